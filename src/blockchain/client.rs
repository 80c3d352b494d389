// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM client for the access-policy, asset, registry and session contracts.

use alloy::{
    network::EthereumWallet,
    primitives::{Address, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;

use super::contracts::{
    v1_type, v2_type, IAccessPolicy, IDelegateRegistryV2, IDelegationRegistryV1, IERC1155,
    ISessionManager,
};
use super::ledger::{AccessLedger, DelegationRegistry, SessionLedger};
use super::types::*;
use crate::access::AccessTier;

/// Read/write client for the gateway's contracts.
pub struct LedgerClient {
    /// Network configuration
    network: NetworkConfig,
    /// Read-only provider
    provider: DynProvider,
    /// Provider with the operator wallet attached (writes)
    writer: Option<DynProvider>,
    access_source: AccessSource,
    /// Gated ERC-1155 contract
    asset: Address,
    session_manager: Option<Address>,
}

impl LedgerClient {
    /// Create a new client for the specified network.
    ///
    /// `operator_key` is a hex private key used for `openFreeSession` and
    /// `closeSession`; without it those writes report `NotConfigured`.
    pub fn new(
        network: NetworkConfig,
        access_source: AccessSource,
        asset: Address,
        session_manager: Option<Address>,
        operator_key: Option<&str>,
    ) -> Result<Self, LedgerError> {
        let url = parse_rpc_url(&network.rpc_url)?;
        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();

        let writer = match operator_key {
            Some(key) => {
                let wallet = EthereumWallet::from(create_signer(key)?);
                Some(ProviderBuilder::new().wallet(wallet).connect_http(url).erased())
            }
            None => None,
        };

        Ok(Self {
            network,
            provider,
            writer,
            access_source,
            asset,
            session_manager,
        })
    }

    /// The read-only provider, shared with registry clients and the transfer feed.
    pub fn provider(&self) -> DynProvider {
        self.provider.clone()
    }

    /// Get the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Get the current block number.
    pub async fn get_block_number(&self) -> Result<u64, LedgerError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }

    fn session_manager_address(&self) -> Result<Address, LedgerError> {
        self.session_manager
            .ok_or(LedgerError::NotConfigured("session manager contract"))
    }

    fn session_writer(&self) -> Result<ISessionManager::ISessionManagerInstance<DynProvider>, LedgerError> {
        let address = self.session_manager_address()?;
        let writer = self
            .writer
            .clone()
            .ok_or(LedgerError::NotConfigured("operator private key"))?;
        Ok(ISessionManager::new(address, writer))
    }
}

#[async_trait]
impl AccessLedger for LedgerClient {
    async fn check_access(&self, wallet: Address) -> Result<AccessTier, LedgerError> {
        match &self.access_source {
            AccessSource::PolicyContract(policy) => {
                let contract = IAccessPolicy::new(*policy, self.provider.clone());
                let result = contract
                    .checkAccess(wallet)
                    .call()
                    .await
                    .map_err(|e| LedgerError::Contract(e.to_string()))?;
                Ok(AccessTier::from_policy(result.access, result.free))
            }
            AccessSource::TokenBalances {
                free_token_id,
                paid_token_id,
            } => {
                let contract = IERC1155::new(self.asset, self.provider.clone());
                let balances: Vec<U256> = contract
                    .balanceOfBatch(vec![wallet, wallet], vec![*free_token_id, *paid_token_id])
                    .call()
                    .await
                    .map_err(|e| LedgerError::Contract(e.to_string()))?;
                if balances.len() != 2 {
                    return Err(LedgerError::Contract(format!(
                        "balanceOfBatch returned {} entries, expected 2",
                        balances.len()
                    )));
                }
                Ok(AccessTier::from_balances(
                    !balances[0].is_zero(),
                    !balances[1].is_zero(),
                ))
            }
        }
    }
}

#[async_trait]
impl SessionLedger for LedgerClient {
    async fn has_paid_session(&self, wallet: Address) -> Result<bool, LedgerError> {
        let contract = ISessionManager::new(self.session_manager_address()?, self.provider.clone());
        contract
            .hasActiveSession(wallet)
            .call()
            .await
            .map_err(|e| LedgerError::Contract(e.to_string()))
    }

    async fn open_free_session(&self, wallet: Address) -> Result<(), LedgerError> {
        let contract = self.session_writer()?;
        let pending = contract
            .openFreeSession(wallet)
            .send()
            .await
            .map_err(|e| LedgerError::TransactionFailed(e.to_string()))?;
        confirm(pending).await
    }

    async fn close_session(&self, wallet: Address) -> Result<(), LedgerError> {
        let contract = self.session_writer()?;
        let pending = contract
            .closeSession(wallet)
            .send()
            .await
            .map_err(|e| LedgerError::TransactionFailed(e.to_string()))?;
        confirm(pending).await
    }
}

async fn confirm(
    pending: alloy::providers::PendingTransactionBuilder<alloy::network::Ethereum>,
) -> Result<(), LedgerError> {
    let receipt = pending
        .get_receipt()
        .await
        .map_err(|e| LedgerError::TransactionFailed(e.to_string()))?;
    if receipt.status() {
        Ok(())
    } else {
        Err(LedgerError::TransactionFailed(format!(
            "transaction {:#x} reverted",
            receipt.transaction_hash
        )))
    }
}

/// Client for one delegation registry.
pub struct RegistryClient {
    config: RegistryConfig,
    /// Gated asset contract; contract-scoped delegations must point here
    asset: Address,
    provider: DynProvider,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig, asset: Address, provider: DynProvider) -> Self {
        Self {
            config,
            asset,
            provider,
        }
    }
}

#[async_trait]
impl DelegationRegistry for RegistryClient {
    fn label(&self) -> String {
        format!("{}:{:#x}", self.config.kind, self.config.address)
    }

    async fn vaults_for(&self, hot_wallet: Address) -> Result<Vec<Address>, LedgerError> {
        match self.config.kind {
            RegistryKind::V2 => {
                let registry = IDelegateRegistryV2::new(self.config.address, self.provider.clone());
                let delegations = registry
                    .getIncomingDelegations(hot_wallet)
                    .call()
                    .await
                    .map_err(|e| LedgerError::Contract(e.to_string()))?;
                Ok(delegations
                    .into_iter()
                    .filter(|d| v2_qualifies(d.type_, d.contract_, self.asset))
                    .map(|d| d.from)
                    .collect())
            }
            RegistryKind::V1 => {
                let registry =
                    IDelegationRegistryV1::new(self.config.address, self.provider.clone());
                let delegations = registry
                    .getDelegationsByDelegate(hot_wallet)
                    .call()
                    .await
                    .map_err(|e| LedgerError::Contract(e.to_string()))?;
                Ok(delegations
                    .into_iter()
                    .filter(|d| v1_qualifies(d.type_, d.contract_, self.asset))
                    .map(|d| d.vault)
                    .collect())
            }
        }
    }
}

/// Whether a v2 delegation covers the gated asset.
fn v2_qualifies(kind: u8, contract: Address, asset: Address) -> bool {
    match kind {
        v2_type::ALL => true,
        v2_type::CONTRACT | v2_type::ERC1155 => contract == asset,
        _ => false,
    }
}

/// Whether a v1 delegation covers the gated asset.
fn v1_qualifies(kind: u8, contract: Address, asset: Address) -> bool {
    match kind {
        v1_type::ALL => true,
        v1_type::CONTRACT | v1_type::TOKEN => contract == asset,
        _ => false,
    }
}

fn parse_rpc_url(raw: &str) -> Result<url::Url, LedgerError> {
    raw.parse()
        .map_err(|e: url::ParseError| LedgerError::InvalidRpcUrl(e.to_string()))
}

/// Create a signer from a hex private key (with or without 0x prefix).
pub fn create_signer(private_key_hex: &str) -> Result<PrivateKeySigner, LedgerError> {
    let key_bytes = alloy::hex::decode(private_key_hex.trim())
        .map_err(|e| LedgerError::InvalidPrivateKey(e.to_string()))?;

    PrivateKeySigner::from_slice(&key_bytes)
        .map_err(|e| LedgerError::InvalidPrivateKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> NetworkConfig {
        NetworkConfig {
            name: "test".to_string(),
            chain_id: 31337,
            rpc_url: "http://127.0.0.1:8545".to_string(),
        }
    }

    #[test]
    fn v2_delegation_scoping() {
        let asset = Address::repeat_byte(0xaa);
        let other = Address::repeat_byte(0xbb);
        assert!(v2_qualifies(v2_type::ALL, Address::ZERO, asset));
        assert!(v2_qualifies(v2_type::CONTRACT, asset, asset));
        assert!(v2_qualifies(v2_type::ERC1155, asset, asset));
        assert!(!v2_qualifies(v2_type::CONTRACT, other, asset));
        // ERC20 delegations never cover an ERC-1155 asset
        assert!(!v2_qualifies(4, asset, asset));
        assert!(!v2_qualifies(0, asset, asset));
    }

    #[test]
    fn v1_delegation_scoping() {
        let asset = Address::repeat_byte(0xaa);
        assert!(v1_qualifies(v1_type::ALL, Address::ZERO, asset));
        assert!(v1_qualifies(v1_type::TOKEN, asset, asset));
        assert!(!v1_qualifies(v1_type::CONTRACT, Address::ZERO, asset));
        assert!(!v1_qualifies(0, asset, asset));
    }

    #[test]
    fn rejects_invalid_rpc_url() {
        let mut bad = network();
        bad.rpc_url = "not a url".to_string();
        let result = LedgerClient::new(
            bad,
            AccessSource::PolicyContract(Address::repeat_byte(1)),
            Address::repeat_byte(2),
            None,
            None,
        );
        assert!(matches!(result, Err(LedgerError::InvalidRpcUrl(_))));
    }

    #[test]
    fn rejects_invalid_operator_key() {
        let result = LedgerClient::new(
            network(),
            AccessSource::PolicyContract(Address::repeat_byte(1)),
            Address::repeat_byte(2),
            None,
            Some("zz"),
        );
        assert!(matches!(result, Err(LedgerError::InvalidPrivateKey(_))));
    }

    #[test]
    fn create_signer_accepts_prefixed_hex() {
        let key = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
        let signer = create_signer(key).unwrap();
        let again = create_signer(&key[2..]).unwrap();
        assert_eq!(signer.address(), again.address());
    }

    #[tokio::test]
    async fn writes_without_operator_key_are_not_configured() {
        let client = LedgerClient::new(
            network(),
            AccessSource::PolicyContract(Address::repeat_byte(1)),
            Address::repeat_byte(2),
            Some(Address::repeat_byte(3)),
            None,
        )
        .unwrap();
        let result = client.open_free_session(Address::repeat_byte(4)).await;
        assert!(matches!(result, Err(LedgerError::NotConfigured(_))));

        let no_manager = LedgerClient::new(
            network(),
            AccessSource::PolicyContract(Address::repeat_byte(1)),
            Address::repeat_byte(2),
            None,
            None,
        )
        .unwrap();
        let result = no_manager.has_paid_session(Address::repeat_byte(4)).await;
        assert!(matches!(result, Err(LedgerError::NotConfigured(_))));
    }
}
