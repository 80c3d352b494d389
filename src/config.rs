// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup. Any invalid
//! value aborts startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `RPC_URL` | EVM JSON-RPC endpoint | Required |
//! | `CHAIN_ID` | Chain id, also embedded in sign-in messages | Required |
//! | `NETWORK_NAME` | Network name for logs | `mainnet` |
//! | `ASSET_ADDRESS` | Gated ERC-1155 contract | Required |
//! | `ACCESS_POLICY_ADDRESS` | `checkAccess` policy contract | Optional (token balances when unset) |
//! | `FREE_TOKEN_ID` | Token id granting the free tier | `0` |
//! | `PAID_TOKEN_ID` | Token id granting the paid tier | `1` |
//! | `SESSION_MANAGER_ADDRESS` | On-chain session bookkeeping contract; without it paid tiers cannot connect | Optional |
//! | `OPERATOR_PRIVATE_KEY` | Hex key used for session writes | Optional |
//! | `DELEGATION_REGISTRIES` | `v2:0x..,v1:0x..` | Optional |
//! | `SIWE_DOMAIN` | Domain expected in sign-in messages | Required |
//! | `SIWE_URI` | URI embedded in sign-in messages | `https://{SIWE_DOMAIN}` |
//! | `SIWE_STATEMENT` | Statement embedded in sign-in messages | see [`DEFAULT_STATEMENT`] |
//! | `NONCE_LENGTH` | Nonce entropy in bytes (min 8) | `16` |
//! | `CHALLENGE_TTL_SECS` | Challenge lifetime | `300` |
//! | `SESSION_TTL_SECS` | Session (credential) lifetime | `86400` |
//! | `TIER_CACHE_TTL_SECS` | Tier cache TTL | `300` |
//! | `DELEGATION_CACHE_TTL_SECS` | Delegation cache TTL | `300` |
//! | `LEDGER_TIMEOUT_SECS` | Per-call ledger timeout | `10` |
//! | `WATCHER_BACKOFF_SECS` | Resubscribe delay after a feed error | `10` |
//! | `LOG_POLL_INTERVAL_SECS` | Transfer log polling interval | `3` |
//! | `SWEEP_INTERVAL_SECS` | Session and peer sweep interval | `30` |
//! | `LEDGER_WRITE_QUEUE` | Ledger write queue depth | `256` |
//! | `WG_INTERFACE` | WireGuard interface | `wg0` |
//! | `WG_NETWORK` | Client address pool (CIDR) | `10.8.0.0/24` |
//! | `WG_SERVER_PUBLIC_KEY` | Gateway's WireGuard public key | Required |
//! | `WG_SERVER_ENDPOINT` | `host:port` clients connect to | Required |
//! | `WG_DNS` | Comma-separated DNS servers for clients | `1.1.1.1` |
//! | `WG_ALLOWED_IPS` | Comma-separated routes for clients | `0.0.0.0/0` |
//! | `NODE_ID` | This gateway's id in node listings | `SIWE_DOMAIN` |
//! | `NODE_REGION` | This gateway's region | `unknown` |
//! | `NODE_REGISTRY_URL` | External node registry | Optional |
//! | `REPUTATION_URL` | Node reputation service | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, U256};

use crate::auth::challenge::MIN_NONCE_BYTES;
use crate::blockchain::writer::DEFAULT_QUEUE_CAPACITY;
use crate::blockchain::{AccessSource, NetworkConfig, RegistryConfig, RegistryKind};
use crate::sweeper::DEFAULT_SWEEP_INTERVAL;
use crate::watcher::DEFAULT_BACKOFF;
use crate::tunnel::AddressPool;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const RPC_URL_ENV: &str = "RPC_URL";
pub const CHAIN_ID_ENV: &str = "CHAIN_ID";
pub const NETWORK_NAME_ENV: &str = "NETWORK_NAME";
pub const ASSET_ADDRESS_ENV: &str = "ASSET_ADDRESS";
pub const ACCESS_POLICY_ADDRESS_ENV: &str = "ACCESS_POLICY_ADDRESS";
pub const FREE_TOKEN_ID_ENV: &str = "FREE_TOKEN_ID";
pub const PAID_TOKEN_ID_ENV: &str = "PAID_TOKEN_ID";
pub const SESSION_MANAGER_ADDRESS_ENV: &str = "SESSION_MANAGER_ADDRESS";
pub const OPERATOR_PRIVATE_KEY_ENV: &str = "OPERATOR_PRIVATE_KEY";
pub const DELEGATION_REGISTRIES_ENV: &str = "DELEGATION_REGISTRIES";
pub const SIWE_DOMAIN_ENV: &str = "SIWE_DOMAIN";
pub const SIWE_URI_ENV: &str = "SIWE_URI";
pub const SIWE_STATEMENT_ENV: &str = "SIWE_STATEMENT";
pub const NONCE_LENGTH_ENV: &str = "NONCE_LENGTH";
pub const CHALLENGE_TTL_ENV: &str = "CHALLENGE_TTL_SECS";
pub const SESSION_TTL_ENV: &str = "SESSION_TTL_SECS";
pub const TIER_CACHE_TTL_ENV: &str = "TIER_CACHE_TTL_SECS";
pub const DELEGATION_CACHE_TTL_ENV: &str = "DELEGATION_CACHE_TTL_SECS";
pub const LEDGER_TIMEOUT_ENV: &str = "LEDGER_TIMEOUT_SECS";
pub const WATCHER_BACKOFF_ENV: &str = "WATCHER_BACKOFF_SECS";
pub const LOG_POLL_INTERVAL_ENV: &str = "LOG_POLL_INTERVAL_SECS";
pub const SWEEP_INTERVAL_ENV: &str = "SWEEP_INTERVAL_SECS";
pub const LEDGER_WRITE_QUEUE_ENV: &str = "LEDGER_WRITE_QUEUE";
pub const WG_INTERFACE_ENV: &str = "WG_INTERFACE";
pub const WG_NETWORK_ENV: &str = "WG_NETWORK";
pub const WG_SERVER_PUBLIC_KEY_ENV: &str = "WG_SERVER_PUBLIC_KEY";
pub const WG_SERVER_ENDPOINT_ENV: &str = "WG_SERVER_ENDPOINT";
pub const WG_DNS_ENV: &str = "WG_DNS";
pub const WG_ALLOWED_IPS_ENV: &str = "WG_ALLOWED_IPS";
pub const NODE_ID_ENV: &str = "NODE_ID";
pub const NODE_REGION_ENV: &str = "NODE_REGION";
pub const NODE_REGISTRY_URL_ENV: &str = "NODE_REGISTRY_URL";
pub const REPUTATION_URL_ENV: &str = "REPUTATION_URL";

/// Environment variable name for log output format.
///
/// `json` for structured output; anything else is human-readable.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default `RUST_LOG` filter when unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

pub const DEFAULT_STATEMENT: &str = "Sign in to the tunnel gateway.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.into(),
    }
}

/// Operator key; never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey(<redacted>)")
    }
}

/// Sign-in challenge parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweConfig {
    pub domain: String,
    pub uri: String,
    pub statement: String,
    pub nonce_bytes: usize,
    pub challenge_ttl: Duration,
}

/// Local tunnel interface and client parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub interface: String,
    pub network: String,
    pub server_public_key: String,
    pub server_endpoint: String,
    pub dns: Vec<String>,
    pub allowed_ips: Vec<String>,
}

/// Node listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub id: String,
    pub region: String,
    pub registry_url: Option<String>,
    pub reputation_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub network: NetworkConfig,
    pub asset: Address,
    pub access_source: AccessSource,
    pub session_manager: Option<Address>,
    pub operator_key: Option<SecretKey>,
    pub registries: Vec<RegistryConfig>,
    pub siwe: SiweConfig,
    pub session_ttl: Duration,
    pub tier_cache_ttl: Duration,
    pub delegation_cache_ttl: Duration,
    pub ledger_timeout: Duration,
    pub watcher_backoff: Duration,
    pub log_poll_interval: Duration,
    pub sweep_interval: Duration,
    pub write_queue_capacity: usize,
    pub tunnel: TunnelConfig,
    pub node: NodeConfig,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup: &lookup };

        let rpc_url = env.required(RPC_URL_ENV)?;
        url::Url::parse(&rpc_url).map_err(|e| invalid(RPC_URL_ENV, e.to_string()))?;
        let network = NetworkConfig {
            name: env.or_default(NETWORK_NAME_ENV, "mainnet"),
            chain_id: env.parse_required(CHAIN_ID_ENV)?,
            rpc_url,
        };

        let access_source = match env.address_optional(ACCESS_POLICY_ADDRESS_ENV)? {
            Some(policy) => AccessSource::PolicyContract(policy),
            None => AccessSource::TokenBalances {
                free_token_id: env.parse_or(FREE_TOKEN_ID_ENV, U256::ZERO)?,
                paid_token_id: env.parse_or(PAID_TOKEN_ID_ENV, U256::from(1))?,
            },
        };

        let registries = match env.optional(DELEGATION_REGISTRIES_ENV) {
            Some(raw) => parse_registries(&raw)?,
            None => Vec::new(),
        };

        let domain = env.required(SIWE_DOMAIN_ENV)?;
        let nonce_bytes: usize = env.parse_or(NONCE_LENGTH_ENV, 16)?;
        if nonce_bytes < MIN_NONCE_BYTES {
            return Err(invalid(
                NONCE_LENGTH_ENV,
                format!("{nonce_bytes} bytes is below the minimum of {MIN_NONCE_BYTES}"),
            ));
        }
        let siwe = SiweConfig {
            uri: env.or_default(SIWE_URI_ENV, &format!("https://{domain}")),
            statement: env.or_default(SIWE_STATEMENT_ENV, DEFAULT_STATEMENT),
            nonce_bytes,
            challenge_ttl: env.secs(CHALLENGE_TTL_ENV, 300)?,
            domain,
        };

        let network_cidr = env.or_default(WG_NETWORK_ENV, "10.8.0.0/24");
        AddressPool::parse(&network_cidr).map_err(|e| invalid(WG_NETWORK_ENV, e.to_string()))?;
        let tunnel = TunnelConfig {
            interface: env.or_default(WG_INTERFACE_ENV, "wg0"),
            network: network_cidr,
            server_public_key: env.required(WG_SERVER_PUBLIC_KEY_ENV)?,
            server_endpoint: env.required(WG_SERVER_ENDPOINT_ENV)?,
            dns: split_list(&env.or_default(WG_DNS_ENV, "1.1.1.1")),
            allowed_ips: split_list(&env.or_default(WG_ALLOWED_IPS_ENV, "0.0.0.0/0")),
        };

        let node = NodeConfig {
            id: env.or_default(NODE_ID_ENV, &siwe.domain),
            region: env.or_default(NODE_REGION_ENV, "unknown"),
            registry_url: env.optional(NODE_REGISTRY_URL_ENV),
            reputation_url: env.optional(REPUTATION_URL_ENV),
        };

        let write_queue_capacity: usize = env.parse_or(LEDGER_WRITE_QUEUE_ENV, DEFAULT_QUEUE_CAPACITY)?;
        if write_queue_capacity == 0 {
            return Err(invalid(LEDGER_WRITE_QUEUE_ENV, "must be greater than zero"));
        }

        Ok(Self {
            host: env.or_default(HOST_ENV, "0.0.0.0"),
            port: env.parse_or(PORT_ENV, 8080)?,
            network,
            asset: env.address_required(ASSET_ADDRESS_ENV)?,
            access_source,
            session_manager: env.address_optional(SESSION_MANAGER_ADDRESS_ENV)?,
            operator_key: env.optional(OPERATOR_PRIVATE_KEY_ENV).map(SecretKey),
            registries,
            siwe,
            session_ttl: env.secs(SESSION_TTL_ENV, 86_400)?,
            tier_cache_ttl: env.secs(TIER_CACHE_TTL_ENV, 300)?,
            delegation_cache_ttl: env.secs(DELEGATION_CACHE_TTL_ENV, 300)?,
            ledger_timeout: env.secs(LEDGER_TIMEOUT_ENV, 10)?,
            watcher_backoff: env.secs(WATCHER_BACKOFF_ENV, DEFAULT_BACKOFF.as_secs())?,
            log_poll_interval: env.secs(LOG_POLL_INTERVAL_ENV, 3)?,
            sweep_interval: env.secs(SWEEP_INTERVAL_ENV, DEFAULT_SWEEP_INTERVAL.as_secs())?,
            write_queue_capacity,
            tunnel,
            node,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse `v2:0xabc..,v1:0xdef..`.
pub fn parse_registries(raw: &str) -> Result<Vec<RegistryConfig>, ConfigError> {
    split_list(raw)
        .into_iter()
        .map(|entry| {
            let (kind, address) = entry
                .split_once(':')
                .ok_or_else(|| invalid(DELEGATION_REGISTRIES_ENV, format!("{entry}: expected kind:address")))?;
            let kind = match kind.trim().to_ascii_lowercase().as_str() {
                "v1" => RegistryKind::V1,
                "v2" => RegistryKind::V2,
                other => {
                    return Err(invalid(
                        DELEGATION_REGISTRIES_ENV,
                        format!("unknown registry kind {other}"),
                    ))
                }
            };
            let address = Address::from_str(address.trim())
                .map_err(|e| invalid(DELEGATION_REGISTRIES_ENV, format!("{entry}: {e}")))?;
            Ok(RegistryConfig { kind, address })
        })
        .collect()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => raw.parse().map_err(|e: T::Err| invalid(name, format!("{raw}: {e}"))),
            None => Ok(default),
        }
    }

    fn parse_required<T>(&self, name: &'static str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.required(name)?;
        raw.parse().map_err(|e: T::Err| invalid(name, format!("{raw}: {e}")))
    }

    fn address_required(&self, name: &'static str) -> Result<Address, ConfigError> {
        self.parse_required(name)
    }

    fn address_optional(&self, name: &'static str) -> Result<Option<Address>, ConfigError> {
        self.optional(name)
            .map(|raw| Address::from_str(&raw).map_err(|e| invalid(name, format!("{raw}: {e}"))))
            .transpose()
    }

    /// Whole seconds; zero is rejected.
    fn secs(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        let secs: u64 = self.parse_or(name, default)?;
        if secs == 0 {
            return Err(invalid(name, "must be greater than zero"));
        }
        Ok(Duration::from_secs(secs))
    }
}
