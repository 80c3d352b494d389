// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory fakes for the ledger, tunnel and node directory seams.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::{local::PrivateKeySigner, SignerSync};
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::access::{AccessTier, TierResolver};
use crate::auth::{ChallengeService, ChallengeSettings};
use crate::blockchain::{
    AccessLedger, DelegationRegistry, LedgerError, LedgerWriteWorker, LedgerWriter, SessionLedger,
    TransferBatchResult, TransferEvent, TransferFeed, WriteStatsSnapshot,
};
use crate::nodes::{NodeDirectory, NodeDirectoryError, NodeInfo};
use crate::session::SessionGate;
use crate::state::AppState;
use crate::tunnel::{
    AddressPool, BackendError, PeerManager, TransferCounters, TunnelBackend, TunnelSettings,
};
use crate::watcher::WatcherState;

pub fn settings() -> ChallengeSettings {
    ChallengeSettings {
        domain: "vpn.example.org".to_string(),
        uri: "https://vpn.example.org".to_string(),
        chain_id: 137,
        statement: Some("Sign in to the VPN gateway.".to_string()),
        nonce_bytes: 16,
        ttl: Duration::from_secs(300),
    }
}

pub fn sign(signer: &PrivateKeySigner, message: &str) -> String {
    let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
    alloy::hex::encode_prefixed(signature.as_bytes())
}

pub fn challenge_service() -> ChallengeService {
    ChallengeService::new(settings()).unwrap()
}

pub fn tunnel_settings() -> TunnelSettings {
    TunnelSettings {
        server_public_key: "c2VydmVyLXB1YmxpYy1rZXktMzItYnl0ZXMtbG9uZyE=".to_string(),
        server_endpoint: "vpn.example.org:51820".to_string(),
        dns: vec!["1.1.1.1".to_string()],
        allowed_ips: vec!["0.0.0.0/0".to_string()],
    }
}

pub fn peer_manager(backend: Arc<RecordingBackend>) -> PeerManager {
    PeerManager::new(
        AddressPool::parse("10.8.0.0/24").unwrap(),
        backend,
        tunnel_settings(),
    )
}

fn rpc_failure() -> LedgerError {
    LedgerError::Rpc("connection refused".to_string())
}

/// Tier lookups from a table; unknown wallets are denied.
#[derive(Default)]
pub struct FakeLedger {
    tiers: Mutex<HashMap<Address, AccessTier>>,
    calls: Mutex<HashMap<Address, usize>>,
    failing_wallets: Mutex<HashSet<Address>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FakeLedger {
    pub fn set_tier(&self, wallet: Address, tier: AccessTier) {
        self.tiers.lock().unwrap().insert(wallet, tier);
    }

    pub fn calls_for(&self, wallet: Address) -> usize {
        self.calls.lock().unwrap().get(&wallet).copied().unwrap_or(0)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_wallet(&self, wallet: Address) {
        self.failing_wallets.lock().unwrap().insert(wallet);
    }

    pub fn recover_wallet(&self, wallet: Address) {
        self.failing_wallets.lock().unwrap().remove(&wallet);
    }
}

#[async_trait]
impl AccessLedger for FakeLedger {
    async fn check_access(&self, wallet: Address) -> Result<AccessTier, LedgerError> {
        *self.calls.lock().unwrap().entry(wallet).or_default() += 1;
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) || self.failing_wallets.lock().unwrap().contains(&wallet) {
            return Err(rpc_failure());
        }
        Ok(self
            .tiers
            .lock()
            .unwrap()
            .get(&wallet)
            .copied()
            .unwrap_or(AccessTier::Denied))
    }
}

pub struct FakeRegistry {
    label: String,
    delegations: Mutex<HashMap<Address, Vec<Address>>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            delegations: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delegate(&self, hot_wallet: Address, vault: Address) {
        self.delegations
            .lock()
            .unwrap()
            .entry(hot_wallet)
            .or_default()
            .push(vault);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DelegationRegistry for FakeRegistry {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn vaults_for(&self, hot_wallet: Address) -> Result<Vec<Address>, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(rpc_failure());
        }
        Ok(self
            .delegations
            .lock()
            .unwrap()
            .get(&hot_wallet)
            .cloned()
            .unwrap_or_default())
    }
}

/// Session contract fake. Writes fail while `fail_next_writes` has budget left.
#[derive(Default)]
pub struct FakeSessionLedger {
    paid: Mutex<HashSet<Address>>,
    opened: Mutex<Vec<Address>>,
    closed: Mutex<Vec<Address>>,
    pending_failures: AtomicUsize,
    attempts: AtomicUsize,
    unconfigured: AtomicBool,
}

impl FakeSessionLedger {
    /// Answer payment checks as if no session contract were deployed.
    pub fn set_unconfigured(&self, unconfigured: bool) {
        self.unconfigured.store(unconfigured, Ordering::SeqCst);
    }

    pub fn set_paid(&self, wallet: Address, paid: bool) {
        let mut set = self.paid.lock().unwrap();
        if paid {
            set.insert(wallet);
        } else {
            set.remove(&wallet);
        }
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn opened(&self) -> Vec<Address> {
        self.opened.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<Address> {
        self.closed.lock().unwrap().clone()
    }

    pub fn write_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn record(&self, log: &Mutex<Vec<Address>>, wallet: Address) -> Result<(), LedgerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(rpc_failure());
        }
        log.lock().unwrap().push(wallet);
        Ok(())
    }
}

#[async_trait]
impl SessionLedger for FakeSessionLedger {
    async fn has_paid_session(&self, wallet: Address) -> Result<bool, LedgerError> {
        if self.unconfigured.load(Ordering::SeqCst) {
            return Err(LedgerError::NotConfigured("session manager contract"));
        }
        Ok(self.paid.lock().unwrap().contains(&wallet))
    }

    async fn open_free_session(&self, wallet: Address) -> Result<(), LedgerError> {
        self.record(&self.opened, wallet)
    }

    async fn close_session(&self, wallet: Address) -> Result<(), LedgerError> {
        self.record(&self.closed, wallet)
    }
}

/// Transfer feed driven by the test. Each subscription replaces the last.
#[derive(Default)]
pub struct FakeTransferFeed {
    current: Mutex<Option<mpsc::Sender<TransferBatchResult>>>,
    subscriptions: AtomicUsize,
    attempts: AtomicUsize,
    rejecting: AtomicBool,
}

impl FakeTransferFeed {
    fn sender(&self) -> mpsc::Sender<TransferBatchResult> {
        self.current
            .lock()
            .unwrap()
            .clone()
            .expect("no active subscription")
    }

    pub async fn send(&self, events: Vec<TransferEvent>) {
        self.sender().send(Ok(events)).await.unwrap();
    }

    pub async fn fail(&self) {
        self.sender().send(Err(rpc_failure())).await.unwrap();
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransferFeed for FakeTransferFeed {
    async fn subscribe(&self) -> Result<mpsc::Receiver<TransferBatchResult>, LedgerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(rpc_failure());
        }
        let (tx, rx) = mpsc::channel(16);
        *self.current.lock().unwrap() = Some(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelCall {
    Configure(String, Ipv4Addr),
    Remove(String),
}

/// Tunnel backend that records successful calls and accepts any key.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<TunnelCall>>,
    counters: Mutex<HashMap<String, TransferCounters>>,
    fail_configure: AtomicBool,
    fail_remove: AtomicBool,
}

impl RecordingBackend {
    pub fn calls(&self) -> Vec<TunnelCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_configure(&self, fail: bool) {
        self.fail_configure.store(fail, Ordering::SeqCst);
    }

    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    pub fn set_counters(&self, public_key: &str, counters: TransferCounters) {
        self.counters
            .lock()
            .unwrap()
            .insert(public_key.to_string(), counters);
    }

    fn command_failure(command: &str) -> BackendError {
        BackendError::Command {
            command: command.to_string(),
            status: "exit status: 1".to_string(),
            stderr: "Operation not permitted".to_string(),
        }
    }
}

#[async_trait]
impl TunnelBackend for RecordingBackend {
    async fn configure_peer(&self, public_key: &str, address: Ipv4Addr) -> Result<(), BackendError> {
        if self.fail_configure.load(Ordering::SeqCst) {
            return Err(Self::command_failure("wg set"));
        }
        self.calls
            .lock()
            .unwrap()
            .push(TunnelCall::Configure(public_key.to_string(), address));
        Ok(())
    }

    async fn remove_peer(&self, public_key: &str) -> Result<(), BackendError> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Self::command_failure("wg set"));
        }
        self.calls
            .lock()
            .unwrap()
            .push(TunnelCall::Remove(public_key.to_string()));
        Ok(())
    }

    async fn transfer_stats(&self) -> Result<HashMap<String, TransferCounters>, BackendError> {
        Ok(self.counters.lock().unwrap().clone())
    }
}

pub struct FakeNodeDirectory {
    nodes: Vec<NodeInfo>,
    failing: AtomicBool,
}

impl FakeNodeDirectory {
    pub fn new(nodes: Vec<NodeInfo>) -> Self {
        Self {
            nodes,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeDirectory for FakeNodeDirectory {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, NodeDirectoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NodeDirectoryError::Request("registry unreachable".to_string()));
        }
        Ok(self.nodes.clone())
    }
}

pub fn node(id: &str, region: &str) -> NodeInfo {
    NodeInfo {
        id: id.to_string(),
        endpoint: format!("{id}.example.org:51820"),
        public_key: format!("{id}-key"),
        region: region.to_string(),
        reputation: None,
    }
}

/// A fully wired `AppState` over fakes. The write worker is held, not run,
/// so queued writes stay observable through `writer_stats`.
pub struct TestGateway {
    pub state: AppState,
    pub ledger: Arc<FakeLedger>,
    pub session_ledger: Arc<FakeSessionLedger>,
    pub backend: Arc<RecordingBackend>,
    pub nodes: Arc<FakeNodeDirectory>,
    watcher_tx: watch::Sender<WatcherState>,
    _worker: LedgerWriteWorker,
}

impl TestGateway {
    pub fn new() -> Self {
        let ledger = Arc::new(FakeLedger::default());
        let session_ledger = Arc::new(FakeSessionLedger::default());
        let backend = Arc::new(RecordingBackend::default());
        let nodes = Arc::new(FakeNodeDirectory::new(vec![
            node("fra-1", "eu-west"),
            node("nyc-1", "us-east"),
        ]));
        let (watcher_tx, watcher_rx) = watch::channel(WatcherState::Disconnected);
        let (writer, worker) = LedgerWriter::new(session_ledger.clone(), 16);

        let state = AppState {
            challenges: Arc::new(challenge_service()),
            tiers: Arc::new(TierResolver::new(
                ledger.clone(),
                None,
                Duration::from_secs(300),
                Duration::from_millis(200),
            )),
            sessions: Arc::new(SessionGate::new(Duration::from_secs(3600))),
            peers: Arc::new(peer_manager(backend.clone())),
            payments: session_ledger.clone(),
            writer: Some(writer),
            nodes: nodes.clone(),
            watcher: watcher_rx,
            ledger_timeout: Duration::from_millis(200),
        };

        Self {
            state,
            ledger,
            session_ledger,
            backend,
            nodes,
            watcher_tx,
            _worker: worker,
        }
    }

    pub fn set_watcher(&self, state: WatcherState) {
        self.watcher_tx.send_replace(state);
    }

    pub fn writer_stats(&self) -> WriteStatsSnapshot {
        self.state
            .writer
            .as_ref()
            .map(LedgerWriter::stats)
            .unwrap_or_default()
    }
}
