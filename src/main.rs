// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tunnel_gate_server::{
    access::{DelegationResolver, TierResolver},
    api::router,
    auth::{ChallengeService, ChallengeSettings},
    blockchain::{
        DelegationRegistry, LedgerClient, LedgerWriter, LogPollingFeed, RegistryClient,
        SessionLedger,
    },
    config::{GatewayConfig, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV},
    nodes::{HttpNodeDirectory, NodeDirectory, NodeInfo, StaticNodeDirectory},
    session::SessionGate,
    state::AppState,
    sweeper::{PeerSweep, SessionSweep, Sweeper},
    tunnel::{AddressPool, PeerManager, TunnelSettings, WgCommandBackend},
    watcher::RevocationWatcher,
};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Gateway stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Arc::new(LedgerClient::new(
        config.network.clone(),
        config.access_source.clone(),
        config.asset,
        config.session_manager,
        config.operator_key.as_ref().map(|k| k.expose()),
    )?);
    match ledger.get_block_number().await {
        Ok(head) => info!(
            network = %ledger.network().name,
            chain_id = ledger.network().chain_id,
            asset = %config.asset,
            head,
            "Ledger client ready"
        ),
        Err(e) => warn!(network = %ledger.network().name, error = %e, "Ledger not reachable at startup"),
    }
    if config.session_manager.is_none() {
        warn!("No session manager contract, paid-tier connects will be refused");
    }

    let registries: Vec<Arc<dyn DelegationRegistry>> = config
        .registries
        .iter()
        .map(|registry| {
            Arc::new(RegistryClient::new(
                registry.clone(),
                config.asset,
                ledger.provider(),
            )) as Arc<dyn DelegationRegistry>
        })
        .collect();
    let delegations = if registries.is_empty() {
        None
    } else {
        info!(count = registries.len(), "Delegation fallback enabled");
        Some(Arc::new(DelegationResolver::new(
            registries,
            config.delegation_cache_ttl,
            config.ledger_timeout,
        )))
    };

    let tiers = Arc::new(TierResolver::new(
        ledger.clone(),
        delegations.clone(),
        config.tier_cache_ttl,
        config.ledger_timeout,
    ));

    let challenges = Arc::new(ChallengeService::new(ChallengeSettings {
        domain: config.siwe.domain.clone(),
        uri: config.siwe.uri.clone(),
        chain_id: config.network.chain_id,
        statement: Some(config.siwe.statement.clone()).filter(|s| !s.is_empty()),
        nonce_bytes: config.siwe.nonce_bytes,
        ttl: config.siwe.challenge_ttl,
    })?);

    let (teardown_tx, teardown_rx) = mpsc::unbounded_channel();
    let sessions = Arc::new(SessionGate::new(config.session_ttl).with_teardown(teardown_tx));

    let pool = AddressPool::parse(&config.tunnel.network)?;
    info!(
        network = %pool,
        gateway = %pool.server_address(),
        capacity = pool.capacity(),
        interface = %config.tunnel.interface,
        "Address pool ready"
    );
    let peers = Arc::new(PeerManager::new(
        pool,
        Arc::new(WgCommandBackend::new(config.tunnel.interface.clone())),
        TunnelSettings {
            server_public_key: config.tunnel.server_public_key.clone(),
            server_endpoint: config.tunnel.server_endpoint.clone(),
            dns: config.tunnel.dns.clone(),
            allowed_ips: config.tunnel.allowed_ips.clone(),
        },
    ));

    let feed = LogPollingFeed::new(ledger.provider(), config.asset)
        .with_poll_interval(config.log_poll_interval);
    let watcher = RevocationWatcher::new(Arc::new(feed), tiers.clone(), delegations, sessions.clone())
        .with_backoff(config.watcher_backoff);
    let watcher_state = watcher.state();

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    let writer = match (config.session_manager, &config.operator_key) {
        (Some(_), Some(_)) => {
            let (writer, worker) =
                LedgerWriter::new(ledger.clone() as Arc<dyn SessionLedger>, config.write_queue_capacity);
            tasks.push(tokio::spawn(worker.run(shutdown.clone())));
            Some(writer)
        }
        _ => {
            warn!("On-chain session writes disabled (session manager or operator key not set)");
            None
        }
    };

    let nodes: Arc<dyn NodeDirectory> = match &config.node.registry_url {
        Some(url) => Arc::new(HttpNodeDirectory::new(
            url.clone(),
            config.node.reputation_url.clone(),
        )?),
        None => Arc::new(StaticNodeDirectory::new(vec![NodeInfo {
            id: config.node.id.clone(),
            endpoint: config.tunnel.server_endpoint.clone(),
            public_key: config.tunnel.server_public_key.clone(),
            region: config.node.region.clone(),
            reputation: None,
        }])),
    };

    tasks.push(tokio::spawn(watcher.run(shutdown.clone())));
    tasks.push(tokio::spawn(
        Sweeper::new(
            SessionSweep::new(sessions.clone(), challenges.clone()),
            config.sweep_interval,
        )
        .run(shutdown.clone()),
    ));
    tasks.push(tokio::spawn(
        Sweeper::new(
            PeerSweep::new(peers.clone(), sessions.clone(), teardown_rx),
            config.sweep_interval,
        )
        .run(shutdown.clone()),
    ));

    let state = AppState {
        challenges,
        tiers,
        sessions,
        peers,
        payments: ledger,
        writer,
        nodes,
        watcher: watcher_state,
        ledger_timeout: config.ledger_timeout,
    };
    let app = router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Tunnel gate listening (docs at /docs)");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }
    info!("Tunnel gate stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}
