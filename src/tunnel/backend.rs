// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tunnel endpoint control.
//!
//! The peer manager only talks to [`TunnelBackend`]. The production backend
//! drives a WireGuard interface through the `wg` tool; tests use a recording
//! double.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::process::Command;
use tracing::debug;

/// Length of a WireGuard public key in bytes.
pub const WG_KEY_LEN: usize = 32;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Cumulative byte counters for one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("invalid tunnel public key: {0}")]
    InvalidKey(String),

    #[error("failed to run {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("{command} exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{0} timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("unexpected tunnel output: {0}")]
    Parse(String),
}

#[async_trait]
pub trait TunnelBackend: Send + Sync {
    /// Add or update a peer whose only allowed address is `address/32`.
    async fn configure_peer(&self, public_key: &str, address: Ipv4Addr) -> Result<(), BackendError>;

    async fn remove_peer(&self, public_key: &str) -> Result<(), BackendError>;

    /// Byte counters for every configured peer, keyed by public key.
    async fn transfer_stats(&self) -> Result<HashMap<String, TransferCounters>, BackendError>;
}

/// Check that `key` is a base64-encoded 32-byte WireGuard key.
pub fn validate_wg_key(key: &str) -> Result<(), BackendError> {
    match STANDARD.decode(key) {
        Ok(bytes) if bytes.len() == WG_KEY_LEN => Ok(()),
        _ => Err(BackendError::InvalidKey(key.to_string())),
    }
}

/// [`TunnelBackend`] over the `wg` command-line tool.
#[derive(Debug, Clone)]
pub struct WgCommandBackend {
    interface: String,
    binary: String,
    timeout: Duration,
}

impl WgCommandBackend {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            binary: "wg".to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    async fn run(&self, args: &[&str]) -> Result<Output, BackendError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!(command = %command, "Running tunnel command");

        let child = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| BackendError::Timeout(command.clone(), self.timeout))?
            .map_err(|e| BackendError::Spawn {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(BackendError::Command {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl TunnelBackend for WgCommandBackend {
    async fn configure_peer(&self, public_key: &str, address: Ipv4Addr) -> Result<(), BackendError> {
        validate_wg_key(public_key)?;
        let allowed = format!("{address}/32");
        self.run(&[
            "set",
            &self.interface,
            "peer",
            public_key,
            "allowed-ips",
            &allowed,
        ])
        .await?;
        Ok(())
    }

    async fn remove_peer(&self, public_key: &str) -> Result<(), BackendError> {
        validate_wg_key(public_key)?;
        self.run(&["set", &self.interface, "peer", public_key, "remove"])
            .await?;
        Ok(())
    }

    async fn transfer_stats(&self) -> Result<HashMap<String, TransferCounters>, BackendError> {
        let output = self.run(&["show", &self.interface, "transfer"]).await?;
        parse_transfer(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `wg show <iface> transfer` output: `<key>\t<rx>\t<tx>` per line.
pub fn parse_transfer(output: &str) -> Result<HashMap<String, TransferCounters>, BackendError> {
    let mut stats = HashMap::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let mut fields = line.split_whitespace();
        let (Some(key), Some(rx), Some(tx), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(BackendError::Parse(line.to_string()));
        };
        let rx_bytes = rx.parse().map_err(|_| BackendError::Parse(line.to_string()))?;
        let tx_bytes = tx.parse().map_err(|_| BackendError::Parse(line.to_string()))?;
        stats.insert(key.to_string(), TransferCounters { rx_bytes, tx_bytes });
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";

    #[test]
    fn accepts_only_32_byte_base64_keys() {
        assert!(validate_wg_key(KEY).is_ok());
        assert!(validate_wg_key("K1").is_err());
        assert!(validate_wg_key("not base64 at all!").is_err());
        // 16 bytes
        assert!(validate_wg_key("AAAAAAAAAAAAAAAAAAAAAA==").is_err());
        // Argument injection never reaches the command line.
        assert!(validate_wg_key("--help").is_err());
    }

    #[test]
    fn parses_transfer_output() {
        let output = format!("{KEY}\t1024\t2048\nAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=\t0\t0\n");
        let stats = parse_transfer(&output).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(
            stats[KEY],
            TransferCounters {
                rx_bytes: 1024,
                tx_bytes: 2048
            }
        );
    }

    #[test]
    fn empty_output_has_no_peers() {
        assert!(parse_transfer("").unwrap().is_empty());
    }

    #[test]
    fn rejects_garbled_transfer_lines() {
        assert!(parse_transfer("key\tlots\t2").is_err());
        assert!(parse_transfer("key\t1").is_err());
    }

    #[tokio::test]
    async fn invalid_key_fails_before_spawning() {
        let backend = WgCommandBackend::new("wg-test");
        let result = backend
            .configure_peer("K1", Ipv4Addr::new(10, 8, 0, 2))
            .await;
        assert_eq!(result, Err(BackendError::InvalidKey("K1".to_string())));
    }
}
