// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transfer Feed
//!
//! Log-polling subscription to `TransferSingle` / `TransferBatch` events on
//! the gated ERC-1155 contract.
//!
//! ## Strategy
//!
//! A subscription starts at the current chain head and walks forward with
//! `eth_getLogs`, in chunks of at most `chunk_size` blocks. Each non-empty
//! chunk is pushed onto a bounded channel. The first RPC error is delivered
//! on the channel and ends the subscription; resubscribing starts again from
//! the head, which is safe because revocation only needs transfers that
//! happen after the caches were populated.

use std::time::Duration;

use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::contracts::IERC1155;
use super::ledger::{TransferBatchResult, TransferFeed};
use super::types::{LedgerError, TransferEvent};

/// Default block chunk size per `eth_getLogs` query.
const DEFAULT_CHUNK_SIZE: u64 = 2000;

/// Default poll interval when caught up to chain head.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Buffered batches per subscription.
const CHANNEL_CAPACITY: usize = 64;

/// Transfer feed backed by an alloy HTTP provider.
pub struct LogPollingFeed {
    provider: DynProvider,
    asset: Address,
    poll_interval: Duration,
    chunk_size: u64,
}

impl LogPollingFeed {
    pub fn new(provider: DynProvider, asset: Address) -> Self {
        Self {
            provider,
            asset,
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn filter(&self, from_block: u64, to_block: u64) -> Filter {
        Filter::new()
            .address(self.asset)
            .event_signature(vec![
                IERC1155::TransferSingle::SIGNATURE_HASH,
                IERC1155::TransferBatch::SIGNATURE_HASH,
            ])
            .from_block(from_block)
            .to_block(to_block)
    }
}

#[async_trait]
impl TransferFeed for LogPollingFeed {
    async fn subscribe(&self) -> Result<mpsc::Receiver<TransferBatchResult>, LedgerError> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let poller = Poller {
            provider: self.provider.clone(),
            filter_template: self.filter(0, 0),
            poll_interval: self.poll_interval,
            chunk_size: self.chunk_size,
            next_block: head + 1,
        };
        tokio::spawn(poller.run(tx));

        Ok(rx)
    }
}

struct Poller {
    provider: DynProvider,
    filter_template: Filter,
    poll_interval: Duration,
    chunk_size: u64,
    next_block: u64,
}

impl Poller {
    async fn run(mut self, tx: mpsc::Sender<TransferBatchResult>) {
        loop {
            match self.poll_step().await {
                Ok(events) if events.is_empty() => {}
                Ok(events) => {
                    if tx.send(Ok(events)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = tx.closed() => return,
            }
        }
    }

    /// Fetch transfers from the next unseen block up to head (chunk-bounded).
    async fn poll_step(&mut self) -> Result<Vec<TransferEvent>, LedgerError> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        if self.next_block > head {
            return Ok(Vec::new());
        }

        let to = (self.next_block + self.chunk_size - 1).min(head);
        let filter = self
            .filter_template
            .clone()
            .from_block(self.next_block)
            .to_block(to);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        self.next_block = to + 1;
        Ok(logs.iter().filter_map(decode_transfer).collect())
    }
}

/// Extract sender/receiver from a transfer log.
///
/// Both events index `(operator, from, to)`, so topics 2 and 3 hold the
/// counterparties.
pub fn decode_transfer(log: &Log) -> Option<TransferEvent> {
    let topics = log.topics();
    if topics.len() < 4 {
        return None;
    }
    let signature = topics[0];
    if signature != IERC1155::TransferSingle::SIGNATURE_HASH
        && signature != IERC1155::TransferBatch::SIGNATURE_HASH
    {
        return None;
    }

    Some(TransferEvent {
        from: topic_address(&topics[2]),
        to: topic_address(&topics[3]),
        block_number: log.block_number,
        tx_hash: log.transaction_hash,
    })
}

/// Last 20 bytes of a 32-byte topic.
fn topic_address(topic: &B256) -> Address {
    Address::from_slice(&topic[12..])
}
