// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Write Queue
//!
//! Best-effort on-chain bookkeeping (free-session records, session closes)
//! runs off the request path through a bounded queue drained by a single
//! worker task.
//!
//! Every job is retried a fixed number of times. The caller gets a `oneshot`
//! receiver for the final outcome and may drop it; counters make failures
//! visible either way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ledger::SessionLedger;
use super::types::{with_timeout, LedgerError};

/// Default queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default attempts per job.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between attempts.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Deadline for one attempt (transactions wait for a receipt).
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// A queued on-chain write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerWrite {
    OpenFreeSession(Address),
    CloseSession(Address),
}

impl LedgerWrite {
    pub fn wallet(&self) -> Address {
        match self {
            LedgerWrite::OpenFreeSession(wallet) | LedgerWrite::CloseSession(wallet) => *wallet,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            LedgerWrite::OpenFreeSession(_) => "open_free_session",
            LedgerWrite::CloseSession(_) => "close_session",
        }
    }
}

/// Final outcome of a queued write.
pub type WriteOutcome = Result<(), LedgerError>;

struct Job {
    write: LedgerWrite,
    done: oneshot::Sender<WriteOutcome>,
}

/// Counters for queued writes.
#[derive(Debug, Default)]
pub struct WriteStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`WriteStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStatsSnapshot {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl WriteStats {
    pub fn snapshot(&self) -> WriteStatsSnapshot {
        WriteStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable handle used by request handlers to enqueue writes.
#[derive(Clone)]
pub struct LedgerWriter {
    tx: mpsc::Sender<Job>,
    stats: Arc<WriteStats>,
}

impl LedgerWriter {
    /// Create the handle and its worker. The worker must be spawned with
    /// [`LedgerWriteWorker::run`].
    pub fn new(ledger: Arc<dyn SessionLedger>, capacity: usize) -> (Self, LedgerWriteWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(WriteStats::default());
        let writer = Self {
            tx,
            stats: stats.clone(),
        };
        let worker = LedgerWriteWorker {
            rx,
            ledger,
            stats,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        };
        (writer, worker)
    }

    /// Queue a write without waiting.
    ///
    /// Returns `None` when the queue is full or the worker is gone; the job
    /// is counted as dropped.
    pub fn enqueue(&self, write: LedgerWrite) -> Option<oneshot::Receiver<WriteOutcome>> {
        let (done, outcome) = oneshot::channel();
        match self.tx.try_send(Job { write, done }) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                Some(outcome)
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    kind = write.kind(),
                    wallet = %write.wallet(),
                    error = %e,
                    "Ledger write dropped"
                );
                None
            }
        }
    }

    pub fn stats(&self) -> WriteStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Background worker draining the write queue.
pub struct LedgerWriteWorker {
    rx: mpsc::Receiver<Job>,
    ledger: Arc<dyn SessionLedger>,
    stats: Arc<WriteStats>,
    max_attempts: u32,
    retry_delay: Duration,
    attempt_timeout: Duration,
}

impl LedgerWriteWorker {
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Run the worker until the cancellation token is triggered or every
    /// writer handle is dropped.
    ///
    /// ```rust,ignore
    /// tokio::spawn(worker.run(shutdown.clone()));
    /// ```
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(max_attempts = self.max_attempts, "Ledger write worker starting");

        loop {
            let job = tokio::select! {
                job = self.rx.recv() => job,
                _ = shutdown.cancelled() => None,
            };
            let Some(job) = job else {
                info!("Ledger write worker shutting down");
                return;
            };

            let outcome = self.execute(job.write, &shutdown).await;
            let _ = job.done.send(outcome);
        }
    }

    async fn execute(&self, write: LedgerWrite, shutdown: &CancellationToken) -> WriteOutcome {
        let mut attempt = 1;
        loop {
            let result = with_timeout(self.attempt_timeout, self.submit(write)).await;
            match result {
                Ok(()) => {
                    self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!(kind = write.kind(), wallet = %write.wallet(), attempt, "Ledger write confirmed");
                    return Ok(());
                }
                Err(e) if attempt < self.max_attempts && retryable(&e) => {
                    warn!(
                        kind = write.kind(),
                        wallet = %write.wallet(),
                        attempt,
                        error = %e,
                        "Ledger write failed, will retry"
                    );
                    attempt += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry_delay) => {},
                        _ = shutdown.cancelled() => {
                            self.stats.failed.fetch_add(1, Ordering::Relaxed);
                            return Err(e);
                        }
                    }
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        kind = write.kind(),
                        wallet = %write.wallet(),
                        attempt,
                        error = %e,
                        "Ledger write abandoned"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn submit(&self, write: LedgerWrite) -> WriteOutcome {
        match write {
            LedgerWrite::OpenFreeSession(wallet) => self.ledger.open_free_session(wallet).await,
            LedgerWrite::CloseSession(wallet) => self.ledger.close_session(wallet).await,
        }
    }
}

/// Configuration gaps never heal by retrying.
fn retryable(error: &LedgerError) -> bool {
    !matches!(
        error,
        LedgerError::NotConfigured(_) | LedgerError::InvalidPrivateKey(_)
    )
}
