// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Transaction log writer.
//!
//! Two write paths append to the same [`TransactionLog`]:
//!
//! - [`JournalWriter::write`] persists one entry and blocks until it is durable.
//! - [`JournalWriter::enqueue`] pushes onto an in-memory queue and returns at
//!   once. A background thread started with [`JournalWriter::start`] drains
//!   up to `batch_size` entries per tick and writes them as one unit.
//!
//! ```text
//!  Pending ──picked into a batch──► InFlight ──batch committed──► Committed
//!     ▲                                │
//!     └────────── batch failed ────────┘
//! ```
//!
//! A failed batch is pushed back whole. Shutdown stops the ticker, then
//! flushes whatever is still pending within a grace period.

use crate::error::{LedgerError, StoreError};
use crate::journal::TransactionLog;
use crate::transaction::Transaction;
use crossbeam::channel::{self, Sender};
use crossbeam::queue::SegQueue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Tuning for the batched write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub shutdown_grace: Duration,
    /// Consecutive batch failures after which failures are logged as errors.
    pub failure_alert_threshold: u32,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_millis(50),
            shutdown_grace: Duration::from_secs(5),
            failure_alert_threshold: 5,
        }
    }
}

/// Counters describing the writer's queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub pending: usize,
    pub in_flight: usize,
    pub committed: u64,
    pub failed_batches: u64,
    pub consecutive_failures: u32,
    /// Failed batches logged at error level, past the alert threshold.
    pub alerts: u64,
}

#[derive(Debug)]
pub struct JournalWriter<L> {
    log: Arc<L>,
    settings: BatchSettings,
    queue: SegQueue<Transaction>,
    pending: AtomicUsize,
    in_flight: AtomicUsize,
    committed: AtomicU64,
    failed_batches: AtomicU64,
    consecutive_failures: AtomicU32,
    alerts: AtomicU64,
    closed: AtomicBool,
}

impl<L: TransactionLog> JournalWriter<L> {
    pub fn new(log: Arc<L>, settings: BatchSettings) -> Self {
        Self {
            log,
            settings: BatchSettings {
                batch_size: settings.batch_size.max(1),
                ..settings
            },
            queue: SegQueue::new(),
            pending: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            committed: AtomicU64::new(0),
            failed_batches: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            alerts: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> BatchSettings {
        self.settings
    }

    pub fn log(&self) -> &Arc<L> {
        &self.log
    }

    /// Persists one entry synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the log rejects the write.
    pub fn write(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        self.log.append(transaction)?;
        self.committed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Queues an entry for the background writer and returns immediately.
    ///
    /// Once the writer has been closed for shutdown there is no cycle left to
    /// drain the queue, so the entry is written synchronously instead.
    pub fn enqueue(&self, transaction: Transaction) {
        if self.closed.load(Ordering::Acquire) {
            warn!(id = %transaction.id, "journal writer closed, writing synchronously");
            if let Err(err) = self.write(&transaction) {
                error!(id = %transaction.id, error = %err, "late transaction could not be persisted");
            }
            return;
        }
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.queue.push(transaction);
        // Closed while pushing: the final flush may already have run.
        if self.closed.load(Ordering::Acquire) {
            while self.pending() > 0 {
                if let Err(err) = self.drain_batch() {
                    error!(error = %err, "late transaction could not be persisted");
                    break;
                }
            }
        }
    }

    /// Writes up to `batch_size` pending entries as one batch.
    ///
    /// Returns the number committed. On failure the whole batch is queued
    /// again and the log error is returned.
    pub fn drain_batch(&self) -> Result<usize, StoreError> {
        let mut batch = Vec::with_capacity(self.settings.batch_size.min(self.pending()));
        while batch.len() < self.settings.batch_size {
            match self.queue.pop() {
                Some(transaction) => batch.push(transaction),
                None => break,
            }
        }
        if batch.is_empty() {
            return Ok(0);
        }

        let size = batch.len();
        self.in_flight.fetch_add(size, Ordering::AcqRel);
        self.pending.fetch_sub(size, Ordering::AcqRel);

        let outcome = self.log.append_batch(&batch);
        match outcome {
            Ok(()) => {
                self.committed.fetch_add(size as u64, Ordering::Relaxed);
                self.consecutive_failures.store(0, Ordering::Relaxed);
                self.in_flight.fetch_sub(size, Ordering::AcqRel);
                debug!(size, "journal batch committed");
                Ok(size)
            }
            Err(err) => {
                self.pending.fetch_add(size, Ordering::AcqRel);
                for transaction in batch {
                    self.queue.push(transaction);
                }
                self.in_flight.fetch_sub(size, Ordering::AcqRel);
                self.failed_batches.fetch_add(1, Ordering::Relaxed);
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.settings.failure_alert_threshold {
                    self.alerts.fetch_add(1, Ordering::Relaxed);
                    error!(size, failures, error = %err, "journal batch keeps failing, requeued");
                } else {
                    warn!(size, failures, error = %err, "journal batch failed, requeued");
                }
                Err(err)
            }
        }
    }

    /// Drains the queue until it is empty or `grace` has elapsed.
    ///
    /// Returns the number of entries committed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::FlushIncomplete`] if entries remain when the
    /// grace period runs out.
    pub fn flush(&self, grace: Duration) -> Result<usize, LedgerError> {
        let deadline = Instant::now() + grace;
        let mut flushed = 0;
        while self.pending() > 0 {
            match self.drain_batch() {
                Ok(count) => flushed += count,
                Err(_) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    thread::sleep(self.settings.flush_interval.min(deadline - now));
                }
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        let remaining = self.pending();
        if remaining > 0 {
            error!(remaining, flushed, "journal flush gave up with entries still queued");
            return Err(LedgerError::FlushIncomplete { remaining });
        }
        Ok(flushed)
    }

    /// Stops scheduled cycles; later [`enqueue`](Self::enqueue) calls write through.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            pending: self.pending(),
            in_flight: self.in_flight.load(Ordering::Acquire),
            committed: self.committed.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
        }
    }
}

impl<L: TransactionLog + 'static> JournalWriter<L> {
    /// Starts the background batch thread.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Spawn`] if the thread cannot be spawned.
    pub fn start(self: &Arc<Self>) -> Result<BatchWriterHandle<L>, LedgerError> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let ticker = channel::tick(self.settings.flush_interval);
        let writer = Arc::clone(self);

        let thread = thread::Builder::new()
            .name("journal-writer".to_string())
            .spawn(move || {
                loop {
                    crossbeam::select! {
                        recv(ticker) -> _ => {
                            // Failures are logged and requeued inside drain_batch.
                            let _ = writer.drain_batch();
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                debug!("journal writer cycle stopped");
            })
            .map_err(|err| LedgerError::Spawn(err.to_string()))?;

        info!(
            batch_size = self.settings.batch_size,
            interval_ms = self.settings.flush_interval.as_millis() as u64,
            "journal writer started"
        );
        Ok(BatchWriterHandle {
            writer: Arc::clone(self),
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

/// Owns the background batch thread.
///
/// Dropping the handle shuts the writer down the same way
/// [`shutdown`](Self::shutdown) does, logging instead of returning errors.
pub struct BatchWriterHandle<L: TransactionLog + 'static> {
    writer: Arc<JournalWriter<L>>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl<L: TransactionLog + 'static> BatchWriterHandle<L> {
    /// Stops the ticker, then flushes what is still pending.
    ///
    /// Returns the number of entries flushed during shutdown.
    pub fn shutdown(mut self) -> Result<usize, LedgerError> {
        self.stop_and_flush()
    }

    fn stop_and_flush(&mut self) -> Result<usize, LedgerError> {
        // Dropping the sender disconnects the channel and ends the loop.
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("journal writer thread panicked");
            }
        }
        self.writer.close();
        let flushed = self.writer.flush(self.writer.settings.shutdown_grace)?;
        info!(flushed, "journal writer stopped");
        Ok(flushed)
    }
}

impl<L: TransactionLog + 'static> Drop for BatchWriterHandle<L> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(err) = self.stop_and_flush() {
                error!(error = %err, "journal writer shutdown on drop failed");
            }
        }
    }
}
