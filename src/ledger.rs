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


//! Ledger service.
//!
//! The [`Ledger`] wires the components together and is the one object the
//! request layer talks to. Build it once at startup and share it by
//! reference (or `Arc`) with every handler.
//!
//! # Update path
//!
//! 1. Validate the request.
//! 2. Resolve the client through the cache (unknown ids stop here).
//! 3. Under the client's lock: conditional store update with retries, record
//!    the accepted transaction (sync or queued), write the store's
//!    balance through to the cache.
//!
//! # Statement path
//!
//! Reads the cache and the transaction log without taking any client lock.

use crate::base::{ClientId, TransactionIdGenerator};
use crate::cache::ClientCache;
use crate::client::{Client, LedgerUpdateResult};
use crate::config::{JournalMode, LedgerConfig};
use crate::error::LedgerError;
use crate::journal::{MemoryTransactionLog, TransactionLog};
use crate::journal_writer::{BatchWriterHandle, JournalWriter, WriterStats};
use crate::lock::ClientLocks;
use crate::retry::UpdateExecutor;
use crate::statement::{Statement, StatementAssembler};
use crate::store::{LedgerStore, MemoryLedgerStore};
use crate::transaction::{MonotonicClock, Transaction, TransactionRequest};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Ledger<S = MemoryLedgerStore, L = MemoryTransactionLog>
where
    S: LedgerStore,
    L: TransactionLog + 'static,
{
    store: Arc<S>,
    cache: Arc<ClientCache>,
    locks: Arc<ClientLocks>,
    executor: UpdateExecutor<S>,
    writer: Arc<JournalWriter<L>>,
    statements: StatementAssembler<S, L>,
    ids: TransactionIdGenerator,
    clock: MonotonicClock,
    mode: JournalMode,
    preload_cache: bool,
    batch_writer: Mutex<Option<BatchWriterHandle<L>>>,
}

impl Ledger<MemoryLedgerStore, MemoryTransactionLog> {
    /// In-memory ledger seeded with `clients`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidClient`] if a seed client breaks the
    /// balance floor or has a negative limit.
    pub fn in_memory(
        clients: impl IntoIterator<Item = Client>,
        config: &LedgerConfig,
    ) -> Result<Self, LedgerError> {
        Ok(Self::new(
            Arc::new(MemoryLedgerStore::with_clients(clients)?),
            Arc::new(MemoryTransactionLog::new()),
            config,
        ))
    }
}

impl<S, L> Ledger<S, L>
where
    S: LedgerStore,
    L: TransactionLog + 'static,
{
    pub fn new(store: Arc<S>, log: Arc<L>, config: &LedgerConfig) -> Self {
        let cache = Arc::new(ClientCache::new());
        let locks = Arc::new(ClientLocks::new());
        let executor = UpdateExecutor::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            config.retry.policy(),
        );
        let writer = Arc::new(JournalWriter::new(
            Arc::clone(&log),
            config.journal.batch_settings(),
        ));
        let statements = StatementAssembler::new(Arc::clone(&store), Arc::clone(&cache), log);

        Self {
            store,
            cache,
            locks,
            executor,
            writer,
            statements,
            ids: TransactionIdGenerator::new(),
            clock: MonotonicClock::new(),
            mode: config.journal.mode,
            preload_cache: config.preload_cache,
            batch_writer: Mutex::new(None),
        }
    }

    /// Applies a credit or debit.
    ///
    /// A debit that would take the balance below `-limit` is not an error:
    /// it returns `accepted == false` with the unchanged balance and nothing
    /// is recorded.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`], [`LedgerError::InvalidKind`],
    ///   [`LedgerError::InvalidDescription`] - malformed request.
    /// - [`LedgerError::NotFound`] - unknown client.
    /// - [`LedgerError::RetriesExhausted`] - transient conflicts past the retry bound.
    /// - [`LedgerError::Store`] - fatal store failure, or a failed synchronous
    ///   log write after the balance was already committed.
    pub fn process(&self, request: TransactionRequest) -> Result<LedgerUpdateResult, LedgerError> {
        let request = request.validate()?;
        let client_id = request.client_id;
        self.cache.get(self.store.as_ref(), client_id)?;

        self.locks.with_lock(client_id, || {
            let result = self
                .executor
                .attempt(client_id, request.kind, request.amount)?;

            let recorded = if result.accepted {
                let transaction =
                    Transaction::from_request(self.ids.next_id(), request, self.clock.now());
                self.record(transaction)
            } else {
                debug!(client = %client_id, balance = result.balance, "debit rejected, over limit");
                Ok(())
            };

            self.cache.record(self.store.as_ref(), client_id, &result);
            recorded.map(|()| result)
        })
    }

    fn record(&self, transaction: Transaction) -> Result<(), LedgerError> {
        match self.mode {
            JournalMode::Sync => self.writer.write(&transaction),
            JournalMode::Async => {
                self.writer.enqueue(transaction);
                Ok(())
            }
        }
    }

    /// Current balance and limit with the ten most recent transactions.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - unknown client.
    /// - [`LedgerError::Store`] - store or log failure.
    pub fn extract(&self, client_id: ClientId) -> Result<Statement, LedgerError> {
        self.statements.extract(client_id)
    }

    /// Cached view of a client.
    pub fn client(&self, client_id: ClientId) -> Result<Client, LedgerError> {
        self.cache.get(self.store.as_ref(), client_id)
    }

    /// Starts the background batch writer when running in async mode.
    ///
    /// Preloads the client cache first if configured. Calling it again while
    /// the writer runs does nothing.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Store`] - the cache preload could not read the store.
    /// - [`LedgerError::Spawn`] - the writer thread could not be started.
    pub fn start(&self) -> Result<(), LedgerError> {
        if self.preload_cache {
            self.cache.preload(self.store.as_ref())?;
        }
        if self.mode != JournalMode::Async {
            return Ok(());
        }
        let mut batch_writer = self.batch_writer.lock();
        if batch_writer.is_none() {
            *batch_writer = Some(self.writer.start()?);
        }
        Ok(())
    }

    /// Warms the cache and the statement path without changing any state.
    ///
    /// Returns the number of clients touched.
    pub fn warm_up(&self) -> Result<usize, LedgerError> {
        let count = self.cache.preload(self.store.as_ref())?;
        for client in self.store.clients()? {
            self.statements.extract(client.id)?;
        }
        info!(clients = count, "ledger warmed up");
        Ok(count)
    }

    /// Checks that the store answers.
    pub fn health(&self) -> Result<(), LedgerError> {
        self.store.clients()?;
        Ok(())
    }

    /// Stops the batch writer and flushes every queued transaction.
    ///
    /// In-flight updates finish normally; entries they queue after this
    /// point are written synchronously. Returns the number flushed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::FlushIncomplete`] if the grace period ran out.
    pub fn shutdown(&self) -> Result<usize, LedgerError> {
        let handle = self.batch_writer.lock().take();
        match handle {
            Some(handle) => handle.shutdown(),
            None => {
                self.writer.close();
                self.writer.flush(self.writer.settings().shutdown_grace)
            }
        }
    }

    pub fn writer_stats(&self) -> WriterStats {
        self.writer.stats()
    }

    pub fn mode(&self) -> JournalMode {
        self.mode
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }
}
