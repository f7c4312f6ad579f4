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


//! Retry/backoff behaviour against a store that injects failures.

use rinha_ledger::{
    Client, ClientId, ClientLocks, JournalConfig, JournalMode, Ledger, LedgerConfig, LedgerError,
    LedgerStore, LedgerUpdateResult, MemoryLedgerStore, MemoryTransactionLog, RetryConfig,
    RetryPolicy, StoreError, TransactionKind, TransactionRequest, UpdateExecutor, default_clients,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Memory store whose next `update` calls fail with a chosen error.
struct FlakyStore {
    inner: MemoryLedgerStore,
    failures_left: AtomicU32,
    failure: StoreError,
    update_calls: AtomicU32,
}

impl FlakyStore {
    fn new(failures: u32, failure: StoreError) -> Self {
        Self {
            inner: MemoryLedgerStore::with_default_clients(),
            failures_left: AtomicU32::new(failures),
            failure,
            update_calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }
}

impl LedgerStore for FlakyStore {
    fn update(
        &self,
        client_id: ClientId,
        kind: TransactionKind,
        amount: i64,
    ) -> Result<Option<LedgerUpdateResult>, StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if fail {
            return Err(self.failure.clone());
        }
        self.inner.update(client_id, kind, amount)
    }

    fn find(&self, client_id: ClientId) -> Result<Option<Client>, StoreError> {
        self.inner.find(client_id)
    }

    fn clients(&self) -> Result<Vec<Client>, StoreError> {
        self.inner.clients()
    }
}

fn executor(store: Arc<FlakyStore>, max_attempts: u32) -> UpdateExecutor<FlakyStore> {
    UpdateExecutor::new(
        store,
        Arc::new(ClientLocks::new()),
        RetryPolicy::new(max_attempts, Duration::from_millis(1)),
    )
}

fn conflict() -> StoreError {
    StoreError::Conflict("could not serialize access".to_string())
}

#[test]
fn transient_conflict_is_retried_until_success() {
    let store = Arc::new(FlakyStore::new(2, conflict()));
    let executor = executor(Arc::clone(&store), 3);

    let result = executor
        .attempt(ClientId(1), TransactionKind::Debit, 100)
        .unwrap();
    assert!(result.accepted);
    assert_eq!(result.balance, -100);
    assert_eq!(store.calls(), 3);
}

#[test]
fn timeouts_are_transient_too() {
    let store = Arc::new(FlakyStore::new(1, StoreError::Timeout));
    let executor = executor(Arc::clone(&store), 3);
    assert!(
        executor
            .attempt(ClientId(1), TransactionKind::Credit, 1)
            .unwrap()
            .accepted
    );
    assert_eq!(store.calls(), 2);
}

#[test]
fn exhausted_retries_surface_as_retryable_error() {
    let store = Arc::new(FlakyStore::new(10, conflict()));
    let executor = executor(Arc::clone(&store), 3);

    let result = executor.attempt(ClientId(1), TransactionKind::Credit, 100);
    assert_eq!(result, Err(LedgerError::RetriesExhausted { attempts: 3 }));
    assert!(result.unwrap_err().is_retryable());
    assert_eq!(store.calls(), 3);
    assert_eq!(store.find(ClientId(1)).unwrap().unwrap().balance, 0);
}

#[test]
fn fatal_errors_are_not_retried() {
    let store = Arc::new(FlakyStore::new(
        5,
        StoreError::Unavailable("connection refused".to_string()),
    ));
    let executor = executor(Arc::clone(&store), 3);

    let result = executor.attempt(ClientId(1), TransactionKind::Credit, 100);
    assert_eq!(
        result,
        Err(LedgerError::Store(StoreError::Unavailable(
            "connection refused".to_string()
        )))
    );
    assert_eq!(store.calls(), 1);
}

#[test]
fn rejected_debit_is_not_retried() {
    let store = Arc::new(FlakyStore::new(0, conflict()));
    let executor = executor(Arc::clone(&store), 3);

    let result = executor
        .attempt(ClientId(1), TransactionKind::Debit, 100_001)
        .unwrap();
    assert!(!result.accepted);
    assert_eq!(store.calls(), 1);
}

#[test]
fn backoff_waits_between_attempts() {
    let store = Arc::new(FlakyStore::new(2, conflict()));
    let executor = UpdateExecutor::new(
        Arc::clone(&store),
        Arc::new(ClientLocks::new()),
        RetryPolicy::new(3, Duration::from_millis(20)),
    );

    let started = Instant::now();
    executor
        .attempt(ClientId(1), TransactionKind::Credit, 1)
        .unwrap();
    // 20ms before the second attempt, 40ms before the third.
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[test]
fn ledger_maps_exhaustion_to_503_and_records_nothing() {
    let config = LedgerConfig {
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
        },
        journal: JournalConfig {
            mode: JournalMode::Sync,
            ..JournalConfig::default()
        },
        ..LedgerConfig::default()
    };
    let ledger = Ledger::new(
        Arc::new(FlakyStore::new(3, conflict())),
        Arc::new(MemoryTransactionLog::new()),
        &config,
    );

    let error = ledger
        .process(TransactionRequest::credit(ClientId(1), 10, "x"))
        .unwrap_err();
    assert_eq!(error.status_code(), 503);
    assert!(ledger.extract(ClientId(1)).unwrap().transactions.is_empty());

    // The conflict budget is spent, so the next request goes through.
    let result = ledger
        .process(TransactionRequest::credit(ClientId(1), 10, "x"))
        .unwrap();
    assert_eq!(result.balance, 10);
    assert_eq!(ledger.extract(ClientId(1)).unwrap().transactions.len(), 1);
}

#[test]
fn default_clients_are_reachable_through_flaky_store() {
    let store = FlakyStore::new(0, conflict());
    assert_eq!(store.clients().unwrap(), default_clients());
}
