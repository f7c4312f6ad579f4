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


//! # Rinha Ledger
//!
//! A concurrency-safe ledger for client balances. Credits and debits are
//! applied under a strict overdraft limit, every accepted transaction is
//! appended to an immutable history, and statements return the current
//! balance with the last ten transactions.
//!
//! ## Core Components
//!
//! - [`Ledger`]: Service facade the request layer calls
//! - [`LedgerStore`]: Authoritative balances with an atomic conditional update
//! - [`ClientLocks`]: Per-client critical sections
//! - [`UpdateExecutor`]: Bounded retry with exponential backoff on transient conflicts
//! - [`ClientCache`]: Read-through, write-through client cache with negative entries
//! - [`JournalWriter`]: Synchronous and batched writes to the [`TransactionLog`]
//! - [`StatementAssembler`]: Balance plus the ten newest transactions
//!
//! ## Example
//!
//! ```
//! use rinha_ledger::{Client, ClientId, Ledger, LedgerConfig, TransactionRequest};
//!
//! let clients = vec![Client::new(ClientId(1), "acme", 1000, 0)];
//! let ledger = Ledger::in_memory(clients, &LedgerConfig::default()).unwrap();
//! ledger.start().unwrap();
//!
//! let result = ledger.process(TransactionRequest::debit(ClientId(1), 500, "rent")).unwrap();
//! assert!(result.accepted);
//! assert_eq!(result.balance, -500);
//!
//! let result = ledger.process(TransactionRequest::debit(ClientId(1), 600, "more")).unwrap();
//! assert!(!result.accepted);
//! assert_eq!(result.balance, -500);
//!
//! ledger.shutdown().unwrap();
//! let statement = ledger.extract(ClientId(1)).unwrap();
//! assert_eq!(statement.transactions.len(), 1);
//! ```
//!
//! ## Thread Safety
//!
//! Updates for different clients run fully in parallel; updates for the same
//! client are serialized. Statements take no lock.

mod base;
mod cache;
pub mod client;
pub mod config;
pub mod error;
mod journal;
mod journal_writer;
mod ledger;
mod lock;
mod retry;
mod statement;
mod store;
mod transaction;

pub use base::{ClientId, TransactionId, TransactionIdGenerator};
pub use cache::ClientCache;
pub use client::{Client, ClientAccount, LedgerUpdateResult};
pub use config::{JournalConfig, JournalMode, LedgerConfig, RetryConfig};
pub use error::{ConfigError, LedgerError, StoreError};
pub use journal::{MemoryTransactionLog, STATEMENT_SIZE, TransactionLog};
pub use journal_writer::{BatchSettings, BatchWriterHandle, JournalWriter, WriterStats};
pub use ledger::Ledger;
pub use lock::ClientLocks;
pub use retry::{RetryPolicy, UpdateExecutor};
pub use statement::{Statement, StatementAssembler, TransactionResponse};
pub use store::{LedgerStore, MemoryLedgerStore, default_clients};
pub use transaction::{
    MAX_DESCRIPTION_LEN, MonotonicClock, Transaction, TransactionKind, TransactionRequest,
    ValidRequest,
};
