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


//! Append-only transaction log.
//!
//! Entries are never updated or removed. Appends are idempotent on
//! [`TransactionId`]: writing an entry that is already persisted is a no-op,
//! so a batch that is retried after a partial failure cannot duplicate rows.

use crate::base::{ClientId, TransactionId};
use crate::error::StoreError;
use crate::transaction::Transaction;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Number of entries returned in a statement.
pub const STATEMENT_SIZE: usize = 10;

/// Durable transaction history.
pub trait TransactionLog: Send + Sync {
    /// Persists one entry.
    fn append(&self, transaction: &Transaction) -> Result<(), StoreError>;

    /// Persists every entry or none of them.
    fn append_batch(&self, batch: &[Transaction]) -> Result<(), StoreError>;

    /// Up to `limit` most recent entries for `client_id`, newest first.
    fn latest(&self, client_id: ClientId, limit: usize) -> Result<Vec<Transaction>, StoreError>;
}

#[derive(Debug, Default)]
struct LogData {
    /// Per-client entries ordered by `(timestamp, id)` ascending.
    entries: HashMap<ClientId, Vec<Transaction>>,
    persisted: HashSet<TransactionId>,
}

impl LogData {
    fn insert(&mut self, transaction: &Transaction) {
        if !self.persisted.insert(transaction.id) {
            return;
        }
        let entries = self.entries.entry(transaction.client_id).or_default();
        let key = (transaction.timestamp, transaction.id);
        // Entries almost always arrive in order, so this lands at the end.
        let position = entries.partition_point(|entry| (entry.timestamp, entry.id) < key);
        entries.insert(position, transaction.clone());
    }
}

/// In-memory [`TransactionLog`].
#[derive(Debug, Default)]
pub struct MemoryTransactionLog {
    data: RwLock<LogData>,
}

impl MemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of persisted entries.
    pub fn len(&self) -> usize {
        self.data.read().persisted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of persisted entries for one client.
    pub fn count_for(&self, client_id: ClientId) -> usize {
        self.data
            .read()
            .entries
            .get(&client_id)
            .map_or(0, Vec::len)
    }

    pub fn contains(&self, id: TransactionId) -> bool {
        self.data.read().persisted.contains(&id)
    }
}

impl TransactionLog for MemoryTransactionLog {
    fn append(&self, transaction: &Transaction) -> Result<(), StoreError> {
        self.data.write().insert(transaction);
        Ok(())
    }

    fn append_batch(&self, batch: &[Transaction]) -> Result<(), StoreError> {
        let mut data = self.data.write();
        for transaction in batch {
            data.insert(transaction);
        }
        Ok(())
    }

    fn latest(&self, client_id: ClientId, limit: usize) -> Result<Vec<Transaction>, StoreError> {
        let data = self.data.read();
        Ok(data
            .entries
            .get(&client_id)
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
