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


//! Ledger store: the authoritative balance and limit per client.
//!
//! [`LedgerStore::update`] must perform the conditional mutation and return
//! the resulting balance in one call. Implementations backed by a database
//! express it as a single `UPDATE ... RETURNING` statement.

use crate::base::ClientId;
use crate::client::{Client, ClientAccount, LedgerUpdateResult};
use crate::error::{LedgerError, StoreError};
use crate::transaction::TransactionKind;
use dashmap::DashMap;

/// Backing store for client balances.
pub trait LedgerStore: Send + Sync {
    /// Atomically applies a credit or debit.
    ///
    /// Returns `Ok(None)` if the client does not exist.
    fn update(
        &self,
        client_id: ClientId,
        kind: TransactionKind,
        amount: i64,
    ) -> Result<Option<LedgerUpdateResult>, StoreError>;

    /// Reads one client.
    fn find(&self, client_id: ClientId) -> Result<Option<Client>, StoreError>;

    /// Reads every client.
    fn clients(&self) -> Result<Vec<Client>, StoreError>;
}

/// In-memory [`LedgerStore`].
///
/// Each record serializes its own updates, so different clients are updated
/// in parallel and the store never needs a global lock.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    accounts: DashMap<ClientId, ClientAccount>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with the given clients. Later duplicates win.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidClient`] for the first client with a
    /// negative limit or a balance below `-limit`.
    pub fn with_clients(clients: impl IntoIterator<Item = Client>) -> Result<Self, LedgerError> {
        let store = Self::new();
        for client in clients {
            client.validate()?;
            store.insert(client);
        }
        Ok(store)
    }

    /// The five clients created by the reference schema.
    pub fn with_default_clients() -> Self {
        let store = Self::new();
        for client in default_clients() {
            store.insert(client);
        }
        store
    }

    fn insert(&self, client: Client) {
        self.accounts.insert(client.id, ClientAccount::from_client(client));
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn update(
        &self,
        client_id: ClientId,
        kind: TransactionKind,
        amount: i64,
    ) -> Result<Option<LedgerUpdateResult>, StoreError> {
        Ok(self
            .accounts
            .get(&client_id)
            .map(|account| account.apply(kind, amount)))
    }

    fn find(&self, client_id: ClientId) -> Result<Option<Client>, StoreError> {
        Ok(self.accounts.get(&client_id).map(|account| account.snapshot()))
    }

    fn clients(&self) -> Result<Vec<Client>, StoreError> {
        let mut clients: Vec<Client> = self
            .accounts
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        clients.sort_by_key(|client| client.id);
        Ok(clients)
    }
}

/// Clients `1..=5` with their fixed limits and a zero balance.
pub fn default_clients() -> Vec<Client> {
    [
        (1, "o barato sai caro", 100_000),
        (2, "zan corp ltda", 80_000),
        (3, "les cruders", 1_000_000),
        (4, "padaria joia de cocaia", 10_000_000),
        (5, "kid mais", 500_000),
    ]
    .into_iter()
    .map(|(id, name, limit)| Client::new(ClientId(id), name, limit, 0))
    .collect()
}
