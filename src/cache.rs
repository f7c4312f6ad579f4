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


//! Client cache.
//!
//! Read-through copy of client metadata and balance, plus a negative cache of
//! ids the store confirmed absent. The store stays the source of truth: every
//! balance written here is one the store returned, never one computed here.

use crate::base::ClientId;
use crate::client::{Client, LedgerUpdateResult};
use crate::error::LedgerError;
use crate::store::LedgerStore;
use dashmap::{DashMap, DashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct ClientCache {
    clients: DashMap<ClientId, Client>,
    missing: DashSet<ClientId>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached client, loading it from `store` on a miss.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - the client does not exist. Once the store
    ///   has said so, later lookups for the same id do not reach it again.
    /// - [`LedgerError::Store`] - the store lookup failed. Nothing is cached.
    pub fn get<S>(&self, store: &S, client_id: ClientId) -> Result<Client, LedgerError>
    where
        S: LedgerStore + ?Sized,
    {
        if let Some(client) = self.clients.get(&client_id) {
            return Ok(client.value().clone());
        }
        if self.missing.contains(&client_id) {
            return Err(LedgerError::NotFound(client_id));
        }

        match store.find(client_id)? {
            Some(client) => {
                debug!(client = %client_id, "client cache miss, loaded from store");
                // A write-through may have landed while we were reading; keep it.
                Ok(self
                    .clients
                    .entry(client_id)
                    .or_insert(client)
                    .value()
                    .clone())
            }
            None => {
                debug!(client = %client_id, "client not found, remembering absence");
                self.missing.insert(client_id);
                Err(LedgerError::NotFound(client_id))
            }
        }
    }

    /// Overwrites the cached balance with the one `store` just returned.
    ///
    /// Must be called while the client's update lock is still held so that
    /// write-throughs land in commit order. If the client is not cached yet,
    /// a fresh snapshot is read from `store` instead.
    pub fn record<S>(&self, store: &S, client_id: ClientId, result: &LedgerUpdateResult)
    where
        S: LedgerStore + ?Sized,
    {
        if let Some(mut client) = self.clients.get_mut(&client_id) {
            client.balance = result.balance;
            return;
        }

        match store.find(client_id) {
            Ok(Some(client)) => {
                self.missing.remove(&client_id);
                self.clients.insert(client_id, client);
            }
            Ok(None) => {}
            Err(err) => {
                // The next read goes through to the store.
                warn!(client = %client_id, error = %err, "cache write-through skipped");
            }
        }
    }

    /// Loads every client from `store`. Returns how many were cached.
    ///
    /// Entries already cached are kept: they were written through under the
    /// client's lock and may be newer than the snapshot read here.
    pub fn preload<S>(&self, store: &S) -> Result<usize, LedgerError>
    where
        S: LedgerStore + ?Sized,
    {
        let clients = store.clients()?;
        let count = clients.len();
        for client in clients {
            self.missing.remove(&client.id);
            self.clients.entry(client.id).or_insert(client);
        }
        info!(clients = count, "client cache preloaded");
        Ok(count)
    }

    /// Cached copy without touching the store.
    pub fn peek(&self, client_id: ClientId) -> Option<Client> {
        self.clients.get(&client_id).map(|client| client.value().clone())
    }

    pub fn is_known_missing(&self, client_id: ClientId) -> bool {
        self.missing.contains(&client_id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
