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


//! Per-client lock manager.
//!
//! Serializes the validate-then-mutate section of every update for one
//! client. Updates for different clients never contend.
//!
//! Locks are created on first use and kept for the life of the process. The
//! client set is small and fixed, so the table stays bounded; a dynamic
//! client population would need a sharded or store-native scheme instead.

use crate::base::ClientId;
use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use std::sync::Arc;

/// Table of lazily created, reentrant per-client locks.
#[derive(Debug, Default)]
pub struct ClientLocks {
    locks: DashMap<ClientId, Arc<ReentrantMutex<()>>>,
}

impl ClientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `client_id`.
    ///
    /// The same thread may nest calls for the same client. The lock is
    /// released when `f` returns or unwinds.
    pub fn with_lock<T>(&self, client_id: ClientId, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(client_id);
        let _guard = lock.lock();
        f()
    }

    /// Number of clients a lock has been created for.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn lock_for(&self, client_id: ClientId) -> Arc<ReentrantMutex<()>> {
        // Clone the Arc out so the map shard is not held while `f` runs.
        if let Some(lock) = self.locks.get(&client_id) {
            return Arc::clone(lock.value());
        }
        Arc::clone(
            self.locks
                .entry(client_id)
                .or_insert_with(|| Arc::new(ReentrantMutex::new(())))
                .value(),
        )
    }
}
