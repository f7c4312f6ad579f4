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


//! Retry/backoff controller for ledger updates.

use crate::base::ClientId;
use crate::client::LedgerUpdateResult;
use crate::error::LedgerError;
use crate::lock::ClientLocks;
use crate::store::LedgerStore;
use crate::transaction::TransactionKind;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(10);

    /// `max_attempts` counts the first try; values below one are raised to one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BASE_DELAY)
    }
}

/// Runs ledger updates under the client's lock, retrying transient conflicts.
///
/// The lock is held across retries, so a later attempt for a client always
/// observes the effect of any earlier one.
pub struct UpdateExecutor<S> {
    store: Arc<S>,
    locks: Arc<ClientLocks>,
    policy: RetryPolicy,
}

impl<S: LedgerStore> UpdateExecutor<S> {
    pub fn new(store: Arc<S>, locks: Arc<ClientLocks>, policy: RetryPolicy) -> Self {
        Self {
            store,
            locks,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Applies one credit or debit.
    ///
    /// A rejected debit is a successful call with `accepted == false`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - amount is zero or negative.
    /// - [`LedgerError::NotFound`] - the store does not know the client.
    /// - [`LedgerError::RetriesExhausted`] - every attempt hit a transient conflict.
    /// - [`LedgerError::Store`] - non-transient store failure, not retried.
    pub fn attempt(
        &self,
        client_id: ClientId,
        kind: TransactionKind,
        amount: i64,
    ) -> Result<LedgerUpdateResult, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        self.locks
            .with_lock(client_id, || self.run(client_id, kind, amount))
    }

    fn run(
        &self,
        client_id: ClientId,
        kind: TransactionKind,
        amount: i64,
    ) -> Result<LedgerUpdateResult, LedgerError> {
        let max_attempts = self.policy.max_attempts;
        for attempt in 1..=max_attempts {
            match self.store.update(client_id, kind, amount) {
                Ok(Some(result)) => {
                    debug!(
                        client = %client_id,
                        kind = %kind,
                        amount,
                        attempt,
                        accepted = result.accepted,
                        balance = result.balance,
                        "ledger update applied"
                    );
                    return Ok(result);
                }
                Ok(None) => return Err(LedgerError::NotFound(client_id)),
                Err(err) if err.is_transient() => {
                    if attempt == max_attempts {
                        break;
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        client = %client_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient store conflict, retrying"
                    );
                    thread::sleep(delay);
                }
                Err(err) => {
                    error!(client = %client_id, error = %err, "ledger update failed");
                    return Err(err.into());
                }
            }
        }

        error!(
            client = %client_id,
            attempts = max_attempts,
            "ledger update abandoned after repeated conflicts"
        );
        Err(LedgerError::RetriesExhausted {
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;

    #[test]
    fn delay_doubles_per_retry() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for(4), Duration::from_millis(80));
    }

    #[test]
    fn delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(100, Duration::from_secs(1));
        assert!(policy.delay_for(90) >= policy.delay_for(31));
    }

    #[test]
    fn zero_attempts_is_raised_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), 3);
    }

    #[test]
    fn attempt_rejects_non_positive_amount() {
        let executor = UpdateExecutor::new(
            Arc::new(MemoryLedgerStore::with_default_clients()),
            Arc::new(ClientLocks::new()),
            RetryPolicy::default(),
        );
        assert_eq!(
            executor.attempt(ClientId(1), TransactionKind::Credit, 0),
            Err(LedgerError::InvalidAmount)
        );
    }

    #[test]
    fn attempt_unknown_client_is_not_found() {
        let executor = UpdateExecutor::new(
            Arc::new(MemoryLedgerStore::with_default_clients()),
            Arc::new(ClientLocks::new()),
            RetryPolicy::default(),
        );
        assert_eq!(
            executor.attempt(ClientId(6), TransactionKind::Debit, 1),
            Err(LedgerError::NotFound(ClientId(6)))
        );
    }
}
