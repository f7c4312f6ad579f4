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


//! Client records and the atomic conditional update.
//!
//! ```text
//!  credit ──────────────────────────────► balance += amount        accepted
//!  debit ── balance - amount >= -limit ─► balance -= amount        accepted
//!        └─ otherwise ──────────────────► balance unchanged        rejected
//! ```
//!
//! # Example
//!
//! ```
//! use rinha_ledger::{ClientAccount, ClientId, TransactionKind};
//!
//! let account = ClientAccount::new(ClientId(1), "o barato sai caro", 1000, 0);
//! assert!(account.apply(TransactionKind::Debit, 500).accepted);
//! assert!(!account.apply(TransactionKind::Debit, 600).accepted);
//! assert_eq!(account.snapshot().balance, -500);
//! ```

use crate::base::ClientId;
use crate::error::LedgerError;
use crate::transaction::TransactionKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Point-in-time copy of a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    /// Maximum overdraft; the balance floor is `-limit`.
    pub limit: i64,
    pub balance: i64,
}

impl Client {
    pub fn new(id: ClientId, name: impl Into<String>, limit: i64, balance: i64) -> Self {
        Self {
            id,
            name: name.into(),
            limit,
            balance,
        }
    }

    /// Checks the record invariants: `limit >= 0` and `balance >= -limit`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidClient`] naming the broken invariant.
    pub fn validate(&self) -> Result<(), LedgerError> {
        let reason = if self.limit < 0 {
            "negative limit"
        } else if self.balance < -self.limit {
            "balance below the overdraft floor"
        } else {
            return Ok(());
        };
        Err(LedgerError::InvalidClient {
            client: self.id,
            reason,
        })
    }

    /// Returns `true` if debiting `amount` keeps the balance at or above `-limit`.
    pub fn can_debit(&self, amount: i64) -> bool {
        self.balance
            .checked_sub(amount)
            .is_some_and(|after| after >= -self.limit)
    }
}

/// Outcome of one update attempt, accepted or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerUpdateResult {
    /// Balance after the update (unchanged when rejected).
    pub balance: i64,
    pub limit: i64,
    pub accepted: bool,
}

impl LedgerUpdateResult {
    /// HTTP status the request layer should answer with.
    pub fn status_code(&self) -> u16 {
        if self.accepted { 200 } else { 422 }
    }
}

#[derive(Debug)]
struct ClientData {
    client: Client,
}

impl ClientData {
    fn assert_invariants(&self) {
        debug_assert!(
            self.client.balance >= -self.client.limit,
            "Invariant violated: balance {} below floor {}",
            self.client.balance,
            -self.client.limit
        );
    }

    /// Increases the balance. Saturates instead of wrapping on overflow.
    fn credit(&mut self, amount: i64) -> bool {
        self.client.balance = self.client.balance.saturating_add(amount);
        self.assert_invariants();
        true
    }

    /// Decreases the balance if the overdraft limit allows it.
    fn debit(&mut self, amount: i64) -> bool {
        if !self.client.can_debit(amount) {
            return false;
        }
        self.client.balance -= amount;
        self.assert_invariants();
        true
    }
}

/// Authoritative ledger record for one client.
///
/// The name and limit never change; the balance changes only through
/// [`ClientAccount::apply`].
#[derive(Debug)]
pub struct ClientAccount {
    inner: Mutex<ClientData>,
}

impl ClientAccount {
    pub fn new(id: ClientId, name: impl Into<String>, limit: i64, balance: i64) -> Self {
        Self::from_client(Client::new(id, name, limit, balance))
    }

    /// Wraps `client` as is; seeding paths run [`Client::validate`] first.
    pub fn from_client(client: Client) -> Self {
        Self {
            inner: Mutex::new(ClientData { client }),
        }
    }

    pub fn id(&self) -> ClientId {
        self.inner.lock().client.id
    }

    pub fn balance(&self) -> i64 {
        self.inner.lock().client.balance
    }

    pub fn limit(&self) -> i64 {
        self.inner.lock().client.limit
    }

    pub fn snapshot(&self) -> Client {
        self.inner.lock().client.clone()
    }

    /// Applies a credit or debit as one indivisible step.
    ///
    /// The check and the mutation happen under the same lock and the
    /// resulting balance is read before it is released, so no other update
    /// can slip in between. Callers are expected to pass a positive amount.
    pub fn apply(&self, kind: TransactionKind, amount: i64) -> LedgerUpdateResult {
        let mut data = self.inner.lock();
        let accepted = match kind {
            TransactionKind::Credit => data.credit(amount),
            TransactionKind::Debit => data.debit(amount),
        };
        LedgerUpdateResult {
            balance: data.client.balance,
            limit: data.client.limit,
            accepted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(limit: i64, balance: i64) -> ClientAccount {
        ClientAccount::new(ClientId(1), "test", limit, balance)
    }

    #[test]
    fn validate_checks_limit_and_floor() {
        assert_eq!(Client::new(ClientId(7), "acme", 100, -100).validate(), Ok(()));
        assert_eq!(
            Client::new(ClientId(7), "acme", 100, -500).validate(),
            Err(LedgerError::InvalidClient {
                client: ClientId(7),
                reason: "balance below the overdraft floor"
            })
        );
        assert_eq!(
            Client::new(ClientId(7), "acme", -10, 0).validate(),
            Err(LedgerError::InvalidClient {
                client: ClientId(7),
                reason: "negative limit"
            })
        );
    }

    #[test]
    fn credit_is_unconditional() {
        let account = account(0, 0);
        let result = account.apply(TransactionKind::Credit, 250);
        assert_eq!(
            result,
            LedgerUpdateResult {
                balance: 250,
                limit: 0,
                accepted: true
            }
        );
    }

    #[test]
    fn debit_down_to_exact_floor_is_accepted() {
        let account = account(100, 0);
        let result = account.apply(TransactionKind::Debit, 100);
        assert!(result.accepted);
        assert_eq!(result.balance, -100);
    }

    #[test]
    fn debit_past_floor_leaves_balance_unchanged() {
        let account = account(100, -40);
        let result = account.apply(TransactionKind::Debit, 61);
        assert!(!result.accepted);
        assert_eq!(result.balance, -40);
        assert_eq!(result.limit, 100);
        assert_eq!(account.balance(), -40);
    }

    #[test]
    fn limit_and_name_never_change() {
        let account = ClientAccount::new(ClientId(2), "zan corp ltda", 80_000, 0);
        account.apply(TransactionKind::Credit, 10);
        account.apply(TransactionKind::Debit, 90_000);
        let snapshot = account.snapshot();
        assert_eq!(snapshot.name, "zan corp ltda");
        assert_eq!(snapshot.limit, 80_000);
        assert_eq!(account.id(), ClientId(2));
        assert_eq!(account.limit(), 80_000);
    }

    #[test]
    fn huge_debit_does_not_overflow() {
        let account = account(i64::MAX, i64::MIN + 1);
        let result = account.apply(TransactionKind::Debit, i64::MAX);
        assert!(!result.accepted);
        assert_eq!(result.balance, i64::MIN + 1);
    }

    #[test]
    fn can_debit_matches_floor_rule() {
        let client = Client::new(ClientId(1), "c", 1000, -500);
        assert!(client.can_debit(500));
        assert!(!client.can_debit(501));
    }

    #[test]
    fn status_codes() {
        let accepted = LedgerUpdateResult {
            balance: 0,
            limit: 0,
            accepted: true,
        };
        let rejected = LedgerUpdateResult {
            accepted: false,
            ..accepted
        };
        assert_eq!(accepted.status_code(), 200);
        assert_eq!(rejected.status_code(), 422);
    }
}
