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


//! Property-based tests for the ledger.
//!
//! These tests verify invariants that should hold for any sequence of
//! credits and debits.

use proptest::prelude::*;
use rinha_ledger::{
    Client, ClientAccount, ClientId, JournalConfig, JournalMode, Ledger, LedgerConfig,
    LedgerStore, TransactionKind, TransactionRequest,
};

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount in cents.
fn arb_amount() -> impl Strategy<Value = i64> {
    1i64..=5_000i64
}

fn arb_kind() -> impl Strategy<Value = TransactionKind> {
    prop_oneof![Just(TransactionKind::Credit), Just(TransactionKind::Debit)]
}

fn arb_operations() -> impl Strategy<Value = Vec<(TransactionKind, i64)>> {
    prop::collection::vec((arb_kind(), arb_amount()), 1..60)
}

fn sync_ledger(limit: i64) -> Ledger {
    let config = LedgerConfig {
        journal: JournalConfig {
            mode: JournalMode::Sync,
            ..JournalConfig::default()
        },
        ..LedgerConfig::default()
    };
    Ledger::in_memory([Client::new(ClientId(1), "prop", limit, 0)], &config).unwrap()
}

fn request(kind: TransactionKind, amount: i64) -> TransactionRequest {
    match kind {
        TransactionKind::Credit => TransactionRequest::credit(ClientId(1), amount, "p"),
        TransactionKind::Debit => TransactionRequest::debit(ClientId(1), amount, "p"),
    }
}

// =============================================================================
// Account Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// A debit is accepted exactly when the balance stays at or above -limit.
    #[test]
    fn debit_accepted_iff_floor_holds(
        limit in 0i64..10_000,
        operations in arb_operations(),
    ) {
        let account = ClientAccount::new(ClientId(1), "prop", limit, 0);

        for (kind, amount) in operations {
            let before = account.balance();
            let result = account.apply(kind, amount);
            match kind {
                TransactionKind::Credit => {
                    prop_assert!(result.accepted);
                    prop_assert_eq!(result.balance, before + amount);
                }
                TransactionKind::Debit => {
                    prop_assert_eq!(result.accepted, before - amount >= -limit);
                    let expected = if result.accepted { before - amount } else { before };
                    prop_assert_eq!(result.balance, expected);
                }
            }
            prop_assert_eq!(result.limit, limit);
        }
    }

    /// Balance is never below -limit after any operation.
    #[test]
    fn balance_never_below_floor(
        limit in 0i64..10_000,
        operations in arb_operations(),
    ) {
        let ledger = sync_ledger(limit);

        for (kind, amount) in operations {
            let result = ledger.process(request(kind, amount)).unwrap();
            prop_assert!(result.balance >= -limit);
        }
        prop_assert!(ledger.client(ClientId(1)).unwrap().balance >= -limit);
    }
}

// =============================================================================
// Ledger Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Final balance equals the sum of accepted credits minus accepted debits.
    #[test]
    fn final_balance_matches_accepted_history(
        limit in 0i64..10_000,
        operations in arb_operations(),
    ) {
        let ledger = sync_ledger(limit);
        let mut expected = 0i64;
        let mut accepted = 0usize;

        for (kind, amount) in operations {
            let result = ledger.process(request(kind, amount)).unwrap();
            if result.accepted {
                accepted += 1;
                expected += match kind {
                    TransactionKind::Credit => amount,
                    TransactionKind::Debit => -amount,
                };
            }
        }

        let statement = ledger.extract(ClientId(1)).unwrap();
        prop_assert_eq!(statement.balance, expected);
        prop_assert_eq!(statement.transactions.len(), accepted.min(10));
        prop_assert_eq!(ledger.writer_stats().committed, accepted as u64);
    }

    /// Statements hold at most ten entries, newest first, strictly descending.
    #[test]
    fn statement_is_bounded_and_strictly_descending(
        operations in arb_operations(),
    ) {
        let ledger = sync_ledger(1_000_000);
        for (kind, amount) in operations {
            ledger.process(request(kind, amount)).unwrap();
        }

        let statement = ledger.extract(ClientId(1)).unwrap();
        prop_assert!(statement.transactions.len() <= 10);
        for pair in statement.transactions.windows(2) {
            prop_assert!(pair[0].timestamp > pair[1].timestamp);
        }
    }

    /// The cache entry always agrees with the authoritative store.
    #[test]
    fn cache_agrees_with_store(
        limit in 0i64..10_000,
        operations in arb_operations(),
    ) {
        let ledger = sync_ledger(limit);
        for (kind, amount) in operations {
            let result = ledger.process(request(kind, amount)).unwrap();
            let cached = ledger.cache().peek(ClientId(1)).unwrap();
            prop_assert_eq!(cached.balance, result.balance);
            let stored = ledger.store().find(ClientId(1)).unwrap().unwrap();
            prop_assert_eq!(stored.balance, result.balance);
        }
    }

    /// Non-positive amounts are rejected before touching any state.
    #[test]
    fn non_positive_amounts_rejected(
        amount in -10_000i64..=0,
        kind in arb_kind(),
    ) {
        let ledger = sync_ledger(100);
        let err = ledger.process(request(kind, amount)).unwrap_err();
        prop_assert!(err.is_invalid_argument());
        prop_assert_eq!(ledger.client(ClientId(1)).unwrap().balance, 0);
        prop_assert_eq!(ledger.extract(ClientId(1)).unwrap().transactions.len(), 0);
    }
}
