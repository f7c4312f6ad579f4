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


//! Statements: current balance and limit with the latest transactions.
//!
//! Balances are read through the client cache and are always current.
//! Entries written through the batched path may lag behind by up to one
//! flush interval.

use crate::base::ClientId;
use crate::cache::ClientCache;
use crate::client::LedgerUpdateResult;
use crate::error::LedgerError;
use crate::journal::{STATEMENT_SIZE, TransactionLog};
use crate::store::LedgerStore;
use crate::transaction::Transaction;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};
use std::sync::Arc;

/// Balance snapshot plus the most recent entries, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub client_id: ClientId,
    pub balance: i64,
    pub limit: i64,
    pub generated_at: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Serialize)]
struct BalanceView {
    total: i64,
    limite: i64,
    data_extrato: String,
}

#[derive(Serialize)]
struct EntryView<'a> {
    valor: i64,
    tipo: &'static str,
    descricao: &'a str,
    realizada_em: String,
}

impl Serialize for Statement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let entries: Vec<EntryView<'_>> = self
            .transactions
            .iter()
            .map(|transaction| EntryView {
                valor: transaction.amount,
                tipo: transaction.kind.as_str(),
                descricao: &transaction.description,
                realizada_em: format_timestamp(&transaction.timestamp),
            })
            .collect();

        let mut state = serializer.serialize_struct("Statement", 2)?;
        state.serialize_field(
            "saldo",
            &BalanceView {
                total: self.balance,
                limite: self.limit,
                data_extrato: format_timestamp(&self.generated_at),
            },
        )?;
        state.serialize_field("ultimas_transacoes", &entries)?;
        state.end()
    }
}

/// Response body for an accepted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransactionResponse {
    #[serde(rename = "limite")]
    pub limit: i64,
    #[serde(rename = "saldo")]
    pub balance: i64,
}

impl From<LedgerUpdateResult> for TransactionResponse {
    fn from(result: LedgerUpdateResult) -> Self {
        Self {
            limit: result.limit,
            balance: result.balance,
        }
    }
}

/// Builds statements. Takes no per-client lock.
pub struct StatementAssembler<S, L> {
    store: Arc<S>,
    cache: Arc<ClientCache>,
    log: Arc<L>,
}

impl<S: LedgerStore, L: TransactionLog> StatementAssembler<S, L> {
    pub fn new(store: Arc<S>, cache: Arc<ClientCache>, log: Arc<L>) -> Self {
        Self { store, cache, log }
    }

    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - unknown client.
    /// - [`LedgerError::Store`] - the store or the log failed.
    pub fn extract(&self, client_id: ClientId) -> Result<Statement, LedgerError> {
        let client = self.cache.get(self.store.as_ref(), client_id)?;
        let mut transactions = self.log.latest(client_id, STATEMENT_SIZE)?;
        // Do not trust the log implementation with ordering or the bound.
        transactions.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        transactions.truncate(STATEMENT_SIZE);

        Ok(Statement {
            client_id,
            balance: client.balance,
            limit: client.limit,
            generated_at: Utc::now(),
            transactions,
        })
    }
}
