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


//! Transaction types.
//!
//! A [`TransactionRequest`] arrives from the request layer already shaped but
//! is re-validated here into a [`ValidRequest`]. Once the ledger accepts it,
//! it becomes an immutable [`Transaction`] that is appended to the log and
//! never updated or deleted.

use crate::base::{ClientId, TransactionId};
use crate::error::LedgerError;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

/// Longest accepted description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 10;

/// Direction of a balance change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    #[serde(rename = "c")]
    Credit,
    #[serde(rename = "d")]
    Debit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "c",
            Self::Debit => "d",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" => Ok(Self::Credit),
            "d" => Ok(Self::Debit),
            other => Err(LedgerError::InvalidKind(other.to_string())),
        }
    }
}

/// A transaction request as handed over by the request layer.
///
/// Field aliases accept the wire names (`valor`, `tipo`, `descricao`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TransactionRequest {
    pub client_id: ClientId,
    #[serde(alias = "tipo")]
    pub kind: String,
    #[serde(alias = "valor")]
    pub amount: i64,
    #[serde(alias = "descricao")]
    pub description: String,
}

impl TransactionRequest {
    pub fn new(
        client_id: ClientId,
        kind: impl Into<String>,
        amount: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            client_id,
            kind: kind.into(),
            amount,
            description: description.into(),
        }
    }

    pub fn credit(client_id: ClientId, amount: i64, description: impl Into<String>) -> Self {
        Self::new(client_id, "c", amount, description)
    }

    pub fn debit(client_id: ClientId, amount: i64, description: impl Into<String>) -> Self {
        Self::new(client_id, "d", amount, description)
    }

    /// Checks amount, type and description, in that order.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - amount is zero or negative.
    /// - [`LedgerError::InvalidKind`] - type is not `"c"` or `"d"`.
    /// - [`LedgerError::InvalidDescription`] - description is empty or too long.
    pub fn validate(self) -> Result<ValidRequest, LedgerError> {
        if self.amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let kind = self.kind.parse::<TransactionKind>()?;
        let length = self.description.chars().count();
        if length == 0 || length > MAX_DESCRIPTION_LEN {
            return Err(LedgerError::InvalidDescription);
        }
        Ok(ValidRequest {
            client_id: self.client_id,
            kind,
            amount: self.amount,
            description: self.description,
        })
    }
}

/// A request that passed validation and may be sent to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRequest {
    pub client_id: ClientId,
    pub kind: TransactionKind,
    pub amount: i64,
    pub description: String,
}

/// An accepted, immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub client_id: ClientId,
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    /// UTC, microsecond precision.
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn from_request(
        id: TransactionId,
        request: ValidRequest,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            client_id: request.client_id,
            amount: request.amount,
            kind: request.kind,
            description: request.description,
            timestamp,
        }
    }
}

/// UTC clock with microsecond resolution that never repeats a reading.
///
/// Two transactions stamped by the same clock always compare strictly, so
/// "newest first" is a total order even within one microsecond.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let previous = match self.last_micros.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |last| Some(wall.max(last + 1)),
        ) {
            Ok(previous) | Err(previous) => previous,
        };
        let micros = wall.max(previous + 1);
        DateTime::<Utc>::from_timestamp_micros(micros)
            .unwrap_or_else(|| Utc::now().trunc_subsecs(6))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_wire_codes() {
        assert_eq!("c".parse::<TransactionKind>(), Ok(TransactionKind::Credit));
        assert_eq!("d".parse::<TransactionKind>(), Ok(TransactionKind::Debit));
        assert_eq!(
            "C".parse::<TransactionKind>(),
            Err(LedgerError::InvalidKind("C".to_string()))
        );
    }

    #[test]
    fn kind_serializes_as_single_letter() {
        assert_eq!(serde_json::to_string(&TransactionKind::Debit).unwrap(), "\"d\"");
        let kind: TransactionKind = serde_json::from_str("\"c\"").unwrap();
        assert_eq!(kind, TransactionKind::Credit);
    }

    #[test]
    fn validate_accepts_well_formed_request() {
        let valid = TransactionRequest::debit(ClientId(1), 500, "rent")
            .validate()
            .unwrap();
        assert_eq!(valid.kind, TransactionKind::Debit);
        assert_eq!(valid.amount, 500);
        assert_eq!(valid.description, "rent");
    }

    #[test]
    fn validate_rejects_non_positive_amount() {
        for amount in [0, -1, i64::MIN] {
            let result = TransactionRequest::credit(ClientId(1), amount, "x").validate();
            assert_eq!(result, Err(LedgerError::InvalidAmount));
        }
    }

    #[test]
    fn validate_rejects_unknown_kind() {
        let result = TransactionRequest::new(ClientId(1), "x", 10, "x").validate();
        assert_eq!(result, Err(LedgerError::InvalidKind("x".to_string())));
    }

    #[test]
    fn validate_checks_description_length_in_characters() {
        let empty = TransactionRequest::credit(ClientId(1), 1, "").validate();
        assert_eq!(empty, Err(LedgerError::InvalidDescription));

        let eleven = TransactionRequest::credit(ClientId(1), 1, "abcdefghijk").validate();
        assert_eq!(eleven, Err(LedgerError::InvalidDescription));

        // Ten multi-byte characters are still ten characters.
        let accented = TransactionRequest::credit(ClientId(1), 1, "éééééééééé").validate();
        assert!(accented.is_ok());
    }

    #[test]
    fn request_accepts_wire_field_names() {
        let json = r#"{"client_id": 3, "valor": 1000, "tipo": "c", "descricao": "salario"}"#;
        let request: TransactionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request, TransactionRequest::credit(ClientId(3), 1000, "salario"));
    }

    #[test]
    fn clock_is_strictly_increasing() {
        let clock = MonotonicClock::new();
        let mut previous = clock.now();
        for _ in 0..10_000 {
            let next = clock.now();
            assert!(next > previous);
            assert_eq!(next.timestamp_subsec_nanos() % 1_000, 0);
            previous = next;
        }
    }
}
