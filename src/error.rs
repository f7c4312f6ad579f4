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


//! Error types for ledger processing.
//!
//! A rejected debit is not an error: it is reported through
//! [`LedgerUpdateResult::accepted`](crate::LedgerUpdateResult) with the
//! unchanged balance. Everything here is a genuine failure.

use crate::base::ClientId;
use thiserror::Error;

/// Failures reported by a backing store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Serialization or deadlock class conflict; expected to succeed on retry
    #[error("store conflict: {0}")]
    Conflict(String),

    /// The store call did not complete in time
    #[error("store call timed out")]
    Timeout,

    /// The store cannot be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure
    #[error("store failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` for failures that are retried by the update executor.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Timeout)
    }
}

/// Ledger processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Client id is not known to the ledger
    #[error("client {0} not found")]
    NotFound(ClientId),

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Transaction type is neither credit nor debit
    #[error("invalid transaction type {0:?} (expected \"c\" or \"d\")")]
    InvalidKind(String),

    /// Description is empty or longer than ten characters
    #[error("invalid description (must be 1 to 10 characters)")]
    InvalidDescription,

    /// Transient store conflicts persisted past the retry bound
    #[error("update abandoned after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Non-transient store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Shutdown grace period elapsed with entries still queued
    #[error("{remaining} queued transactions were not flushed before shutdown")]
    FlushIncomplete { remaining: usize },

    /// Seed client with a negative limit or a balance below its floor
    #[error("invalid client {client}: {reason}")]
    InvalidClient {
        client: ClientId,
        reason: &'static str,
    },

    /// The background journal writer thread could not be spawned
    #[error("cannot start journal writer: {0}")]
    Spawn(String),
}

impl LedgerError {
    /// Rejected before reaching the store.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount | Self::InvalidKind(_) | Self::InvalidDescription
        )
    }

    /// The caller may try the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    /// HTTP status the request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidAmount | Self::InvalidKind(_) | Self::InvalidDescription => 422,
            Self::RetriesExhausted { .. } => 503,
            Self::Store(_)
            | Self::FlushIncomplete { .. }
            | Self::InvalidClient { .. }
            | Self::Spawn(_) => 500,
        }
    }
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
