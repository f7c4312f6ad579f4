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


//! Ledger configuration.
//!
//! Every field has a default, so an empty document is a valid config.
//!
//! ```yaml
//! log_level: info
//! preload_cache: true
//! retry:
//!   max_attempts: 3
//!   base_delay_ms: 10
//! journal:
//!   mode: async
//!   batch_size: 100
//!   flush_interval_ms: 50
//!   shutdown_grace_ms: 5000
//!   failure_alert_threshold: 5
//! ```

use crate::error::ConfigError;
use crate::journal_writer::BatchSettings;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub log_level: String,
    pub preload_cache: bool,
    pub retry: RetryConfig,
    pub journal: JournalConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            preload_cache: true,
            retry: RetryConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: RetryPolicy::DEFAULT_BASE_DELAY.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

/// Which path records accepted transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Write each entry before answering.
    Sync,
    /// Queue each entry for the background batch writer.
    #[default]
    Async,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JournalConfig {
    pub mode: JournalMode,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub shutdown_grace_ms: u64,
    pub failure_alert_threshold: u32,
}

impl Default for JournalConfig {
    fn default() -> Self {
        let settings = BatchSettings::default();
        Self {
            mode: JournalMode::default(),
            batch_size: settings.batch_size,
            flush_interval_ms: settings.flush_interval.as_millis() as u64,
            shutdown_grace_ms: settings.shutdown_grace.as_millis() as u64,
            failure_alert_threshold: settings.failure_alert_threshold,
        }
    }
}

impl JournalConfig {
    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            failure_alert_threshold: self.failure_alert_threshold,
        }
    }
}

impl LedgerConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.journal.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "journal.batch_size must be at least 1".to_string(),
            ));
        }
        if self.journal.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "journal.flush_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
