// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tutorbook engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Tutorbook configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TutorbookConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Credit ledger limits and history paging.
    #[serde(default)]
    pub credits: CreditsConfig,

    /// Booking cost, cancellation window, and operation deadlines.
    #[serde(default)]
    pub booking: BookingConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long a writer waits for another process's write lock, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tutorbook").join("tutorbook.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("tutorbook.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Credit ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CreditsConfig {
    /// Largest balance an add operation may produce.
    #[serde(default = "default_max_balance")]
    pub max_balance: i64,

    /// Page size used when a history query does not ask for one.
    #[serde(default = "default_history_limit")]
    pub history_default_limit: i64,

    /// Hard cap on the page size of a history query.
    #[serde(default = "default_history_max_limit")]
    pub history_max_limit: i64,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            max_balance: default_max_balance(),
            history_default_limit: default_history_limit(),
            history_max_limit: default_history_max_limit(),
        }
    }
}

fn default_max_balance() -> i64 {
    1_000
}

fn default_history_limit() -> i64 {
    50
}

fn default_history_max_limit() -> i64 {
    500
}

/// Booking engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BookingConfig {
    /// Credits debited per lesson booking.
    #[serde(default = "default_lesson_cost")]
    pub lesson_cost: i64,

    /// Cancellation is refused once fewer than this many hours remain
    /// before the lesson starts.
    #[serde(default = "default_cancellation_window_hours")]
    pub cancellation_window_hours: i64,

    /// Deadline for one booking or ledger operation, in milliseconds.
    /// `0` disables the deadline.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            lesson_cost: default_lesson_cost(),
            cancellation_window_hours: default_cancellation_window_hours(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

impl BookingConfig {
    /// The operation deadline, if one is configured.
    pub fn operation_timeout(&self) -> Option<std::time::Duration> {
        (self.operation_timeout_ms > 0)
            .then(|| std::time::Duration::from_millis(self.operation_timeout_ms))
    }
}

fn default_lesson_cost() -> i64 {
    1
}

fn default_cancellation_window_hours() -> i64 {
    24
}

fn default_operation_timeout_ms() -> u64 {
    10_000
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
