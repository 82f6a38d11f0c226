// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tutorbook.toml` > `~/.config/tutorbook/tutorbook.toml` >
//! `/etc/tutorbook/tutorbook.toml` with environment variable overrides via `TUTORBOOK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TutorbookConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/tutorbook/tutorbook.toml";

/// Configuration file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "tutorbook.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tutorbook/tutorbook.toml` (system-wide)
/// 3. `~/.config/tutorbook/tutorbook.toml` (user XDG config)
/// 4. `./tutorbook.toml` (local directory)
/// 5. `TUTORBOOK_*` environment variables
pub fn load_config() -> Result<TutorbookConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<TutorbookConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TutorbookConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TutorbookConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TutorbookConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TutorbookConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Path of the per-user configuration file, if the platform has a config dir.
pub fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("tutorbook").join(LOCAL_CONFIG_FILE))
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `TUTORBOOK_BOOKING_LESSON_COST` must map to
/// `booking.lesson_cost`, not `booking.lesson.cost`.
fn env_provider() -> Env {
    Env::prefixed("TUTORBOOK_").map(|key| {
        // Keys arrive upper-case; figment lowercases only after mapping.
        let key_str = key.as_str().to_ascii_lowercase();
        let mapped = key_str
            .replacen("storage_", "storage.", 1)
            .replacen("credits_", "credits.", 1)
            .replacen("booking_", "booking.", 1)
            .replacen("logging_", "logging.", 1);
        mapped.into()
    })
}
