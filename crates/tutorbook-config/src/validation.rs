// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, the credit adjustment range, and paging limits.

use crate::diagnostic::ConfigError;
use crate::model::TutorbookConfig;

/// Smallest amount a single credit operation may move.
pub const MIN_CREDIT_AMOUNT: i64 = 1;

/// Largest amount a single credit operation may move.
pub const MAX_CREDIT_AMOUNT: i64 = 100;

/// Longest cancellation window accepted, one year.
pub const MAX_CANCELLATION_WINDOW_HOURS: i64 = 24 * 365;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TutorbookConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.credits.max_balance < MAX_CREDIT_AMOUNT {
        errors.push(ConfigError::Validation {
            message: format!(
                "credits.max_balance must be at least {MAX_CREDIT_AMOUNT}, got {}",
                config.credits.max_balance
            ),
        });
    }

    if config.credits.history_max_limit < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "credits.history_max_limit must be at least 1, got {}",
                config.credits.history_max_limit
            ),
        });
    }

    if config.credits.history_default_limit < 1
        || config.credits.history_default_limit > config.credits.history_max_limit
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "credits.history_default_limit must be between 1 and credits.history_max_limit ({}), got {}",
                config.credits.history_max_limit, config.credits.history_default_limit
            ),
        });
    }

    if !(MIN_CREDIT_AMOUNT..=MAX_CREDIT_AMOUNT).contains(&config.booking.lesson_cost) {
        errors.push(ConfigError::Validation {
            message: format!(
                "booking.lesson_cost must be between {MIN_CREDIT_AMOUNT} and {MAX_CREDIT_AMOUNT}, got {}",
                config.booking.lesson_cost
            ),
        });
    }

    if !(0..=MAX_CANCELLATION_WINDOW_HOURS).contains(&config.booking.cancellation_window_hours) {
        errors.push(ConfigError::Validation {
            message: format!(
                "booking.cancellation_window_hours must be between 0 and {MAX_CANCELLATION_WINDOW_HOURS}, got {}",
                config.booking.cancellation_window_hours
            ),
        });
    }

    let level = config.logging.level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "logging.level `{}` is not one of {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = TutorbookConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = TutorbookConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "database_path"));
    }

    #[test]
    fn lesson_cost_outside_adjustment_range_fails() {
        let mut config = TutorbookConfig::default();
        config.booking.lesson_cost = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "lesson_cost"));

        config.booking.lesson_cost = 101;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "lesson_cost"));
    }

    #[test]
    fn negative_window_fails_validation() {
        let mut config = TutorbookConfig::default();
        config.booking.cancellation_window_hours = -1;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "cancellation_window_hours"));
    }

    #[test]
    fn window_longer_than_a_year_fails_validation() {
        let mut config = TutorbookConfig::default();
        config.booking.cancellation_window_hours = MAX_CANCELLATION_WINDOW_HOURS;
        assert!(validate_config(&config).is_ok());

        config.booking.cancellation_window_hours = MAX_CANCELLATION_WINDOW_HOURS + 1;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "cancellation_window_hours"));

        config.booking.cancellation_window_hours = 9_000_000_000_000_000;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "cancellation_window_hours"));
    }

    #[test]
    fn default_limit_above_max_limit_fails() {
        let mut config = TutorbookConfig::default();
        config.credits.history_default_limit = 600;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "history_default_limit"));
    }

    #[test]
    fn tiny_balance_cap_fails() {
        let mut config = TutorbookConfig::default();
        config.credits.max_balance = 10;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "max_balance"));
    }

    #[test]
    fn unknown_log_level_fails() {
        let mut config = TutorbookConfig::default();
        config.logging.level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "logging.level"));
    }

    #[test]
    fn errors_are_collected_not_fail_fast() {
        let mut config = TutorbookConfig::default();
        config.storage.database_path = " ".to_string();
        config.booking.lesson_cost = 0;
        config.booking.cancellation_window_hours = -3;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = TutorbookConfig::default();
        config.storage.database_path = "/tmp/test.db".to_string();
        config.booking.lesson_cost = 2;
        config.booking.cancellation_window_hours = 12;
        config.credits.max_balance = 5_000;
        config.logging.level = "DEBUG".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
