// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types and error classification for the Tutorbook engine.
//!
//! Infrastructure failures share [`TutorbookError`]. Each business operation
//! defines its own closed error enum (in the ledger and booking crates) that
//! wraps `TutorbookError` in a `System` variant, and implements [`Classify`]
//! so the request layer can map outcomes without string matching.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString};
use thiserror::Error;
use tracing::{debug, error};

/// Message shown to callers for failures whose details must stay internal.
pub const GENERIC_FAILURE_MESSAGE: &str = "the operation could not be completed, please try again later";

/// Infrastructure error shared by every Tutorbook crate.
#[derive(Debug, Error)]
pub enum TutorbookError {
    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A persisted invariant was found violated (duplicate balance row,
    /// seat counter underflow, ledger drift).
    #[error("integrity violation: {message}")]
    Integrity { message: String },

    /// The operation deadline passed before the unit of work committed.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The caller cancelled the operation before the unit of work committed.
    #[error("operation cancelled by caller")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TutorbookError {
    /// Build an integrity error from any displayable message.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

/// Coarse category of a failed operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed input the caller can correct.
    Validation,
    /// Expected outcome of legitimate contention (full lesson, low balance).
    Conflict,
    /// The referenced entity does not exist (or is no longer active).
    NotFound,
    /// The caller is not allowed to perform the operation.
    Forbidden,
    /// A persisted invariant is broken; always an incident.
    Integrity,
    /// Anything else: transport, storage, timeouts.
    Internal,
}

impl ErrorClass {
    /// Whether failures of this class must be logged as incidents.
    pub fn is_incident(self) -> bool {
        matches!(self, ErrorClass::Integrity | ErrorClass::Internal)
    }
}

/// Classification shared by every operation error.
pub trait Classify: Display {
    /// The category of this error.
    fn class(&self) -> ErrorClass;

    /// Message that is safe to show to the end user.
    ///
    /// Integrity and internal failures collapse to a generic message so no
    /// implementation detail leaks.
    fn public_message(&self) -> String {
        if self.class().is_incident() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

impl Classify for TutorbookError {
    fn class(&self) -> ErrorClass {
        match self {
            TutorbookError::Integrity { .. } => ErrorClass::Integrity,
            TutorbookError::Config(_)
            | TutorbookError::Storage { .. }
            | TutorbookError::Timeout { .. }
            | TutorbookError::Cancelled
            | TutorbookError::Internal(_) => ErrorClass::Internal,
        }
    }
}

/// Log a failed operation at the level its class deserves.
///
/// Incidents go to `error!` with the full internal message; caller-correctable
/// and contention outcomes stay at `debug!`.
pub fn log_failure<E: Classify>(operation: &'static str, err: &E) {
    let class = err.class();
    if class.is_incident() {
        error!(operation, class = %class, error = %err, "operation failed");
    } else {
        debug!(operation, class = %class, error = %err, "operation rejected");
    }
}
