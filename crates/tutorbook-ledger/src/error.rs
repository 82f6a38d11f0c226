// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Closed error sets for ledger operations.

use thiserror::Error;

use tutorbook_config::validation::{MAX_CREDIT_AMOUNT, MIN_CREDIT_AMOUNT};
use tutorbook_core::{Classify, ErrorClass, TutorbookError, UserId};

/// Minimum trimmed length of a reason attached to a manual credit operation.
pub const MIN_REASON_LEN: usize = 3;

/// Failure of an in-transaction posting primitive.
#[derive(Debug, Error)]
pub enum PostingError {
    /// A balance row was about to be created a second time.
    #[error("credit account for user {user} already exists")]
    DuplicateAccount { user: UserId },

    #[error(transparent)]
    System(#[from] TutorbookError),
}

/// Errors from [`CreditLedger::add_credits`](crate::CreditLedger::add_credits).
#[derive(Debug, Error)]
pub enum AddCreditsError {
    #[error(
        "credit amount must be between {} and {}, got {amount}",
        MIN_CREDIT_AMOUNT,
        MAX_CREDIT_AMOUNT
    )]
    InvalidAmount { amount: i64 },

    #[error("reason must be at least {} characters", MIN_REASON_LEN)]
    InvalidReason,

    #[error("user {user} not found")]
    UserNotFound { user: UserId },

    #[error(
        "adding {amount} credits would raise the balance of {balance} above the maximum of {max}"
    )]
    BalanceExceeded { balance: i64, amount: i64, max: i64 },

    #[error("credit account for user {user} was initialized twice")]
    DuplicateCredit { user: UserId },

    #[error(transparent)]
    System(#[from] TutorbookError),
}

/// Errors from [`CreditLedger::deduct_credits`](crate::CreditLedger::deduct_credits).
#[derive(Debug, Error)]
pub enum DeductCreditsError {
    #[error(
        "credit amount must be between {} and {}, got {amount}",
        MIN_CREDIT_AMOUNT,
        MAX_CREDIT_AMOUNT
    )]
    InvalidAmount { amount: i64 },

    #[error("reason must be at least {} characters", MIN_REASON_LEN)]
    InvalidReason,

    #[error("user {user} not found")]
    UserNotFound { user: UserId },

    #[error("insufficient credits: balance {balance}, requested {requested}")]
    InsufficientCredits { balance: i64, requested: i64 },

    #[error("credit account for user {user} was initialized twice")]
    DuplicateCredit { user: UserId },

    #[error(transparent)]
    System(#[from] TutorbookError),
}

/// Errors from explicit account operations (`open_account`, `credit_account`).
#[derive(Debug, Error)]
pub enum CreditAccountError {
    #[error("user {user} not found")]
    UserNotFound { user: UserId },

    #[error("no credit account for user {user}")]
    CreditNotFound { user: UserId },

    #[error("credit account for user {user} was initialized twice")]
    DuplicateCredit { user: UserId },

    #[error(transparent)]
    System(#[from] TutorbookError),
}

impl From<PostingError> for AddCreditsError {
    fn from(err: PostingError) -> Self {
        match err {
            PostingError::DuplicateAccount { user } => Self::DuplicateCredit { user },
            PostingError::System(e) => Self::System(e),
        }
    }
}

impl From<PostingError> for DeductCreditsError {
    fn from(err: PostingError) -> Self {
        match err {
            PostingError::DuplicateAccount { user } => Self::DuplicateCredit { user },
            PostingError::System(e) => Self::System(e),
        }
    }
}

impl From<PostingError> for CreditAccountError {
    fn from(err: PostingError) -> Self {
        match err {
            PostingError::DuplicateAccount { user } => Self::DuplicateCredit { user },
            PostingError::System(e) => Self::System(e),
        }
    }
}

/// Malformed input shared by add and deduct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputError {
    Amount(i64),
    Reason,
}

impl From<InputError> for AddCreditsError {
    fn from(err: InputError) -> Self {
        match err {
            InputError::Amount(amount) => Self::InvalidAmount { amount },
            InputError::Reason => Self::InvalidReason,
        }
    }
}

impl From<InputError> for DeductCreditsError {
    fn from(err: InputError) -> Self {
        match err {
            InputError::Amount(amount) => Self::InvalidAmount { amount },
            InputError::Reason => Self::InvalidReason,
        }
    }
}

/// Validate a manual credit operation, returning the trimmed reason.
pub(crate) fn validate_input(amount: i64, reason: &str) -> Result<String, InputError> {
    if !(MIN_CREDIT_AMOUNT..=MAX_CREDIT_AMOUNT).contains(&amount) {
        return Err(InputError::Amount(amount));
    }
    let reason = reason.trim();
    if reason.chars().count() < MIN_REASON_LEN {
        return Err(InputError::Reason);
    }
    Ok(reason.to_string())
}

impl Classify for PostingError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::DuplicateAccount { .. } => ErrorClass::Integrity,
            Self::System(e) => e.class(),
        }
    }
}

impl Classify for AddCreditsError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidAmount { .. } | Self::InvalidReason => ErrorClass::Validation,
            Self::UserNotFound { .. } => ErrorClass::NotFound,
            Self::BalanceExceeded { .. } => ErrorClass::Conflict,
            Self::DuplicateCredit { .. } => ErrorClass::Integrity,
            Self::System(e) => e.class(),
        }
    }
}

impl Classify for DeductCreditsError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidAmount { .. } | Self::InvalidReason => ErrorClass::Validation,
            Self::UserNotFound { .. } => ErrorClass::NotFound,
            Self::InsufficientCredits { .. } => ErrorClass::Conflict,
            Self::DuplicateCredit { .. } => ErrorClass::Integrity,
            Self::System(e) => e.class(),
        }
    }
}

impl Classify for CreditAccountError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::UserNotFound { .. } | Self::CreditNotFound { .. } => ErrorClass::NotFound,
            Self::DuplicateCredit { .. } => ErrorClass::Integrity,
            Self::System(e) => e.class(),
        }
    }
}
