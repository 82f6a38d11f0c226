// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Closed error sets for booking operations.

use thiserror::Error;

use tutorbook_core::{BookingId, Classify, ErrorClass, LessonId, TutorbookError, UserId};
use tutorbook_ledger::PostingError;

/// Errors from [`BookingCoordinator::create_booking`](crate::BookingCoordinator::create_booking).
#[derive(Debug, Error)]
pub enum CreateBookingError {
    #[error("user {user} not found")]
    UserNotFound { user: UserId },

    #[error("lesson {lesson} not found")]
    LessonNotFound { lesson: LessonId },

    #[error("lesson {lesson} has already started")]
    LessonInPast { lesson: LessonId },

    #[error("student {student} already holds a booking for lesson {lesson}")]
    AlreadyBooked { student: UserId, lesson: LessonId },

    #[error("lesson {lesson} is full ({max_students} seats)")]
    LessonFull { lesson: LessonId, max_students: i64 },

    #[error("insufficient credits: balance {balance}, lesson costs {required}")]
    InsufficientCredits { balance: i64, required: i64 },

    #[error(transparent)]
    System(#[from] TutorbookError),
}

/// Errors from [`BookingCoordinator::cancel_booking`](crate::BookingCoordinator::cancel_booking).
#[derive(Debug, Error)]
pub enum CancelBookingError {
    /// The booking does not exist or is no longer active.
    #[error("active booking {booking} not found")]
    BookingNotFound { booking: BookingId },

    #[error("user {requester} may not cancel booking {booking}")]
    Forbidden {
        requester: UserId,
        booking: BookingId,
    },

    #[error(
        "lessons can only be cancelled at least {window_hours} hours before they start \
         ({minutes_left} minutes left)"
    )]
    CancellationWindowClosed {
        window_hours: i64,
        minutes_left: i64,
    },

    #[error(transparent)]
    System(#[from] TutorbookError),
}

fn posting_to_system(err: PostingError) -> TutorbookError {
    match err {
        PostingError::DuplicateAccount { user } => {
            TutorbookError::integrity(format!("credit account for user {user} initialized twice"))
        }
        PostingError::System(e) => e,
    }
}

impl From<PostingError> for CreateBookingError {
    fn from(err: PostingError) -> Self {
        Self::System(posting_to_system(err))
    }
}

impl From<PostingError> for CancelBookingError {
    fn from(err: PostingError) -> Self {
        Self::System(posting_to_system(err))
    }
}

impl Classify for CreateBookingError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::UserNotFound { .. } | Self::LessonNotFound { .. } => ErrorClass::NotFound,
            Self::LessonInPast { .. } => ErrorClass::Validation,
            Self::AlreadyBooked { .. }
            | Self::LessonFull { .. }
            | Self::InsufficientCredits { .. } => ErrorClass::Conflict,
            Self::System(e) => e.class(),
        }
    }
}

impl Classify for CancelBookingError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::BookingNotFound { .. } => ErrorClass::NotFound,
            Self::Forbidden { .. } => ErrorClass::Forbidden,
            Self::CancellationWindowClosed { .. } => ErrorClass::Conflict,
            Self::System(e) => e.class(),
        }
    }
}
