// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tutorbook booking engine.
//!
//! This crate provides the domain types, the shared infrastructure error,
//! error classification, the operation context, and the collaborator traits
//! (clock, post-commit notifier) used throughout the workspace.

pub mod context;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use context::OpContext;
pub use error::{Classify, ErrorClass, TutorbookError, log_failure};
pub use traits::{BookingNotifier, Clock, NoopNotifier, SystemClock};
pub use types::{
    Booking, BookingId, BookingStatus, CancelledBooking, CreditTransaction, HealthStatus, Lesson,
    LessonId, OperationType, Role, User, UserId,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tutorbook_error_has_all_variants() {
        let _config = TutorbookError::Config("test".into());
        let _storage = TutorbookError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _integrity = TutorbookError::integrity("test");
        let _timeout = TutorbookError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _cancelled = TutorbookError::Cancelled;
        let _internal = TutorbookError::Internal("test".into());
    }

    #[test]
    fn booking_ids_are_unique() {
        let a = BookingId::generate();
        let b = BookingId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn collaborator_traits_are_object_safe() {
        fn _assert_clock(_: &dyn Clock) {}
        fn _assert_notifier(_: &dyn BookingNotifier) {}
        let clock = SystemClock;
        let before = chrono::Utc::now();
        assert!(clock.now() >= before);
    }

    #[tokio::test]
    async fn noop_notifier_accepts_events() {
        use chrono::Utc;
        let now = Utc::now();
        let booking = Booking {
            id: BookingId::generate(),
            student_id: "s-1".into(),
            lesson_id: "l-1".into(),
            status: BookingStatus::Active,
            credits_paid: 1,
            created_at: now,
            cancelled_at: None,
        };
        let debit = CreditTransaction {
            id: 1,
            user_id: "s-1".into(),
            amount: -1,
            operation: OperationType::Deduct,
            reason: "Lesson booking".to_string(),
            performed_by: "s-1".into(),
            booking_id: Some(booking.id.clone()),
            balance_after: 0,
            created_at: now,
        };
        NoopNotifier.booking_created(&booking, &debit).await.unwrap();
    }
}
