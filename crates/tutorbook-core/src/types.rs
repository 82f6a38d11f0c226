// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the ledger, booking, and storage crates.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::TutorbookError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a platform user (student, teacher, admin, methodologist).
    UserId
);
string_id!(
    /// Identifier of a lesson slot.
    LessonId
);
string_id!(
    /// Identifier of a booking (UUID v4).
    BookingId
);

impl BookingId {
    /// Generate a fresh booking identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Role of a platform user. Roles are issued by the external identity layer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
    Methodologist,
}

/// A platform user as far as the booking engine is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A lesson slot with a limited number of seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub teacher_id: UserId,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Maximum number of simultaneously active bookings.
    pub max_students: i64,
    /// Seats currently held by active bookings.
    pub booked_seats: i64,
}

impl Lesson {
    /// Seats still available.
    pub fn free_seats(&self) -> i64 {
        (self.max_students - self.booked_seats).max(0)
    }

    /// Whether every seat is taken.
    pub fn is_full(&self) -> bool {
        self.booked_seats >= self.max_students
    }
}

/// Booking lifecycle state. `Cancelled` is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

/// A reservation binding one student to one lesson seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub student_id: UserId,
    pub lesson_id: LessonId,
    pub status: BookingStatus,
    /// Credits debited when the booking was made; refunds return exactly this.
    pub credits_paid: i64,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Kind of ledger entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Add,
    Deduct,
    Refund,
}

impl OperationType {
    /// Sign applied to the absolute amount of an entry of this kind.
    pub fn sign(self) -> i64 {
        match self {
            OperationType::Add | OperationType::Refund => 1,
            OperationType::Deduct => -1,
        }
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Monotonic entry id assigned by the store.
    pub id: i64,
    pub user_id: UserId,
    /// Signed amount: positive for add/refund, negative for deduct.
    pub amount: i64,
    pub operation: OperationType,
    pub reason: String,
    pub performed_by: UserId,
    /// Booking this entry pays for or refunds, if any.
    pub booking_id: Option<BookingId>,
    /// Cached balance immediately after this entry was applied.
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Audit record written once per cancelled booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledBooking {
    pub id: String,
    pub booking_id: BookingId,
    pub student_id: UserId,
    pub lesson_id: LessonId,
    pub cancelled_by: UserId,
    pub cancelled_at: DateTime<Utc>,
    pub refunded_credits: i64,
    pub refund_transaction_id: Option<i64>,
    pub reason: Option<String>,
}

/// Health status reported by the storage health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational but experiencing issues.
    Degraded(String),
    /// Not operational.
    Unhealthy(String),
}

/// Format a timestamp the way every table stores it.
///
/// RFC 3339 with millisecond precision and a `Z` suffix, so lexicographic
/// order matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TutorbookError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| TutorbookError::Internal(format!("malformed timestamp `{raw}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn timestamps_sort_lexicographically() {
        let early = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let a = format_timestamp(&early);
        let b = format_timestamp(&late);
        assert_eq!(a, "2026-03-01T09:00:00.000Z");
        assert!(a < b);
        assert_eq!(parse_timestamp(&a).unwrap(), early);
    }

    #[test]
    fn malformed_timestamp_is_rejected() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn roles_parse_from_lowercase() {
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
        assert_eq!(Role::Methodologist.to_string(), "methodologist");
        assert!(Role::from_str("superuser").is_err());
    }

    #[test]
    fn operation_sign_matches_direction() {
        assert_eq!(OperationType::Add.sign(), 1);
        assert_eq!(OperationType::Refund.sign(), 1);
        assert_eq!(OperationType::Deduct.sign(), -1);
        assert_eq!(OperationType::from_str("refund").unwrap(), OperationType::Refund);
    }

    #[test]
    fn lesson_seat_arithmetic() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let lesson = Lesson {
            id: "l-1".into(),
            teacher_id: "t-1".into(),
            title: "Algebra".to_string(),
            start_time: start,
            end_time: start + chrono::Duration::hours(1),
            max_students: 5,
            booked_seats: 4,
        };
        assert_eq!(lesson.free_seats(), 1);
        assert!(!lesson.is_full());
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = UserId::from("student-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"student-7\"");
        assert_eq!(id.to_string(), "student-7");
    }
}
