// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `tutorbook-core::types` so the ledger
//! and booking crates share them. This module re-exports them for convenience
//! within the storage crate.

pub use tutorbook_core::types::{
    Booking, BookingId, BookingStatus, CancelledBooking, CreditTransaction, Lesson, LessonId,
    OperationType, Role, User, UserId,
};
