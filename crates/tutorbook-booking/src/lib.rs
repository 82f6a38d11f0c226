// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seat booking engine for Tutorbook.
//!
//! [`BookingCoordinator`] reconciles a lesson's seat counter with the
//! student's credit balance: a booking takes a seat and debits the lesson
//! cost in one unit of work, a cancellation frees the seat and refunds in
//! another. [`BookingValidator`] and [`CancellationPolicy`] are pure rules
//! the coordinator applies; [`CapacityGuard`] owns the seat counter.

pub mod capacity;
pub mod coordinator;
pub mod error;
pub mod policy;
pub mod validator;

pub use capacity::{CapacityAudit, CapacityGuard, Occupancy, Reservation};
pub use coordinator::{BookingCoordinator, BookingReceipt, CancellationOutcome};
pub use error::{CancelBookingError, CreateBookingError};
pub use policy::{CancellationDecision, CancellationPolicy};
pub use validator::{BookingValidator, Precheck};
