// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-commit notification hook.

use async_trait::async_trait;

use crate::error::TutorbookError;
use crate::types::{Booking, CancelledBooking, CreditTransaction};

/// Receives booking events after the unit of work has committed.
///
/// Implementations fan events out to live-update channels, chat bots, and
/// so on. A failure here is logged by the caller and never rolls back the
/// committed operation.
#[async_trait]
pub trait BookingNotifier: Send + Sync + 'static {
    /// A booking was created and its debit committed.
    async fn booking_created(
        &self,
        booking: &Booking,
        debit: &CreditTransaction,
    ) -> Result<(), TutorbookError>;

    /// A booking was cancelled and its refund committed.
    async fn booking_cancelled(
        &self,
        cancellation: &CancelledBooking,
        refund: &CreditTransaction,
    ) -> Result<(), TutorbookError>;
}

/// Notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl BookingNotifier for NoopNotifier {
    async fn booking_created(
        &self,
        _booking: &Booking,
        _debit: &CreditTransaction,
    ) -> Result<(), TutorbookError> {
        Ok(())
    }

    async fn booking_cancelled(
        &self,
        _cancellation: &CancelledBooking,
        _refund: &CreditTransaction,
    ) -> Result<(), TutorbookError> {
        Ok(())
    }
}
