// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording notifier for asserting post-commit events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use tutorbook_core::{Booking, BookingNotifier, CancelledBooking, CreditTransaction, TutorbookError};

/// One captured notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierEvent {
    Created {
        booking: Booking,
        debit: CreditTransaction,
    },
    Cancelled {
        cancellation: CancelledBooking,
        refund: CreditTransaction,
    },
}

/// Captures every event it receives.
///
/// With [`failing`](Self::failing) it still records, then returns an error,
/// so tests can check that a broken notifier never undoes a commit.
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<NotifierEvent>>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            fail: AtomicBool::new(false),
        }
    }

    /// A notifier whose every call fails after recording.
    pub fn failing() -> Self {
        let notifier = Self::new();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub async fn events(&self) -> Vec<NotifierEvent> {
        self.events.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }

    async fn record(&self, event: NotifierEvent) -> Result<(), TutorbookError> {
        self.events.lock().await.push(event);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TutorbookError::Internal("notification channel closed".into()));
        }
        Ok(())
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookingNotifier for RecordingNotifier {
    async fn booking_created(
        &self,
        booking: &Booking,
        debit: &CreditTransaction,
    ) -> Result<(), TutorbookError> {
        self.record(NotifierEvent::Created {
            booking: booking.clone(),
            debit: debit.clone(),
        })
        .await
    }

    async fn booking_cancelled(
        &self,
        cancellation: &CancelledBooking,
        refund: &CreditTransaction,
    ) -> Result<(), TutorbookError> {
        self.record(NotifierEvent::Cancelled {
            cancellation: cancellation.clone(),
            refund: refund.clone(),
        })
        .await
    }
}
