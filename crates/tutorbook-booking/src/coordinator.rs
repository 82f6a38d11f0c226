// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Booking coordinator.
//!
//! Owns the booking state machine `active -> cancelled`. Each create or
//! cancel is one unit of work touching the seat counter, the balance row,
//! the ledger, and the booking rows together; either all of them change or
//! none does. Notifications go out only after commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use tutorbook_config::model::BookingConfig;
use tutorbook_core::{
    Booking, BookingId, BookingNotifier, BookingStatus, CancelledBooking, Clock, CreditTransaction,
    Lesson, LessonId, NoopNotifier, OpContext, OperationType, Role, SystemClock, TutorbookError,
    UserId, log_failure,
};
use tutorbook_ledger::postings::{self, Posting};
use tutorbook_storage::queries::{bookings, lessons, users};
use tutorbook_storage::{Database, is_unique_violation, map_sql_err};

use crate::capacity::{CapacityAudit, CapacityGuard, Reservation};
use crate::error::{CancelBookingError, CreateBookingError};
use crate::policy::CancellationPolicy;
use crate::validator::BookingValidator;

/// Reason recorded on the debit of a booking.
pub const BOOKING_DEBIT_REASON: &str = "lesson booking";
/// Reason recorded on the refund of a cancelled booking.
pub const BOOKING_REFUND_REASON: &str = "booking cancelled";

/// Committed booking with the student's balance after the debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingReceipt {
    pub booking: Booking,
    pub debit: CreditTransaction,
    pub balance: i64,
}

/// Committed cancellation with its refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub cancellation: CancelledBooking,
    pub refund: CreditTransaction,
    pub balance: i64,
}

pub struct BookingCoordinator {
    db: Arc<Database>,
    config: BookingConfig,
    validator: BookingValidator,
    policy: CancellationPolicy,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn BookingNotifier>,
}

impl BookingCoordinator {
    /// Coordinator using the system clock and no notifier.
    pub fn new(db: Arc<Database>, config: BookingConfig) -> Self {
        Self {
            validator: BookingValidator::new(config.lesson_cost),
            policy: CancellationPolicy::from_hours(config.cancellation_window_hours),
            db,
            config,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn BookingNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn validator(&self) -> BookingValidator {
        self.validator
    }

    pub fn policy(&self) -> CancellationPolicy {
        self.policy
    }

    fn scoped(&self, ctx: &OpContext) -> OpContext {
        match self.config.operation_timeout() {
            Some(timeout) => ctx.child().timeout(timeout),
            None => ctx.child(),
        }
    }

    /// Book a seat in `lesson` for `student` and debit the lesson cost.
    pub async fn create_booking(
        &self,
        ctx: &OpContext,
        student: &UserId,
        lesson: &LessonId,
    ) -> Result<BookingReceipt, CreateBookingError> {
        let result = self.create_booking_inner(ctx, student, lesson).await;

        match &result {
            Ok(receipt) => {
                info!(
                    booking_id = %receipt.booking.id,
                    student = %receipt.booking.student_id,
                    lesson = %receipt.booking.lesson_id,
                    credits_paid = receipt.booking.credits_paid,
                    balance_after = receipt.balance,
                    "booking created"
                );
                if let Err(e) = self
                    .notifier
                    .booking_created(&receipt.booking, &receipt.debit)
                    .await
                {
                    warn!(booking_id = %receipt.booking.id, error = %e, "booking notification failed");
                }
            }
            Err(err) => log_failure("create_booking", err),
        }
        result
    }

    async fn create_booking_inner(
        &self,
        ctx: &OpContext,
        student: &UserId,
        lesson: &LessonId,
    ) -> Result<BookingReceipt, CreateBookingError> {
        let now = self.clock.now();
        let validator = self.validator;

        // Fast fail on the read connection. Not authoritative.
        let (s, l) = (student.clone(), lesson.clone());
        let early = self
            .db
            .read(move |conn| Ok(validator.precheck(conn, &s, &l, now)))
            .await??;
        if early.lesson.is_full() {
            return Err(CreateBookingError::LessonFull {
                lesson: lesson.clone(),
                max_students: early.lesson.max_students,
            });
        }
        validator.sufficient_balance(early.balance)?;

        let ctx = self.scoped(ctx);
        let (student, lesson) = (student.clone(), lesson.clone());
        self.db
            .unit_of_work(&ctx, move |tx| {
                let pre = validator.precheck(tx, &student, &lesson, now)?;
                match CapacityGuard::reserve(tx, &lesson)? {
                    Reservation::Reserved { .. } => {}
                    Reservation::Full { max_students } => {
                        return Err(CreateBookingError::LessonFull {
                            lesson,
                            max_students,
                        });
                    }
                    Reservation::UnknownLesson => {
                        return Err(CreateBookingError::LessonNotFound { lesson });
                    }
                }
                validator.sufficient_balance(pre.balance)?;

                let booking = Booking {
                    id: BookingId::generate(),
                    student_id: student.clone(),
                    lesson_id: lesson.clone(),
                    status: BookingStatus::Active,
                    credits_paid: validator.lesson_cost(),
                    created_at: now,
                    cancelled_at: None,
                };
                match bookings::insert_booking(tx, &booking) {
                    Ok(()) => {}
                    Err(e) if is_unique_violation(&e) => {
                        return Err(CreateBookingError::AlreadyBooked { student, lesson });
                    }
                    Err(e) => return Err(map_sql_err(e).into()),
                }

                let debit = postings::post(
                    tx,
                    &Posting {
                        user: &student,
                        operation: OperationType::Deduct,
                        amount: booking.credits_paid,
                        reason: BOOKING_DEBIT_REASON,
                        performed_by: &student,
                        booking: Some(&booking.id),
                        at: now,
                    },
                )?;
                Ok(BookingReceipt {
                    balance: debit.balance_after,
                    booking,
                    debit,
                })
            })
            .await
    }

    /// Cancel an active booking and refund what was paid for it.
    ///
    /// Only the booking's student or an admin may cancel, and only while the
    /// cancellation window is open. A booking that is already cancelled is
    /// reported as not found, so retries never refund twice.
    pub async fn cancel_booking(
        &self,
        ctx: &OpContext,
        booking: &BookingId,
        requester: &UserId,
        reason: Option<&str>,
    ) -> Result<CancellationOutcome, CancelBookingError> {
        let result = self.cancel_booking_inner(ctx, booking, requester, reason).await;

        match &result {
            Ok(outcome) => {
                info!(
                    booking_id = %outcome.booking.id,
                    student = %outcome.booking.student_id,
                    lesson = %outcome.booking.lesson_id,
                    cancelled_by = %outcome.cancellation.cancelled_by,
                    refunded = outcome.refund.amount,
                    balance_after = outcome.balance,
                    "booking cancelled"
                );
                if let Err(e) = self
                    .notifier
                    .booking_cancelled(&outcome.cancellation, &outcome.refund)
                    .await
                {
                    warn!(booking_id = %outcome.booking.id, error = %e, "cancellation notification failed");
                }
            }
            Err(err) => log_failure("cancel_booking", err),
        }
        result
    }

    async fn cancel_booking_inner(
        &self,
        ctx: &OpContext,
        booking: &BookingId,
        requester: &UserId,
        reason: Option<&str>,
    ) -> Result<CancellationOutcome, CancelBookingError> {
        let now = self.clock.now();
        let policy = self.policy;
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let (b, r) = (booking.clone(), requester.clone());
        self.db
            .read(move |conn| Ok(check_cancellation(conn, policy, &b, &r, now)))
            .await??;

        let ctx = self.scoped(ctx);
        let (booking, requester) = (booking.clone(), requester.clone());
        self.db
            .unit_of_work(&ctx, move |tx| {
                let (active, _lesson) = check_cancellation(tx, policy, &booking, &requester, now)?;
                if !bookings::mark_cancelled(tx, &booking, &now)? {
                    return Err(CancelBookingError::BookingNotFound { booking });
                }
                CapacityGuard::release(tx, &active.lesson_id)?;

                postings::ensure_account(tx, &active.student_id, &now)?;
                let refund = postings::post(
                    tx,
                    &Posting {
                        user: &active.student_id,
                        operation: OperationType::Refund,
                        amount: active.credits_paid,
                        reason: BOOKING_REFUND_REASON,
                        performed_by: &requester,
                        booking: Some(&booking),
                        at: now,
                    },
                )?;

                let cancellation = CancelledBooking {
                    id: uuid::Uuid::new_v4().to_string(),
                    booking_id: booking.clone(),
                    student_id: active.student_id.clone(),
                    lesson_id: active.lesson_id.clone(),
                    cancelled_by: requester.clone(),
                    cancelled_at: now,
                    refunded_credits: refund.amount,
                    refund_transaction_id: Some(refund.id),
                    reason,
                };
                bookings::insert_cancellation(tx, &cancellation)?;

                Ok(CancellationOutcome {
                    booking: Booking {
                        status: BookingStatus::Cancelled,
                        cancelled_at: Some(now),
                        ..active
                    },
                    cancellation,
                    balance: refund.balance_after,
                    refund,
                })
            })
            .await
    }

    pub async fn get_booking(&self, booking: &BookingId) -> Result<Option<Booking>, TutorbookError> {
        let booking = booking.clone();
        self.db
            .read(move |conn| bookings::get_booking(conn, &booking))
            .await
    }

    /// A student's bookings, newest first.
    pub async fn list_student_bookings(
        &self,
        student: &UserId,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, TutorbookError> {
        let student = student.clone();
        self.db
            .read(move |conn| bookings::list_for_student(conn, &student, status))
            .await
    }

    pub async fn get_cancellation(
        &self,
        booking: &BookingId,
    ) -> Result<Option<CancelledBooking>, TutorbookError> {
        let booking = booking.clone();
        self.db
            .read(move |conn| bookings::get_cancellation(conn, &booking))
            .await
    }

    /// Compare a lesson's seat counter with its active bookings.
    pub async fn audit_lesson(
        &self,
        lesson: &LessonId,
    ) -> Result<Option<CapacityAudit>, TutorbookError> {
        let lesson = lesson.clone();
        let audit = self
            .db
            .read(move |conn| CapacityGuard::audit(conn, &lesson))
            .await?;
        if let Some(audit) = audit.as_ref().filter(|a| !a.is_consistent()) {
            warn!(
                lesson = %audit.lesson,
                booked_seats = audit.booked_seats,
                active_bookings = audit.active_bookings,
                "seat counter drifted from active bookings"
            );
        }
        Ok(audit)
    }
}

/// Shared cancellation preconditions: active booking, authorized requester,
/// open window.
fn check_cancellation(
    conn: &Connection,
    policy: CancellationPolicy,
    booking: &BookingId,
    requester: &UserId,
    now: DateTime<Utc>,
) -> Result<(Booking, Lesson), CancelBookingError> {
    let found = bookings::get_booking(conn, booking)?
        .filter(|b| b.status == BookingStatus::Active)
        .ok_or_else(|| CancelBookingError::BookingNotFound {
            booking: booking.clone(),
        })?;

    if &found.student_id != requester {
        let is_admin = users::get_user(conn, requester)?.is_some_and(|u| u.role == Role::Admin);
        if !is_admin {
            return Err(CancelBookingError::Forbidden {
                requester: requester.clone(),
                booking: booking.clone(),
            });
        }
    }

    let lesson = lessons::get_lesson(conn, &found.lesson_id)?.ok_or_else(|| {
        TutorbookError::integrity(format!(
            "booking {booking} references missing lesson {}",
            found.lesson_id
        ))
    })?;

    let decision = policy.evaluate(lesson.start_time, now);
    if !decision.allowed {
        return Err(CancelBookingError::CancellationWindowClosed {
            window_hours: policy.window().num_hours(),
            minutes_left: decision.time_until_start.num_minutes(),
        });
    }
    Ok((found, lesson))
}
