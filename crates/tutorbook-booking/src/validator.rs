// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only booking preconditions.
//!
//! The same checks run twice: once on the read connection to reject hopeless
//! requests early, and again inside the unit of work where their answer is
//! authoritative. They never write.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use tutorbook_core::{Lesson, LessonId, User, UserId};
use tutorbook_ledger::postings;
use tutorbook_storage::queries::{bookings, lessons, users};

use crate::error::CreateBookingError;

/// What the preconditions observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precheck {
    pub student: User,
    pub lesson: Lesson,
    /// Balance at the time of the check, zero without a balance row.
    pub balance: i64,
}

/// Booking preconditions for a fixed lesson price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingValidator {
    lesson_cost: i64,
}

impl BookingValidator {
    pub fn new(lesson_cost: i64) -> Self {
        Self { lesson_cost }
    }

    pub fn lesson_cost(&self) -> i64 {
        self.lesson_cost
    }

    pub fn student_exists(
        &self,
        conn: &Connection,
        student: &UserId,
    ) -> Result<User, CreateBookingError> {
        users::get_user(conn, student)?.ok_or_else(|| CreateBookingError::UserNotFound {
            user: student.clone(),
        })
    }

    /// The lesson exists and has not started at `now`.
    pub fn lesson_bookable(
        &self,
        conn: &Connection,
        lesson: &LessonId,
        now: DateTime<Utc>,
    ) -> Result<Lesson, CreateBookingError> {
        let found = lessons::get_lesson(conn, lesson)?.ok_or_else(|| {
            CreateBookingError::LessonNotFound {
                lesson: lesson.clone(),
            }
        })?;
        if found.start_time <= now {
            return Err(CreateBookingError::LessonInPast {
                lesson: lesson.clone(),
            });
        }
        Ok(found)
    }

    pub fn not_already_booked(
        &self,
        conn: &Connection,
        student: &UserId,
        lesson: &LessonId,
    ) -> Result<(), CreateBookingError> {
        match bookings::find_active(conn, student, lesson)? {
            Some(_) => Err(CreateBookingError::AlreadyBooked {
                student: student.clone(),
                lesson: lesson.clone(),
            }),
            None => Ok(()),
        }
    }

    /// `balance` covers one lesson.
    pub fn sufficient_balance(&self, balance: i64) -> Result<(), CreateBookingError> {
        if balance < self.lesson_cost {
            return Err(CreateBookingError::InsufficientCredits {
                balance,
                required: self.lesson_cost,
            });
        }
        Ok(())
    }

    /// Run every check except capacity and balance sufficiency.
    ///
    /// The credit row is read before the lesson row. Seat and balance
    /// verdicts are left to the caller so that inside a unit of work a full
    /// lesson is reported before a short balance.
    pub fn precheck(
        &self,
        conn: &Connection,
        student: &UserId,
        lesson: &LessonId,
        now: DateTime<Utc>,
    ) -> Result<Precheck, CreateBookingError> {
        let student_row = self.student_exists(conn, student)?;
        let balance = postings::balance_or_zero(conn, student)?;
        let lesson_row = self.lesson_bookable(conn, lesson, now)?;
        self.not_already_booked(conn, student, lesson)?;
        Ok(Precheck {
            student: student_row,
            lesson: lesson_row,
            balance,
        })
    }
}
