// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seat counter of a lesson.
//!
//! `lessons.booked_seats` is the authority on occupancy. It only moves inside
//! a unit of work through a conditional update, so it can never pass
//! `max_students` nor drop below zero, and it always equals the number of
//! active bookings once the unit commits.

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;

use tutorbook_core::{LessonId, TutorbookError};
use tutorbook_storage::map_sql_err;
use tutorbook_storage::queries::bookings;

/// Result of trying to take a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// A seat was taken; the counter now reads `booked_seats`.
    Reserved { booked_seats: i64 },
    /// Every seat is taken.
    Full { max_students: i64 },
    /// No lesson with that id.
    UnknownLesson,
}

/// Counter and limit of one lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub booked_seats: i64,
    pub max_students: i64,
}

impl Occupancy {
    pub fn free_seats(&self) -> i64 {
        (self.max_students - self.booked_seats).max(0)
    }
}

/// Counter compared with the number of active bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityAudit {
    pub lesson: LessonId,
    pub booked_seats: i64,
    pub max_students: i64,
    pub active_bookings: i64,
}

impl CapacityAudit {
    pub fn is_consistent(&self) -> bool {
        self.booked_seats == self.active_bookings && self.booked_seats <= self.max_students
    }
}

/// Seat reservation and release. Mutations require the caller's transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapacityGuard;

impl CapacityGuard {
    /// Current counter and limit, `None` for an unknown lesson.
    pub fn occupancy(
        conn: &Connection,
        lesson: &LessonId,
    ) -> Result<Option<Occupancy>, TutorbookError> {
        conn.query_row(
            "SELECT booked_seats, max_students FROM lessons WHERE id = ?1",
            params![lesson.as_str()],
            |row| {
                Ok(Occupancy {
                    booked_seats: row.get(0)?,
                    max_students: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(map_sql_err)
    }

    /// Take one seat if one is free.
    pub fn reserve(tx: &Transaction<'_>, lesson: &LessonId) -> Result<Reservation, TutorbookError> {
        let changed = tx
            .execute(
                "UPDATE lessons SET booked_seats = booked_seats + 1
                 WHERE id = ?1 AND booked_seats < max_students",
                params![lesson.as_str()],
            )
            .map_err(map_sql_err)?;

        let Some(occupancy) = Self::occupancy(tx, lesson)? else {
            return Ok(Reservation::UnknownLesson);
        };
        if changed == 1 {
            Ok(Reservation::Reserved {
                booked_seats: occupancy.booked_seats,
            })
        } else {
            Ok(Reservation::Full {
                max_students: occupancy.max_students,
            })
        }
    }

    /// Give one seat back, returning the new counter.
    ///
    /// Releasing from an empty counter is an integrity violation: some booking
    /// was cancelled without ever holding a seat.
    pub fn release(tx: &Transaction<'_>, lesson: &LessonId) -> Result<i64, TutorbookError> {
        let changed = tx
            .execute(
                "UPDATE lessons SET booked_seats = booked_seats - 1
                 WHERE id = ?1 AND booked_seats > 0",
                params![lesson.as_str()],
            )
            .map_err(map_sql_err)?;
        if changed == 0 {
            return Err(TutorbookError::integrity(format!(
                "seat release on lesson {lesson} with no booked seats"
            )));
        }
        Self::occupancy(tx, lesson)?
            .map(|o| o.booked_seats)
            .ok_or_else(|| TutorbookError::integrity(format!("lesson {lesson} vanished")))
    }

    /// Compare the counter of `lesson` with its active bookings.
    pub fn audit(conn: &Connection, lesson: &LessonId) -> Result<Option<CapacityAudit>, TutorbookError> {
        let Some(occupancy) = Self::occupancy(conn, lesson)? else {
            return Ok(None);
        };
        let active_bookings = bookings::count_active_for_lesson(conn, lesson)?;
        Ok(Some(CapacityAudit {
            lesson: lesson.clone(),
            booked_seats: occupancy.booked_seats,
            max_students: occupancy.max_students,
            active_bookings,
        }))
    }
}
