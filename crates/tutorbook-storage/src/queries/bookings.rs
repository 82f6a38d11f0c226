// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Booking and cancellation audit rows.
//!
//! Bookings are never deleted and `cancelled` is terminal; the schema's
//! triggers reject anything else.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use tutorbook_core::TutorbookError;
use tutorbook_core::types::format_timestamp;

use crate::database::map_sql_err;
use crate::models::{Booking, BookingId, BookingStatus, CancelledBooking, LessonId, UserId};
use crate::queries::columns;

const BOOKING_COLUMNS: &str =
    "id, student_id, lesson_id, status, credits_paid, created_at, cancelled_at";

const CANCELLATION_COLUMNS: &str = "id, booking_id, student_id, lesson_id, cancelled_by, \
     cancelled_at, refunded_credits, refund_transaction_id, reason";

fn map_booking(row: &Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: BookingId(row.get(0)?),
        student_id: UserId(row.get(1)?),
        lesson_id: LessonId(row.get(2)?),
        status: columns::tag(row, 3)?,
        credits_paid: row.get(4)?,
        created_at: columns::timestamp(row, 5)?,
        cancelled_at: columns::optional_timestamp(row, 6)?,
    })
}

fn map_cancellation(row: &Row<'_>) -> rusqlite::Result<CancelledBooking> {
    Ok(CancelledBooking {
        id: row.get(0)?,
        booking_id: BookingId(row.get(1)?),
        student_id: UserId(row.get(2)?),
        lesson_id: LessonId(row.get(3)?),
        cancelled_by: UserId(row.get(4)?),
        cancelled_at: columns::timestamp(row, 5)?,
        refunded_credits: row.get(6)?,
        refund_transaction_id: row.get(7)?,
        reason: row.get(8)?,
    })
}

/// Insert a new active booking.
///
/// Fails with a UNIQUE violation if the student already holds an active
/// booking for the lesson.
pub fn insert_booking(conn: &Connection, booking: &Booking) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO bookings (id, student_id, lesson_id, status, credits_paid, created_at, cancelled_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            booking.id.as_str(),
            booking.student_id.as_str(),
            booking.lesson_id.as_str(),
            booking.status.to_string(),
            booking.credits_paid,
            format_timestamp(&booking.created_at),
            booking.cancelled_at.as_ref().map(format_timestamp),
        ],
    )?;
    Ok(())
}

/// Get a booking by ID, whatever its status.
pub fn get_booking(conn: &Connection, id: &BookingId) -> Result<Option<Booking>, TutorbookError> {
    conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id.as_str()],
        map_booking,
    )
    .optional()
    .map_err(map_sql_err)
}

/// The student's active booking for a lesson, if any.
pub fn find_active(
    conn: &Connection,
    student: &UserId,
    lesson: &LessonId,
) -> Result<Option<Booking>, TutorbookError> {
    conn.query_row(
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE student_id = ?1 AND lesson_id = ?2 AND status = 'active'"
        ),
        params![student.as_str(), lesson.as_str()],
        map_booking,
    )
    .optional()
    .map_err(map_sql_err)
}

/// Number of active bookings holding a seat in `lesson`.
pub fn count_active_for_lesson(conn: &Connection, lesson: &LessonId) -> Result<i64, TutorbookError> {
    conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE lesson_id = ?1 AND status = 'active'",
        params![lesson.as_str()],
        |row| row.get(0),
    )
    .map_err(map_sql_err)
}

/// A student's bookings, newest first, optionally filtered by status.
pub fn list_for_student(
    conn: &Connection,
    student: &UserId,
    status: Option<BookingStatus>,
) -> Result<Vec<Booking>, TutorbookError> {
    let status = status.map(|s| s.to_string());
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE student_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, id DESC"
        ))
        .map_err(map_sql_err)?;
    let rows = stmt
        .query_map(params![student.as_str(), status], map_booking)
        .map_err(map_sql_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
}

/// Flip an active booking to cancelled.
///
/// Returns `false` when the booking was not active, so a second cancellation
/// racing the first is detected inside the unit of work.
pub fn mark_cancelled(
    conn: &Connection,
    id: &BookingId,
    at: &DateTime<Utc>,
) -> Result<bool, TutorbookError> {
    let changed = conn
        .execute(
            "UPDATE bookings SET status = 'cancelled', cancelled_at = ?2
             WHERE id = ?1 AND status = 'active'",
            params![id.as_str(), format_timestamp(at)],
        )
        .map_err(map_sql_err)?;
    Ok(changed == 1)
}

/// Write the audit row for a cancellation.
pub fn insert_cancellation(
    conn: &Connection,
    cancellation: &CancelledBooking,
) -> Result<(), TutorbookError> {
    conn.execute(
        &format!(
            "INSERT INTO cancelled_bookings ({CANCELLATION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            cancellation.id,
            cancellation.booking_id.as_str(),
            cancellation.student_id.as_str(),
            cancellation.lesson_id.as_str(),
            cancellation.cancelled_by.as_str(),
            format_timestamp(&cancellation.cancelled_at),
            cancellation.refunded_credits,
            cancellation.refund_transaction_id,
            cancellation.reason,
        ],
    )
    .map_err(map_sql_err)?;
    Ok(())
}

/// The cancellation audit row for a booking, if it was cancelled.
pub fn get_cancellation(
    conn: &Connection,
    booking: &BookingId,
) -> Result<Option<CancelledBooking>, TutorbookError> {
    conn.query_row(
        &format!("SELECT {CANCELLATION_COLUMNS} FROM cancelled_bookings WHERE booking_id = ?1"),
        params![booking.as_str()],
        map_cancellation,
    )
    .optional()
    .map_err(map_sql_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::database::is_unique_violation;
    use crate::queries::{lessons, users};
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;
    use tutorbook_core::{Lesson, Role, User};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 4, day, 9, 0, 0).unwrap()
    }

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        db.write(|conn| {
            for (id, role) in [("t-1", Role::Teacher), ("s-1", Role::Student)] {
                users::upsert_user(
                    conn,
                    &User {
                        id: id.into(),
                        display_name: id.to_string(),
                        role,
                        created_at: ts(1),
                    },
                )?;
            }
            lessons::insert_lesson(
                conn,
                &Lesson {
                    id: "l-1".into(),
                    teacher_id: "t-1".into(),
                    title: "Algebra".to_string(),
                    start_time: ts(20),
                    end_time: ts(20) + Duration::hours(1),
                    max_students: 3,
                    booked_seats: 0,
                },
            )
        })
        .await
        .unwrap();
        (db, dir)
    }

    fn make_booking(created_day: u32) -> Booking {
        Booking {
            id: BookingId::generate(),
            student_id: "s-1".into(),
            lesson_id: "l-1".into(),
            status: BookingStatus::Active,
            credits_paid: 1,
            created_at: ts(created_day),
            cancelled_at: None,
        }
    }

    #[tokio::test]
    async fn second_active_booking_violates_unique_index() {
        let (db, _dir) = setup_db().await;
        let first = make_booking(2);
        let second = make_booking(3);
        let unique = db
            .write(move |conn| {
                insert_booking(conn, &first).map_err(map_sql_err)?;
                let err = insert_booking(conn, &second).unwrap_err();
                Ok(is_unique_violation(&err))
            })
            .await
            .unwrap();
        assert!(unique);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_then_rebook_is_allowed() {
        let (db, _dir) = setup_db().await;
        let first = make_booking(2);
        let first_id = first.id.clone();
        let second = make_booking(3);
        db.write(move |conn| {
            insert_booking(conn, &first).map_err(map_sql_err)?;
            assert!(mark_cancelled(conn, &first_id, &ts(3))?);
            assert!(!mark_cancelled(conn, &first_id, &ts(4))?);
            insert_booking(conn, &second).map_err(map_sql_err)
        })
        .await
        .unwrap();

        let student = UserId::from("s-1");
        let (all, active, active_count) = db
            .read(move |conn| {
                Ok((
                    list_for_student(conn, &student, None)?,
                    list_for_student(conn, &student, Some(BookingStatus::Active))?,
                    count_active_for_lesson(conn, &LessonId::from("l-1"))?,
                ))
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].status, BookingStatus::Cancelled);
        assert_eq!(all[1].cancelled_at, Some(ts(3)));
        assert_eq!(active.len(), 1);
        assert_eq!(active_count, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn bookings_cannot_be_deleted_or_reactivated() {
        let (db, _dir) = setup_db().await;
        let booking = make_booking(2);
        let id = booking.id.clone();
        let (deleted, reactivated) = db
            .write(move |conn| {
                insert_booking(conn, &booking).map_err(map_sql_err)?;
                mark_cancelled(conn, &id, &ts(3))?;
                let deleted = conn.execute("DELETE FROM bookings WHERE id = ?1", [id.as_str()]);
                let reactivated = conn.execute(
                    "UPDATE bookings SET status = 'active', cancelled_at = NULL WHERE id = ?1",
                    [id.as_str()],
                );
                Ok((deleted.is_err(), reactivated.is_err()))
            })
            .await
            .unwrap();
        assert!(deleted);
        assert!(reactivated);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_audit_roundtrips() {
        let (db, _dir) = setup_db().await;
        let booking = make_booking(2);
        let cancellation = CancelledBooking {
            id: "c-1".to_string(),
            booking_id: booking.id.clone(),
            student_id: "s-1".into(),
            lesson_id: "l-1".into(),
            cancelled_by: "s-1".into(),
            cancelled_at: ts(3),
            refunded_credits: 1,
            refund_transaction_id: None,
            reason: Some("sick".to_string()),
        };
        let expected = cancellation.clone();
        let booking_id = booking.id.clone();
        db.write(move |conn| {
            insert_booking(conn, &booking).map_err(map_sql_err)?;
            mark_cancelled(conn, &booking.id, &ts(3))?;
            insert_cancellation(conn, &cancellation)
        })
        .await
        .unwrap();

        let fetched = db
            .read(move |conn| get_cancellation(conn, &booking_id))
            .await
            .unwrap();
        assert_eq!(fetched, Some(expected));
        db.close().await.unwrap();
    }
}
