// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lesson slot rows.
//!
//! The `booked_seats` counter is only ever changed by the booking engine's
//! capacity guard inside a unit of work; this module creates and reads rows.

use rusqlite::{Connection, OptionalExtension, Row, params};

use tutorbook_core::TutorbookError;
use tutorbook_core::types::format_timestamp;

use crate::database::map_sql_err;
use crate::models::{Lesson, LessonId, UserId};
use crate::queries::columns;

/// Column list matching [`map_lesson`].
pub const LESSON_COLUMNS: &str =
    "id, teacher_id, title, start_time, end_time, max_students, booked_seats";

/// Map a row selected with [`LESSON_COLUMNS`].
pub fn map_lesson(row: &Row<'_>) -> rusqlite::Result<Lesson> {
    Ok(Lesson {
        id: LessonId(row.get(0)?),
        teacher_id: UserId(row.get(1)?),
        title: row.get(2)?,
        start_time: columns::timestamp(row, 3)?,
        end_time: columns::timestamp(row, 4)?,
        max_students: row.get(5)?,
        booked_seats: row.get(6)?,
    })
}

/// Create a lesson slot. The seat counter always starts at zero.
pub fn insert_lesson(conn: &Connection, lesson: &Lesson) -> Result<(), TutorbookError> {
    conn.execute(
        "INSERT INTO lessons (id, teacher_id, title, start_time, end_time, max_students, booked_seats)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        params![
            lesson.id.as_str(),
            lesson.teacher_id.as_str(),
            lesson.title,
            format_timestamp(&lesson.start_time),
            format_timestamp(&lesson.end_time),
            lesson.max_students,
        ],
    )
    .map_err(map_sql_err)?;
    Ok(())
}

/// Get a lesson by ID.
pub fn get_lesson(conn: &Connection, id: &LessonId) -> Result<Option<Lesson>, TutorbookError> {
    conn.query_row(
        &format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = ?1"),
        params![id.as_str()],
        map_lesson,
    )
    .optional()
    .map_err(map_sql_err)
}

/// List lessons starting at or after `from`, soonest first.
pub fn list_upcoming(
    conn: &Connection,
    from: &chrono::DateTime<chrono::Utc>,
) -> Result<Vec<Lesson>, TutorbookError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {LESSON_COLUMNS} FROM lessons WHERE start_time >= ?1 ORDER BY start_time ASC, id ASC"
        ))
        .map_err(map_sql_err)?;
    let rows = stmt
        .query_map(params![format_timestamp(from)], map_lesson)
        .map_err(map_sql_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
}
