// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User rows mirrored from the identity layer.

use rusqlite::{Connection, OptionalExtension, Row, params};

use tutorbook_core::TutorbookError;
use tutorbook_core::types::format_timestamp;

use crate::database::map_sql_err;
use crate::models::{User, UserId};
use crate::queries::columns;

const USER_COLUMNS: &str = "id, display_name, role, created_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        display_name: row.get(1)?,
        role: columns::tag(row, 2)?,
        created_at: columns::timestamp(row, 3)?,
    })
}

/// Insert a user or refresh its display name and role.
pub fn upsert_user(conn: &Connection, user: &User) -> Result<(), TutorbookError> {
    conn.execute(
        "INSERT INTO users (id, display_name, role, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name, role = excluded.role",
        params![
            user.id.as_str(),
            user.display_name,
            user.role.to_string(),
            format_timestamp(&user.created_at),
        ],
    )
    .map_err(map_sql_err)?;
    Ok(())
}

/// Get a user by ID.
pub fn get_user(conn: &Connection, id: &UserId) -> Result<Option<User>, TutorbookError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id.as_str()],
        map_user,
    )
    .optional()
    .map_err(map_sql_err)
}

/// Whether a user with this ID exists.
pub fn user_exists(conn: &Connection, id: &UserId) -> Result<bool, TutorbookError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        params![id.as_str()],
        |row| row.get(0),
    )
    .map_err(map_sql_err)
}
