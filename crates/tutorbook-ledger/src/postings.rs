// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-transaction ledger primitives.
//!
//! These functions assume the caller already holds the write lock (they run
//! inside [`Database::unit_of_work`](tutorbook_storage::Database::unit_of_work)).
//! The booking engine calls them from its own units of work so a seat change
//! and its credit movement commit together.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use tutorbook_core::types::format_timestamp;
use tutorbook_core::{BookingId, CreditTransaction, OperationType, TutorbookError, UserId};
use tutorbook_storage::queries::columns;
use tutorbook_storage::{is_unique_violation, map_sql_err};

use crate::error::PostingError;

/// Column list matching [`map_transaction`].
pub const TRANSACTION_COLUMNS: &str =
    "id, user_id, amount, operation, reason, performed_by, booking_id, balance_after, created_at";

/// A user's cached balance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditAccount {
    pub user_id: UserId,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One ledger entry to append.
#[derive(Debug, Clone)]
pub struct Posting<'a> {
    pub user: &'a UserId,
    pub operation: OperationType,
    /// Absolute amount; the sign comes from `operation`.
    pub amount: i64,
    pub reason: &'a str,
    pub performed_by: &'a UserId,
    pub booking: Option<&'a BookingId>,
    pub at: DateTime<Utc>,
}

/// Map a row selected with [`TRANSACTION_COLUMNS`].
pub fn map_transaction(row: &Row<'_>) -> rusqlite::Result<CreditTransaction> {
    Ok(CreditTransaction {
        id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        amount: row.get(2)?,
        operation: columns::tag(row, 3)?,
        reason: row.get(4)?,
        performed_by: UserId(row.get(5)?),
        booking_id: row.get::<_, Option<String>>(6)?.map(BookingId),
        balance_after: row.get(7)?,
        created_at: columns::timestamp(row, 8)?,
    })
}

/// Read a user's balance row, if it exists.
pub fn read_account(
    conn: &Connection,
    user: &UserId,
) -> Result<Option<CreditAccount>, TutorbookError> {
    conn.query_row(
        "SELECT user_id, balance, created_at, updated_at FROM credits WHERE user_id = ?1",
        params![user.as_str()],
        |row| {
            Ok(CreditAccount {
                user_id: UserId(row.get(0)?),
                balance: row.get(1)?,
                created_at: columns::timestamp(row, 2)?,
                updated_at: columns::timestamp(row, 3)?,
            })
        },
    )
    .optional()
    .map_err(map_sql_err)
}

/// Current balance, or zero when the user has no balance row yet.
pub fn balance_or_zero(conn: &Connection, user: &UserId) -> Result<i64, TutorbookError> {
    Ok(read_account(conn, user)?.map_or(0, |account| account.balance))
}

/// Create the balance row with a zero balance.
///
/// A second initialization is reported as [`PostingError::DuplicateAccount`].
pub fn open_account(
    conn: &Connection,
    user: &UserId,
    at: &DateTime<Utc>,
) -> Result<CreditAccount, PostingError> {
    let now = format_timestamp(at);
    match conn.execute(
        "INSERT INTO credits (user_id, balance, created_at, updated_at) VALUES (?1, 0, ?2, ?2)",
        params![user.as_str(), now],
    ) {
        Ok(_) => Ok(CreditAccount {
            user_id: user.clone(),
            balance: 0,
            created_at: *at,
            updated_at: *at,
        }),
        Err(e) if is_unique_violation(&e) => {
            Err(PostingError::DuplicateAccount { user: user.clone() })
        }
        Err(e) => Err(map_sql_err(e).into()),
    }
}

/// Read the balance row, creating it on first use.
pub fn ensure_account(
    conn: &Connection,
    user: &UserId,
    at: &DateTime<Utc>,
) -> Result<CreditAccount, PostingError> {
    match read_account(conn, user)? {
        Some(account) => Ok(account),
        None => open_account(conn, user, at),
    }
}

/// Apply `posting` to the balance row and append the matching entry.
///
/// The balance row must exist. The resulting balance is recorded on the entry
/// as `balance_after`. A negative result is an integrity violation; callers
/// check sufficiency before posting.
pub fn post(conn: &Connection, posting: &Posting<'_>) -> Result<CreditTransaction, PostingError> {
    if posting.amount <= 0 {
        return Err(TutorbookError::Internal(format!(
            "posting amount must be positive, got {}",
            posting.amount
        ))
        .into());
    }
    let delta = posting.operation.sign() * posting.amount;
    let at = format_timestamp(&posting.at);

    let current = read_account(conn, posting.user)?.ok_or_else(|| {
        TutorbookError::integrity(format!(
            "posting to user {} without a credit account",
            posting.user
        ))
    })?;
    let balance_after = current.balance + delta;
    if balance_after < 0 {
        return Err(TutorbookError::integrity(format!(
            "posting {delta} would make the balance of user {} negative ({})",
            posting.user, current.balance
        ))
        .into());
    }

    conn.execute(
        "UPDATE credits SET balance = ?2, updated_at = ?3 WHERE user_id = ?1",
        params![posting.user.as_str(), balance_after, at],
    )
    .map_err(map_sql_err)?;

    conn.execute(
        "INSERT INTO credit_transactions
             (user_id, amount, operation, reason, performed_by, booking_id, balance_after, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            posting.user.as_str(),
            delta,
            posting.operation.to_string(),
            posting.reason,
            posting.performed_by.as_str(),
            posting.booking.map(BookingId::as_str),
            balance_after,
            at,
        ],
    )
    .map_err(map_sql_err)?;

    Ok(CreditTransaction {
        id: conn.last_insert_rowid(),
        user_id: posting.user.clone(),
        amount: delta,
        operation: posting.operation,
        reason: posting.reason.to_string(),
        performed_by: posting.performed_by.clone(),
        booking_id: posting.booking.cloned(),
        balance_after,
        created_at: posting.at,
    })
}

/// Sum of a user's entry amounts and the number of entries.
pub fn ledger_totals(conn: &Connection, user: &UserId) -> Result<(i64, i64), TutorbookError> {
    conn.query_row(
        "SELECT COALESCE(SUM(amount), 0), COUNT(*) FROM credit_transactions WHERE user_id = ?1",
        params![user.as_str()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .map_err(map_sql_err)
}

/// The entry of `operation` kind linked to `booking`, if any.
pub fn entry_for_booking(
    conn: &Connection,
    booking: &BookingId,
    operation: OperationType,
) -> Result<Option<CreditTransaction>, TutorbookError> {
    conn.query_row(
        &format!(
            "SELECT {TRANSACTION_COLUMNS} FROM credit_transactions
             WHERE booking_id = ?1 AND operation = ?2
             ORDER BY id ASC LIMIT 1"
        ),
        params![booking.as_str(), operation.to_string()],
        map_transaction,
    )
    .optional()
    .map_err(map_sql_err)
}
