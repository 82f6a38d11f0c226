// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtered, paged reads of the transaction history.
//!
//! Malformed filters are clamped rather than rejected: the page size is
//! bounded, a negative offset becomes zero, and a reversed date range is
//! swapped.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rusqlite::types::Value;
use serde::Serialize;

use tutorbook_config::model::CreditsConfig;
use tutorbook_core::types::format_timestamp;
use tutorbook_core::{CreditTransaction, OperationType, TutorbookError, UserId};
use tutorbook_storage::map_sql_err;

use crate::postings::{TRANSACTION_COLUMNS, map_transaction};

/// History query. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub user: Option<UserId>,
    pub operation: Option<OperationType>,
    /// Inclusive lower bound on `created_at`.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TransactionFilter {
    /// Filter for one user's history.
    pub fn for_user(user: impl Into<UserId>) -> Self {
        Self {
            user: Some(user.into()),
            ..Self::default()
        }
    }

    /// Clamp paging and order the date range.
    pub fn normalized(mut self, config: &CreditsConfig) -> Self {
        let max = config.history_max_limit.max(1);
        let limit = self
            .limit
            .unwrap_or(config.history_default_limit)
            .clamp(1, max);
        self.limit = Some(limit);
        self.offset = Some(self.offset.unwrap_or(0).max(0));
        if let (Some(start), Some(end)) = (self.start, self.end)
            && start > end
        {
            self.start = Some(end);
            self.end = Some(start);
        }
        self
    }
}

/// One page of history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionPage {
    pub entries: Vec<CreditTransaction>,
    /// Number of entries matching the filter, ignoring paging.
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl TransactionPage {
    /// Whether entries exist beyond this page.
    pub fn has_more(&self) -> bool {
        self.offset + (self.entries.len() as i64) < self.total
    }
}

/// Run a normalized filter. Call [`TransactionFilter::normalized`] first.
pub fn query_page(
    conn: &Connection,
    filter: &TransactionFilter,
) -> Result<TransactionPage, TutorbookError> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(user) = &filter.user {
        clauses.push("user_id = ?");
        values.push(Value::Text(user.as_str().to_string()));
    }
    if let Some(operation) = filter.operation {
        clauses.push("operation = ?");
        values.push(Value::Text(operation.to_string()));
    }
    if let Some(start) = &filter.start {
        clauses.push("created_at >= ?");
        values.push(Value::Text(format_timestamp(start)));
    }
    if let Some(end) = &filter.end {
        clauses.push("created_at <= ?");
        values.push(Value::Text(format_timestamp(end)));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM credit_transactions{where_sql}"),
            rusqlite::params_from_iter(values.iter()),
            |row| row.get(0),
        )
        .map_err(map_sql_err)?;

    let limit = filter.limit.unwrap_or(1);
    let offset = filter.offset.unwrap_or(0);
    let mut page_values = values;
    page_values.push(Value::Integer(limit));
    page_values.push(Value::Integer(offset));

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM credit_transactions{where_sql}
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .map_err(map_sql_err)?;
    let entries = stmt
        .query_map(rusqlite::params_from_iter(page_values.iter()), map_transaction)
        .map_err(map_sql_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sql_err)?;

    Ok(TransactionPage {
        entries,
        total,
        limit,
        offset,
    })
}
