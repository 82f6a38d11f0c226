// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-writer documentation and enforcement.
//!
//! All writes in tutorbook-storage are serialized through `tokio-rusqlite`'s
//! single background thread. The `Database` struct IS the single writer.
//! Components accept `&Database` and go through [`Database::unit_of_work`]
//! or [`Database::write`].
//!
//! **Do NOT create additional Connection instances for writes.**
//!
//! Within one process the background thread runs one closure at a time, so
//! units of work never interleave. Across processes every unit of work begins
//! with `BEGIN IMMEDIATE`, which takes SQLite's database-wide write lock
//! before the first read; the other process waits up to `busy_timeout`.
//! Because the lock covers the whole file there is no lock-ordering deadlock
//! between a booking and a concurrent credit adjustment. Statements still
//! read the credit row before the lesson row.
//!
//! [`Database::unit_of_work`]: crate::Database::unit_of_work
//! [`Database::write`]: crate::Database::write

/// Transaction behaviour used by every unit of work.
pub const UNIT_OF_WORK_BEHAVIOR: rusqlite::TransactionBehavior =
    rusqlite::TransactionBehavior::Immediate;
