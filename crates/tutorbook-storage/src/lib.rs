// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Tutorbook booking engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, an `IMMEDIATE` unit-of-work helper
//! bound to an [`OpContext`](tutorbook_core::OpContext), and typed row
//! queries for users, lessons, bookings, and cancellation audits.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod writer;

pub use database::{Database, is_unique_violation, map_sql_err, map_tr_err};
pub use models::*;
