// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed row queries.
//!
//! Every function takes a plain `&rusqlite::Connection`, so the same query runs
//! on the read connection, on the writer, or inside a unit of work (a
//! `rusqlite::Transaction` derefs to its connection).

pub mod bookings;
pub mod columns;
pub mod lessons;
pub mod users;
