// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tutorbook integration tests.
//!
//! Provides deterministic collaborators and a harness wiring the ledger and
//! the booking coordinator over a temp SQLite database.
//!
//! # Components
//!
//! - [`TestHarness`] - Temp database, ledger, coordinator, and seed helpers
//! - [`ManualClock`] - Clock that only moves when told to
//! - [`RecordingNotifier`] - Notifier capturing every post-commit event

pub mod clock;
pub mod harness;
pub mod notifier;

pub use clock::ManualClock;
pub use harness::{TestHarness, TestHarnessBuilder};
pub use notifier::{NotifierEvent, RecordingNotifier};
