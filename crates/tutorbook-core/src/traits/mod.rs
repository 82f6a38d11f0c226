// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams between the booking engine and its collaborators.
//!
//! Components receive these as explicit handles at construction time; there
//! is no process-wide singleton.

pub mod clock;
pub mod notifier;

pub use clock::{Clock, SystemClock};
pub use notifier::{BookingNotifier, NoopNotifier};
