// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credit ledger for the Tutorbook booking engine.
//!
//! Every user has at most one balance row and an append-only list of
//! transactions; the balance always equals the sum of the user's transaction
//! amounts. [`CreditLedger`] is the public entry point, [`postings`] holds
//! the in-transaction primitives the booking engine reuses inside its own
//! units of work.

pub mod error;
pub mod history;
pub mod ledger;
pub mod postings;

pub use error::{AddCreditsError, CreditAccountError, DeductCreditsError, PostingError};
pub use history::{TransactionFilter, TransactionPage};
pub use ledger::{CreditLedger, LedgerReport};
pub use postings::CreditAccount;
