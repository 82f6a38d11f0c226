// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request operation context: deadline plus cancellation.
//!
//! A unit of work checks its context before it begins and again right before
//! commit. If the caller cancelled or the deadline passed, the transaction is
//! rolled back and nothing becomes visible to other callers.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::TutorbookError;

/// Deadline and cancellation signal carried by one request.
#[derive(Debug, Clone)]
pub struct OpContext {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}

impl OpContext {
    /// A context that never expires and is only cancelled explicitly.
    pub fn background() -> Self {
        Self {
            timeout: None,
            deadline: None,
            token: CancellationToken::new(),
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().timeout(timeout)
    }

    /// A context cancelled whenever `parent` is cancelled.
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            timeout: None,
            deadline: None,
            token: parent.child_token(),
        }
    }

    /// Set (or tighten) the deadline to `timeout` from now.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        if self.deadline.is_none_or(|existing| deadline < existing) {
            self.deadline = Some(deadline);
            self.timeout = Some(timeout);
        }
        self
    }

    /// Derive a context sharing this deadline whose token is a child of ours.
    ///
    /// Cancelling the child does not cancel the parent.
    pub fn child(&self) -> Self {
        Self {
            timeout: self.timeout,
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    /// The cancellation token observed by this context.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel this context (and every child).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns an error if the context was cancelled or its deadline passed.
    pub fn ensure_active(&self) -> Result<(), TutorbookError> {
        if self.token.is_cancelled() {
            return Err(TutorbookError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(TutorbookError::Timeout {
                duration: self.timeout.unwrap_or_default(),
            });
        }
        Ok(())
    }
}
