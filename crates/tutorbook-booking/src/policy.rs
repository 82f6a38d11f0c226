// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cancellation window rule.
//!
//! A booking may be cancelled, with a full refund, while at least the window
//! remains before the lesson starts. Exactly the window is still allowed.

use chrono::{DateTime, TimeDelta, Utc};

/// Default cancellation window in hours.
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Outcome of evaluating the policy for one booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationDecision {
    pub allowed: bool,
    /// Whether the full price is returned. Always equals `allowed`.
    pub refund_due: bool,
    /// Negative once the lesson has started.
    pub time_until_start: TimeDelta,
}

/// Pure cancellation rule; holds only the window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationPolicy {
    window: TimeDelta,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self::from_hours(DEFAULT_WINDOW_HOURS)
    }
}

impl CancellationPolicy {
    pub fn new(window: TimeDelta) -> Self {
        Self { window }
    }

    /// Window of `hours`. Out-of-range values saturate, closing the window for good.
    pub fn from_hours(hours: i64) -> Self {
        let window = TimeDelta::try_hours(hours).unwrap_or(if hours < 0 {
            TimeDelta::MIN
        } else {
            TimeDelta::MAX
        });
        Self::new(window)
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Evaluate a cancellation at `now` for a lesson starting at `lesson_start`.
    pub fn evaluate(&self, lesson_start: DateTime<Utc>, now: DateTime<Utc>) -> CancellationDecision {
        let time_until_start = lesson_start - now;
        let allowed = time_until_start >= self.window;
        CancellationDecision {
            allowed,
            refund_due: allowed,
            time_until_start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn twenty_five_hours_ahead_is_refundable() {
        let decision = CancellationPolicy::default().evaluate(now() + TimeDelta::hours(25), now());
        assert!(decision.allowed);
        assert!(decision.refund_due);
        assert_eq!(decision.time_until_start, TimeDelta::hours(25));
    }

    #[test]
    fn twenty_three_hours_ahead_is_refused() {
        let decision = CancellationPolicy::default().evaluate(now() + TimeDelta::hours(23), now());
        assert!(!decision.allowed);
        assert!(!decision.refund_due);
    }

    #[test]
    fn exactly_the_window_is_allowed() {
        let policy = CancellationPolicy::default();
        assert!(policy.evaluate(now() + TimeDelta::hours(24), now()).allowed);
        assert!(
            !policy
                .evaluate(now() + TimeDelta::hours(24) - TimeDelta::milliseconds(1), now())
                .allowed
        );
    }

    #[test]
    fn started_lessons_report_negative_lead_time() {
        let decision = CancellationPolicy::default().evaluate(now() - TimeDelta::hours(1), now());
        assert!(!decision.allowed);
        assert!(decision.time_until_start < TimeDelta::zero());
    }

    #[test]
    fn oversized_window_saturates_instead_of_panicking() {
        let policy = CancellationPolicy::from_hours(9_000_000_000_000_000);
        assert_eq!(policy.window(), TimeDelta::MAX);
        assert!(!policy.evaluate(now() + TimeDelta::days(365 * 50), now()).allowed);

        assert_eq!(CancellationPolicy::from_hours(i64::MIN).window(), TimeDelta::MIN);
    }

    proptest! {
        #[test]
        fn allowed_iff_lead_time_covers_window(
            lead_minutes in -10_000i64..10_000,
            window_hours in 0i64..72,
        ) {
            let policy = CancellationPolicy::from_hours(window_hours);
            let decision = policy.evaluate(now() + TimeDelta::minutes(lead_minutes), now());
            prop_assert_eq!(decision.allowed, lead_minutes >= window_hours * 60);
            prop_assert_eq!(decision.refund_due, decision.allowed);
        }
    }
}
