// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the ledger and the booking coordinator over a temp
//! SQLite database, sharing one [`ManualClock`] and one
//! [`RecordingNotifier`]. Seed helpers register users and lessons the way
//! the surrounding platform would.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use tutorbook_booking::BookingCoordinator;
use tutorbook_config::model::{BookingConfig, CreditsConfig, StorageConfig, TutorbookConfig};
use tutorbook_core::{
    Clock, CreditTransaction, Lesson, OpContext, Role, TutorbookError, User, UserId,
};
use tutorbook_ledger::CreditLedger;
use tutorbook_storage::Database;
use tutorbook_storage::queries::{lessons, users};

use crate::clock::ManualClock;
use crate::notifier::RecordingNotifier;

/// Id of the admin every harness registers for funding accounts.
pub const HARNESS_ADMIN: &str = "harness-admin";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    credits: CreditsConfig,
    booking: BookingConfig,
    start: Option<DateTime<Utc>>,
    failing_notifier: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            credits: CreditsConfig::default(),
            booking: BookingConfig::default(),
            start: None,
            failing_notifier: false,
        }
    }

    pub fn with_lesson_cost(mut self, cost: i64) -> Self {
        self.booking.lesson_cost = cost;
        self
    }

    pub fn with_max_balance(mut self, max: i64) -> Self {
        self.credits.max_balance = max;
        self
    }

    pub fn with_cancellation_window_hours(mut self, hours: i64) -> Self {
        self.booking.cancellation_window_hours = hours;
        self
    }

    /// Freeze the harness clock at `start` instead of the current time.
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Use a notifier that fails every call.
    pub fn with_failing_notifier(mut self) -> Self {
        self.failing_notifier = true;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, TutorbookError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| TutorbookError::Storage {
            source: Box::new(e),
        })?;
        let storage = StorageConfig {
            database_path: temp_dir.path().join("test.db").to_string_lossy().into_owned(),
            ..StorageConfig::default()
        };
        let db = Arc::new(Database::open_with(&storage).await?);

        let clock = Arc::new(ManualClock::new(self.start.unwrap_or_else(Utc::now)));
        let notifier = Arc::new(if self.failing_notifier {
            RecordingNotifier::failing()
        } else {
            RecordingNotifier::new()
        });

        let ledger = Arc::new(
            CreditLedger::new(db.clone(), self.credits.clone())
                .with_clock(clock.clone())
                .with_operation_timeout(self.booking.operation_timeout()),
        );
        let coordinator = Arc::new(
            BookingCoordinator::new(db.clone(), self.booking.clone())
                .with_clock(clock.clone())
                .with_notifier(notifier.clone()),
        );

        let config = TutorbookConfig {
            storage,
            credits: self.credits,
            booking: self.booking,
            ..TutorbookConfig::default()
        };

        let harness = TestHarness {
            db,
            ledger,
            coordinator,
            clock,
            notifier,
            config,
            _temp_dir: temp_dir,
        };
        harness.add_user(HARNESS_ADMIN, Role::Admin).await?;
        Ok(harness)
    }
}

/// A complete booking engine over a throwaway database.
pub struct TestHarness {
    pub db: Arc<Database>,
    pub ledger: Arc<CreditLedger>,
    pub coordinator: Arc<BookingCoordinator>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub config: TutorbookConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default settings.
    pub async fn new() -> Result<Self, TutorbookError> {
        Self::builder().build().await
    }

    pub fn ctx(&self) -> OpContext {
        OpContext::background()
    }

    pub fn admin(&self) -> UserId {
        UserId::from(HARNESS_ADMIN)
    }

    /// Open a second, independent handle on the same database file, as a
    /// second process would.
    pub async fn open_second_handle(&self) -> Result<Database, TutorbookError> {
        Database::open_with(&self.config.storage).await
    }

    pub async fn add_user(&self, id: &str, role: Role) -> Result<User, TutorbookError> {
        let user = User {
            id: id.into(),
            display_name: id.to_string(),
            role,
            created_at: self.clock.now(),
        };
        let row = user.clone();
        self.db.write(move |conn| users::upsert_user(conn, &row)).await?;
        Ok(user)
    }

    pub async fn add_student(&self, id: &str) -> Result<User, TutorbookError> {
        self.add_user(id, Role::Student).await
    }

    pub async fn add_teacher(&self, id: &str) -> Result<User, TutorbookError> {
        self.add_user(id, Role::Teacher).await
    }

    pub async fn add_admin(&self, id: &str) -> Result<User, TutorbookError> {
        self.add_user(id, Role::Admin).await
    }

    /// Register a one-hour lesson starting `starts_in` from the harness clock.
    pub async fn add_lesson(
        &self,
        id: &str,
        teacher: &str,
        starts_in: TimeDelta,
        max_students: i64,
    ) -> Result<Lesson, TutorbookError> {
        let start_time = self.clock.now() + starts_in;
        let lesson = Lesson {
            id: id.into(),
            teacher_id: teacher.into(),
            title: format!("Lesson {id}"),
            start_time,
            end_time: start_time + TimeDelta::hours(1),
            max_students,
            booked_seats: 0,
        };
        let row = lesson.clone();
        self.db.write(move |conn| lessons::insert_lesson(conn, &row)).await?;
        Ok(lesson)
    }

    /// Add `amount` credits to `user` as the harness admin.
    pub async fn fund(&self, user: &str, amount: i64) -> Result<CreditTransaction, TutorbookError> {
        self.ledger
            .add_credits(&self.ctx(), &user.into(), amount, "test funding", &self.admin())
            .await
            .map_err(|e| TutorbookError::Internal(e.to_string()))
    }

    pub async fn balance(&self, user: &str) -> Result<i64, TutorbookError> {
        self.ledger.get_balance(&user.into()).await
    }
}
