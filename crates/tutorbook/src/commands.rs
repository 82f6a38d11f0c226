// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations.
//!
//! Every command prints either a short human line or, with `--json`, the
//! full result as pretty JSON. Failures carry their [`ErrorClass`] so the
//! binary can pick an exit code.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use tutorbook_booking::BookingCoordinator;
use tutorbook_config::TutorbookConfig;
use tutorbook_core::{
    BookingId, BookingStatus, Classify, ErrorClass, Lesson, OpContext, OperationType, Role,
    TutorbookError, User, UserId,
};
use tutorbook_ledger::{CreditLedger, TransactionFilter};
use tutorbook_storage::Database;
use tutorbook_storage::queries::{lessons, users};

/// A failed command: its class and the message safe to print.
#[derive(Debug)]
pub struct CommandError {
    pub class: ErrorClass,
    pub message: String,
}

impl CommandError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Validation,
            message: message.into(),
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self.class {
            ErrorClass::Validation => 2,
            ErrorClass::NotFound => 3,
            ErrorClass::Conflict => 4,
            ErrorClass::Forbidden => 5,
            ErrorClass::Integrity | ErrorClass::Internal => 1,
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl<E: Classify> From<E> for CommandError {
    fn from(err: E) -> Self {
        Self {
            class: err.class(),
            message: err.public_message(),
        }
    }
}

pub type CommandResult = Result<(), CommandError>;

/// Engine components wired over one database handle.
pub struct App {
    pub db: Arc<Database>,
    pub ledger: CreditLedger,
    pub coordinator: BookingCoordinator,
    pub json: bool,
}

impl App {
    pub async fn open(config: &TutorbookConfig, json: bool) -> Result<Self, TutorbookError> {
        let db = Arc::new(Database::open_with(&config.storage).await?);
        let ledger = CreditLedger::new(db.clone(), config.credits.clone())
            .with_operation_timeout(config.booking.operation_timeout());
        let coordinator = BookingCoordinator::new(db.clone(), config.booking.clone());
        Ok(Self {
            db,
            ledger,
            coordinator,
            json,
        })
    }

    /// Checkpoint and close the database once every component is dropped.
    pub async fn shutdown(self) -> Result<(), TutorbookError> {
        let Self {
            db,
            ledger,
            coordinator,
            ..
        } = self;
        drop(ledger);
        drop(coordinator);
        match Arc::try_unwrap(db) {
            Ok(db) => db.close().await,
            Err(_) => Ok(()),
        }
    }

    fn ctx(&self) -> OpContext {
        OpContext::background()
    }

    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T) -> String) {
        if self.json {
            match serde_json::to_string_pretty(value) {
                Ok(out) => println!("{out}"),
                Err(e) => eprintln!("tutorbook: failed to encode output: {e}"),
            }
        } else {
            println!("{}", human(value));
        }
    }

    pub async fn add_user(&self, id: String, name: String, role: Role) -> CommandResult {
        if id.trim().is_empty() {
            return Err(CommandError::validation("user id must not be empty"));
        }
        let user = User {
            id: id.into(),
            display_name: name,
            role,
            created_at: Utc::now(),
        };
        let row = user.clone();
        self.db.write(move |conn| users::upsert_user(conn, &row)).await?;
        self.emit(&user, |u| format!("user {} ({}) saved", u.id, u.role));
        Ok(())
    }

    pub async fn add_lesson(
        &self,
        id: String,
        teacher: String,
        title: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        seats: i64,
    ) -> CommandResult {
        if end <= start {
            return Err(CommandError::validation("lesson must end after it starts"));
        }
        if seats < 1 {
            return Err(CommandError::validation("lesson needs at least one seat"));
        }
        let teacher = UserId::from(teacher);
        let lookup = teacher.clone();
        let known = self
            .db
            .read(move |conn| users::user_exists(conn, &lookup))
            .await?;
        if !known {
            return Err(CommandError {
                class: ErrorClass::NotFound,
                message: format!("user {teacher} not found"),
            });
        }

        let lesson = Lesson {
            id: id.into(),
            teacher_id: teacher,
            title,
            start_time: start,
            end_time: end,
            max_students: seats,
            booked_seats: 0,
        };
        let row = lesson.clone();
        self.db
            .write(move |conn| lessons::insert_lesson(conn, &row))
            .await?;
        self.emit(&lesson, |l| {
            format!("lesson {} scheduled at {} ({} seats)", l.id, l.start_time, l.max_students)
        });
        Ok(())
    }

    pub async fn list_lessons(&self) -> CommandResult {
        let now = Utc::now();
        let upcoming = self
            .db
            .read(move |conn| lessons::list_upcoming(conn, &now))
            .await?;
        self.emit(&upcoming, |list| {
            if list.is_empty() {
                return "no upcoming lessons".to_string();
            }
            list.iter()
                .map(|l| {
                    format!(
                        "{:<12} {}  {}/{} seats  {}",
                        l.id, l.start_time, l.booked_seats, l.max_students, l.title
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        });
        Ok(())
    }

    pub async fn open_account(&self, user: String) -> CommandResult {
        let account = self.ledger.open_account(&self.ctx(), &user.into()).await?;
        self.emit(&account, |a| format!("credit account opened for {}", a.user_id));
        Ok(())
    }

    pub async fn add_credits(
        &self,
        user: String,
        amount: i64,
        reason: String,
        by: String,
    ) -> CommandResult {
        let entry = self
            .ledger
            .add_credits(&self.ctx(), &user.into(), amount, &reason, &by.into())
            .await?;
        self.emit(&entry, |e| {
            format!("added {} credits to {}, balance {}", e.amount, e.user_id, e.balance_after)
        });
        Ok(())
    }

    pub async fn deduct_credits(
        &self,
        user: String,
        amount: i64,
        reason: String,
        by: String,
    ) -> CommandResult {
        let entry = self
            .ledger
            .deduct_credits(&self.ctx(), &user.into(), amount, &reason, &by.into())
            .await?;
        self.emit(&entry, |e| {
            format!(
                "deducted {} credits from {}, balance {}",
                -e.amount, e.user_id, e.balance_after
            )
        });
        Ok(())
    }

    pub async fn balance(&self, user: String) -> CommandResult {
        #[derive(Serialize)]
        struct Balance {
            user: UserId,
            balance: i64,
        }
        let user = UserId::from(user);
        let balance = self.ledger.get_balance(&user).await?;
        self.emit(&Balance { user, balance }, |b| format!("{}: {} credits", b.user, b.balance));
        Ok(())
    }

    pub async fn history(&self, filter: TransactionFilter) -> CommandResult {
        let page = self.ledger.get_transaction_history(filter).await?;
        self.emit(&page, |p| {
            let mut lines: Vec<String> = p
                .entries
                .iter()
                .map(|e| {
                    format!(
                        "#{:<6} {}  {:<10} {:<7} {:>5}  -> {:<5} {}",
                        e.id,
                        e.created_at,
                        e.user_id,
                        e.operation,
                        e.amount,
                        e.balance_after,
                        e.reason
                    )
                })
                .collect();
            lines.push(format!(
                "{} of {} entries{}",
                p.entries.len(),
                p.total,
                if p.has_more() { " (more available)" } else { "" }
            ));
            lines.join("\n")
        });
        Ok(())
    }

    pub async fn book(&self, student: String, lesson: String) -> CommandResult {
        let receipt = self
            .coordinator
            .create_booking(&self.ctx(), &student.into(), &lesson.into())
            .await?;
        self.emit(&receipt, |r| {
            format!(
                "booking {} created for {} in {}, balance {}",
                r.booking.id, r.booking.student_id, r.booking.lesson_id, r.balance
            )
        });
        Ok(())
    }

    pub async fn cancel(&self, booking: String, by: String, reason: Option<String>) -> CommandResult {
        let outcome = self
            .coordinator
            .cancel_booking(
                &self.ctx(),
                &BookingId::from(booking),
                &by.into(),
                reason.as_deref(),
            )
            .await?;
        self.emit(&outcome, |o| {
            format!(
                "booking {} cancelled, refunded {} credits, balance {}",
                o.booking.id, o.refund.amount, o.balance
            )
        });
        Ok(())
    }

    pub async fn bookings(&self, student: String, status: Option<BookingStatus>) -> CommandResult {
        let list = self
            .coordinator
            .list_student_bookings(&student.into(), status)
            .await?;
        self.emit(&list, |list| {
            if list.is_empty() {
                return "no bookings".to_string();
            }
            list.iter()
                .map(|b| {
                    format!(
                        "{}  {:<12} {:<9} paid {}  {}",
                        b.id, b.lesson_id, b.status, b.credits_paid, b.created_at
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        });
        Ok(())
    }
}

/// Build a history filter from CLI arguments.
pub fn history_filter(
    user: Option<String>,
    operation: Option<OperationType>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> TransactionFilter {
    TransactionFilter {
        user: user.map(UserId::from),
        operation,
        start: from,
        end: to,
        limit,
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutorbook_booking::CreateBookingError;

    #[test]
    fn exit_codes_follow_error_class() {
        let err: CommandError = CreateBookingError::LessonFull {
            lesson: "l-1".into(),
            max_students: 5,
        }
        .into();
        assert_eq!(err.exit_code(), 4);

        let err: CommandError = TutorbookError::integrity("two credit rows").into();
        assert_eq!(err.exit_code(), 1);
        assert!(!err.message.contains("credit rows"));

        assert_eq!(CommandError::validation("bad").exit_code(), 2);
    }

    #[test]
    fn history_filter_maps_arguments() {
        let filter = history_filter(Some("s-1".into()), Some(OperationType::Refund), None, None, Some(5), None);
        assert_eq!(filter.user, Some(UserId::from("s-1")));
        assert_eq!(filter.operation, Some(OperationType::Refund));
        assert_eq!(filter.limit, Some(5));
    }

    #[tokio::test]
    async fn app_runs_a_booking_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TutorbookConfig::default();
        config.storage.database_path = dir.path().join("cli.db").to_string_lossy().into_owned();
        let app = App::open(&config, true).await.unwrap();

        app.add_user("t-1".into(), "Teacher".into(), Role::Teacher).await.unwrap();
        app.add_user("s-1".into(), "Student".into(), Role::Student).await.unwrap();
        app.add_user("admin".into(), "Admin".into(), Role::Admin).await.unwrap();
        let start = Utc::now() + chrono::Duration::days(3);
        app.add_lesson(
            "l-1".into(),
            "t-1".into(),
            "Geometry".into(),
            start,
            start + chrono::Duration::hours(1),
            2,
        )
        .await
        .unwrap();

        let err = app.book("s-1".into(), "l-1".into()).await.unwrap_err();
        assert_eq!(err.exit_code(), 4);

        app.add_credits("s-1".into(), 5, "top up".into(), "admin".into())
            .await
            .unwrap();
        app.book("s-1".into(), "l-1".into()).await.unwrap();
        assert_eq!(app.ledger.get_balance(&"s-1".into()).await.unwrap(), 4);

        let err = app
            .add_lesson("l-2".into(), "ghost".into(), "x".into(), start, start, 1)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
