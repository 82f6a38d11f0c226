// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tutorbook - credit ledger and seat-booking engine.
//!
//! This is the operator CLI: it exposes every ledger and booking operation
//! over the configured SQLite database.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod doctor;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use tutorbook_config::TutorbookConfig;
use tutorbook_core::{BookingStatus, OperationType, Role};

use crate::commands::{App, CommandError, history_filter};

/// Tutorbook - credit ledger and seat-booking engine.
#[derive(Parser, Debug)]
#[command(name = "tutorbook", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the XDG lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database and apply pending migrations.
    Migrate,
    /// Register platform users.
    #[command(subcommand)]
    User(UserCommand),
    /// Schedule and list lessons.
    #[command(subcommand)]
    Lesson(LessonCommand),
    /// Manual credit operations.
    #[command(subcommand)]
    Credits(CreditsCommand),
    /// Show a user's balance.
    Balance { user: String },
    /// Show transaction history, newest first.
    History {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        operation: Option<OperationType>,
        /// Inclusive lower bound (RFC 3339).
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Inclusive upper bound (RFC 3339).
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },
    /// Book a lesson seat for a student.
    Book { student: String, lesson: String },
    /// Cancel a booking and refund it.
    Cancel {
        booking: String,
        /// User requesting the cancellation.
        #[arg(long)]
        by: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// List a student's bookings.
    Bookings {
        student: String,
        #[arg(long)]
        status: Option<BookingStatus>,
    },
    /// Check storage health, ledger consistency, and seat counters.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Create or update a user.
    Add {
        id: String,
        name: String,
        #[arg(long, default_value = "student")]
        role: Role,
    },
}

#[derive(Subcommand, Debug)]
enum LessonCommand {
    /// Schedule a lesson.
    Add {
        id: String,
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        title: String,
        /// Start time (RFC 3339).
        #[arg(long)]
        start: DateTime<Utc>,
        /// End time (RFC 3339).
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(long)]
        seats: i64,
    },
    /// List upcoming lessons.
    List,
}

#[derive(Subcommand, Debug)]
enum CreditsCommand {
    /// Add credits to a user.
    Add {
        user: String,
        amount: i64,
        #[arg(long)]
        reason: String,
        /// Admin performing the operation.
        #[arg(long)]
        by: String,
    },
    /// Deduct credits from a user.
    Deduct {
        user: String,
        amount: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        by: String,
    },
    /// Initialize a user's balance row at zero.
    Open { user: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => tutorbook_config::load_and_validate_path(path),
        None => tutorbook_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            tutorbook_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level);

    if let Err(err) = run(cli, &config).await {
        eprintln!("tutorbook: {err}");
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli, config: &TutorbookConfig) -> Result<(), CommandError> {
    let app = App::open(config, cli.json).await?;

    let result = match cli.command {
        Commands::Migrate => {
            println!("database ready at {}", app.db.path());
            Ok(())
        }
        Commands::User(UserCommand::Add { id, name, role }) => app.add_user(id, name, role).await,
        Commands::Lesson(LessonCommand::Add {
            id,
            teacher,
            title,
            start,
            end,
            seats,
        }) => app.add_lesson(id, teacher, title, start, end, seats).await,
        Commands::Lesson(LessonCommand::List) => app.list_lessons().await,
        Commands::Credits(CreditsCommand::Add {
            user,
            amount,
            reason,
            by,
        }) => app.add_credits(user, amount, reason, by).await,
        Commands::Credits(CreditsCommand::Deduct {
            user,
            amount,
            reason,
            by,
        }) => app.deduct_credits(user, amount, reason, by).await,
        Commands::Credits(CreditsCommand::Open { user }) => app.open_account(user).await,
        Commands::Balance { user } => app.balance(user).await,
        Commands::History {
            user,
            operation,
            from,
            to,
            limit,
            offset,
        } => {
            app.history(history_filter(user, operation, from, to, limit, offset))
                .await
        }
        Commands::Book { student, lesson } => app.book(student, lesson).await,
        Commands::Cancel {
            booking,
            by,
            reason,
        } => app.cancel(booking, by, reason).await,
        Commands::Bookings { student, status } => app.bookings(student, status).await,
        Commands::Doctor { plain } => doctor::run_doctor(&app, plain).await,
    };

    app.shutdown().await?;
    result
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tutorbook={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
