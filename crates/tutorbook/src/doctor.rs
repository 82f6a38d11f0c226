// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tutorbook doctor` command implementation.
//!
//! Runs consistency checks against a live database: storage health, every
//! cached balance against its ledger, and every upcoming lesson's seat
//! counter against its active bookings. Also reports the process heap.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

use tutorbook_core::HealthStatus;
use tutorbook_storage::queries::lessons;

use crate::commands::{App, CommandError};

/// Status of a diagnostic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip)]
    pub duration: Duration,
}

/// Run the `tutorbook doctor` command.
///
/// Fails (exit code 1) when any check fails.
pub async fn run_doctor(app: &App, plain: bool) -> Result<(), CommandError> {
    let results = vec![
        check_database(app).await,
        check_ledger(app).await,
        check_seats(app).await,
        check_memory(),
    ];

    let failed = results.iter().any(|r| r.status == CheckStatus::Fail);
    if app.json {
        match serde_json::to_string_pretty(&results) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("tutorbook: failed to encode output: {e}"),
        }
    } else {
        print_results(&results, !plain && std::io::stdout().is_terminal());
    }

    if failed {
        return Err(CommandError {
            class: tutorbook_core::ErrorClass::Integrity,
            message: "doctor found failing checks".to_string(),
        });
    }
    Ok(())
}

fn print_results(results: &[CheckResult], use_color: bool) {
    println!();
    println!("  tutorbook doctor");
    println!("  {}", "-".repeat(50));

    let mut issues = 0;
    for result in results {
        let duration_ms = result.duration.as_millis();
        let line = match (result.status, use_color) {
            (CheckStatus::Pass, true) => {
                use colored::Colorize;
                format!("    {} {:<12} {} ({duration_ms}ms)", "✓".green(), result.name, result.message)
            }
            (CheckStatus::Warn, true) => {
                use colored::Colorize;
                format!(
                    "    {} {:<12} {} ({duration_ms}ms)",
                    "!".yellow(),
                    result.name,
                    result.message.yellow()
                )
            }
            (CheckStatus::Fail, true) => {
                use colored::Colorize;
                format!(
                    "    {} {:<12} {} ({duration_ms}ms)",
                    "✗".red(),
                    result.name,
                    result.message.red()
                )
            }
            (status, false) => {
                let tag = match status {
                    CheckStatus::Pass => "[OK]  ",
                    CheckStatus::Warn => "[WARN]",
                    CheckStatus::Fail => "[FAIL]",
                };
                format!("    {tag} {:<12} {} ({duration_ms}ms)", result.name, result.message)
            }
        };
        if result.status != CheckStatus::Pass {
            issues += 1;
        }
        println!("{line}");
    }

    println!();
    if issues > 0 {
        let word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();
}

async fn check_database(app: &App) -> CheckResult {
    let start = Instant::now();
    let (status, message) = match app.db.health_check().await {
        HealthStatus::Healthy => (CheckStatus::Pass, format!("{} reachable", app.db.path())),
        HealthStatus::Degraded(reason) => (CheckStatus::Warn, reason),
        HealthStatus::Unhealthy(reason) => (CheckStatus::Fail, reason),
    };
    CheckResult {
        name: "database".to_string(),
        status,
        message,
        duration: start.elapsed(),
    }
}

async fn check_ledger(app: &App) -> CheckResult {
    let start = Instant::now();
    let (status, message) = match app.ledger.reconcile_all().await {
        Ok(reports) => {
            let drifted: Vec<_> = reports
                .iter()
                .filter(|r| !r.is_consistent())
                .map(|r| r.user.to_string())
                .collect();
            if drifted.is_empty() {
                (
                    CheckStatus::Pass,
                    format!("{} balances match their ledger", reports.len()),
                )
            } else {
                (
                    CheckStatus::Fail,
                    format!("balance drift for: {}", drifted.join(", ")),
                )
            }
        }
        Err(e) => (CheckStatus::Fail, e.to_string()),
    };
    CheckResult {
        name: "ledger".to_string(),
        status,
        message,
        duration: start.elapsed(),
    }
}

async fn check_seats(app: &App) -> CheckResult {
    let start = Instant::now();
    let now = Utc::now();
    let upcoming = app
        .db
        .read(move |conn| lessons::list_upcoming(conn, &now))
        .await;

    let (status, message) = match upcoming {
        Ok(list) => {
            let mut drifted = Vec::new();
            let mut failure = None;
            for lesson in &list {
                match app.coordinator.audit_lesson(&lesson.id).await {
                    Ok(Some(audit)) if !audit.is_consistent() => drifted.push(lesson.id.to_string()),
                    Ok(_) => {}
                    Err(e) => {
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }
            match failure {
                Some(e) => (CheckStatus::Fail, e),
                None if drifted.is_empty() => (
                    CheckStatus::Pass,
                    format!("{} upcoming lessons consistent", list.len()),
                ),
                None => (
                    CheckStatus::Fail,
                    format!("seat counter drift for: {}", drifted.join(", ")),
                ),
            }
        }
        Err(e) => (CheckStatus::Fail, e.to_string()),
    };
    CheckResult {
        name: "seats".to_string(),
        status,
        message,
        duration: start.elapsed(),
    }
}

/// Heap and resident size as reported by jemalloc.
fn check_memory() -> CheckResult {
    let start = Instant::now();

    #[cfg(not(target_env = "msvc"))]
    let (status, message) = {
        let _ = tikv_jemalloc_ctl::epoch::advance();
        let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
        let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
        let mib = |bytes: usize| bytes as f64 / (1024.0 * 1024.0);
        (
            CheckStatus::Pass,
            format!("heap {:.1} MiB, resident {:.1} MiB", mib(allocated), mib(resident)),
        )
    };

    #[cfg(target_env = "msvc")]
    let (status, message) = (CheckStatus::Warn, "jemalloc not available on MSVC".to_string());

    CheckResult {
        name: "memory".to_string(),
        status,
        message,
        duration: start.elapsed(),
    }
}
