// SPDX-FileCopyrightText: 2026 Tutorbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credit ledger backed by SQLite.
//!
//! Every mutating call runs as one unit of work: read the balance row under
//! the write lock, validate, update the cached balance, append the entry.
//! Two concurrent deductions against the same user can never both observe the
//! same stale balance. Reads go through the read connection and never create
//! state.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use tutorbook_config::model::CreditsConfig;
use tutorbook_core::{
    Clock, CreditTransaction, OpContext, OperationType, SystemClock, TutorbookError, UserId,
    log_failure,
};
use tutorbook_storage::Database;
use tutorbook_storage::queries::users;

use crate::error::{AddCreditsError, CreditAccountError, DeductCreditsError, validate_input};
use crate::history::{self, TransactionFilter, TransactionPage};
use crate::postings::{self, CreditAccount, Posting};

/// Comparison of a user's cached balance with the ledger sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerReport {
    pub user: UserId,
    /// Balance row value, `None` when no row exists.
    pub cached_balance: Option<i64>,
    /// Sum of the user's entry amounts.
    pub ledger_sum: i64,
    pub entries: i64,
}

impl LedgerReport {
    /// Whether the cached balance matches the ledger.
    pub fn is_consistent(&self) -> bool {
        self.cached_balance.unwrap_or(0) == self.ledger_sum
            && (self.cached_balance.is_some() || self.entries == 0)
    }
}

/// Per-user credit balances and their append-only history.
pub struct CreditLedger {
    db: Arc<Database>,
    config: CreditsConfig,
    clock: Arc<dyn Clock>,
    operation_timeout: Option<Duration>,
}

impl CreditLedger {
    /// Create a ledger over `db` using the system clock and no deadline.
    pub fn new(db: Arc<Database>, config: CreditsConfig) -> Self {
        Self {
            db,
            config,
            clock: Arc::new(SystemClock),
            operation_timeout: None,
        }
    }

    /// Use `clock` for entry timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound every mutating call by `timeout` (on top of the caller's context).
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// The ledger limits in effect.
    pub fn config(&self) -> &CreditsConfig {
        &self.config
    }

    fn scoped(&self, ctx: &OpContext) -> OpContext {
        match self.operation_timeout {
            Some(timeout) => ctx.child().timeout(timeout),
            None => ctx.child(),
        }
    }

    /// Current balance; zero when the user has no balance row yet.
    ///
    /// Never creates state. A missing row for a user who already has ledger
    /// entries is logged as an incident and still reported as zero.
    pub async fn get_balance(&self, user: &UserId) -> Result<i64, TutorbookError> {
        let lookup = user.clone();
        let (account, totals) = self
            .db
            .read(move |conn| {
                let account = postings::read_account(conn, &lookup)?;
                let totals = match account {
                    Some(_) => None,
                    None => Some(postings::ledger_totals(conn, &lookup)?),
                };
                Ok((account, totals))
            })
            .await?;

        match (account, totals) {
            (Some(account), _) => Ok(account.balance),
            (None, Some((sum, entries))) if entries > 0 => {
                error!(
                    user = %user,
                    entries,
                    ledger_sum = sum,
                    "credit row missing for user with ledger entries"
                );
                Ok(0)
            }
            (None, _) => Ok(0),
        }
    }

    /// Strict balance-row read: `CreditNotFound` when the row does not exist.
    pub async fn credit_account(&self, user: &UserId) -> Result<CreditAccount, CreditAccountError> {
        let lookup = user.clone();
        self.db
            .read(move |conn| postings::read_account(conn, &lookup))
            .await
            .map_err(CreditAccountError::from)
            .and_then(|account| {
                account.ok_or_else(|| CreditAccountError::CreditNotFound { user: user.clone() })
            })
            .inspect_err(|e| log_failure("credit_account", e))
    }

    /// Explicitly initialize a user's balance row at zero.
    pub async fn open_account(
        &self,
        ctx: &OpContext,
        user: &UserId,
    ) -> Result<CreditAccount, CreditAccountError> {
        let ctx = self.scoped(ctx);
        let now = self.clock.now();
        let user_id = user.clone();
        let result = self
            .db
            .unit_of_work(&ctx, move |tx| {
                if !users::user_exists(tx, &user_id)? {
                    return Err(CreditAccountError::UserNotFound { user: user_id });
                }
                Ok(postings::open_account(tx, &user_id, &now)?)
            })
            .await;

        match &result {
            Ok(account) => info!(user = %account.user_id, "credit account opened"),
            Err(err) => log_failure("open_account", err),
        }
        result
    }

    /// Add `amount` credits to `user`.
    ///
    /// `amount` must be within [1, 100] and the trimmed `reason` at least three
    /// characters. Fails with `BalanceExceeded` if the resulting balance would
    /// pass `credits.max_balance`. Creates the balance row on first use.
    pub async fn add_credits(
        &self,
        ctx: &OpContext,
        user: &UserId,
        amount: i64,
        reason: &str,
        performed_by: &UserId,
    ) -> Result<CreditTransaction, AddCreditsError> {
        let result = self
            .add_credits_inner(ctx, user, amount, reason, performed_by)
            .await;

        match &result {
            Ok(entry) => info!(
                user = %entry.user_id,
                amount = entry.amount,
                balance_after = entry.balance_after,
                performed_by = %entry.performed_by,
                transaction_id = entry.id,
                "credits added"
            ),
            Err(err) => log_failure("add_credits", err),
        }
        result
    }

    async fn add_credits_inner(
        &self,
        ctx: &OpContext,
        user: &UserId,
        amount: i64,
        reason: &str,
        performed_by: &UserId,
    ) -> Result<CreditTransaction, AddCreditsError> {
        let reason = validate_input(amount, reason)?;
        let ctx = self.scoped(ctx);
        let now = self.clock.now();
        let max = self.config.max_balance;
        let user = user.clone();
        let performed_by = performed_by.clone();

        self.db
            .unit_of_work(&ctx, move |tx| {
                if !users::user_exists(tx, &user)? {
                    return Err(AddCreditsError::UserNotFound { user });
                }
                let account = postings::ensure_account(tx, &user, &now)?;
                if account.balance + amount > max {
                    return Err(AddCreditsError::BalanceExceeded {
                        balance: account.balance,
                        amount,
                        max,
                    });
                }
                Ok(postings::post(
                    tx,
                    &Posting {
                        user: &user,
                        operation: OperationType::Add,
                        amount,
                        reason: &reason,
                        performed_by: &performed_by,
                        booking: None,
                        at: now,
                    },
                )?)
            })
            .await
    }

    /// Deduct `amount` credits from `user`.
    ///
    /// Same input rules as [`add_credits`](Self::add_credits). Fails with
    /// `InsufficientCredits` when the balance is lower than `amount`; a user
    /// without a balance row has a balance of zero.
    pub async fn deduct_credits(
        &self,
        ctx: &OpContext,
        user: &UserId,
        amount: i64,
        reason: &str,
        performed_by: &UserId,
    ) -> Result<CreditTransaction, DeductCreditsError> {
        let result = self
            .deduct_credits_inner(ctx, user, amount, reason, performed_by)
            .await;

        match &result {
            Ok(entry) => info!(
                user = %entry.user_id,
                amount = entry.amount,
                balance_after = entry.balance_after,
                performed_by = %entry.performed_by,
                transaction_id = entry.id,
                "credits deducted"
            ),
            Err(err) => log_failure("deduct_credits", err),
        }
        result
    }

    async fn deduct_credits_inner(
        &self,
        ctx: &OpContext,
        user: &UserId,
        amount: i64,
        reason: &str,
        performed_by: &UserId,
    ) -> Result<CreditTransaction, DeductCreditsError> {
        let reason = validate_input(amount, reason)?;
        let ctx = self.scoped(ctx);
        let now = self.clock.now();
        let user = user.clone();
        let performed_by = performed_by.clone();

        self.db
            .unit_of_work(&ctx, move |tx| {
                if !users::user_exists(tx, &user)? {
                    return Err(DeductCreditsError::UserNotFound { user });
                }
                let balance = postings::balance_or_zero(tx, &user)?;
                if balance < amount {
                    return Err(DeductCreditsError::InsufficientCredits {
                        balance,
                        requested: amount,
                    });
                }
                Ok(postings::post(
                    tx,
                    &Posting {
                        user: &user,
                        operation: OperationType::Deduct,
                        amount,
                        reason: &reason,
                        performed_by: &performed_by,
                        booking: None,
                        at: now,
                    },
                )?)
            })
            .await
    }

    /// One page of transaction history, newest first.
    ///
    /// The filter is clamped (see [`TransactionFilter::normalized`]); this call
    /// never fails on malformed paging.
    pub async fn get_transaction_history(
        &self,
        filter: TransactionFilter,
    ) -> Result<TransactionPage, TutorbookError> {
        let filter = filter.normalized(&self.config);
        self.db
            .read(move |conn| history::query_page(conn, &filter))
            .await
    }

    /// Compare a user's cached balance with the sum of their entries.
    pub async fn reconcile(&self, user: &UserId) -> Result<LedgerReport, TutorbookError> {
        let lookup = user.clone();
        let report = self
            .db
            .read(move |conn| {
                let cached_balance = postings::read_account(conn, &lookup)?.map(|a| a.balance);
                let (ledger_sum, entries) = postings::ledger_totals(conn, &lookup)?;
                Ok(LedgerReport {
                    user: lookup,
                    cached_balance,
                    ledger_sum,
                    entries,
                })
            })
            .await?;
        if !report.is_consistent() {
            warn!(
                user = %report.user,
                cached_balance = ?report.cached_balance,
                ledger_sum = report.ledger_sum,
                "credit balance drifted from ledger"
            );
        }
        Ok(report)
    }

    /// Reconcile every user that has a balance row or ledger entries.
    pub async fn reconcile_all(&self) -> Result<Vec<LedgerReport>, TutorbookError> {
        let reports = self
            .db
            .read(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT u.user_id, c.balance,
                                COALESCE((SELECT SUM(amount) FROM credit_transactions t
                                          WHERE t.user_id = u.user_id), 0),
                                (SELECT COUNT(*) FROM credit_transactions t
                                 WHERE t.user_id = u.user_id)
                         FROM (SELECT user_id FROM credits
                               UNION SELECT user_id FROM credit_transactions) u
                         LEFT JOIN credits c ON c.user_id = u.user_id
                         ORDER BY u.user_id",
                    )
                    .map_err(tutorbook_storage::map_sql_err)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(LedgerReport {
                            user: UserId(row.get(0)?),
                            cached_balance: row.get(1)?,
                            ledger_sum: row.get(2)?,
                            entries: row.get(3)?,
                        })
                    })
                    .map_err(tutorbook_storage::map_sql_err)?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(tutorbook_storage::map_sql_err)
            })
            .await?;

        for report in reports.iter().filter(|r| !r.is_consistent()) {
            warn!(
                user = %report.user,
                cached_balance = ?report.cached_balance,
                ledger_sum = report.ledger_sum,
                "credit balance drifted from ledger"
            );
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;
    use tracing_test::traced_test;
    use tutorbook_core::{Role, User};

    async fn setup() -> (Arc<CreditLedger>, Arc<Database>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Arc::new(Database::open(db_path.to_str().unwrap()).await.unwrap());
        db.write(|conn| {
            for (id, role) in [
                ("s-1", Role::Student),
                ("s-2", Role::Student),
                ("admin", Role::Admin),
            ] {
                users::upsert_user(
                    conn,
                    &User {
                        id: id.into(),
                        display_name: id.to_string(),
                        role,
                        created_at: Utc::now(),
                    },
                )?;
            }
            Ok(())
        })
        .await
        .unwrap();
        let ledger = Arc::new(CreditLedger::new(db.clone(), CreditsConfig::default()));
        (ledger, db, dir)
    }

    fn ctx() -> OpContext {
        OpContext::background()
    }

    fn admin() -> UserId {
        UserId::from("admin")
    }

    #[tokio::test]
    async fn balance_of_unknown_account_is_zero_and_creates_nothing() {
        let (ledger, _db, _dir) = setup().await;
        let user = UserId::from("s-1");
        assert_eq!(ledger.get_balance(&user).await.unwrap(), 0);
        assert!(matches!(
            ledger.credit_account(&user).await,
            Err(CreditAccountError::CreditNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn add_then_deduct_updates_balance_and_history() {
        let (ledger, _db, _dir) = setup().await;
        let user = UserId::from("s-1");

        let add = ledger
            .add_credits(&ctx(), &user, 10, "  welcome bonus ", &admin())
            .await
            .unwrap();
        assert_eq!(add.amount, 10);
        assert_eq!(add.balance_after, 10);
        assert_eq!(add.reason, "welcome bonus");
        assert_eq!(add.operation, OperationType::Add);

        let deduct = ledger
            .deduct_credits(&ctx(), &user, 4, "manual charge", &admin())
            .await
            .unwrap();
        assert_eq!(deduct.amount, -4);
        assert_eq!(deduct.balance_after, 6);

        assert_eq!(ledger.get_balance(&user).await.unwrap(), 6);
        let report = ledger.reconcile(&user).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.entries, 2);
    }

    #[tokio::test]
    async fn admin_bound_checks() {
        let (ledger, _db, _dir) = setup().await;
        let user = UserId::from("s-1");

        assert!(matches!(
            ledger.add_credits(&ctx(), &user, 0, "promo", &admin()).await,
            Err(AddCreditsError::InvalidAmount { amount: 0 })
        ));
        assert!(matches!(
            ledger.add_credits(&ctx(), &user, 150, "promo", &admin()).await,
            Err(AddCreditsError::InvalidAmount { amount: 150 })
        ));
        assert!(matches!(
            ledger.add_credits(&ctx(), &user, 50, "ok", &admin()).await,
            Err(AddCreditsError::InvalidReason)
        ));
        let entry = ledger
            .add_credits(&ctx(), &user, 50, "promo", &admin())
            .await
            .unwrap();
        assert_eq!(entry.balance_after, 50);
    }

    #[tokio::test]
    async fn deduct_validates_input_like_add() {
        let (ledger, _db, _dir) = setup().await;
        let user = UserId::from("s-1");
        assert!(matches!(
            ledger.deduct_credits(&ctx(), &user, 101, "charge", &admin()).await,
            Err(DeductCreditsError::InvalidAmount { amount: 101 })
        ));
        assert!(matches!(
            ledger.deduct_credits(&ctx(), &user, 1, " x ", &admin()).await,
            Err(DeductCreditsError::InvalidReason)
        ));
    }

    #[tokio::test]
    async fn balance_cap_is_enforced() {
        let (ledger, _db, _dir) = setup().await;
        let user = UserId::from("s-1");
        for _ in 0..10 {
            ledger
                .add_credits(&ctx(), &user, 100, "bulk purchase", &admin())
                .await
                .unwrap();
        }
        let err = ledger
            .add_credits(&ctx(), &user, 1, "one more", &admin())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AddCreditsError::BalanceExceeded {
                balance: 1000,
                amount: 1,
                max: 1000
            }
        ));
        assert_eq!(ledger.get_balance(&user).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn deduct_without_account_is_insufficient_and_creates_nothing() {
        let (ledger, _db, _dir) = setup().await;
        let user = UserId::from("s-1");
        let err = ledger
            .deduct_credits(&ctx(), &user, 1, "charge", &admin())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeductCreditsError::InsufficientCredits {
                balance: 0,
                requested: 1
            }
        ));
        assert!(ledger.credit_account(&user).await.is_err());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (ledger, _db, _dir) = setup().await;
        let ghost = UserId::from("ghost");
        assert!(matches!(
            ledger.add_credits(&ctx(), &ghost, 5, "gift", &admin()).await,
            Err(AddCreditsError::UserNotFound { .. })
        ));
        assert!(matches!(
            ledger.deduct_credits(&ctx(), &ghost, 5, "charge", &admin()).await,
            Err(DeductCreditsError::UserNotFound { .. })
        ));
        assert!(matches!(
            ledger.open_account(&ctx(), &ghost).await,
            Err(CreditAccountError::UserNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn open_account_twice_is_duplicate_credit() {
        let (ledger, _db, _dir) = setup().await;
        let user = UserId::from("s-1");
        let account = ledger.open_account(&ctx(), &user).await.unwrap();
        assert_eq!(account.balance, 0);
        let err = ledger.open_account(&ctx(), &user).await.unwrap_err();
        assert!(matches!(err, CreditAccountError::DuplicateCredit { .. }));
        assert_eq!(
            tutorbook_core::Classify::class(&err),
            tutorbook_core::ErrorClass::Integrity
        );
    }

    #[tokio::test]
    async fn concurrent_deductions_never_overdraw() {
        let (ledger, _db, _dir) = setup().await;
        let user = UserId::from("s-1");
        ledger
            .add_credits(&ctx(), &user, 5, "top up", &admin())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..12 {
            let ledger = ledger.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .deduct_credits(&OpContext::background(), &user, 2, "race", &admin())
                    .await
            }));
        }

        let mut deducted = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(entry) => deducted += -entry.amount,
                Err(DeductCreditsError::InsufficientCredits { .. }) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(deducted, 4);
        assert_eq!(insufficient, 10);
        assert_eq!(ledger.get_balance(&user).await.unwrap(), 1);
        assert!(ledger.reconcile(&user).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn cancelled_context_leaves_no_entry() {
        let (ledger, _db, _dir) = setup().await;
        let user = UserId::from("s-1");
        let ctx = OpContext::background();
        ctx.cancel();
        let err = ledger
            .add_credits(&ctx, &user, 5, "top up", &admin())
            .await
            .unwrap_err();
        assert!(matches!(err, AddCreditsError::System(TutorbookError::Cancelled)));
        let page = ledger
            .get_transaction_history(TransactionFilter::for_user("s-1"))
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(ledger.get_balance(&user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn history_filters_and_pages_newest_first() {
        let (ledger, _db, _dir) = setup().await;
        let s1 = UserId::from("s-1");
        let s2 = UserId::from("s-2");
        for i in 1..=5 {
            ledger
                .add_credits(&ctx(), &s1, i, "top up", &admin())
                .await
                .unwrap();
        }
        ledger
            .deduct_credits(&ctx(), &s1, 2, "manual charge", &admin())
            .await
            .unwrap();
        ledger
            .add_credits(&ctx(), &s2, 7, "top up", &admin())
            .await
            .unwrap();

        let page = ledger
            .get_transaction_history(TransactionFilter {
                limit: Some(3),
                ..TransactionFilter::for_user("s-1")
            })
            .await
            .unwrap();
        assert_eq!(page.total, 6);
        assert_eq!(page.entries.len(), 3);
        assert!(page.has_more());
        assert_eq!(page.entries[0].operation, OperationType::Deduct);
        assert!(page.entries.windows(2).all(|w| w[0].id > w[1].id));

        let adds_only = ledger
            .get_transaction_history(TransactionFilter {
                operation: Some(OperationType::Add),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(adds_only.total, 6);
        assert!(adds_only.entries.iter().all(|e| e.operation == OperationType::Add));

        let far_offset = ledger
            .get_transaction_history(TransactionFilter {
                offset: Some(100),
                ..TransactionFilter::for_user("s-2")
            })
            .await
            .unwrap();
        assert_eq!(far_offset.total, 1);
        assert!(far_offset.entries.is_empty());
    }

    #[tokio::test]
    async fn history_date_range_is_inclusive() {
        let (ledger, _db, _dir) = setup().await;
        let s1 = UserId::from("s-1");
        let entry = ledger
            .add_credits(&ctx(), &s1, 3, "top up", &admin())
            .await
            .unwrap();

        let exact = ledger
            .get_transaction_history(TransactionFilter {
                start: Some(entry.created_at),
                end: Some(entry.created_at),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(exact.total, 1);

        let before = ledger
            .get_transaction_history(TransactionFilter {
                end: Some(entry.created_at - chrono::Duration::seconds(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(before.total, 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_credit_row_with_entries_is_logged_as_incident() {
        let (ledger, db, _dir) = setup().await;
        let user = UserId::from("s-1");
        ledger
            .add_credits(&ctx(), &user, 3, "top up", &admin())
            .await
            .unwrap();
        db.write(|conn| {
            conn.execute("DELETE FROM credits WHERE user_id = 's-1'", [])
                .map_err(tutorbook_storage::map_sql_err)?;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(ledger.get_balance(&user).await.unwrap(), 0);
        assert!(logs_contain("credit row missing for user with ledger entries"));

        let report = ledger.reconcile(&user).await.unwrap();
        assert!(!report.is_consistent());
        let all = ledger.reconcile_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].cached_balance, None);
    }
}
