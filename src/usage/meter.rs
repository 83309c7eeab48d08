use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::window::MonthWindow;
use crate::db::{DbOperations, UsageRecord, UsageTotals, User};
use crate::error::AppError;
use crate::proxy::TokenUsage;

/// Where a user stands against the free monthly allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub used: i64,
    pub limit: i64,
    pub is_paid: bool,
    pub exceeded: bool,
    pub remaining: i64,
}

impl QuotaStatus {
    pub fn evaluate(used: i64, is_paid: bool, limit: i64) -> Self {
        Self {
            used,
            limit,
            is_paid,
            exceeded: !is_paid && used >= limit,
            remaining: (limit - used).max(0),
        }
    }

    pub fn ensure_allowed(self) -> Result<Self, AppError> {
        if self.exceeded {
            return Err(AppError::QuotaExceeded { used: self.used, limit: self.limit });
        }
        Ok(self)
    }
}

/// Month-to-date figures for one user.
#[derive(Debug, Clone, Copy)]
pub struct MonthlyUsage {
    pub window: MonthWindow,
    pub totals: UsageTotals,
    pub status: QuotaStatus,
}

/// Result of recording one AI call.
#[derive(Debug, Clone)]
pub struct RecordedUsage {
    pub record: UsageRecord,
    pub month_total: i64,
    pub remaining: i64,
}

/// Reads and writes the monthly token ledger.
///
/// Checking and recording are separate steps: two concurrent requests can
/// both pass [`UsageMeter::check`] before either records, so a user may
/// overshoot the limit by one call's worth of tokens.
#[derive(Clone)]
pub struct UsageMeter {
    db: DbOperations,
    free_limit: i64,
}

impl UsageMeter {
    pub fn new(db: DbOperations, free_limit: i64) -> Self {
        Self { db, free_limit }
    }

    pub fn free_limit(&self) -> i64 {
        self.free_limit
    }

    pub async fn monthly_usage<Tz: TimeZone>(
        &self,
        user: &User,
        now: &DateTime<Tz>,
    ) -> Result<MonthlyUsage, AppError> {
        let window = MonthWindow::containing(now);
        let totals = self.db.sum_usage_between(user.id, window.start, window.end).await?;
        let status = QuotaStatus::evaluate(totals.total_tokens, user.is_paid, self.free_limit);
        Ok(MonthlyUsage { window, totals, status })
    }

    /// Fails with `QuotaExceeded` when a free user has spent the allowance.
    pub async fn check<Tz: TimeZone>(&self, user: &User, now: &DateTime<Tz>) -> Result<QuotaStatus, AppError> {
        let usage = self.monthly_usage(user, now).await?;
        if usage.status.exceeded {
            warn!(
                "User {} blocked by monthly quota ({} / {} tokens)",
                user.id, usage.status.used, usage.status.limit
            );
        }
        usage.status.ensure_allowed()
    }

    /// Appends one usage row and overwrites the user's running counter with
    /// the month-to-date total.
    pub async fn record<Tz: TimeZone>(
        &self,
        user_id: Uuid,
        prompt_id: Option<Uuid>,
        usage: TokenUsage,
        now: &DateTime<Tz>,
    ) -> Result<RecordedUsage, AppError> {
        let window = MonthWindow::containing(now);
        let at = now.with_timezone(&Utc);
        let (record, month_total) = self
            .db
            .record_usage(user_id, prompt_id, usage, at, window.bounds())
            .await?;

        info!(
            "Recorded {} tokens for user {} ({} this month)",
            usage.total_tokens, user_id, month_total
        );

        Ok(RecordedUsage {
            record,
            month_total,
            remaining: (self.free_limit - month_total).max(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_user_under_limit() {
        let status = QuotaStatus::evaluate(49_900, false, 50_000);
        assert!(!status.exceeded);
        assert_eq!(status.remaining, 100);
        assert!(status.ensure_allowed().is_ok());
    }

    #[test]
    fn test_free_user_at_limit_is_blocked() {
        let status = QuotaStatus::evaluate(50_000, false, 50_000);
        assert!(status.exceeded);
        assert_eq!(status.remaining, 0);
        match status.ensure_allowed() {
            Err(AppError::QuotaExceeded { used, limit }) => {
                assert_eq!(used, 50_000);
                assert_eq!(limit, 50_000);
            }
            other => panic!("expected quota error, got {:?}", other),
        }
    }

    #[test]
    fn test_remaining_floors_at_zero() {
        let status = QuotaStatus::evaluate(50_200, false, 50_000);
        assert!(status.exceeded);
        assert_eq!(status.remaining, 0);
    }

    #[test]
    fn test_paid_user_never_blocked() {
        for used in [0, 50_000, 1_000_000] {
            let status = QuotaStatus::evaluate(used, true, 50_000);
            assert!(!status.exceeded);
            assert!(status.ensure_allowed().is_ok());
        }
    }
}
