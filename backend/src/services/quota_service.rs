use crate::models::{DailyQuotaUsage, QuotaStatus};
use crate::services::store::{doc_id, get_doc, DocumentStore, QUOTA_USAGE_INDEX};
use anyhow::Result;
use chrono::NaiveDate;
use log::{info, warn};
use serde_json::json;

pub const DEFAULT_DAILY_BUDGET: i64 = 10_000;
pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.8;

/// Self-imposed daily budget. Live fetches stop once usage reaches the
/// threshold, well before the platform's own limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaPolicy {
    pub daily_budget: i64,
    pub threshold_ratio: f64,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        QuotaPolicy {
            daily_budget: DEFAULT_DAILY_BUDGET,
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
        }
    }
}

impl QuotaPolicy {
    pub fn threshold(&self) -> i64 {
        (self.daily_budget as f64 * self.threshold_ratio).ceil() as i64
    }

    pub fn is_exhausted(&self, usage: Option<&DailyQuotaUsage>) -> bool {
        usage.map_or(0, |u| u.quota_used) >= self.threshold()
    }
}

fn usage_id(user_id: &str, date: NaiveDate) -> String {
    doc_id(&[user_id, &date.to_string()])
}

pub async fn get_usage(
    store: &dyn DocumentStore,
    user_id: &str,
    date: NaiveDate,
) -> Result<Option<DailyQuotaUsage>> {
    get_doc(store, QUOTA_USAGE_INDEX, &usage_id(user_id, date)).await
}

/// Adds to today's counters. Usage only ever grows.
pub async fn record_usage(
    store: &dyn DocumentStore,
    user_id: &str,
    date: NaiveDate,
    units: i64,
    calls: i64,
) -> Result<()> {
    let seed = json!({
        "user_id": user_id,
        "date": date,
        "quota_used": 0,
        "calls_made": 0
    });
    store
        .increment(
            QUOTA_USAGE_INDEX,
            &usage_id(user_id, date),
            &[("quota_used", units.max(0)), ("calls_made", calls.max(0))],
            seed,
        )
        .await
}

/// Raises today's usage to the full budget after the platform reported quota exhaustion.
pub async fn mark_exhausted(
    store: &dyn DocumentStore,
    user_id: &str,
    date: NaiveDate,
    policy: &QuotaPolicy,
) -> Result<()> {
    let used = get_usage(store, user_id, date)
        .await?
        .map_or(0, |u| u.quota_used);
    let remaining = policy.daily_budget - used;
    if remaining > 0 {
        warn!("YouTube reported quota exhaustion for {user_id}; saturating usage for {date}");
        record_usage(store, user_id, date, remaining, 0).await?;
    }
    Ok(())
}

/// Whether live fetches are blocked for today. A failed read counts as
/// exhausted so a storage outage cannot cause unmetered API calls.
pub async fn is_exhausted(
    store: &dyn DocumentStore,
    user_id: &str,
    date: NaiveDate,
    policy: &QuotaPolicy,
) -> bool {
    match get_usage(store, user_id, date).await {
        Ok(usage) => policy.is_exhausted(usage.as_ref()),
        Err(e) => {
            warn!("Failed to read quota usage for {user_id}: {e:#}");
            true
        }
    }
}

pub async fn quota_status(
    store: &dyn DocumentStore,
    user_id: &str,
    date: NaiveDate,
    policy: &QuotaPolicy,
) -> Result<QuotaStatus> {
    let usage = get_usage(store, user_id, date).await?;
    let status = QuotaStatus {
        date,
        quota_used: usage.as_ref().map_or(0, |u| u.quota_used),
        calls_made: usage.as_ref().map_or(0, |u| u.calls_made),
        daily_budget: policy.daily_budget,
        threshold: policy.threshold(),
        exhausted: policy.is_exhausted(usage.as_ref()),
    };
    info!(
        "Quota for {user_id} on {date}: {}/{} units",
        status.quota_used, status.daily_budget
    );
    Ok(status)
}
