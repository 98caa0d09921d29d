use crate::services::cache::{CacheKey, SnapshotCache};
use crate::services::quota_service::{self, QuotaPolicy};
use crate::services::settings_service::{effective_api_key, list_all_settings};
use crate::services::stats_service::{refresh_channel, StatsContext};
use crate::services::store::SharedStore;
use crate::services::youtube_service::{Credentials, YouTubeApi};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use std::sync::Arc;

pub const DEFAULT_REFRESH_SCHEDULE: &str = "0 * * * * *";
pub const DEFAULT_REFRESH_INTERVAL_MINUTES: i64 = 15;

/// A channel is due when nothing is cached or the cache is older than `interval`.
pub fn refresh_due(cache_age: Option<Duration>, interval: Duration) -> bool {
    cache_age.map_or(true, |age| age > interval)
}

/// Everything the scheduled job needs, owned so it can move into the job closure.
#[derive(Clone)]
pub struct RefreshJob {
    pub store: SharedStore,
    pub youtube: Arc<dyn YouTubeApi>,
    pub policy: QuotaPolicy,
    pub default_api_key: Option<String>,
    pub interval: Duration,
}

impl RefreshJob {
    /// One pass over every user with a configured channel. Returns how many
    /// channels were fetched live.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<usize> {
        let store = self.store.as_ref();
        let ctx = StatsContext::new(store, self.youtube.as_ref(), self.policy);
        let today = now.date_naive();
        let mut refreshed = 0;

        for settings in list_all_settings(store).await? {
            let Some(channel_id) = settings.channel_id.as_deref() else {
                continue;
            };
            let Some(api_key) = effective_api_key(Some(&settings), self.default_api_key.as_deref())
            else {
                debug!("Skipping {}: no API key", settings.user_id);
                continue;
            };

            let key = CacheKey::new(&settings.user_id, channel_id);
            let cache_age = match SnapshotCache::channels(store).get(&key, now).await {
                Ok(cached) => cached.map(|c| c.age),
                Err(e) => {
                    error!("Failed to read channel cache for {}: {e:#}", settings.user_id);
                    continue;
                }
            };
            if !refresh_due(cache_age, self.interval) {
                continue;
            }
            if quota_service::is_exhausted(store, &settings.user_id, today, &self.policy).await {
                debug!("Skipping {}: quota exhausted", settings.user_id);
                continue;
            }

            let credentials = Credentials {
                api_key: api_key.to_string(),
                channel_id: channel_id.to_string(),
            };
            match refresh_channel(&ctx, &settings.user_id, &credentials, now).await {
                Ok(_) => refreshed += 1,
                Err(e) => error!("Background refresh failed for {channel_id}: {e}"),
            }
        }

        if refreshed > 0 {
            info!("Background refresh updated {refreshed} channel(s)");
        }
        Ok(refreshed)
    }
}
