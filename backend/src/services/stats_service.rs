use crate::models::{
    ChannelSnapshot, DailyStats, ResolvedStats, ResolvedVideos, StatsSource, VideoSnapshot,
};
use crate::services::cache::{CacheKey, Cached, SnapshotCache};
use crate::services::milestone_service::record_milestones;
use crate::services::quota_service::{self, QuotaPolicy};
use crate::services::store::{doc_id, find_docs, put_doc, DocumentStore, DAILY_STATS_INDEX};
use crate::services::youtube_service::{
    Credentials, FetchError, YouTubeApi, CHANNELS_COST, SEARCH_COST, VIDEOS_COST,
};
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{error, info, warn};

pub const FRESHNESS_WINDOW_MINUTES: i64 = 120;
pub const RECENT_VIDEO_COUNT: usize = 25;

/// Collaborators shared by every stats operation.
pub struct StatsContext<'a> {
    pub store: &'a dyn DocumentStore,
    pub youtube: &'a dyn YouTubeApi,
    pub policy: QuotaPolicy,
    pub freshness: Duration,
}

impl<'a> StatsContext<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        youtube: &'a dyn YouTubeApi,
        policy: QuotaPolicy,
    ) -> Self {
        StatsContext {
            store,
            youtube,
            policy,
            freshness: Duration::minutes(FRESHNESS_WINDOW_MINUTES),
        }
    }
}

async fn cached_channel(
    ctx: &StatsContext<'_>,
    key: &CacheKey,
    now: DateTime<Utc>,
) -> Option<Cached<ChannelSnapshot>> {
    match SnapshotCache::channels(ctx.store).get(key, now).await {
        Ok(cached) => cached,
        Err(e) => {
            warn!("Channel cache unavailable for {}: {e:#}", key.channel_id);
            None
        }
    }
}

/// Latest daily record strictly before `today`.
pub async fn latest_daily_stats_before(
    store: &dyn DocumentStore,
    user_id: &str,
    channel_id: &str,
    today: NaiveDate,
) -> Result<Option<DailyStats>> {
    let rows: Vec<DailyStats> = find_docs(
        store,
        DAILY_STATS_INDEX,
        &[("user_id", user_id), ("channel_id", channel_id)],
    )
    .await?;
    Ok(rows
        .into_iter()
        .filter(|row| row.date < today)
        .max_by_key(|row| row.date))
}

/// Walks the offline tiers: historical record, then the stale cache entry,
/// then an explicit no-data result. `reason` explains why the live tier was skipped.
async fn fall_back(
    ctx: &StatsContext<'_>,
    user_id: &str,
    channel_id: &str,
    today: NaiveDate,
    stale: Option<ChannelSnapshot>,
    reason: &str,
) -> ResolvedStats {
    let title = stale
        .as_ref()
        .map(|s| s.channel_title.clone())
        .unwrap_or_default();

    match latest_daily_stats_before(ctx.store, user_id, channel_id, today).await {
        Ok(Some(row)) => {
            return ResolvedStats::found(row.to_snapshot(&title), StatsSource::Historical)
                .with_message(format!("{reason}; showing stats recorded on {}", row.date));
        }
        Ok(None) => {}
        Err(e) => warn!("Historical stats unavailable for {channel_id}: {e:#}"),
    }

    if let Some(snapshot) = stale {
        let captured_at = snapshot.captured_at;
        return ResolvedStats::found(snapshot, StatsSource::Cache).with_message(format!(
            "{reason}; showing cached stats from {}",
            captured_at.to_rfc3339()
        ));
    }

    ResolvedStats::empty(format!("{reason}; no stored statistics are available"))
}

/// Picks the best available channel statistics and labels where they came from.
///
/// Tiers, first hit wins: cache younger than the freshness window, then a
/// live fetch when credentials exist and quota allows, then the latest
/// historical daily record, then the stale cache. Never fails; every
/// downstream error just moves on to the next tier.
pub async fn resolve_channel_stats(
    ctx: &StatsContext<'_>,
    user_id: &str,
    channel_id: &str,
    api_key: Option<&str>,
    now: DateTime<Utc>,
) -> ResolvedStats {
    resolve(ctx, user_id, channel_id, api_key, now, true).await
}

/// Manual refresh: same tiers, minus the fresh-cache shortcut. The quota
/// gate still applies.
pub async fn force_refresh_channel_stats(
    ctx: &StatsContext<'_>,
    user_id: &str,
    channel_id: &str,
    api_key: Option<&str>,
    now: DateTime<Utc>,
) -> ResolvedStats {
    resolve(ctx, user_id, channel_id, api_key, now, false).await
}

async fn resolve(
    ctx: &StatsContext<'_>,
    user_id: &str,
    channel_id: &str,
    api_key: Option<&str>,
    now: DateTime<Utc>,
    serve_fresh_cache: bool,
) -> ResolvedStats {
    let key = CacheKey::new(user_id, channel_id);
    let cached = cached_channel(ctx, &key, now).await;

    if let Some(entry) = cached.as_ref().filter(|_| serve_fresh_cache) {
        if entry.is_fresh(ctx.freshness) {
            return ResolvedStats::found(entry.value.clone(), StatsSource::Cache);
        }
    }

    let stale = cached.map(|entry| entry.value);
    let today = now.date_naive();

    if quota_service::is_exhausted(ctx.store, user_id, today, &ctx.policy).await {
        info!("Quota exhausted for {user_id}; skipping live fetch of {channel_id}");
        let reason = "Daily API quota exceeded";
        return fall_back(ctx, user_id, channel_id, today, stale, reason).await;
    }

    let Some(api_key) = api_key.filter(|k| !k.is_empty()) else {
        return fall_back(
            ctx,
            user_id,
            channel_id,
            today,
            stale,
            "No YouTube API key configured",
        )
        .await;
    };

    let credentials = Credentials {
        api_key: api_key.to_string(),
        channel_id: channel_id.to_string(),
    };

    match refresh_channel(ctx, user_id, &credentials, now).await {
        Ok(snapshot) => ResolvedStats::found(snapshot, StatsSource::Api),
        Err(e) => {
            warn!("Live fetch of {channel_id} failed: {e}");
            fall_back(
                ctx,
                user_id,
                channel_id,
                today,
                stale,
                &format!("Live fetch failed ({e})"),
            )
            .await
        }
    }
}

/// Books one request against today's quota. A quota error saturates the
/// day instead of charging units.
async fn charge<T>(
    ctx: &StatsContext<'_>,
    user_id: &str,
    today: NaiveDate,
    units: i64,
    result: Result<T, FetchError>,
) -> Result<T, FetchError> {
    match &result {
        Err(e) if e.is_quota() => {
            if let Err(e) =
                quota_service::mark_exhausted(ctx.store, user_id, today, &ctx.policy).await
            {
                error!("Failed to record quota exhaustion for {user_id}: {e:#}");
            }
        }
        _ => {
            let recorded = quota_service::record_usage(ctx.store, user_id, today, units, 1).await;
            if let Err(e) = recorded {
                error!("Failed to record quota usage for {user_id}: {e:#}");
            }
        }
    }
    result
}

/// Live fetch plus its write-backs: cache, quota counter, milestones and the
/// daily record. Write-back failures are logged and do not fail the fetch.
pub async fn refresh_channel(
    ctx: &StatsContext<'_>,
    user_id: &str,
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> Result<ChannelSnapshot, FetchError> {
    let today = now.date_naive();
    let result = ctx.youtube.fetch_channel(credentials, now).await;
    let result = charge(ctx, user_id, today, CHANNELS_COST, result).await;

    let snapshot = result?;
    let key = CacheKey::new(user_id, &credentials.channel_id);

    if let Err(e) = SnapshotCache::channels(ctx.store).set(&key, &snapshot, now).await {
        error!("Failed to cache channel {}: {e:#}", snapshot.channel_id);
    }
    if let Err(e) = record_milestones(ctx.store, user_id, &snapshot, now).await {
        error!("Failed to record milestones for {}: {e:#}", snapshot.channel_id);
    }
    if let Err(e) = record_daily_stats(ctx.store, user_id, &snapshot, now).await {
        error!("Failed to record daily stats for {}: {e:#}", snapshot.channel_id);
    }

    info!(
        "Refreshed channel {}: {} subscribers, {} videos, {} views",
        snapshot.channel_id, snapshot.subscriber_count, snapshot.video_count, snapshot.total_views
    );
    Ok(snapshot)
}

/// Upserts today's row, with deltas measured against the previous day on file.
pub async fn record_daily_stats(
    store: &dyn DocumentStore,
    user_id: &str,
    snapshot: &ChannelSnapshot,
    now: DateTime<Utc>,
) -> Result<DailyStats> {
    let today = now.date_naive();
    let previous =
        latest_daily_stats_before(store, user_id, &snapshot.channel_id, today).await?;

    let (subscriber_delta, views_delta, videos_published) = match &previous {
        Some(prev) => (
            snapshot.subscriber_count - prev.subscriber_count,
            snapshot.total_views - prev.total_views,
            (snapshot.video_count - prev.video_count).max(0),
        ),
        None => (0, 0, 0),
    };

    let row = DailyStats {
        user_id: user_id.to_string(),
        channel_id: snapshot.channel_id.clone(),
        date: today,
        subscriber_count: snapshot.subscriber_count,
        total_views: snapshot.total_views,
        video_count: snapshot.video_count,
        subscriber_delta,
        views_delta,
        videos_published,
        recorded_at: now,
    };
    let id = doc_id(&[user_id, &snapshot.channel_id, &today.to_string()]);
    put_doc(store, DAILY_STATS_INDEX, &id, &row).await?;
    Ok(row)
}

pub async fn daily_history(
    store: &dyn DocumentStore,
    user_id: &str,
    channel_id: &str,
) -> Result<Vec<DailyStats>> {
    let mut rows: Vec<DailyStats> = find_docs(
        store,
        DAILY_STATS_INDEX,
        &[("user_id", user_id), ("channel_id", channel_id)],
    )
    .await?;
    rows.sort_by_key(|row| row.date);
    Ok(rows)
}

fn resolved_videos(
    cached: Cached<Vec<VideoSnapshot>>,
    message: Option<String>,
) -> ResolvedVideos {
    ResolvedVideos {
        videos: cached.value,
        source: StatsSource::Cache,
        last_updated: Some(cached.stored_at),
        message,
        error: None,
    }
}

/// Recent uploads, with the same cache-first policy as channel stats but no
/// historical tier. A live refresh costs a search plus a videos lookup.
pub async fn resolve_video_stats(
    ctx: &StatsContext<'_>,
    user_id: &str,
    channel_id: &str,
    api_key: Option<&str>,
    now: DateTime<Utc>,
) -> ResolvedVideos {
    let key = CacheKey::new(user_id, channel_id);
    let cache = SnapshotCache::videos(ctx.store);
    let cached = match cache.get(&key, now).await {
        Ok(cached) => cached,
        Err(e) => {
            warn!("Video cache unavailable for {channel_id}: {e:#}");
            None
        }
    };

    if let Some(entry) = cached.as_ref().filter(|entry| entry.is_fresh(ctx.freshness)) {
        return resolved_videos(entry.clone(), None);
    }

    let today = now.date_naive();
    let reason = if let Some(api_key) = api_key.filter(|k| !k.is_empty()) {
        if quota_service::is_exhausted(ctx.store, user_id, today, &ctx.policy).await {
            "Daily API quota exceeded".to_string()
        } else {
            let credentials = Credentials {
                api_key: api_key.to_string(),
                channel_id: channel_id.to_string(),
            };
            match refresh_videos(ctx, user_id, &credentials, now).await {
                Ok(videos) => {
                    return ResolvedVideos {
                        videos,
                        source: StatsSource::Api,
                        last_updated: Some(now),
                        message: None,
                        error: None,
                    };
                }
                Err(e) => format!("Live fetch failed ({e})"),
            }
        }
    } else {
        "No YouTube API key configured".to_string()
    };

    match cached {
        Some(entry) => {
            let message = format!("{reason}; showing cached videos");
            resolved_videos(entry, Some(message))
        }
        None => ResolvedVideos {
            videos: Vec::new(),
            source: StatsSource::Cache,
            last_updated: None,
            message: None,
            error: Some(format!("{reason}; no cached videos are available")),
        },
    }
}

pub async fn refresh_videos(
    ctx: &StatsContext<'_>,
    user_id: &str,
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> Result<Vec<VideoSnapshot>, FetchError> {
    let today = now.date_naive();
    let search = ctx
        .youtube
        .search_recent_video_ids(credentials, RECENT_VIDEO_COUNT)
        .await;
    let video_ids = charge(ctx, user_id, today, SEARCH_COST, search).await?;

    let result = if video_ids.is_empty() {
        Ok(Vec::new())
    } else {
        let lookup = ctx.youtube.fetch_videos(credentials, &video_ids).await;
        charge(ctx, user_id, today, VIDEOS_COST, lookup).await
    };

    let videos = result?;
    let key = CacheKey::new(user_id, &credentials.channel_id);
    if let Err(e) = SnapshotCache::videos(ctx.store).set(&key, &videos, now).await {
        error!("Failed to cache videos for {}: {e:#}", credentials.channel_id);
    }
    info!(
        "Fetched {} recent videos for channel {}",
        videos.len(),
        credentials.channel_id
    );
    Ok(videos)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::MilestoneKind;
    use crate::services::milestone_service::list_milestones;
    use crate::services::quota_service::{get_usage, record_usage};
    use crate::services::store::MemoryStore;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub const CHANNEL: &str = "UC_x5XG1OV2P6uZZ5FSM9Ttw";

    /// Scripted YouTube API: pops one prepared response per call.
    #[derive(Default)]
    pub struct FakeYouTube {
        channels: Mutex<VecDeque<Result<ChannelSnapshot, FetchError>>>,
        searches: Mutex<VecDeque<Result<Vec<String>, FetchError>>>,
        lookups: Mutex<VecDeque<Result<Vec<VideoSnapshot>, FetchError>>>,
        pub channel_calls: AtomicUsize,
        pub video_calls: AtomicUsize,
    }

    impl FakeYouTube {
        pub fn with_channel(self, response: Result<ChannelSnapshot, FetchError>) -> Self {
            self.channels.lock().unwrap().push_back(response);
            self
        }

        pub fn with_search(self, response: Result<Vec<String>, FetchError>) -> Self {
            self.searches.lock().unwrap().push_back(response);
            self
        }

        pub fn with_lookup(self, response: Result<Vec<VideoSnapshot>, FetchError>) -> Self {
            self.lookups.lock().unwrap().push_back(response);
            self
        }

        /// Scripts a search returning these videos' ids and the matching lookup.
        pub fn with_videos(self, videos: Vec<VideoSnapshot>) -> Self {
            let ids = videos.iter().map(|v| v.video_id.clone()).collect();
            self.with_search(Ok(ids)).with_lookup(Ok(videos))
        }

        pub fn calls(&self) -> usize {
            self.channel_calls.load(Ordering::SeqCst) + self.video_calls.load(Ordering::SeqCst)
        }
    }

    #[rocket::async_trait]
    impl YouTubeApi for FakeYouTube {
        async fn fetch_channel(
            &self,
            credentials: &Credentials,
            now: DateTime<Utc>,
        ) -> Result<ChannelSnapshot, FetchError> {
            self.channel_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.channels.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(FetchError::NotFound(credentials.channel_id.clone())))
                .map(|mut snapshot| {
                    snapshot.captured_at = now;
                    snapshot
                })
        }

        async fn search_recent_video_ids(
            &self,
            credentials: &Credentials,
            _max_results: usize,
        ) -> Result<Vec<String>, FetchError> {
            self.video_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.searches.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(FetchError::NotFound(credentials.channel_id.clone())))
        }

        async fn fetch_videos(
            &self,
            credentials: &Credentials,
            _video_ids: &[String],
        ) -> Result<Vec<VideoSnapshot>, FetchError> {
            self.video_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.lookups.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(FetchError::NotFound(credentials.channel_id.clone())))
        }
    }

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap()
    }

    pub fn snapshot(subscribers: i64, captured_at: DateTime<Utc>) -> ChannelSnapshot {
        ChannelSnapshot {
            channel_id: CHANNEL.into(),
            channel_title: "PokeBim".into(),
            subscriber_count: subscribers,
            video_count: 40,
            total_views: 250_000,
            custom_url: Some("@pokebim".into()),
            captured_at,
        }
    }

    async fn seed_cache(store: &MemoryStore, subscribers: i64, age: Duration) {
        let captured_at = now() - age;
        SnapshotCache::channels(store)
            .set(
                &CacheKey::new("u1", CHANNEL),
                &snapshot(subscribers, captured_at),
                captured_at,
            )
            .await
            .unwrap();
    }

    async fn seed_history(store: &MemoryStore, days_ago: i64, subscribers: i64) {
        let recorded_at = now() - Duration::days(days_ago);
        record_daily_stats(store, "u1", &snapshot(subscribers, recorded_at), recorded_at)
            .await
            .unwrap();
    }

    async fn exhaust_quota(store: &MemoryStore) {
        record_usage(store, "u1", now().date_naive(), 8_000, 80)
            .await
            .unwrap();
    }

    fn context<'a>(store: &'a MemoryStore, youtube: &'a FakeYouTube) -> StatsContext<'a> {
        StatsContext::new(store, youtube, QuotaPolicy::default())
    }

    #[tokio::test]
    async fn fresh_cache_wins_without_live_call() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default().with_channel(Ok(snapshot(999, now())));
        seed_cache(&store, 120, Duration::minutes(90)).await;

        let ctx = context(&store, &youtube);
        let resolved = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;

        assert_eq!(resolved.source, StatsSource::Cache);
        assert_eq!(resolved.stats.unwrap().subscriber_count, 120);
        assert_eq!(youtube.calls(), 0);
        assert!(get_usage(&store, "u1", now().date_naive())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn stale_cache_triggers_live_fetch_and_write_back() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default().with_channel(Ok(snapshot(10_050, now())));
        seed_cache(&store, 9_900, Duration::hours(3)).await;
        seed_history(&store, 1, 9_800).await;

        let ctx = context(&store, &youtube);
        let resolved = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;

        assert_eq!(resolved.source, StatsSource::Api);
        assert_eq!(resolved.stats.as_ref().unwrap().subscriber_count, 10_050);
        assert_eq!(resolved.last_updated, Some(now()));
        assert!(resolved.error.is_none());

        let usage = get_usage(&store, "u1", now().date_naive()).await.unwrap().unwrap();
        assert_eq!(usage.quota_used, CHANNELS_COST);
        assert_eq!(usage.calls_made, 1);

        let cached = SnapshotCache::channels(&store)
            .get(&CacheKey::new("u1", CHANNEL), now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.value.subscriber_count, 10_050);

        let history = daily_history(&store, "u1", CHANNEL).await.unwrap();
        let today = history.last().unwrap();
        assert_eq!(today.date, now().date_naive());
        assert_eq!(today.subscriber_delta, 250);

        let milestones = list_milestones(&store, "u1", CHANNEL).await.unwrap();
        assert!(milestones
            .iter()
            .any(|m| m.kind == MilestoneKind::Subscribers && m.value == 10_000));
    }

    #[tokio::test]
    async fn exhausted_quota_prefers_historical_over_stale_cache() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default().with_channel(Ok(snapshot(1, now())));
        exhaust_quota(&store).await;
        seed_cache(&store, 500, Duration::hours(5)).await;
        seed_history(&store, 3, 450).await;
        seed_history(&store, 1, 480).await;

        let ctx = context(&store, &youtube);
        let resolved = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;

        assert_eq!(youtube.calls(), 0);
        assert_eq!(resolved.source, StatsSource::Historical);
        let stats = resolved.stats.unwrap();
        assert_eq!(stats.subscriber_count, 480);
        assert_eq!(stats.channel_title, "PokeBim");
    }

    #[tokio::test]
    async fn exhausted_quota_falls_back_to_stale_cache_then_nothing() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default();
        exhaust_quota(&store).await;

        let ctx = context(&store, &youtube);
        let empty = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert!(empty.stats.is_none());
        assert_eq!(empty.source, StatsSource::Cache);
        assert!(empty.error.unwrap().contains("quota exceeded"));

        seed_cache(&store, 500, Duration::hours(5)).await;
        let stale = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert_eq!(stale.source, StatsSource::Cache);
        assert_eq!(stale.stats.unwrap().subscriber_count, 500);
        assert!(stale.message.unwrap().contains("quota exceeded"));
        assert!(stale.error.is_none());
        assert_eq!(youtube.calls(), 0);
    }

    #[tokio::test]
    async fn todays_record_is_not_historical() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default();
        exhaust_quota(&store).await;
        seed_history(&store, 0, 700).await;

        let ctx = context(&store, &youtube);
        let resolved = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert!(resolved.stats.is_none());
        assert!(resolved.error.is_some());
    }

    #[tokio::test]
    async fn missing_credentials_use_historical_with_explanation() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default();
        seed_history(&store, 2, 321).await;

        let ctx = context(&store, &youtube);
        let resolved = resolve_channel_stats(&ctx, "u1", CHANNEL, None, now()).await;
        assert_eq!(resolved.source, StatsSource::Historical);
        assert_eq!(resolved.stats.unwrap().subscriber_count, 321);
        assert!(resolved.message.unwrap().contains("No YouTube API key"));

        let blank_key = resolve_channel_stats(&ctx, "u2", CHANNEL, Some(""), now()).await;
        assert!(blank_key.stats.is_none());
        assert_eq!(blank_key.source, StatsSource::Cache);
        assert!(blank_key.error.unwrap().contains("No YouTube API key"));
        assert_eq!(youtube.calls(), 0);
    }

    #[tokio::test]
    async fn live_failure_demotes_to_historical() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default()
            .with_channel(Err(FetchError::Unauthorized("channels returned 403".into())));
        seed_history(&store, 1, 42).await;

        let ctx = context(&store, &youtube);
        let resolved = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("bad"), now()).await;

        assert_eq!(resolved.source, StatsSource::Historical);
        assert!(resolved.message.unwrap().contains("Live fetch failed"));
        assert_eq!(youtube.calls(), 1);
    }

    #[tokio::test]
    async fn live_failure_without_fallback_reports_error() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default();

        let ctx = context(&store, &youtube);
        let resolved = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;

        assert!(resolved.stats.is_none());
        assert_eq!(resolved.source, StatsSource::Cache);
        assert!(resolved.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn live_failure_falls_back_to_stale_cache() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default()
            .with_channel(Err(FetchError::Unauthorized("channels returned 403".into())));
        seed_cache(&store, 640, Duration::hours(3)).await;

        let ctx = context(&store, &youtube);
        let resolved = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("bad"), now()).await;

        assert_eq!(resolved.source, StatsSource::Cache);
        assert_eq!(resolved.stats.unwrap().subscriber_count, 640);
        assert_eq!(resolved.last_updated, Some(now() - Duration::hours(3)));
        assert!(resolved.message.unwrap().contains("Live fetch failed"));
        assert!(resolved.error.is_none());
        assert_eq!(youtube.calls(), 1);
    }

    #[tokio::test]
    async fn missing_key_falls_back_to_stale_cache() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default().with_channel(Ok(snapshot(999, now())));
        seed_cache(&store, 640, Duration::hours(3)).await;

        let ctx = context(&store, &youtube);
        let resolved = resolve_channel_stats(&ctx, "u1", CHANNEL, None, now()).await;

        assert_eq!(resolved.source, StatsSource::Cache);
        assert_eq!(resolved.stats.unwrap().subscriber_count, 640);
        assert!(resolved.message.unwrap().contains("No YouTube API key"));
        assert!(resolved.error.is_none());
        assert_eq!(youtube.calls(), 0);
    }

    #[tokio::test]
    async fn cache_exactly_at_freshness_window_is_served() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default().with_channel(Ok(snapshot(999, now())));
        seed_cache(&store, 300, Duration::minutes(FRESHNESS_WINDOW_MINUTES)).await;
        let ctx = context(&store, &youtube);

        let at_edge = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert_eq!(at_edge.source, StatsSource::Cache);
        assert_eq!(at_edge.stats.unwrap().subscriber_count, 300);
        assert_eq!(youtube.calls(), 0);

        let later = now() + Duration::seconds(1);
        let past_edge = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), later).await;
        assert_eq!(past_edge.source, StatsSource::Api);
        assert_eq!(youtube.calls(), 1);
    }

    #[tokio::test]
    async fn quota_error_from_api_blocks_later_live_calls() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default()
            .with_channel(Err(FetchError::QuotaExceeded))
            .with_channel(Ok(snapshot(1, now())));

        let ctx = context(&store, &youtube);
        resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;

        assert_eq!(youtube.calls(), 1);
        let today = now().date_naive();
        assert!(quota_service::is_exhausted(&store, "u1", today, &ctx.policy).await);
    }

    #[tokio::test]
    async fn repeated_calls_without_state_change_agree() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default();
        let ctx = context(&store, &youtube);

        seed_cache(&store, 77, Duration::minutes(10)).await;
        let first = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        let second = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert_eq!(first, second);

        exhaust_quota(&store).await;
        seed_cache(&store, 77, Duration::hours(4)).await;
        let first = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        let second = resolve_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert_eq!(first, second);
        assert_eq!(youtube.calls(), 0);
    }

    #[tokio::test]
    async fn forced_refresh_skips_fresh_cache_but_not_quota_gate() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default().with_channel(Ok(snapshot(500, now())));
        seed_cache(&store, 450, Duration::minutes(10)).await;
        let ctx = context(&store, &youtube);

        let forced = force_refresh_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert_eq!(forced.source, StatsSource::Api);
        assert_eq!(forced.stats.unwrap().subscriber_count, 500);

        exhaust_quota(&store).await;
        let blocked = force_refresh_channel_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert_eq!(blocked.source, StatsSource::Cache);
        assert!(blocked.message.unwrap().contains("quota"));
        assert_eq!(youtube.calls(), 1);
    }

    fn upload() -> VideoSnapshot {
        VideoSnapshot {
            video_id: "abc".into(),
            title: "Upload".into(),
            published_at: now() - Duration::days(1),
            view_count: 10,
            like_count: 1,
            comment_count: 0,
            duration_minutes: 12,
        }
    }

    #[tokio::test]
    async fn videos_refresh_charges_search_and_lookup() {
        let store = MemoryStore::new();
        let video = upload();
        let youtube = FakeYouTube::default().with_videos(vec![video.clone()]);
        let ctx = context(&store, &youtube);

        let live = resolve_video_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert_eq!(live.source, StatsSource::Api);
        assert_eq!(live.videos, vec![video.clone()]);

        let usage = get_usage(&store, "u1", now().date_naive()).await.unwrap().unwrap();
        assert_eq!(usage.quota_used, SEARCH_COST + VIDEOS_COST);
        assert_eq!(usage.calls_made, 2);

        let cached = resolve_video_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert_eq!(cached.source, StatsSource::Cache);
        assert_eq!(cached.videos, vec![video]);
        assert_eq!(youtube.calls(), 2);
    }

    #[tokio::test]
    async fn empty_search_skips_lookup_and_charges_search_only() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default().with_search(Ok(Vec::new()));
        let ctx = context(&store, &youtube);

        let live = resolve_video_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert_eq!(live.source, StatsSource::Api);
        assert!(live.videos.is_empty());
        assert_eq!(youtube.calls(), 1);

        let usage = get_usage(&store, "u1", now().date_naive()).await.unwrap().unwrap();
        assert_eq!(usage.quota_used, SEARCH_COST);
        assert_eq!(usage.calls_made, 1);
    }

    #[tokio::test]
    async fn failed_lookup_still_charges_both_requests() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default()
            .with_search(Ok(vec!["abc".into()]))
            .with_lookup(Err(FetchError::Malformed("missing items".into())));
        let ctx = context(&store, &youtube);

        let resolved = resolve_video_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert!(resolved.videos.is_empty());
        assert!(resolved.error.unwrap().contains("Live fetch failed"));
        assert_eq!(youtube.calls(), 2);

        let usage = get_usage(&store, "u1", now().date_naive()).await.unwrap().unwrap();
        assert_eq!(usage.quota_used, SEARCH_COST + VIDEOS_COST);
        assert_eq!(usage.calls_made, 2);
    }

    #[tokio::test]
    async fn quota_error_on_search_skips_lookup_and_saturates() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default()
            .with_search(Err(FetchError::QuotaExceeded))
            .with_lookup(Ok(vec![upload()]));
        let ctx = context(&store, &youtube);

        resolve_video_stats(&ctx, "u1", CHANNEL, Some("key"), now()).await;
        assert_eq!(youtube.calls(), 1);
        let today = now().date_naive();
        assert!(quota_service::is_exhausted(&store, "u1", today, &ctx.policy).await);
    }

    #[tokio::test]
    async fn videos_without_key_or_cache_report_error() {
        let store = MemoryStore::new();
        let youtube = FakeYouTube::default();
        let ctx = context(&store, &youtube);
        let resolved = resolve_video_stats(&ctx, "u1", CHANNEL, None, now()).await;
        assert!(resolved.videos.is_empty());
        assert!(resolved.error.unwrap().contains("No YouTube API key"));
    }
}
