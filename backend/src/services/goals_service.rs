use crate::models::{ApiError, GoalsUpdate, StatsSource, UserGoals, VideoSnapshot, WeeklyProgress};
use crate::services::cache::{CacheKey, SnapshotCache};
use crate::services::store::{get_doc, put_doc, DocumentStore, USER_GOALS_INDEX};
use crate::services::task_service::tasks_completed_on;
use crate::utils::start_of_week;
use chrono::{DateTime, Utc};
use log::{info, warn};

pub async fn get_goals(store: &dyn DocumentStore, user_id: &str) -> Result<UserGoals, ApiError> {
    Ok(get_doc(store, USER_GOALS_INDEX, user_id)
        .await?
        .unwrap_or_else(|| UserGoals::new(user_id)))
}

pub async fn update_goals(
    store: &dyn DocumentStore,
    user_id: &str,
    update: &GoalsUpdate,
) -> Result<UserGoals, ApiError> {
    let goals = get_goals(store, user_id).await?.apply(update)?;
    put_doc(store, USER_GOALS_INDEX, user_id, &goals).await?;
    info!("Updated goals for {user_id}");
    Ok(goals)
}

pub fn uploads_since(videos: &[VideoSnapshot], since: DateTime<Utc>) -> i64 {
    videos.iter().filter(|v| v.published_at >= since).count() as i64
}

/// Uploads published since Monday 00:00 UTC, counted from the video cache;
/// this never triggers a live fetch.
pub async fn weekly_progress(
    store: &dyn DocumentStore,
    user_id: &str,
    channel_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<WeeklyProgress, ApiError> {
    let goals = get_goals(store, user_id).await?;
    let today = now.date_naive();
    let week_start = start_of_week(today);

    let uploads_this_week = match channel_id {
        Some(channel_id) => {
            let key = CacheKey::new(user_id, channel_id);
            match SnapshotCache::videos(store).get(&key, now).await {
                Ok(Some(cached)) => {
                    let since = week_start.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
                    since.map_or(0, |since| uploads_since(&cached.value, since))
                }
                Ok(None) => 0,
                Err(e) => {
                    warn!("Video cache unavailable for weekly progress: {e:#}");
                    0
                }
            }
        }
        None => 0,
    };

    Ok(WeeklyProgress {
        week_start,
        uploads_this_week,
        weekly_upload_target: goals.weekly_upload_target,
        goal_met: uploads_this_week >= goals.weekly_upload_target,
        tasks_completed_today: tasks_completed_on(store, user_id, today).await?,
        daily_task_target: goals.daily_task_target,
        source: StatsSource::Cache,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        // A Thursday.
        Utc.with_ymd_and_hms(2026, 10, 15, 18, 0, 0).unwrap()
    }

    fn video(id: &str, published_at: DateTime<Utc>) -> VideoSnapshot {
        VideoSnapshot {
            video_id: id.into(),
            title: id.into(),
            published_at,
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            duration_minutes: 8,
        }
    }

    #[test]
    fn partial_update_only_touches_given_fields() {
        let goals = UserGoals::new("u1");
        let updated = goals
            .apply(&GoalsUpdate {
                weekly_upload_target: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(updated.weekly_upload_target, 3);
        assert_eq!(updated.daily_views_target, goals.daily_views_target);

        let invalid = goals.apply(&GoalsUpdate {
            daily_task_target: Some(0),
            ..Default::default()
        });
        assert!(matches!(invalid, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn update_is_persisted() {
        let store = MemoryStore::new();
        update_goals(
            &store,
            "u1",
            &GoalsUpdate {
                subscriber_target: Some(25_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(
            get_goals(&store, "u1").await.unwrap().subscriber_target,
            25_000
        );
    }

    #[tokio::test]
    async fn weekly_progress_counts_uploads_since_monday() {
        let store = MemoryStore::new();
        let channel = "UC_x5XG1OV2P6uZZ5FSM9Ttw";
        let monday = Utc.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap();
        let videos = vec![
            video("tue", monday + Duration::days(1)),
            video("mon", monday),
            video("last-sunday", monday - Duration::minutes(1)),
        ];
        SnapshotCache::videos(&store)
            .set(&CacheKey::new("u1", channel), &videos, now())
            .await
            .unwrap();

        let progress = weekly_progress(&store, "u1", Some(channel), now())
            .await
            .unwrap();
        assert_eq!(progress.week_start, monday.date_naive());
        assert_eq!(progress.uploads_this_week, 2);
        assert!(progress.goal_met);

        let no_channel = weekly_progress(&store, "u1", None, now()).await.unwrap();
        assert_eq!(no_channel.uploads_this_week, 0);
        assert!(!no_channel.goal_met);
    }
}
