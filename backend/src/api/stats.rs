use crate::models::{
    ApiError, AuthUser, DailyStats, Milestone, QuotaStatus, ResolvedStats, ResolvedVideos,
    StatsSource,
};
use crate::services::milestone_service::list_milestones;
use crate::services::quota_service::quota_status;
use crate::services::settings_service::{effective_api_key, get_settings};
use crate::services::stats_service::{
    daily_history, force_refresh_channel_stats, resolve_channel_stats, resolve_video_stats,
};
use crate::AppState;
use chrono::Utc;
use log::warn;
use rocket::serde::json::Json;
use rocket::{get, post, State};

const NO_CHANNEL: &str = "No YouTube channel configured";

/// The configured channel and the key to fetch it with, if any.
struct ChannelTarget {
    channel_id: Option<String>,
    api_key: Option<String>,
}

async fn channel_target(state: &AppState, user_id: &str) -> ChannelTarget {
    let settings = match get_settings(state.store.as_ref(), user_id).await {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Failed to load settings for {user_id}: {e:#}");
            None
        }
    };
    ChannelTarget {
        channel_id: settings.as_ref().and_then(|s| s.channel_id.clone()),
        api_key: effective_api_key(settings.as_ref(), state.config.youtube_api_key.as_deref())
            .map(str::to_string),
    }
}

#[get("/channel")]
pub async fn channel_stats(user: AuthUser, state: &State<AppState>) -> Json<ResolvedStats> {
    let target = channel_target(state, &user.0).await;
    let Some(channel_id) = target.channel_id else {
        return Json(ResolvedStats::empty(NO_CHANNEL));
    };
    let resolved = resolve_channel_stats(
        &state.stats_context(),
        &user.0,
        &channel_id,
        target.api_key.as_deref(),
        Utc::now(),
    )
    .await;
    Json(resolved)
}

#[post("/refresh")]
pub async fn refresh_stats(
    user: AuthUser,
    state: &State<AppState>,
) -> Result<Json<ResolvedStats>, ApiError> {
    let target = channel_target(state, &user.0).await;
    let channel_id = target
        .channel_id
        .ok_or_else(|| ApiError::BadRequest(NO_CHANNEL.into()))?;
    let resolved = force_refresh_channel_stats(
        &state.stats_context(),
        &user.0,
        &channel_id,
        target.api_key.as_deref(),
        Utc::now(),
    )
    .await;
    Ok(Json(resolved))
}

#[get("/videos")]
pub async fn video_stats(user: AuthUser, state: &State<AppState>) -> Json<ResolvedVideos> {
    let target = channel_target(state, &user.0).await;
    let Some(channel_id) = target.channel_id else {
        return Json(ResolvedVideos {
            videos: Vec::new(),
            source: StatsSource::Cache,
            last_updated: None,
            message: None,
            error: Some(NO_CHANNEL.into()),
        });
    };
    let resolved = resolve_video_stats(
        &state.stats_context(),
        &user.0,
        &channel_id,
        target.api_key.as_deref(),
        Utc::now(),
    )
    .await;
    Json(resolved)
}

#[get("/quota")]
pub async fn quota(user: AuthUser, state: &State<AppState>) -> Result<Json<QuotaStatus>, ApiError> {
    let today = Utc::now().date_naive();
    let status = quota_status(state.store.as_ref(), &user.0, today, &state.config.quota).await?;
    Ok(Json(status))
}

#[get("/milestones")]
pub async fn milestones(
    user: AuthUser,
    state: &State<AppState>,
) -> Result<Json<Vec<Milestone>>, ApiError> {
    let Some(channel_id) = channel_target(state, &user.0).await.channel_id else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(list_milestones(state.store.as_ref(), &user.0, &channel_id).await?))
}

#[get("/history")]
pub async fn history(
    user: AuthUser,
    state: &State<AppState>,
) -> Result<Json<Vec<DailyStats>>, ApiError> {
    let Some(channel_id) = channel_target(state, &user.0).await.channel_id else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(daily_history(state.store.as_ref(), &user.0, &channel_id).await?))
}
