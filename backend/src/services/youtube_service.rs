use crate::models::{ChannelSnapshot, VideoSnapshot};
use crate::utils::{parse_iso8601_duration_to_minutes, parse_iso8601_to_datetime};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::Client;
use serde_json::Value;

const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Quota units charged per request type.
pub const CHANNELS_COST: i64 = 1;
pub const SEARCH_COST: i64 = 100;
pub const VIDEOS_COST: i64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("YouTube API quota exceeded")]
    QuotaExceeded,
    #[error("YouTube API rejected the request: {0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("YouTube API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected YouTube API response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn is_quota(&self) -> bool {
        matches!(self, FetchError::QuotaExceeded)
    }
}

/// API key and channel a live fetch runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub api_key: String,
    pub channel_id: String,
}

#[rocket::async_trait]
pub trait YouTubeApi: Send + Sync {
    async fn fetch_channel(
        &self,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<ChannelSnapshot, FetchError>;

    /// Ids of the most recent uploads. One search request.
    async fn search_recent_video_ids(
        &self,
        credentials: &Credentials,
        max_results: usize,
    ) -> Result<Vec<String>, FetchError>;

    /// Details for the given ids, newest first. One videos request.
    async fn fetch_videos(
        &self,
        credentials: &Credentials,
        video_ids: &[String],
    ) -> Result<Vec<VideoSnapshot>, FetchError>;
}

pub struct YouTubeClient {
    client: Client,
    base_url: String,
}

impl Default for YouTubeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeClient {
    pub fn new() -> Self {
        Self::with_base_url(YOUTUBE_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        YouTubeClient {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(
        &self,
        endpoint: &str,
        api_key: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, FetchError> {
        let url = format!("{}/{endpoint}", self.base_url);
        debug!("YouTube API request: {endpoint} {params:?}");

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", api_key)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body, endpoint));
        }

        Ok(response.json::<Value>().await?)
    }
}

#[rocket::async_trait]
impl YouTubeApi for YouTubeClient {
    async fn fetch_channel(
        &self,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<ChannelSnapshot, FetchError> {
        // Documentation: https://developers.google.com/youtube/v3/docs/channels
        let response = self
            .get_json(
                "channels",
                &credentials.api_key,
                &[
                    ("part", "snippet,statistics"),
                    ("id", credentials.channel_id.as_str()),
                ],
            )
            .await?;

        parse_channel_response(&response, &credentials.channel_id, now)
    }

    async fn search_recent_video_ids(
        &self,
        credentials: &Credentials,
        max_results: usize,
    ) -> Result<Vec<String>, FetchError> {
        let max_results = max_results.clamp(1, 50).to_string();

        // Documentation: https://developers.google.com/youtube/v3/docs/search
        let search = self
            .get_json(
                "search",
                &credentials.api_key,
                &[
                    ("part", "id"),
                    ("channelId", credentials.channel_id.as_str()),
                    ("order", "date"),
                    ("type", "video"),
                    ("maxResults", max_results.as_str()),
                ],
            )
            .await?;

        Ok(parse_search_video_ids(&search))
    }

    async fn fetch_videos(
        &self,
        credentials: &Credentials,
        video_ids: &[String],
    ) -> Result<Vec<VideoSnapshot>, FetchError> {
        // Documentation: https://developers.google.com/youtube/v3/docs/videos
        let ids = video_ids.join(",");
        let videos = self
            .get_json(
                "videos",
                &credentials.api_key,
                &[
                    ("part", "snippet,statistics,contentDetails"),
                    ("id", ids.as_str()),
                ],
            )
            .await?;

        Ok(parse_videos_response(&videos))
    }
}

/// A 403 mentioning "quota" is the platform's way of saying the daily budget is gone.
pub fn classify_error(status: u16, body: &str, what: &str) -> FetchError {
    match status {
        403 if body.to_lowercase().contains("quota") => FetchError::QuotaExceeded,
        400 | 401 | 403 => FetchError::Unauthorized(format!("{what} returned {status}")),
        404 => FetchError::NotFound(what.to_string()),
        _ => FetchError::Malformed(format!("{what} returned {status}")),
    }
}

fn count(value: &Value) -> i64 {
    value.as_str().unwrap_or("0").parse().unwrap_or(0)
}

pub fn parse_channel_response(
    response: &Value,
    channel_id: &str,
    now: DateTime<Utc>,
) -> Result<ChannelSnapshot, FetchError> {
    let item = response["items"]
        .as_array()
        .and_then(|items| items.first())
        .ok_or_else(|| FetchError::NotFound(format!("Channel {channel_id}")))?;

    Ok(ChannelSnapshot {
        channel_id: item["id"].as_str().unwrap_or(channel_id).to_string(),
        channel_title: item["snippet"]["title"].as_str().unwrap_or("").to_string(),
        subscriber_count: count(&item["statistics"]["subscriberCount"]),
        video_count: count(&item["statistics"]["videoCount"]),
        total_views: count(&item["statistics"]["viewCount"]),
        custom_url: item["snippet"]["customUrl"].as_str().map(String::from),
        captured_at: now,
    })
}

pub fn parse_search_video_ids(response: &Value) -> Vec<String> {
    response["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["id"]["videoId"].as_str())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_videos_response(response: &Value) -> Vec<VideoSnapshot> {
    let Some(items) = response["items"].as_array() else {
        return Vec::new();
    };

    let mut videos = Vec::new();
    for item in items {
        let Some(video_id) = item["id"].as_str() else {
            continue;
        };
        let Some(published_at) =
            parse_iso8601_to_datetime(item["snippet"]["publishedAt"].as_str().unwrap_or(""))
        else {
            warn!("Skipping video {video_id} without a publish date");
            continue;
        };

        videos.push(VideoSnapshot {
            video_id: video_id.to_string(),
            title: item["snippet"]["title"].as_str().unwrap_or("").to_string(),
            published_at,
            view_count: count(&item["statistics"]["viewCount"]),
            like_count: count(&item["statistics"]["likeCount"]),
            comment_count: count(&item["statistics"]["commentCount"]),
            duration_minutes: parse_iso8601_duration_to_minutes(
                item["contentDetails"]["duration"].as_str().unwrap_or(""),
            ),
        });
    }
    videos.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    videos
}
