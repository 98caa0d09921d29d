use chrono::{DateTime, NaiveDate, Utc};
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::Responder;
use rocket::{response, Response};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// The user a request was authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

/// Which tier produced a [`ResolvedStats`] payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsSource {
    Api,
    Cache,
    Historical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub channel_id: String,
    pub channel_title: String,
    pub subscriber_count: i64,
    pub video_count: i64,
    pub total_views: i64,
    pub custom_url: Option<String>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSnapshot {
    pub video_id: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub duration_minutes: i64,
}

/// Quota units spent against the YouTube API on one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyQuotaUsage {
    pub user_id: String,
    pub date: NaiveDate,
    pub quota_used: i64,
    pub calls_made: i64,
}

/// Selector output. Either `stats` is populated and `source` says where it
/// came from, or `stats` is `None` and `error` explains why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStats {
    pub stats: Option<ChannelSnapshot>,
    pub source: StatsSource,
    pub last_updated: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ResolvedStats {
    pub fn found(stats: ChannelSnapshot, source: StatsSource) -> Self {
        let last_updated = Some(stats.captured_at);
        ResolvedStats {
            stats: Some(stats),
            source,
            last_updated,
            message: None,
            error: None,
        }
    }

    pub fn empty(error: impl Into<String>) -> Self {
        ResolvedStats {
            stats: None,
            source: StatsSource::Cache,
            last_updated: None,
            message: None,
            error: Some(error.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedVideos {
    pub videos: Vec<VideoSnapshot>,
    pub source: StatsSource,
    pub last_updated: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// One row per (user, channel, date). The latest row before today is the
/// "historical" tier of the selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub user_id: String,
    pub channel_id: String,
    pub date: NaiveDate,
    pub subscriber_count: i64,
    pub total_views: i64,
    pub video_count: i64,
    pub subscriber_delta: i64,
    pub views_delta: i64,
    pub videos_published: i64,
    pub recorded_at: DateTime<Utc>,
}

impl DailyStats {
    pub fn to_snapshot(&self, channel_title: &str) -> ChannelSnapshot {
        ChannelSnapshot {
            channel_id: self.channel_id.clone(),
            channel_title: channel_title.to_string(),
            subscriber_count: self.subscriber_count,
            video_count: self.video_count,
            total_views: self.total_views,
            custom_url: None,
            captured_at: self.recorded_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneKind {
    Subscribers,
    Views,
    Videos,
}

impl MilestoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneKind::Subscribers => "subscribers",
            MilestoneKind::Views => "views",
            MilestoneKind::Videos => "videos",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub user_id: String,
    pub channel_id: String,
    pub kind: MilestoneKind,
    pub value: i64,
    pub reached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub date: NaiveDate,
    pub quota_used: i64,
    pub calls_made: i64,
    pub daily_budget: i64,
    pub threshold: i64,
    pub exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Filming,
    Editing,
    Scripting,
    Research,
    Community,
    Admin,
    Personal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub priority: Priority,
    pub estimated_minutes: i64,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub xp_awarded: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub priority: Priority,
    pub estimated_minutes: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<TaskCategory>,
    pub priority: Option<Priority>,
    pub estimated_minutes: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

impl Task {
    /// Applies a partial update. Completion state is not editable here.
    pub fn apply(&self, update: TaskUpdate) -> Result<Task, ApiError> {
        let mut task = self.clone();
        if let Some(title) = update.title {
            if title.trim().is_empty() {
                return Err(ApiError::BadRequest("Task title cannot be empty".into()));
            }
            task.title = title;
        }
        if let Some(minutes) = update.estimated_minutes {
            if minutes <= 0 {
                return Err(ApiError::BadRequest(
                    "Estimated minutes must be positive".into(),
                ));
            }
            task.estimated_minutes = minutes;
        }
        if update.description.is_some() {
            task.description = update.description;
        }
        if let Some(category) = update.category {
            task.category = category;
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if update.due_date.is_some() {
            task.due_date = update.due_date;
        }
        Ok(task)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub task: Task,
    pub xp_awarded: i64,
    pub level_up: bool,
    pub stats: UserStats,
    pub unlocked_achievements: Vec<AchievementView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub level: i64,
    pub current_xp: i64,
    pub xp_to_next_level: i64,
    pub total_tasks_completed: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_completed_on: Option<NaiveDate>,
}

impl UserStats {
    pub fn new(user_id: &str) -> Self {
        UserStats {
            user_id: user_id.to_string(),
            level: 1,
            current_xp: 0,
            xp_to_next_level: 100,
            total_tasks_completed: 0,
            current_streak: 0,
            longest_streak: 0,
            last_completed_on: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockedAchievement {
    pub user_id: String,
    pub achievement_id: String,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub xp_reward: i64,
    pub unlocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserGoals {
    pub user_id: String,
    pub weekly_upload_target: i64,
    pub daily_views_target: i64,
    pub subscriber_target: i64,
    pub daily_task_target: i64,
}

impl UserGoals {
    pub fn new(user_id: &str) -> Self {
        UserGoals {
            user_id: user_id.to_string(),
            weekly_upload_target: 2,
            daily_views_target: 1_000,
            subscriber_target: 10_000,
            daily_task_target: 3,
        }
    }

    /// Merges a partial update into a copy of these goals.
    pub fn apply(&self, update: &GoalsUpdate) -> Result<UserGoals, ApiError> {
        fn target(name: &str, value: Option<i64>, current: i64) -> Result<i64, ApiError> {
            match value {
                Some(v) if v <= 0 => Err(ApiError::BadRequest(format!(
                    "{name} must be greater than zero"
                ))),
                Some(v) => Ok(v),
                None => Ok(current),
            }
        }

        Ok(UserGoals {
            user_id: self.user_id.clone(),
            weekly_upload_target: target(
                "weekly_upload_target",
                update.weekly_upload_target,
                self.weekly_upload_target,
            )?,
            daily_views_target: target(
                "daily_views_target",
                update.daily_views_target,
                self.daily_views_target,
            )?,
            subscriber_target: target(
                "subscriber_target",
                update.subscriber_target,
                self.subscriber_target,
            )?,
            daily_task_target: target(
                "daily_task_target",
                update.daily_task_target,
                self.daily_task_target,
            )?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalsUpdate {
    pub weekly_upload_target: Option<i64>,
    pub daily_views_target: Option<i64>,
    pub subscriber_target: Option<i64>,
    pub daily_task_target: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyProgress {
    pub week_start: NaiveDate,
    pub uploads_this_week: i64,
    pub weekly_upload_target: i64,
    pub goal_met: bool,
    pub tasks_completed_today: i64,
    pub daily_task_target: i64,
    pub source: StatsSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeaStatus {
    Idea,
    Scripting,
    Filming,
    Editing,
    Published,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoIdea {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: IdeaStatus,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdea {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdeaUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<IdeaStatus>,
    pub tags: Option<Vec<String>>,
}

impl VideoIdea {
    pub fn apply(&self, update: IdeaUpdate, now: DateTime<Utc>) -> Result<VideoIdea, ApiError> {
        let mut idea = self.clone();
        if let Some(title) = update.title {
            if title.trim().is_empty() {
                return Err(ApiError::BadRequest("Idea title cannot be empty".into()));
            }
            idea.title = title;
        }
        if update.description.is_some() {
            idea.description = update.description;
        }
        if let Some(status) = update.status {
            idea.status = status;
        }
        if let Some(tags) = update.tags {
            idea.tags = tags;
        }
        idea.updated_at = now;
        Ok(idea)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: String,
    pub channel_id: Option<String>,
    pub api_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    /// A channel id or channel URL. An empty string clears it.
    pub channel: Option<String>,
    /// An empty string clears the override.
    pub api_key: Option<String>,
}

/// What the API reveals about settings; the key itself never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsView {
    pub channel_id: Option<String>,
    pub has_api_key: bool,
    pub using_default_api_key: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Conflict(_) => Status::Conflict,
            ApiError::Internal(_) => Status::InternalServerError,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{e:#}"))
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status == Status::InternalServerError {
            log::error!("Request failed: {self}");
        }
        let body = ErrorResponse {
            error: status.reason().unwrap_or("Error").to_string(),
            message: self.to_string(),
        };
        let json = serde_json::to_string(&body).map_err(|_| Status::InternalServerError)?;
        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}
