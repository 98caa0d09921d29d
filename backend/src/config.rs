use crate::models::AuthUser;
use crate::services::elasticsearch_service::{create_es_indices, EsStore};
use crate::services::leveling_service::RewardTable;
use crate::services::quota_service::{QuotaPolicy, DEFAULT_DAILY_BUDGET, DEFAULT_THRESHOLD_RATIO};
use crate::services::refresh_service::{
    RefreshJob, DEFAULT_REFRESH_INTERVAL_MINUTES, DEFAULT_REFRESH_SCHEDULE,
};
use crate::services::store::{MemoryStore, SharedStore};
use crate::services::youtube_service::YouTubeClient;
use crate::AppState;
use anyhow::{anyhow, bail, Result};
use chrono::{Duration, Utc};
use elasticsearch::{
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    Elasticsearch,
};
use env_logger::Builder;
use log::{error, info, LevelFilter};
use rocket::http::{Method, Status};
use rocket::request::{FromRequest, Outcome};
use rocket::Request;
use rocket_cors::{AllowedHeaders, AllowedOrigins, CorsOptions};
use std::env;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Elasticsearch,
}

/// Everything read from the environment, parsed once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server-wide fallback when a user has not saved their own key.
    pub youtube_api_key: Option<String>,
    pub access_token: String,
    pub user_id: String,
    pub elasticsearch_url: String,
    pub storage: StorageBackend,
    pub quota: QuotaPolicy,
    pub refresh_schedule: String,
    pub refresh_interval: Duration,
    pub cors_origin: String,
}

impl AppConfig {
    pub fn from_env() -> Result<AppConfig> {
        AppConfig::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<AppConfig> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let access_token = var("ACCESS_TOKEN")
            .ok_or_else(|| anyhow!("ACCESS_TOKEN environment variable must be set"))?;

        let storage = match var("STORAGE_BACKEND").as_deref() {
            None | Some("elasticsearch") => StorageBackend::Elasticsearch,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                bail!("Unknown STORAGE_BACKEND '{other}' (expected memory or elasticsearch)")
            }
        };

        let daily_budget = match var("DAILY_QUOTA_BUDGET") {
            Some(v) => v.parse::<i64>().ok().filter(|b| *b > 0).ok_or_else(|| {
                anyhow!("DAILY_QUOTA_BUDGET must be a positive integer, got '{v}'")
            })?,
            None => DEFAULT_DAILY_BUDGET,
        };

        let interval_minutes = match var("REFRESH_INTERVAL_MINUTES") {
            Some(v) => v.parse::<i64>().ok().filter(|m| *m > 0).ok_or_else(|| {
                anyhow!("REFRESH_INTERVAL_MINUTES must be a positive integer, got '{v}'")
            })?,
            None => DEFAULT_REFRESH_INTERVAL_MINUTES,
        };

        Ok(AppConfig {
            youtube_api_key: var("YOUTUBE_API_KEY"),
            access_token,
            user_id: var("USER_ID").unwrap_or_else(|| "default".to_string()),
            elasticsearch_url: var("ELASTICSEARCH_URL")
                .unwrap_or_else(|| "http://localhost:9200".to_string()),
            storage,
            quota: QuotaPolicy {
                daily_budget,
                threshold_ratio: DEFAULT_THRESHOLD_RATIO,
            },
            refresh_schedule: var("REFRESH_SCHEDULE")
                .unwrap_or_else(|| DEFAULT_REFRESH_SCHEDULE.to_string()),
            refresh_interval: Duration::minutes(interval_minutes),
            cors_origin: var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:8080".to_string()),
        })
    }
}

/// Level comes from `RUST_LOG`, defaulting to info.
pub fn init_logger() {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();
    info!("Starting PokeBim Motivator backend...");
}

pub fn load_environment() {
    dotenv::dotenv().ok();
}

pub fn create_elasticsearch_client(es_url: &str) -> Result<Elasticsearch> {
    info!("Connecting to Elasticsearch at: {es_url}");

    let transport =
        TransportBuilder::new(SingleNodeConnectionPool::new(es_url.parse()?)).build()?;

    Ok(Elasticsearch::new(transport))
}

pub async fn create_store(config: &AppConfig) -> Result<SharedStore> {
    match config.storage {
        StorageBackend::Memory => {
            info!("Using in-memory storage; data is lost on restart.");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Elasticsearch => {
            let es_client = create_elasticsearch_client(&config.elasticsearch_url)?;
            create_es_indices(&es_client).await;
            Ok(Arc::new(EsStore::new(es_client)))
        }
    }
}

pub async fn setup_refresh_scheduler(job: RefreshJob, schedule: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let refresh_job = Job::new_async(schedule, move |_uuid, _l| {
        let job = job.clone();
        Box::pin(async move {
            if let Err(e) = job.run(Utc::now()).await {
                error!("Background refresh failed: {e:#}");
            }
        })
    })?;

    scheduler.add(refresh_job).await?;
    scheduler.start().await?;
    info!("Refresh scheduler started ({schedule}).");

    Ok(scheduler)
}

pub async fn create_app_state(config: AppConfig) -> Result<AppState> {
    let store = create_store(&config).await?;
    let youtube = Arc::new(YouTubeClient::new());

    let job = RefreshJob {
        store: store.clone(),
        youtube: youtube.clone(),
        policy: config.quota,
        default_api_key: config.youtube_api_key.clone(),
        interval: config.refresh_interval,
    };
    let scheduler = setup_refresh_scheduler(job, &config.refresh_schedule).await?;

    Ok(AppState {
        store,
        youtube,
        config,
        rewards: RewardTable::default(),
        scheduler: Mutex::new(Some(scheduler)),
    })
}

pub fn create_cors(origin: &str) -> Result<rocket_cors::Cors> {
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::some_exact(&[origin]))
        .allowed_methods(
            vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Options,
            ]
            .into_iter()
            .map(From::from)
            .collect(),
        )
        .allowed_headers(AllowedHeaders::some(&[
            "Authorization",
            "Accept",
            "Content-Type",
        ]))
        .allow_credentials(true)
        .to_cors()
        .map_err(|e| anyhow!("Failed to create CORS options: {}", e))?;

    Ok(cors)
}

/// Single-owner deployment: one bearer token maps to the configured user.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = &'static str;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(state) = request.rocket().state::<AppState>() else {
            return Outcome::Error((Status::InternalServerError, "Missing application state"));
        };

        let token = request
            .headers()
            .get_one("Authorization")
            .and_then(|auth| auth.strip_prefix("Bearer "));

        match token {
            Some(t) if t == state.config.access_token => {
                Outcome::Success(AuthUser(state.config.user_id.clone()))
            }
            Some(_) => Outcome::Error((Status::Unauthorized, "Invalid token")),
            None => Outcome::Error((Status::Unauthorized, "Missing token")),
        }
    }
}
