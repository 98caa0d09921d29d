#[macro_use]
extern crate rocket;

mod api;
mod config;
mod models;
mod services;
mod utils;

use crate::config::AppConfig;
use crate::services::leveling_service::RewardTable;
use crate::services::stats_service::StatsContext;
use crate::services::store::SharedStore;
use crate::services::youtube_service::YouTubeApi;
use rocket::{Build, Rocket};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::JobScheduler;

pub struct AppState {
    pub store: SharedStore,
    pub youtube: Arc<dyn YouTubeApi>,
    pub config: AppConfig,
    pub rewards: RewardTable,
    /// Kept alive for the server's lifetime; `None` when no refresh job runs.
    pub scheduler: Mutex<Option<JobScheduler>>,
}

impl AppState {
    pub fn stats_context(&self) -> StatsContext<'_> {
        StatsContext::new(self.store.as_ref(), self.youtube.as_ref(), self.config.quota)
    }
}

pub fn build_rocket(state: AppState) -> Rocket<Build> {
    rocket::build()
        .manage(state)
        .mount(
            "/stats",
            routes![
                api::stats::channel_stats,
                api::stats::refresh_stats,
                api::stats::video_stats,
                api::stats::quota,
                api::stats::milestones,
                api::stats::history,
            ],
        )
        .mount(
            "/tasks",
            routes![
                api::tasks::list_tasks,
                api::tasks::create_task,
                api::tasks::update_task,
                api::tasks::delete_task,
                api::tasks::complete_task,
            ],
        )
        .mount(
            "/goals",
            routes![
                api::goals::get_goals,
                api::goals::update_goals,
                api::goals::weekly_progress,
            ],
        )
        .mount(
            "/ideas",
            routes![
                api::ideas::list_ideas,
                api::ideas::create_idea,
                api::ideas::update_idea,
                api::ideas::delete_idea,
            ],
        )
        .mount(
            "/settings",
            routes![
                api::settings::get_user_settings,
                api::settings::update_user_settings,
            ],
        )
        .mount(
            "/progress",
            routes![api::progress::user_progress, api::progress::achievements],
        )
}

#[launch]
async fn rocket() -> _ {
    config::load_environment();
    config::init_logger();

    let app_config = match AppConfig::from_env() {
        Ok(app_config) => app_config,
        Err(e) => {
            log::error!("Invalid configuration: {e:#}");
            std::process::exit(1);
        }
    };

    let cors = match config::create_cors(&app_config.cors_origin) {
        Ok(cors) => cors,
        Err(e) => {
            log::error!("{e:#}");
            std::process::exit(1);
        }
    };

    let app_state = match config::create_app_state(app_config).await {
        Ok(state) => state,
        Err(e) => {
            log::error!("Failed to initialise application state: {e:#}");
            std::process::exit(1);
        }
    };

    build_rocket(app_state).attach(cors)
}
