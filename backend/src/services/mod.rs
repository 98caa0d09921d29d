pub mod cache;
pub mod elasticsearch_service;
pub mod goals_service;
pub mod idea_service;
pub mod leveling_service;
pub mod milestone_service;
pub mod progress_service;
pub mod quota_service;
pub mod refresh_service;
pub mod settings_service;
pub mod stats_service;
pub mod store;
pub mod task_service;
pub mod youtube_service;
