use crate::models::{ApiError, AuthUser, GoalsUpdate, UserGoals, WeeklyProgress};
use crate::services::goals_service;
use crate::services::settings_service::get_settings;
use crate::AppState;
use chrono::Utc;
use rocket::serde::json::Json;
use rocket::{get, put, State};

#[get("/")]
pub async fn get_goals(
    user: AuthUser,
    state: &State<AppState>,
) -> Result<Json<UserGoals>, ApiError> {
    Ok(Json(goals_service::get_goals(state.store.as_ref(), &user.0).await?))
}

#[put("/", data = "<update>")]
pub async fn update_goals(
    user: AuthUser,
    state: &State<AppState>,
    update: Json<GoalsUpdate>,
) -> Result<Json<UserGoals>, ApiError> {
    Ok(Json(
        goals_service::update_goals(state.store.as_ref(), &user.0, &update).await?,
    ))
}

#[get("/progress")]
pub async fn weekly_progress(
    user: AuthUser,
    state: &State<AppState>,
) -> Result<Json<WeeklyProgress>, ApiError> {
    let settings = get_settings(state.store.as_ref(), &user.0).await?;
    let channel_id = settings.and_then(|s| s.channel_id);
    let progress = goals_service::weekly_progress(
        state.store.as_ref(),
        &user.0,
        channel_id.as_deref(),
        Utc::now(),
    )
    .await?;
    Ok(Json(progress))
}
