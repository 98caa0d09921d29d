use crate::models::{ApiError, AuthUser, SettingsUpdate, SettingsView};
use crate::services::settings_service::{get_settings, settings_view, update_settings};
use crate::AppState;
use chrono::Utc;
use rocket::serde::json::Json;
use rocket::{get, put, State};

#[get("/")]
pub async fn get_user_settings(
    user: AuthUser,
    state: &State<AppState>,
) -> Result<Json<SettingsView>, ApiError> {
    let settings = get_settings(state.store.as_ref(), &user.0).await?;
    Ok(Json(settings_view(
        settings.as_ref(),
        state.config.youtube_api_key.as_deref(),
    )))
}

#[put("/", data = "<update>")]
pub async fn update_user_settings(
    user: AuthUser,
    state: &State<AppState>,
    update: Json<SettingsUpdate>,
) -> Result<Json<SettingsView>, ApiError> {
    let saved = update_settings(
        state.store.as_ref(),
        &user.0,
        update.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(Json(settings_view(
        Some(&saved),
        state.config.youtube_api_key.as_deref(),
    )))
}
