use crate::models::{AchievementView, ApiError, AuthUser, UserStats};
use crate::services::progress_service::{get_user_stats, list_achievements};
use crate::AppState;
use rocket::serde::json::Json;
use rocket::{get, State};

#[get("/")]
pub async fn user_progress(
    user: AuthUser,
    state: &State<AppState>,
) -> Result<Json<UserStats>, ApiError> {
    Ok(Json(get_user_stats(state.store.as_ref(), &user.0).await?))
}

#[get("/achievements")]
pub async fn achievements(
    user: AuthUser,
    state: &State<AppState>,
) -> Result<Json<Vec<AchievementView>>, ApiError> {
    Ok(Json(list_achievements(state.store.as_ref(), &user.0).await?))
}
