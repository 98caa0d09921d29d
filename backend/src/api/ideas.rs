use crate::models::{ApiError, AuthUser, IdeaUpdate, NewIdea, VideoIdea};
use crate::services::idea_service;
use crate::AppState;
use chrono::Utc;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, State};

#[get("/")]
pub async fn list_ideas(
    user: AuthUser,
    state: &State<AppState>,
) -> Result<Json<Vec<VideoIdea>>, ApiError> {
    Ok(Json(idea_service::list_ideas(state.store.as_ref(), &user.0).await?))
}

#[post("/", data = "<new_idea>")]
pub async fn create_idea(
    user: AuthUser,
    state: &State<AppState>,
    new_idea: Json<NewIdea>,
) -> Result<Json<VideoIdea>, ApiError> {
    let idea = idea_service::create_idea(
        state.store.as_ref(),
        &user.0,
        new_idea.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(Json(idea))
}

#[put("/<id>", data = "<update>")]
pub async fn update_idea(
    user: AuthUser,
    state: &State<AppState>,
    id: &str,
    update: Json<IdeaUpdate>,
) -> Result<Json<VideoIdea>, ApiError> {
    let idea = idea_service::update_idea(
        state.store.as_ref(),
        &user.0,
        id,
        update.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(Json(idea))
}

#[delete("/<id>")]
pub async fn delete_idea(
    user: AuthUser,
    state: &State<AppState>,
    id: &str,
) -> Result<Status, ApiError> {
    idea_service::delete_idea(state.store.as_ref(), &user.0, id).await?;
    Ok(Status::NoContent)
}
