use crate::models::{ApiError, AuthUser, NewTask, Task, TaskCompletion, TaskUpdate};
use crate::services::task_service;
use crate::AppState;
use chrono::Utc;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, State};

#[get("/")]
pub async fn list_tasks(
    user: AuthUser,
    state: &State<AppState>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(task_service::list_tasks(state.store.as_ref(), &user.0).await?))
}

#[post("/", data = "<new_task>")]
pub async fn create_task(
    user: AuthUser,
    state: &State<AppState>,
    new_task: Json<NewTask>,
) -> Result<Json<Task>, ApiError> {
    let task = task_service::create_task(
        state.store.as_ref(),
        &user.0,
        new_task.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(Json(task))
}

#[put("/<id>", data = "<update>")]
pub async fn update_task(
    user: AuthUser,
    state: &State<AppState>,
    id: &str,
    update: Json<TaskUpdate>,
) -> Result<Json<Task>, ApiError> {
    let task =
        task_service::update_task(state.store.as_ref(), &user.0, id, update.into_inner()).await?;
    Ok(Json(task))
}

#[delete("/<id>")]
pub async fn delete_task(
    user: AuthUser,
    state: &State<AppState>,
    id: &str,
) -> Result<Status, ApiError> {
    task_service::delete_task(state.store.as_ref(), &user.0, id).await?;
    Ok(Status::NoContent)
}

#[post("/<id>/complete")]
pub async fn complete_task(
    user: AuthUser,
    state: &State<AppState>,
    id: &str,
) -> Result<Json<TaskCompletion>, ApiError> {
    let completion = task_service::complete_task(
        state.store.as_ref(),
        &user.0,
        id,
        &state.rewards,
        Utc::now(),
    )
    .await?;
    Ok(Json(completion))
}
