use crate::models::{ApiError, NewTask, Task, TaskCompletion, TaskUpdate};
use crate::services::leveling_service::{apply_task_completion, RewardTable};
use crate::services::progress_service::{get_user_stats, save_user_stats, unlock_achievements};
use crate::services::store::{find_docs, get_doc, put_doc, DocumentStore, TASKS_INDEX};
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use uuid::Uuid;

const DEFAULT_ESTIMATED_MINUTES: i64 = 30;

/// Open tasks first, then by due date (undated last), then oldest first.
pub async fn list_tasks(store: &dyn DocumentStore, user_id: &str) -> Result<Vec<Task>, ApiError> {
    let mut tasks: Vec<Task> = find_docs(store, TASKS_INDEX, &[("user_id", user_id)]).await?;
    tasks.sort_by(|a, b| {
        a.completed
            .cmp(&b.completed)
            .then_with(|| match (a.due_date, b.due_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    Ok(tasks)
}

async fn get_task(store: &dyn DocumentStore, user_id: &str, id: &str) -> Result<Task, ApiError> {
    match get_doc::<Task>(store, TASKS_INDEX, id).await? {
        Some(task) if task.user_id == user_id => Ok(task),
        _ => Err(ApiError::NotFound(format!("Task {id} not found"))),
    }
}

pub async fn create_task(
    store: &dyn DocumentStore,
    user_id: &str,
    new_task: NewTask,
    now: DateTime<Utc>,
) -> Result<Task, ApiError> {
    if new_task.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Task title cannot be empty".into()));
    }
    let estimated_minutes = new_task
        .estimated_minutes
        .unwrap_or(DEFAULT_ESTIMATED_MINUTES);
    if estimated_minutes <= 0 {
        return Err(ApiError::BadRequest(
            "Estimated minutes must be positive".into(),
        ));
    }

    let task = Task {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        title: new_task.title,
        description: new_task.description,
        category: new_task.category,
        priority: new_task.priority,
        estimated_minutes,
        due_date: new_task.due_date,
        completed: false,
        completed_at: None,
        xp_awarded: 0,
        created_at: now,
    };
    put_doc(store, TASKS_INDEX, &task.id, &task).await?;
    Ok(task)
}

pub async fn update_task(
    store: &dyn DocumentStore,
    user_id: &str,
    id: &str,
    update: TaskUpdate,
) -> Result<Task, ApiError> {
    let task = get_task(store, user_id, id).await?.apply(update)?;
    put_doc(store, TASKS_INDEX, &task.id, &task).await?;
    Ok(task)
}

pub async fn delete_task(
    store: &dyn DocumentStore,
    user_id: &str,
    id: &str,
) -> Result<(), ApiError> {
    get_task(store, user_id, id).await?;
    store.delete(TASKS_INDEX, id).await?;
    Ok(())
}

/// Marks a task done and pays out its XP plus any achievements it unlocks.
pub async fn complete_task(
    store: &dyn DocumentStore,
    user_id: &str,
    id: &str,
    rewards: &RewardTable,
    now: DateTime<Utc>,
) -> Result<TaskCompletion, ApiError> {
    let mut task = get_task(store, user_id, id).await?;
    if task.completed {
        return Err(ApiError::Conflict(format!("Task {id} is already completed")));
    }

    let reward = rewards.task_reward(&task);
    task.completed = true;
    task.completed_at = Some(now);
    task.xp_awarded = reward;
    // Persist the task first so a retry after a partial failure cannot pay twice.
    put_doc(store, TASKS_INDEX, &task.id, &task).await?;

    let stats = get_user_stats(store, user_id).await?;
    let (mut stats, level_up) = apply_task_completion(&stats, reward, now.date_naive());
    let level_before_bonus = stats.level;
    let unlocked_achievements = unlock_achievements(store, &mut stats, now).await?;
    save_user_stats(store, &stats).await?;

    info!(
        "{user_id} completed '{}' for {reward} XP (level {})",
        task.title, stats.level
    );

    Ok(TaskCompletion {
        task,
        xp_awarded: reward,
        level_up: level_up || stats.level > level_before_bonus,
        stats,
        unlocked_achievements,
    })
}

pub async fn tasks_completed_on(
    store: &dyn DocumentStore,
    user_id: &str,
    date: NaiveDate,
) -> Result<i64, ApiError> {
    let tasks: Vec<Task> = find_docs(store, TASKS_INDEX, &[("user_id", user_id)]).await?;
    Ok(tasks
        .iter()
        .filter(|t| t.completed_at.is_some_and(|at| at.date_naive() == date))
        .count() as i64)
}
