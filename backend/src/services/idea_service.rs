use crate::models::{ApiError, IdeaStatus, IdeaUpdate, NewIdea, VideoIdea};
use crate::services::store::{find_docs, get_doc, put_doc, DocumentStore, VIDEO_IDEAS_INDEX};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Most recently touched first.
pub async fn list_ideas(
    store: &dyn DocumentStore,
    user_id: &str,
) -> Result<Vec<VideoIdea>, ApiError> {
    let mut ideas: Vec<VideoIdea> =
        find_docs(store, VIDEO_IDEAS_INDEX, &[("user_id", user_id)]).await?;
    ideas.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(ideas)
}

async fn get_idea(
    store: &dyn DocumentStore,
    user_id: &str,
    id: &str,
) -> Result<VideoIdea, ApiError> {
    match get_doc::<VideoIdea>(store, VIDEO_IDEAS_INDEX, id).await? {
        Some(idea) if idea.user_id == user_id => Ok(idea),
        _ => Err(ApiError::NotFound(format!("Idea {id} not found"))),
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

pub async fn create_idea(
    store: &dyn DocumentStore,
    user_id: &str,
    new_idea: NewIdea,
    now: DateTime<Utc>,
) -> Result<VideoIdea, ApiError> {
    if new_idea.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Idea title cannot be empty".into()));
    }
    let idea = VideoIdea {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        title: new_idea.title,
        description: new_idea.description,
        status: IdeaStatus::Idea,
        tags: normalize_tags(new_idea.tags),
        created_at: now,
        updated_at: now,
    };
    put_doc(store, VIDEO_IDEAS_INDEX, &idea.id, &idea).await?;
    Ok(idea)
}

pub async fn update_idea(
    store: &dyn DocumentStore,
    user_id: &str,
    id: &str,
    mut update: IdeaUpdate,
    now: DateTime<Utc>,
) -> Result<VideoIdea, ApiError> {
    update.tags = update.tags.map(normalize_tags);
    let idea = get_idea(store, user_id, id).await?.apply(update, now)?;
    put_doc(store, VIDEO_IDEAS_INDEX, &idea.id, &idea).await?;
    Ok(idea)
}

pub async fn delete_idea(
    store: &dyn DocumentStore,
    user_id: &str,
    id: &str,
) -> Result<(), ApiError> {
    get_idea(store, user_id, id).await?;
    store.delete(VIDEO_IDEAS_INDEX, id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap()
    }

    fn new_idea(title: &str, tags: &[&str]) -> NewIdea {
        NewIdea {
            title: title.into(),
            description: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn new_ideas_start_in_idea_status() {
        let store = MemoryStore::new();
        let draft = new_idea("Tier list", &["Ranking", " ranking ", ""]);
        let idea = create_idea(&store, "u1", draft, now()).await.unwrap();
        assert_eq!(idea.status, IdeaStatus::Idea);
        assert_eq!(idea.tags, vec!["ranking"]);

        let blank = create_idea(&store, "u1", new_idea(" ", &[]), now()).await;
        assert!(matches!(blank, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn update_moves_idea_through_pipeline() {
        let store = MemoryStore::new();
        let first = create_idea(&store, "u1", new_idea("Deck build", &[]), now())
            .await
            .unwrap();
        create_idea(&store, "u1", new_idea("Pack opening", &[]), now())
            .await
            .unwrap();

        let later = now() + Duration::hours(1);
        let updated = update_idea(
            &store,
            "u1",
            &first.id,
            IdeaUpdate {
                status: Some(IdeaStatus::Scripting),
                ..Default::default()
            },
            later,
        )
        .await
        .unwrap();
        assert_eq!(updated.status, IdeaStatus::Scripting);
        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.created_at, now());

        let listed = list_ideas(&store, "u1").await.unwrap();
        assert_eq!(listed[0].id, first.id);
    }

    #[tokio::test]
    async fn other_users_cannot_touch_ideas() {
        let store = MemoryStore::new();
        let idea = create_idea(&store, "u1", new_idea("Collab", &[]), now())
            .await
            .unwrap();

        let foreign = update_idea(&store, "u2", &idea.id, IdeaUpdate::default(), now()).await;
        assert!(matches!(foreign, Err(ApiError::NotFound(_))));
        assert!(matches!(
            delete_idea(&store, "u2", &idea.id).await,
            Err(ApiError::NotFound(_))
        ));

        delete_idea(&store, "u1", &idea.id).await.unwrap();
        assert!(list_ideas(&store, "u1").await.unwrap().is_empty());
    }
}
