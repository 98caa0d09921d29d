use crate::models::{ApiError, SettingsUpdate, SettingsView, UserSettings};
use crate::services::store::{find_docs, get_doc, put_doc, DocumentStore, USER_SETTINGS_INDEX};
use crate::utils::extract_youtube_channel_id;
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;

pub async fn get_settings(
    store: &dyn DocumentStore,
    user_id: &str,
) -> Result<Option<UserSettings>> {
    get_doc(store, USER_SETTINGS_INDEX, user_id).await
}

/// Every user that has saved settings; the background refresh walks this.
pub async fn list_all_settings(store: &dyn DocumentStore) -> Result<Vec<UserSettings>> {
    find_docs(store, USER_SETTINGS_INDEX, &[]).await
}

fn blank_to_none(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub async fn update_settings(
    store: &dyn DocumentStore,
    user_id: &str,
    update: SettingsUpdate,
    now: DateTime<Utc>,
) -> Result<UserSettings, ApiError> {
    let mut settings = get_settings(store, user_id)
        .await?
        .unwrap_or_else(|| UserSettings {
            user_id: user_id.to_string(),
            channel_id: None,
            api_key: None,
            updated_at: now,
        });

    if let Some(channel) = update.channel {
        settings.channel_id = match blank_to_none(channel) {
            Some(input) => Some(extract_youtube_channel_id(&input).ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "'{input}' is not a YouTube channel id or channel URL"
                ))
            })?),
            None => None,
        };
    }
    if let Some(api_key) = update.api_key {
        settings.api_key = blank_to_none(api_key);
    }
    settings.updated_at = now;

    put_doc(store, USER_SETTINGS_INDEX, user_id, &settings).await?;
    info!(
        "Saved settings for {user_id} (channel: {})",
        settings.channel_id.as_deref().unwrap_or("none")
    );
    Ok(settings)
}

/// The per-user key wins over the server-wide default.
pub fn effective_api_key<'a>(
    settings: Option<&'a UserSettings>,
    default_key: Option<&'a str>,
) -> Option<&'a str> {
    settings
        .and_then(|s| s.api_key.as_deref())
        .filter(|k| !k.is_empty())
        .or(default_key.filter(|k| !k.is_empty()))
}

pub fn settings_view(settings: Option<&UserSettings>, default_key: Option<&str>) -> SettingsView {
    let own_key = settings.is_some_and(|s| s.api_key.as_deref().is_some_and(|k| !k.is_empty()));
    SettingsView {
        channel_id: settings.and_then(|s| s.channel_id.clone()),
        has_api_key: effective_api_key(settings, default_key).is_some(),
        using_default_api_key: !own_key && default_key.is_some_and(|k| !k.is_empty()),
        updated_at: settings.map(|s| s.updated_at),
    }
}
