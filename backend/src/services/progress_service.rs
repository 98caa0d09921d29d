use crate::models::{AchievementView, UnlockedAchievement, UserStats};
use crate::services::leveling_service::{add_xp, Achievement, ACHIEVEMENTS};
use crate::services::store::{
    create_doc, doc_id, find_docs, get_doc, put_doc, DocumentStore, ACHIEVEMENTS_INDEX,
    USER_STATS_INDEX,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;

pub async fn get_user_stats(store: &dyn DocumentStore, user_id: &str) -> Result<UserStats> {
    Ok(get_doc(store, USER_STATS_INDEX, user_id)
        .await?
        .unwrap_or_else(|| UserStats::new(user_id)))
}

pub async fn save_user_stats(store: &dyn DocumentStore, stats: &UserStats) -> Result<()> {
    put_doc(store, USER_STATS_INDEX, &stats.user_id, stats).await
}

fn view(achievement: Achievement, unlocked_at: Option<DateTime<Utc>>) -> AchievementView {
    AchievementView {
        id: achievement.id().to_string(),
        title: achievement.title().to_string(),
        description: achievement.description().to_string(),
        xp_reward: achievement.xp_reward(),
        unlocked_at,
    }
}

/// Unlocks every earned achievement not yet on file and folds its XP bonus
/// into `stats`. Bonuses can push the level high enough for a level
/// achievement, so evaluation repeats until nothing new unlocks.
pub async fn unlock_achievements(
    store: &dyn DocumentStore,
    stats: &mut UserStats,
    now: DateTime<Utc>,
) -> Result<Vec<AchievementView>> {
    let mut unlocked = Vec::new();

    loop {
        let mut unlocked_this_round = false;
        for achievement in ACHIEVEMENTS {
            if !achievement.is_earned(stats) {
                continue;
            }
            let record = UnlockedAchievement {
                user_id: stats.user_id.clone(),
                achievement_id: achievement.id().to_string(),
                unlocked_at: now,
            };
            let id = doc_id(&[&stats.user_id, achievement.id()]);
            if !create_doc(store, ACHIEVEMENTS_INDEX, &id, &record).await? {
                continue;
            }

            info!("{} unlocked achievement '{}'", stats.user_id, achievement.id());
            let progress = add_xp(
                stats.current_xp,
                stats.level,
                stats.xp_to_next_level,
                achievement.xp_reward(),
            );
            stats.current_xp = progress.current_xp;
            stats.level = progress.level;
            stats.xp_to_next_level = progress.threshold;
            unlocked.push(view(*achievement, Some(now)));
            unlocked_this_round = true;
        }
        if !unlocked_this_round {
            break;
        }
    }

    Ok(unlocked)
}

/// The whole catalogue, with unlock times where unlocked.
pub async fn list_achievements(
    store: &dyn DocumentStore,
    user_id: &str,
) -> Result<Vec<AchievementView>> {
    let records: Vec<UnlockedAchievement> =
        find_docs(store, ACHIEVEMENTS_INDEX, &[("user_id", user_id)]).await?;

    Ok(ACHIEVEMENTS
        .iter()
        .map(|achievement| {
            let unlocked_at = records
                .iter()
                .find(|r| r.achievement_id == achievement.id())
                .map(|r| r.unlocked_at);
            view(*achievement, unlocked_at)
        })
        .collect())
}
