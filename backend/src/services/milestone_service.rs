use crate::models::{ChannelSnapshot, Milestone, MilestoneKind};
use crate::services::store::{create_doc, doc_id, find_docs, DocumentStore, MILESTONES_INDEX};
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;

const SUBSCRIBER_THRESHOLDS: &[i64] = &[
    100, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000,
];
const VIEW_THRESHOLDS: &[i64] = &[
    1_000, 10_000, 100_000, 500_000, 1_000_000, 10_000_000, 100_000_000,
];
const VIDEO_THRESHOLDS: &[i64] = &[1, 10, 25, 50, 100, 250, 500, 1_000];

pub fn thresholds(kind: MilestoneKind) -> &'static [i64] {
    match kind {
        MilestoneKind::Subscribers => SUBSCRIBER_THRESHOLDS,
        MilestoneKind::Views => VIEW_THRESHOLDS,
        MilestoneKind::Videos => VIDEO_THRESHOLDS,
    }
}

/// Every threshold of every kind that the snapshot has reached. Each kind is
/// evaluated on its own; there is no ordering between them.
pub fn reached_thresholds(snapshot: &ChannelSnapshot) -> Vec<(MilestoneKind, i64)> {
    [
        (MilestoneKind::Subscribers, snapshot.subscriber_count),
        (MilestoneKind::Views, snapshot.total_views),
        (MilestoneKind::Videos, snapshot.video_count),
    ]
    .into_iter()
    .flat_map(|(kind, current)| {
        thresholds(kind)
            .iter()
            .copied()
            .filter(move |threshold| current >= *threshold)
            .map(move |threshold| (kind, threshold))
    })
    .collect()
}

fn milestone_id(user_id: &str, channel_id: &str, kind: MilestoneKind, value: i64) -> String {
    doc_id(&[user_id, channel_id, kind.as_str(), &value.to_string()])
}

/// Inserts a record for each reached threshold not already on file. Returns
/// only the milestones written by this call.
pub async fn record_milestones(
    store: &dyn DocumentStore,
    user_id: &str,
    snapshot: &ChannelSnapshot,
    now: DateTime<Utc>,
) -> Result<Vec<Milestone>> {
    let mut inserted = Vec::new();

    for (kind, value) in reached_thresholds(snapshot) {
        let milestone = Milestone {
            user_id: user_id.to_string(),
            channel_id: snapshot.channel_id.clone(),
            kind,
            value,
            reached_at: now,
        };
        let id = milestone_id(user_id, &snapshot.channel_id, kind, value);
        if create_doc(store, MILESTONES_INDEX, &id, &milestone).await? {
            info!(
                "Channel {} reached {} {}",
                snapshot.channel_id,
                value,
                kind.as_str()
            );
            inserted.push(milestone);
        }
    }

    Ok(inserted)
}

pub async fn list_milestones(
    store: &dyn DocumentStore,
    user_id: &str,
    channel_id: &str,
) -> Result<Vec<Milestone>> {
    let mut milestones: Vec<Milestone> = find_docs(
        store,
        MILESTONES_INDEX,
        &[("user_id", user_id), ("channel_id", channel_id)],
    )
    .await?;
    milestones.sort_by(|a, b| {
        a.reached_at
            .cmp(&b.reached_at)
            .then(a.kind.as_str().cmp(b.kind.as_str()))
            .then(a.value.cmp(&b.value))
    });
    Ok(milestones)
}
