use fred::prelude::PubsubInterface;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::utils::state::AppState;

/// Realtime event names carried over the pub/sub channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PostNew,
    PostUpdate,
    PostDestroy,
    CommentNew,
    LikeNew,
    UserGone,
    UserDeleted,
}

impl EventKind {
    fn as_str(&self) -> &'static str {
        match self {
            EventKind::PostNew => "post:new",
            EventKind::PostUpdate => "post:update",
            EventKind::PostDestroy => "post:destroy",
            EventKind::CommentNew => "comment:new",
            EventKind::LikeNew => "like:new",
            EventKind::UserGone => "user:gone",
            EventKind::UserDeleted => "user:deleted",
        }
    }
}

/// Publish one event envelope per feed channel. Best effort: a realtime
/// miss must never roll back the write it narrates.
pub async fn publish(state: &AppState, kind: EventKind, subject_id: i64, feed_ids: &[i32]) {
    let envelope = json!({
        "event": kind.as_str(),
        "id": subject_id.to_string(),
    })
    .to_string();

    if feed_ids.is_empty() {
        if let Err(err) = state
            .pubsub_redis
            .publish::<i64, _, _>("global", envelope.as_str())
            .await
        {
            warn!(event = kind.as_str(), error = %err, "pubsub publish failed");
        }
        return;
    }

    for feed_id in feed_ids {
        let channel = format!("feed:{feed_id}");
        if let Err(err) = state
            .pubsub_redis
            .publish::<i64, _, _>(channel, envelope.as_str())
            .await
        {
            warn!(event = kind.as_str(), feed_id, error = %err, "pubsub publish failed");
        }
    }
}
