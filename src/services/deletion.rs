use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::{
    create_tx,
    database::{engagement, feeds, groups, posts, sessions, subscriptions, timelines, users},
    database::{bans, conn::LazyConn},
    entities::user::GoneStatus,
    get_conn,
    services::ServiceError,
    services::events::{self, EventKind},
    utils::state::ArcAppState,
};

pub const JOB_GONE_CLEANUP: &str = "gone-cleanup";

/// Grace window between a deletion request and the cleanup run.
pub const COOLDOWN_SECS: i64 = 30 * 24 * 3600;

/// Wall-clock budget of one cleanup run.
const RUN_DEADLINE: Duration = Duration::from_secs(20);
/// Row batch per step iteration.
const BATCH: i64 = 1000;
/// Posts are deleted one row at a time, so the batch is smaller.
const POST_BATCH: i64 = 100;
/// Delay before an unfinished run fires again.
pub const RESCHEDULE_DELAY_SECS: i64 = 30;

/// The fixed order of per-entity cleanup. Every step is idempotent and
/// drains to a no-op, so a resumed run can always start from the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionStep {
    Likes,
    Comments,
    Posts,
    Subscriptions,
    Bans,
    Feeds,
    Sessions,
    Finalize,
}

impl DeletionStep {
    pub const ORDER: [DeletionStep; 8] = [
        DeletionStep::Likes,
        DeletionStep::Comments,
        DeletionStep::Posts,
        DeletionStep::Subscriptions,
        DeletionStep::Bans,
        DeletionStep::Feeds,
        DeletionStep::Sessions,
        DeletionStep::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionStep::Likes => "likes",
            DeletionStep::Comments => "comments",
            DeletionStep::Posts => "posts",
            DeletionStep::Subscriptions => "subscriptions",
            DeletionStep::Bans => "bans",
            DeletionStep::Feeds => "feeds",
            DeletionStep::Sessions => "sessions",
            DeletionStep::Finalize => "finalize",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Done,
    More,
}

async fn run_step(
    state: &ArcAppState,
    user_id: i64,
    step: DeletionStep,
    conn: &mut LazyConn,
) -> Result<StepOutcome, ServiceError> {
    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);

    let outcome = match step {
        DeletionStep::Likes => {
            let removed = engagement::delete_likes_by_user(user_id, BATCH, &mut tx).await?;
            if removed == BATCH as u64 {
                StepOutcome::More
            } else {
                StepOutcome::Done
            }
        }
        DeletionStep::Comments => {
            let removed = engagement::delete_comments_by_user(user_id, BATCH, &mut tx).await?;
            if removed == BATCH as u64 {
                StepOutcome::More
            } else {
                StepOutcome::Done
            }
        }
        DeletionStep::Posts => {
            let post_ids = posts::list_posts_by_author(user_id, POST_BATCH, conn).await?;
            let drained = (post_ids.len() as i64) < POST_BATCH;
            for post_id in post_ids {
                posts::delete_post(post_id, &mut tx).await?;
            }
            if drained {
                StepOutcome::Done
            } else {
                StepOutcome::More
            }
        }
        DeletionStep::Subscriptions => {
            subscriptions::sever_all_for_user(user_id, &mut tx).await?;
            StepOutcome::Done
        }
        DeletionStep::Bans => {
            bans::sever_all_for_user(user_id, &mut tx).await?;
            StepOutcome::Done
        }
        DeletionStep::Feeds => {
            let feed_ids = feeds::user_feed_ids(user_id, None, conn).await?;
            let stripped = timelines::strip_feeds_from_memberships(&feed_ids, BATCH, &mut tx).await?;
            if stripped == BATCH as u64 {
                StepOutcome::More
            } else {
                timelines::delete_local_bumps_for_user(user_id, &mut tx).await?;
                groups::remove_memberships_of_user(user_id, &mut tx).await?;
                StepOutcome::Done
            }
        }
        DeletionStep::Sessions => {
            sessions::delete_sessions_for_user(user_id, &mut tx).await?;
            StepOutcome::Done
        }
        DeletionStep::Finalize => {
            users::set_gone_status(user_id, Some(GoneStatus::Deleted), &mut tx).await?;
            users::zero_counters(user_id, &mut tx).await?;
            StepOutcome::Done
        }
    };

    tx.commit().await.map_err(ServiceError::from)?;
    Ok(outcome)
}

/// One run of the deletion workflow. Returns true when the user reached the
/// terminal state, false when the deadline cut the run short and a follow-up
/// job was scheduled.
pub async fn run_gone_cleanup(state: &ArcAppState, user_id: i64) -> Result<bool, ServiceError> {
    let mut conn = get_conn!(state);
    let Some(user) = users::get_user(user_id, &mut conn).await? else {
        warn!(user_id, "gone-cleanup for unknown user");
        return Ok(true);
    };

    match user.gone_status {
        Some(GoneStatus::Cooldown) => {
            let mut tx_conn = get_conn!(state);
            let mut tx = create_tx!(tx_conn);
            users::set_gone_status(user_id, Some(GoneStatus::Deletion), &mut tx).await?;
            tx.commit().await.map_err(ServiceError::from)?;
        }
        Some(GoneStatus::Deletion) => {} // resumed run
        Some(GoneStatus::Deleted) => return Ok(true),
        None | Some(GoneStatus::Suspended) => {
            // the user came back before the job fired; nothing to do
            info!(user_id, "gone-cleanup skipped, user resumed");
            return Ok(true);
        }
    }

    let deadline = Instant::now() + RUN_DEADLINE;

    for step in DeletionStep::ORDER {
        loop {
            if Instant::now() >= deadline {
                // the caller re-locks the job; the next run resumes from the
                // top and the finished steps drain to no-ops
                info!(user_id, step = step.as_str(), "gone-cleanup out of budget");
                return Ok(false);
            }
            match run_step(state, user_id, step, &mut conn).await? {
                StepOutcome::Done => break,
                StepOutcome::More => continue,
            }
        }
    }

    info!(user_id, "user deleted");
    events::publish(state, EventKind::UserDeleted, user_id, &[]).await;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_order_is_fixed() {
        // content rows go before the relations that scope them, and the
        // terminal state flip is last
        assert_eq!(
            DeletionStep::ORDER
                .iter()
                .map(DeletionStep::as_str)
                .collect::<Vec<_>>(),
            vec![
                "likes",
                "comments",
                "posts",
                "subscriptions",
                "bans",
                "feeds",
                "sessions",
                "finalize"
            ]
        );
        assert_eq!(
            DeletionStep::ORDER.last().copied(),
            Some(DeletionStep::Finalize)
        );
    }
}
