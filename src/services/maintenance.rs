use serde_json::json;
use tracing::info;

use crate::{
    create_tx,
    database::{jobs, sessions, users},
    entities::job::Job,
    get_conn,
    services::deletion::{self, COOLDOWN_SECS, JOB_GONE_CLEANUP},
    services::worker::{HandlerResult, JobManager, JobOutcome, MAX_FAILURES},
    utils::security::REFRESH_TOKEN_TTL,
    utils::state::ArcAppState,
};

pub const JOB_EXPIRE_SESSIONS: &str = "expire-auth-sessions";
pub const JOB_PURGE_DEAD_JOBS: &str = "purge-dead-jobs";
pub const JOB_FINALIZE_GONE: &str = "finalize-gone-users";

const HOUR_SECS: i64 = 3600;
const SESSION_SWEEP_INTERVAL: i64 = HOUR_SECS;
const JOB_PURGE_INTERVAL: i64 = HOUR_SECS;
const GONE_SWEEP_INTERVAL: i64 = 6 * HOUR_SECS;

/// Sessions idle past the refresh-token lifetime are dead weight; tokens
/// bound to them would not verify as anything but expired anyway.
async fn expire_sessions(state: ArcAppState, _job: Job) -> HandlerResult {
    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    let removed = sessions::delete_expired_sessions(REFRESH_TOKEN_TTL as i64, &mut tx).await?;
    tx.commit().await?;

    if removed > 0 {
        info!(removed, "expired auth sessions dropped");
    }
    Ok(JobOutcome::Reschedule(SESSION_SWEEP_INTERVAL))
}

async fn purge_dead_jobs(state: ArcAppState, _job: Job) -> HandlerResult {
    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    let removed = jobs::purge_failed_jobs(MAX_FAILURES, &mut tx).await?;
    tx.commit().await?;

    if removed > 0 {
        info!(removed, "dead jobs purged");
    }
    Ok(JobOutcome::Reschedule(JOB_PURGE_INTERVAL))
}

/// Safety net behind `request_deletion`: users whose cooldown lapsed but
/// whose cleanup job vanished get a fresh one.
async fn finalize_gone_users(state: ArcAppState, _job: Job) -> HandlerResult {
    let mut conn = get_conn!(state);
    let overdue = users::list_overdue_cooldown_users(COOLDOWN_SECS, &mut conn).await?;

    if !overdue.is_empty() {
        let mut tx = create_tx!(conn);
        for user_id in &overdue {
            jobs::create_job(
                state.snowflake.generate(),
                JOB_GONE_CLEANUP,
                &json!({ "user_id": user_id }),
                Some(&user_id.to_string()),
                0,
                &mut tx,
            )
            .await?;
        }
        tx.commit().await?;
        info!(count = overdue.len(), "requeued overdue gone users");
    }

    Ok(JobOutcome::Reschedule(GONE_SWEEP_INTERVAL))
}

async fn gone_cleanup(state: ArcAppState, job: Job) -> HandlerResult {
    let user_id = job
        .payload_i64("user_id")
        .ok_or_else(|| anyhow::anyhow!("gone-cleanup payload missing user_id"))?;

    let finished = deletion::run_gone_cleanup(&state, user_id).await?;
    if finished {
        Ok(JobOutcome::Complete)
    } else {
        Ok(JobOutcome::Reschedule(deletion::RESCHEDULE_DELAY_SECS))
    }
}

/// Wire every background handler into the manager.
pub fn register_handlers(manager: &mut JobManager) {
    manager.register(JOB_GONE_CLEANUP, gone_cleanup);
    manager.register(JOB_EXPIRE_SESSIONS, expire_sessions);
    manager.register(JOB_PURGE_DEAD_JOBS, purge_dead_jobs);
    manager.register(JOB_FINALIZE_GONE, finalize_gone_users);
}

/// Make sure one pending instance of each recurring task exists. Safe to
/// run on every boot: the keyed insert replaces the pending row.
pub async fn seed_recurring_jobs(state: &ArcAppState) -> Result<(), crate::services::ServiceError> {
    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    for name in [JOB_EXPIRE_SESSIONS, JOB_PURGE_DEAD_JOBS, JOB_FINALIZE_GONE] {
        jobs::create_job(
            state.snowflake.generate(),
            name,
            &json!({}),
            Some("singleton"),
            0,
            &mut tx,
        )
        .await?;
    }
    tx.commit().await?;
    Ok(())
}
