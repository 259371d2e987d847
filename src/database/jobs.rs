use deadpool_postgres::Transaction;
use serde_json::Value;
use tokio_postgres::Row;

use crate::{
    database::conn::{DbError, LazyConn},
    entities::job::Job,
};

const JOB_COLUMNS: &str = "
    id, name, payload, uniq_key,
    EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at,
    EXTRACT(EPOCH FROM unlock_at)::BIGINT AS unlock_at,
    attempts, failures
";

fn row_to_job(row: &Row) -> Job {
    Job {
        id: row.get("id"),
        name: row.get("name"),
        payload: row.get("payload"),
        uniq_key: row.get("uniq_key"),
        created_at: row.get("created_at"),
        unlock_at: row.get("unlock_at"),
        attempts: row.get("attempts"),
        failures: row.get("failures"),
    }
}

/// Enqueue a job, due `delay_secs` from now.
///
/// A keyed job replaces the pending instance with the same (name, key):
/// at most one exists at any time. An unkeyed job always inserts.
pub async fn create_job(
    id: i64,
    name: &str,
    payload: &Value,
    uniq_key: Option<&str>,
    delay_secs: i64,
    tx: &mut Transaction<'_>,
) -> Result<Job, DbError> {
    let sql = format!(
        "
        INSERT INTO jobs (id, name, payload, uniq_key, unlock_at)
        VALUES ($1, $2, $3, $4, now() + make_interval(secs => $5::BIGINT::DOUBLE PRECISION))
        ON CONFLICT (name, uniq_key) WHERE uniq_key IS NOT NULL
        DO UPDATE SET
            payload = EXCLUDED.payload,
            unlock_at = EXCLUDED.unlock_at
        RETURNING {JOB_COLUMNS}
        "
    );
    let row = tx
        .query_one(&sql, &[&id, &name, &payload, &uniq_key, &delay_secs])
        .await?;
    Ok(row_to_job(&row))
}

/// Cancel a pending keyed job. No-op when none is pending.
pub async fn delete_job_by_key(
    name: &str,
    uniq_key: &str,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let deleted = tx
        .execute(
            "DELETE FROM jobs WHERE name = $1 AND uniq_key = $2",
            &[&name, &uniq_key],
        )
        .await?;
    Ok(deleted > 0)
}

/// Atomically claim up to `count` due jobs with one of the given names.
///
/// Claimed rows are re-locked `lock_secs` into the future, so a crashed or
/// failed run is retried when the lock lapses. `FOR UPDATE SKIP LOCKED`
/// keeps concurrent workers off each other's batches.
pub async fn fetch_jobs(
    names: &[&str],
    count: i64,
    lock_secs: i64,
    conn: &mut LazyConn,
) -> Result<Vec<Job>, DbError> {
    let sql = "
        WITH due AS (
            SELECT id FROM jobs
            WHERE name = ANY ($1) AND unlock_at <= now()
            ORDER BY unlock_at
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        UPDATE jobs j
        SET unlock_at = now() + make_interval(secs => $3::BIGINT::DOUBLE PRECISION),
            attempts = j.attempts + 1
        FROM due
        WHERE j.id = due.id
        RETURNING j.id, j.name, j.payload, j.uniq_key,
                  EXTRACT(EPOCH FROM j.created_at)::BIGINT AS created_at,
                  EXTRACT(EPOCH FROM j.unlock_at)::BIGINT AS unlock_at,
                  j.attempts, j.failures
        ";

    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let db = conn.get_client().await?;
    let rows = db.query(sql, &[&names, &count, &lock_secs]).await?;
    Ok(rows.iter().map(row_to_job).collect())
}

/// Push a claimed job's lock forward so it fires again after `delay_secs`.
/// This is how a handler that ran out of budget resumes later without
/// giving up its uniqueness slot.
pub async fn relock_job(id: i64, delay_secs: i64, conn: &mut LazyConn) -> Result<(), DbError> {
    let db = conn.get_client().await?;
    db.execute(
        "
        UPDATE jobs
        SET unlock_at = now() + make_interval(secs => $2::BIGINT::DOUBLE PRECISION)
        WHERE id = $1
        ",
        &[&id, &delay_secs],
    )
    .await?;
    Ok(())
}

/// Completed jobs leave the queue.
pub async fn delete_job(id: i64, conn: &mut LazyConn) -> Result<bool, DbError> {
    let db = conn.get_client().await?;
    let deleted = db.execute("DELETE FROM jobs WHERE id = $1", &[&id]).await?;
    Ok(deleted > 0)
}

/// A failed run stays locked until its lock lapses; only the failure count
/// changes.
pub async fn mark_job_failure(id: i64, conn: &mut LazyConn) -> Result<(), DbError> {
    let db = conn.get_client().await?;
    db.execute(
        "UPDATE jobs SET failures = failures + 1 WHERE id = $1",
        &[&id],
    )
    .await?;
    Ok(())
}

/// Drop jobs that failed too often. Returns how many went.
pub async fn purge_failed_jobs(max_failures: i32, tx: &mut Transaction<'_>) -> Result<u64, DbError> {
    Ok(tx
        .execute("DELETE FROM jobs WHERE failures >= $1", &[&max_failures])
        .await?)
}
