use deadpool_postgres::Transaction;

use crate::database::conn::{DbError, LazyConn};

pub async fn insert_session(
    session_id: i64,
    user_id: i64,
    token_secret: &str,
    tx: &mut Transaction<'_>,
) -> Result<(), DbError> {
    tx.execute(
        "
        INSERT INTO auth_sessions (session_id, user_id, token_secret)
        VALUES ($1, $2, $3)
        ",
        &[&session_id, &user_id, &token_secret],
    )
    .await?;
    Ok(())
}

/// A token is only as good as its session row: signature checks pass for
/// any token we minted, this ties it to a revocable record.
pub async fn check_session_secret(
    user_id: i64,
    session_id: i64,
    secret: &str,
    conn: &mut LazyConn,
) -> Result<bool, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt(
            "
            UPDATE auth_sessions
            SET last_used_at = now()
            WHERE session_id = $1 AND user_id = $2 AND token_secret = $3
            RETURNING 1
            ",
            &[&session_id, &user_id, &secret],
        )
        .await?;
    Ok(row.is_some())
}

pub async fn delete_session(session_id: i64, tx: &mut Transaction<'_>) -> Result<bool, DbError> {
    let deleted = tx
        .execute(
            "DELETE FROM auth_sessions WHERE session_id = $1",
            &[&session_id],
        )
        .await?;
    Ok(deleted > 0)
}

pub async fn delete_sessions_for_user(
    user_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<u64, DbError> {
    Ok(tx
        .execute(
            "DELETE FROM auth_sessions WHERE user_id = $1",
            &[&user_id],
        )
        .await?)
}

/// Drop sessions idle past the refresh-token lifetime. Tokens signed for
/// them stop verifying even before their embedded expiry.
pub async fn delete_expired_sessions(
    max_idle_secs: i64,
    tx: &mut Transaction<'_>,
) -> Result<u64, DbError> {
    Ok(tx
        .execute(
            "
            DELETE FROM auth_sessions
            WHERE last_used_at < now() - make_interval(secs => $1::BIGINT::DOUBLE PRECISION)
            ",
            &[&max_idle_secs],
        )
        .await?)
}
