use deadpool_postgres::Transaction;

use crate::database::conn::{DbError, LazyConn};

pub async fn insert_ban(
    banner_id: i64,
    banned_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let inserted = tx
        .execute(
            "
            INSERT INTO bans (banner_id, banned_id)
            VALUES ($1, $2)
            ON CONFLICT (banner_id, banned_id) DO NOTHING
            ",
            &[&banner_id, &banned_id],
        )
        .await?;
    Ok(inserted > 0)
}

pub async fn delete_ban(
    banner_id: i64,
    banned_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let deleted = tx
        .execute(
            "DELETE FROM bans WHERE banner_id = $1 AND banned_id = $2",
            &[&banner_id, &banned_id],
        )
        .await?;
    Ok(deleted > 0)
}

pub async fn is_banned(
    banner_id: i64,
    banned_id: i64,
    conn: &mut LazyConn,
) -> Result<bool, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt(
            "SELECT 1 FROM bans WHERE banner_id = $1 AND banned_id = $2",
            &[&banner_id, &banned_id],
        )
        .await?;
    Ok(row.is_some())
}

/// Users this user banned.
pub async fn banned_user_ids(user_id: i64, conn: &mut LazyConn) -> Result<Vec<i64>, DbError> {
    let db = conn.get_client().await?;
    let rows = db
        .query("SELECT banned_id FROM bans WHERE banner_id = $1", &[&user_id])
        .await?;
    Ok(rows.iter().map(|r| r.get("banned_id")).collect())
}

/// Users who banned this user.
pub async fn banned_by_user_ids(user_id: i64, conn: &mut LazyConn) -> Result<Vec<i64>, DbError> {
    let db = conn.get_client().await?;
    let rows = db
        .query("SELECT banner_id FROM bans WHERE banned_id = $1", &[&user_id])
        .await?;
    Ok(rows.iter().map(|r| r.get("banner_id")).collect())
}

/// Drop every ban edge touching a user. Returns rows removed.
pub async fn sever_all_for_user(user_id: i64, tx: &mut Transaction<'_>) -> Result<u64, DbError> {
    Ok(tx
        .execute(
            "DELETE FROM bans WHERE banner_id = $1 OR banned_id = $1",
            &[&user_id],
        )
        .await?)
}
