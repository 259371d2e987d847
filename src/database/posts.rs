use deadpool_postgres::Transaction;
use tokio_postgres::Row;

use crate::{
    database::conn::{DbError, LazyConn},
    entities::post::{Post, PrivacyFlags},
};

pub const POST_COLUMNS: &str = "
    p.post_id, p.user_id, p.body,
    EXTRACT(EPOCH FROM p.created_at)::BIGINT AS created_at,
    EXTRACT(EPOCH FROM p.updated_at)::BIGINT AS updated_at,
    EXTRACT(EPOCH FROM p.bumped_at)::BIGINT AS bumped_at,
    p.destination_feed_ids, p.feed_ids,
    p.is_private, p.is_protected, p.is_propagable,
    p.comments_count, p.likes_count
";

pub fn row_to_post(row: &Row) -> Post {
    Post {
        post_id: row.get("post_id"),
        user_id: row.get("user_id"),
        body: row.get("body"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        bumped_at: row.get("bumped_at"),
        destination_feed_ids: row.get("destination_feed_ids"),
        feed_ids: row.get("feed_ids"),
        is_private: row.get("is_private"),
        is_protected: row.get("is_protected"),
        is_propagable: row.get("is_propagable"),
        comments_count: row.get("comments_count"),
        likes_count: row.get("likes_count"),
    }
}

pub async fn get_post(post_id: i64, conn: &mut LazyConn) -> Result<Option<Post>, DbError> {
    let db = conn.get_client().await?;
    let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.post_id = $1");
    let row = db.query_opt(&sql, &[&post_id]).await?;
    Ok(row.as_ref().map(row_to_post))
}

pub struct NewPostRow {
    pub post_id: i64,
    pub user_id: i64,
    pub body: String,
    pub destination_feed_ids: Vec<i32>,
    pub feed_ids: Vec<i32>,
    pub flags: PrivacyFlags,
}

/// Insert a post with flags already derived; the schema trigger recomputes
/// the same values, so the row never depends on the caller being right.
pub async fn insert_post(row: &NewPostRow, tx: &mut Transaction<'_>) -> Result<Post, DbError> {
    let sql = format!(
        "
        INSERT INTO posts AS p (post_id, user_id, body, destination_feed_ids, feed_ids,
                                is_private, is_protected, is_propagable)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {POST_COLUMNS}
        "
    );
    let inserted = tx
        .query_one(
            &sql,
            &[
                &row.post_id,
                &row.user_id,
                &row.body,
                &row.destination_feed_ids,
                &row.feed_ids,
                &row.flags.is_private,
                &row.flags.is_protected,
                &row.flags.is_propagable,
            ],
        )
        .await?;
    Ok(row_to_post(&inserted))
}

pub async fn update_post_body(
    post_id: i64,
    body: &str,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let updated = tx
        .execute(
            "UPDATE posts SET body = $2, updated_at = now() WHERE post_id = $1",
            &[&post_id, &body],
        )
        .await?;
    Ok(updated > 0)
}

/// Re-target a post. New flags are written alongside and the membership
/// array is reset to the new fan-out set.
pub async fn set_destinations(
    post_id: i64,
    destination_feed_ids: &[i32],
    feed_ids: &[i32],
    flags: PrivacyFlags,
    tx: &mut Transaction<'_>,
) -> Result<(), DbError> {
    tx.execute(
        "
        UPDATE posts
        SET destination_feed_ids = $2,
            feed_ids = $3,
            is_private = $4, is_protected = $5, is_propagable = $6,
            updated_at = now()
        WHERE post_id = $1
        ",
        &[
            &post_id,
            &destination_feed_ids,
            &feed_ids,
            &flags.is_private,
            &flags.is_protected,
            &flags.is_propagable,
        ],
    )
    .await?;
    Ok(())
}

pub async fn delete_post(post_id: i64, tx: &mut Transaction<'_>) -> Result<bool, DbError> {
    let deleted = tx
        .execute("DELETE FROM posts WHERE post_id = $1", &[&post_id])
        .await?;
    Ok(deleted > 0)
}

pub async fn bump_post(post_id: i64, tx: &mut Transaction<'_>) -> Result<(), DbError> {
    tx.execute(
        "UPDATE posts SET bumped_at = now() WHERE post_id = $1",
        &[&post_id],
    )
    .await?;
    Ok(())
}

pub async fn adjust_comments_count(
    post_id: i64,
    delta: i32,
    tx: &mut Transaction<'_>,
) -> Result<(), DbError> {
    tx.execute(
        "
        UPDATE posts
        SET comments_count = GREATEST(comments_count + $2, 0)
        WHERE post_id = $1
        ",
        &[&post_id, &delta],
    )
    .await?;
    Ok(())
}

pub async fn adjust_likes_count(
    post_id: i64,
    delta: i32,
    tx: &mut Transaction<'_>,
) -> Result<(), DbError> {
    tx.execute(
        "
        UPDATE posts
        SET likes_count = GREATEST(likes_count + $2, 0)
        WHERE post_id = $1
        ",
        &[&post_id, &delta],
    )
    .await?;
    Ok(())
}

/// Post ids authored by a user, oldest first, for batched deletion.
pub async fn list_posts_by_author(
    user_id: i64,
    limit: i64,
    conn: &mut LazyConn,
) -> Result<Vec<i64>, DbError> {
    let db = conn.get_client().await?;
    let rows = db
        .query(
            "SELECT post_id FROM posts WHERE user_id = $1 ORDER BY post_id LIMIT $2",
            &[&user_id, &limit],
        )
        .await?;
    Ok(rows.iter().map(|r| r.get("post_id")).collect())
}
