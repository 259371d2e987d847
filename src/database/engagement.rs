use deadpool_postgres::Transaction;
use tokio_postgres::Row;

use crate::{
    database::conn::{DbError, LazyConn},
    entities::engagement::{Comment, Like},
};

fn row_to_comment(row: &Row) -> Comment {
    Comment {
        comment_id: row.get("comment_id"),
        post_id: row.get("post_id"),
        user_id: row.get("user_id"),
        body: row.get("body"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const COMMENT_COLUMNS: &str = "
    comment_id, post_id, user_id, body,
    EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at,
    EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at
";

pub async fn get_comment(
    comment_id: i64,
    conn: &mut LazyConn,
) -> Result<Option<Comment>, DbError> {
    let db = conn.get_client().await?;
    let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE comment_id = $1");
    let row = db.query_opt(&sql, &[&comment_id]).await?;
    Ok(row.as_ref().map(row_to_comment))
}

pub async fn insert_comment(
    comment_id: i64,
    post_id: i64,
    user_id: i64,
    body: &str,
    tx: &mut Transaction<'_>,
) -> Result<Comment, DbError> {
    let sql = format!(
        "
        INSERT INTO comments (comment_id, post_id, user_id, body)
        VALUES ($1, $2, $3, $4)
        RETURNING {COMMENT_COLUMNS}
        "
    );
    let row = tx
        .query_one(&sql, &[&comment_id, &post_id, &user_id, &body])
        .await?;
    Ok(row_to_comment(&row))
}

pub async fn update_comment_body(
    comment_id: i64,
    body: &str,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let updated = tx
        .execute(
            "UPDATE comments SET body = $2, updated_at = now() WHERE comment_id = $1",
            &[&comment_id, &body],
        )
        .await?;
    Ok(updated > 0)
}

pub async fn delete_comment(comment_id: i64, tx: &mut Transaction<'_>) -> Result<bool, DbError> {
    let deleted = tx
        .execute("DELETE FROM comments WHERE comment_id = $1", &[&comment_id])
        .await?;
    Ok(deleted > 0)
}

/// Whether the user still has comments on the post, for membership
/// withdrawal after a delete.
pub async fn user_commented_post(
    user_id: i64,
    post_id: i64,
    conn: &mut LazyConn,
) -> Result<bool, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt(
            "SELECT 1 FROM comments WHERE user_id = $1 AND post_id = $2 LIMIT 1",
            &[&user_id, &post_id],
        )
        .await?;
    Ok(row.is_some())
}

pub async fn delete_comments_by_user(
    user_id: i64,
    limit: i64,
    tx: &mut Transaction<'_>,
) -> Result<u64, DbError> {
    // batched so the deletion workflow can stop at its deadline;
    // post counters stay correct per batch
    Ok(tx
        .execute(
            "
            WITH doomed AS (
                SELECT comment_id, post_id FROM comments
                WHERE user_id = $1
                ORDER BY comment_id
                LIMIT $2
            ),
            counted AS (
                UPDATE posts p
                SET comments_count = GREATEST(p.comments_count - d.n, 0)
                FROM (SELECT post_id, COUNT(*) AS n FROM doomed GROUP BY post_id) d
                WHERE p.post_id = d.post_id
            )
            DELETE FROM comments c
            USING doomed
            WHERE c.comment_id = doomed.comment_id
            ",
            &[&user_id, &limit],
        )
        .await?)
}

pub async fn insert_like(
    post_id: i64,
    user_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let inserted = tx
        .execute(
            "
            INSERT INTO likes (post_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (post_id, user_id) DO NOTHING
            ",
            &[&post_id, &user_id],
        )
        .await?;
    Ok(inserted > 0)
}

pub async fn delete_like(
    post_id: i64,
    user_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let deleted = tx
        .execute(
            "DELETE FROM likes WHERE post_id = $1 AND user_id = $2",
            &[&post_id, &user_id],
        )
        .await?;
    Ok(deleted > 0)
}

pub async fn get_like(
    post_id: i64,
    user_id: i64,
    conn: &mut LazyConn,
) -> Result<Option<Like>, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt(
            "
            SELECT post_id, user_id,
                   EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at
            FROM likes
            WHERE post_id = $1 AND user_id = $2
            ",
            &[&post_id, &user_id],
        )
        .await?;
    Ok(row.map(|r| Like {
        post_id: r.get("post_id"),
        user_id: r.get("user_id"),
        created_at: r.get("created_at"),
    }))
}

pub async fn delete_likes_by_user(
    user_id: i64,
    limit: i64,
    tx: &mut Transaction<'_>,
) -> Result<u64, DbError> {
    Ok(tx
        .execute(
            "
            WITH doomed AS (
                SELECT post_id, user_id FROM likes
                WHERE user_id = $1
                ORDER BY post_id
                LIMIT $2
            ),
            counted AS (
                UPDATE posts p
                SET likes_count = GREATEST(p.likes_count - 1, 0)
                FROM doomed
                WHERE p.post_id = doomed.post_id
            )
            DELETE FROM likes l
            USING doomed
            WHERE l.post_id = doomed.post_id AND l.user_id = doomed.user_id
            ",
            &[&user_id, &limit],
        )
        .await?)
}
