use deadpool_postgres::Transaction;

use crate::{
    database::conn::{DbError, LazyConn},
    database::posts::{POST_COLUMNS, row_to_post},
    database::visibility::{BanScope, Viewer, posts_visibility_sql},
    entities::feed::{Feed, FeedName},
    entities::post::Post,
};

const MAX_PAGE: i64 = 120;

/// Append feed ids to a post's membership array, keeping it a set.
pub async fn add_post_to_feeds(
    post_id: i64,
    feed_ids: &[i32],
    tx: &mut Transaction<'_>,
) -> Result<(), DbError> {
    if feed_ids.is_empty() {
        return Ok(());
    }
    tx.execute(
        "
        UPDATE posts
        SET feed_ids = ARRAY(SELECT DISTINCT unnest(feed_ids || $2::INT[]) ORDER BY 1)
        WHERE post_id = $1
        ",
        &[&post_id, &feed_ids],
    )
    .await?;
    Ok(())
}

pub async fn remove_post_from_feeds(
    post_id: i64,
    feed_ids: &[i32],
    tx: &mut Transaction<'_>,
) -> Result<(), DbError> {
    if feed_ids.is_empty() {
        return Ok(());
    }
    tx.execute(
        "
        UPDATE posts
        SET feed_ids = ARRAY(SELECT unnest(feed_ids) EXCEPT SELECT unnest($2::INT[]))
        WHERE post_id = $1
        ",
        &[&post_id, &feed_ids],
    )
    .await?;
    Ok(())
}

/// Record the viewer-local sort time of a post surfaced into a home feed by
/// a friend's like or comment. First bump wins.
pub async fn insert_local_bump(
    post_id: i64,
    user_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<(), DbError> {
    tx.execute(
        "
        INSERT INTO local_bumps (post_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (post_id, user_id) DO NOTHING
        ",
        &[&post_id, &user_id],
    )
    .await?;
    Ok(())
}

pub async fn delete_local_bumps_for_user(
    user_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<u64, DbError> {
    Ok(tx
        .execute("DELETE FROM local_bumps WHERE user_id = $1", &[&user_id])
        .await?)
}

#[derive(Debug, Clone, Copy)]
pub struct TimelinePage {
    pub limit: i64,
    pub offset: i64,
    pub with_hidden: bool,
}

impl Default for TimelinePage {
    fn default() -> Self {
        Self {
            limit: 30,
            offset: 0,
            with_hidden: false,
        }
    }
}

/// One page of a feed, filtered for the viewer.
///
/// Home feeds honor the viewer's Hides feed and sort by the local bump when
/// one exists; every other feed kind sorts by the post's own bump time.
pub async fn read_feed_page(
    feed: &Feed,
    viewer: &Viewer,
    page: TimelinePage,
    conn: &mut LazyConn,
) -> Result<Vec<Post>, DbError> {
    let limit = page.limit.clamp(1, MAX_PAGE);
    let offset = page.offset.max(0);

    let ban_scope = if feed.is_home() {
        BanScope::TwoWay
    } else {
        BanScope::ViewerOnly
    };
    let visibility = posts_visibility_sql(viewer, ban_scope);

    let mut clauses = vec!["p.feed_ids @> ARRAY[$1]".to_string(), visibility];
    let mut order = "p.bumped_at DESC, p.post_id DESC".to_string();
    let mut join = String::new();

    if feed.is_home() {
        if let Some(viewer_id) = viewer.user_id {
            join = format!(
                "LEFT JOIN local_bumps b ON b.post_id = p.post_id AND b.user_id = {viewer_id}"
            );
            order =
                "GREATEST(p.bumped_at, COALESCE(b.created_at, p.bumped_at)) DESC, p.post_id DESC"
                    .to_string();

            if !page.with_hidden {
                clauses.push(format!(
                    "NOT p.feed_ids && (
                        SELECT COALESCE(array_agg(feed_id), '{{}}')
                        FROM feeds
                        WHERE user_id = {viewer_id} AND name = '{}'
                    )",
                    FeedName::Hides.as_str()
                ));
            }
        }
    }

    let sql = format!(
        "
        SELECT {POST_COLUMNS}
        FROM posts p
        {join}
        WHERE {}
        ORDER BY {order}
        LIMIT {limit} OFFSET {offset}
        ",
        clauses.join(" AND ")
    );

    let db = conn.get_client().await?;
    let rows = db.query(&sql, &[&feed.feed_id]).await?;
    Ok(rows.iter().map(row_to_post).collect())
}

/// Recent propagable post ids in a feed, newest first. Used to backfill a
/// subscriber's home feed.
pub async fn recent_propagable_posts(
    feed_id: i32,
    limit: i64,
    conn: &mut LazyConn,
) -> Result<Vec<i64>, DbError> {
    let db = conn.get_client().await?;
    let rows = db
        .query(
            "
            SELECT post_id FROM posts p
            WHERE p.destination_feed_ids @> ARRAY[$1] AND p.is_propagable
            ORDER BY p.bumped_at DESC
            LIMIT $2
            ",
            &[&feed_id, &limit],
        )
        .await?;
    Ok(rows.iter().map(|r| r.get("post_id")).collect())
}

/// Drop a user's feeds out of every post membership array. Batched by post
/// id so the deletion workflow can run it under a deadline.
pub async fn strip_feeds_from_memberships(
    feed_ids: &[i32],
    limit: i64,
    tx: &mut Transaction<'_>,
) -> Result<u64, DbError> {
    if feed_ids.is_empty() {
        return Ok(0);
    }
    Ok(tx
        .execute(
            "
            WITH affected AS (
                SELECT post_id FROM posts
                WHERE feed_ids && $1::INT[]
                ORDER BY post_id
                LIMIT $2
            )
            UPDATE posts p
            SET feed_ids = ARRAY(SELECT unnest(p.feed_ids) EXCEPT SELECT unnest($1::INT[])),
                destination_feed_ids = ARRAY(
                    SELECT unnest(p.destination_feed_ids) EXCEPT SELECT unnest($1::INT[])
                )
            FROM affected
            WHERE p.post_id = affected.post_id
            ",
            &[&feed_ids, &limit],
        )
        .await?)
}
