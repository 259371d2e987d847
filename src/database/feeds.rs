use deadpool_postgres::Transaction;
use tokio_postgres::Row;

use crate::{
    database::conn::{DbError, LazyConn},
    entities::feed::{Feed, FeedName},
    entities::post::DestinationFeed,
};

fn row_to_feed(row: &Row) -> Feed {
    let name: String = row.get("name");
    Feed {
        feed_id: row.get("feed_id"),
        user_id: row.get("user_id"),
        name: FeedName::from_db(&name).expect("unknown feed name in feeds table"),
        title: row.get("title"),
        is_inherent: row.get("is_inherent"),
        ord: row.get("ord"),
    }
}

/// Create the owner's fixed feed set. The RiverOfNews instance created here
/// is the inherent one. Idempotent for singleton kinds.
pub async fn ensure_default_feeds(user_id: i64, tx: &mut Transaction<'_>) -> Result<(), DbError> {
    for name in FeedName::ALL {
        if name.is_singleton() {
            tx.execute(
                "
                INSERT INTO feeds (user_id, name)
                VALUES ($1, $2)
                ON CONFLICT (user_id, name) WHERE name <> 'RiverOfNews' DO NOTHING
                ",
                &[&user_id, &name.as_str()],
            )
            .await?;
        } else {
            tx.execute(
                "
                INSERT INTO feeds (user_id, name, is_inherent, ord)
                SELECT $1, $2, TRUE, 0
                WHERE NOT EXISTS (
                    SELECT 1 FROM feeds
                    WHERE user_id = $1 AND name = $2 AND is_inherent
                )
                ",
                &[&user_id, &name.as_str()],
            )
            .await?;
        }
    }
    Ok(())
}

pub async fn get_feed(feed_id: i32, conn: &mut LazyConn) -> Result<Option<Feed>, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt(
            "
            SELECT feed_id, user_id, name, title, is_inherent, ord
            FROM feeds
            WHERE feed_id = $1
            ",
            &[&feed_id],
        )
        .await?;
    Ok(row.as_ref().map(row_to_feed))
}

/// The owner's singleton feed of a given kind. For RiverOfNews this is the
/// inherent instance.
pub async fn get_user_named_feed(
    user_id: i64,
    name: FeedName,
    conn: &mut LazyConn,
) -> Result<Option<Feed>, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt(
            "
            SELECT feed_id, user_id, name, title, is_inherent, ord
            FROM feeds
            WHERE user_id = $1 AND name = $2
              AND (name <> 'RiverOfNews' OR is_inherent)
            ",
            &[&user_id, &name.as_str()],
        )
        .await?;
    Ok(row.as_ref().map(row_to_feed))
}

pub async fn list_home_feeds(user_id: i64, conn: &mut LazyConn) -> Result<Vec<Feed>, DbError> {
    let db = conn.get_client().await?;
    let rows = db
        .query(
            "
            SELECT feed_id, user_id, name, title, is_inherent, ord
            FROM feeds
            WHERE user_id = $1 AND name = 'RiverOfNews'
            ORDER BY is_inherent DESC, ord NULLS LAST, feed_id
            ",
            &[&user_id],
        )
        .await?;
    Ok(rows.iter().map(row_to_feed).collect())
}

pub async fn create_home_feed(
    user_id: i64,
    title: &str,
    tx: &mut Transaction<'_>,
) -> Result<Feed, DbError> {
    let row = tx
        .query_one(
            "
            INSERT INTO feeds (user_id, name, title, is_inherent, ord)
            VALUES ($1, 'RiverOfNews', $2, FALSE,
                    (SELECT COALESCE(MAX(ord), 0) + 1
                     FROM feeds WHERE user_id = $1 AND name = 'RiverOfNews'))
            RETURNING feed_id, user_id, name, title, is_inherent, ord
            ",
            &[&user_id, &title],
        )
        .await?;
    Ok(row_to_feed(&row))
}

pub async fn update_home_feed(
    feed_id: i32,
    title: Option<&str>,
    ord: Option<i32>,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let mut set_clauses = Vec::new();
    let mut values: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = Vec::new();

    if let Some(ref title) = title {
        values.push(title);
        set_clauses.push(format!("title = ${}", values.len() + 1));
    }
    if let Some(ref ord) = ord {
        values.push(ord);
        set_clauses.push(format!("ord = ${}", values.len() + 1));
    }

    if set_clauses.is_empty() {
        return Ok(false);
    }

    let query = format!(
        "UPDATE feeds SET {} WHERE feed_id = $1 AND name = 'RiverOfNews'",
        set_clauses.join(", ")
    );

    let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = vec![&feed_id];
    params.extend(values);

    let updated = tx.execute(query.as_str(), &params).await?;
    Ok(updated > 0)
}

/// Delete an auxiliary home feed. Refuses the inherent one. Subscriptions
/// that only targeted the deleted feed fall back to the inherent home feed;
/// post memberships move with them.
pub async fn delete_home_feed(feed: &Feed, tx: &mut Transaction<'_>) -> Result<bool, DbError> {
    if feed.is_inherent || feed.name != FeedName::RiverOfNews {
        return Ok(false);
    }

    let inherent_id: i32 = tx
        .query_one(
            "
            SELECT feed_id FROM feeds
            WHERE user_id = $1 AND name = 'RiverOfNews' AND is_inherent
            ",
            &[&feed.user_id],
        )
        .await?
        .get("feed_id");

    // point orphaned subscriptions at the inherent feed
    tx.execute(
        "
        UPDATE subscriptions
        SET home_feed_ids = array_append(array_remove(home_feed_ids, $1), $2)
        WHERE user_id = $3 AND home_feed_ids = ARRAY[$1]
        ",
        &[&feed.feed_id, &inherent_id, &feed.user_id],
    )
    .await?;
    tx.execute(
        "
        UPDATE subscriptions
        SET home_feed_ids = array_remove(home_feed_ids, $1)
        WHERE user_id = $2 AND $1 = ANY (home_feed_ids)
        ",
        &[&feed.feed_id, &feed.user_id],
    )
    .await?;

    // migrate memberships, then drop the feed
    tx.execute(
        "
        UPDATE posts
        SET feed_ids = array_append(array_remove(feed_ids, $1), $2)
        WHERE feed_ids @> ARRAY[$1] AND NOT feed_ids @> ARRAY[$2]
        ",
        &[&feed.feed_id, &inherent_id],
    )
    .await?;
    tx.execute(
        "UPDATE posts SET feed_ids = array_remove(feed_ids, $1) WHERE feed_ids @> ARRAY[$1]",
        &[&feed.feed_id],
    )
    .await?;

    let deleted = tx
        .execute(
            "DELETE FROM feeds WHERE feed_id = $1 AND NOT is_inherent",
            &[&feed.feed_id],
        )
        .await?;
    Ok(deleted > 0)
}

/// Load what a post needs to know about its destination feeds to derive
/// privacy flags and route fan-out.
pub async fn load_destination_feeds(
    feed_ids: &[i32],
    conn: &mut LazyConn,
) -> Result<Vec<DestinationFeed>, DbError> {
    let db = conn.get_client().await?;
    let rows = db
        .query(
            "
            SELECT f.feed_id, f.name, u.is_private, u.is_protected
            FROM feeds f
            JOIN users u ON u.user_id = f.user_id
            WHERE f.feed_id = ANY ($1)
            ",
            &[&feed_ids],
        )
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            let name: String = row.get("name");
            FeedName::from_db(&name).map(|name| DestinationFeed {
                feed_id: row.get("feed_id"),
                name,
                owner_is_private: row.get("is_private"),
                owner_is_protected: row.get("is_protected"),
            })
        })
        .collect())
}

/// Feed ids owned by a user, optionally limited to one kind.
pub async fn user_feed_ids(
    user_id: i64,
    name: Option<FeedName>,
    conn: &mut LazyConn,
) -> Result<Vec<i32>, DbError> {
    let db = conn.get_client().await?;
    let rows = match name {
        Some(name) => {
            db.query(
                "SELECT feed_id FROM feeds WHERE user_id = $1 AND name = $2",
                &[&user_id, &name.as_str()],
            )
            .await?
        }
        None => {
            db.query("SELECT feed_id FROM feeds WHERE user_id = $1", &[&user_id])
                .await?
        }
    };
    Ok(rows.iter().map(|r| r.get("feed_id")).collect())
}
