use deadpool_postgres::Transaction;

use crate::database::conn::{DbError, LazyConn};

/// A subscriber of some Posts feed together with the home feeds that
/// receive its fan-out.
#[derive(Debug, Clone)]
pub struct FeedSubscriber {
    pub user_id: i64,
    pub home_feed_ids: Vec<i32>,
}

pub async fn is_subscribed(
    user_id: i64,
    to_feed_id: i32,
    conn: &mut LazyConn,
) -> Result<bool, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt(
            "SELECT 1 FROM subscriptions WHERE user_id = $1 AND to_feed_id = $2",
            &[&user_id, &to_feed_id],
        )
        .await?;
    Ok(row.is_some())
}

/// Insert the subscription row and maintain both users' counters.
/// Re-subscribing replaces the selected home feeds.
pub async fn insert_subscription(
    user_id: i64,
    to_feed_id: i32,
    feed_owner_id: i64,
    home_feed_ids: &[i32],
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let existing = tx
        .query_opt(
            "SELECT 1 FROM subscriptions WHERE user_id = $1 AND to_feed_id = $2",
            &[&user_id, &to_feed_id],
        )
        .await?;
    if existing.is_some() {
        tx.execute(
            "
            UPDATE subscriptions SET home_feed_ids = $3
            WHERE user_id = $1 AND to_feed_id = $2
            ",
            &[&user_id, &to_feed_id, &home_feed_ids],
        )
        .await?;
        return Ok(false);
    }

    tx.execute(
        "
        INSERT INTO subscriptions (user_id, to_feed_id, home_feed_ids)
        VALUES ($1, $2, $3)
        ",
        &[&user_id, &to_feed_id, &home_feed_ids],
    )
    .await?;
    tx.execute(
        "UPDATE users SET subscriptions_count = subscriptions_count + 1 WHERE user_id = $1",
        &[&user_id],
    )
    .await?;
    tx.execute(
        "UPDATE users SET subscribers_count = subscribers_count + 1 WHERE user_id = $1",
        &[&feed_owner_id],
    )
    .await?;

    Ok(true)
}

pub async fn delete_subscription(
    user_id: i64,
    to_feed_id: i32,
    feed_owner_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let deleted = tx
        .execute(
            "DELETE FROM subscriptions WHERE user_id = $1 AND to_feed_id = $2",
            &[&user_id, &to_feed_id],
        )
        .await?;
    if deleted > 0 {
        tx.execute(
            "
            UPDATE users
            SET subscriptions_count = GREATEST(subscriptions_count - 1, 0)
            WHERE user_id = $1
            ",
            &[&user_id],
        )
        .await?;
        tx.execute(
            "
            UPDATE users
            SET subscribers_count = GREATEST(subscribers_count - 1, 0)
            WHERE user_id = $1
            ",
            &[&feed_owner_id],
        )
        .await?;
    }
    Ok(deleted > 0)
}

/// Subscribers of a feed with their fan-out targets.
pub async fn list_feed_subscribers(
    feed_id: i32,
    conn: &mut LazyConn,
) -> Result<Vec<FeedSubscriber>, DbError> {
    let db = conn.get_client().await?;
    let rows = db
        .query(
            "
            SELECT user_id, home_feed_ids
            FROM subscriptions
            WHERE to_feed_id = $1
            ",
            &[&feed_id],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|r| FeedSubscriber {
            user_id: r.get("user_id"),
            home_feed_ids: r.get("home_feed_ids"),
        })
        .collect())
}

/// Feed ids the user subscribes to, for the visibility filter.
pub async fn subscribed_feed_ids(user_id: i64, conn: &mut LazyConn) -> Result<Vec<i32>, DbError> {
    let db = conn.get_client().await?;
    let rows = db
        .query(
            "SELECT to_feed_id FROM subscriptions WHERE user_id = $1",
            &[&user_id],
        )
        .await?;
    Ok(rows.iter().map(|r| r.get("to_feed_id")).collect())
}

pub async fn create_subscription_request(
    from_user_id: i64,
    to_user_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let inserted = tx
        .execute(
            "
            INSERT INTO subscription_requests (from_user_id, to_user_id)
            VALUES ($1, $2)
            ON CONFLICT (from_user_id, to_user_id) DO NOTHING
            ",
            &[&from_user_id, &to_user_id],
        )
        .await?;
    Ok(inserted > 0)
}

pub async fn delete_subscription_request(
    from_user_id: i64,
    to_user_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let deleted = tx
        .execute(
            "
            DELETE FROM subscription_requests
            WHERE from_user_id = $1 AND to_user_id = $2
            ",
            &[&from_user_id, &to_user_id],
        )
        .await?;
    Ok(deleted > 0)
}

pub async fn has_subscription_request(
    from_user_id: i64,
    to_user_id: i64,
    conn: &mut LazyConn,
) -> Result<bool, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt(
            "
            SELECT 1 FROM subscription_requests
            WHERE from_user_id = $1 AND to_user_id = $2
            ",
            &[&from_user_id, &to_user_id],
        )
        .await?;
    Ok(row.is_some())
}

/// Remove every subscription edge touching a user, in both directions.
/// Counter maintenance happens per affected row. Returns rows removed.
pub async fn sever_all_for_user(user_id: i64, tx: &mut Transaction<'_>) -> Result<u64, DbError> {
    // outgoing: decrement owners' subscriber counts
    tx.execute(
        "
        UPDATE users u
        SET subscribers_count = GREATEST(subscribers_count - sub.n, 0)
        FROM (
            SELECT f.user_id AS owner_id, COUNT(*) AS n
            FROM subscriptions s
            JOIN feeds f ON f.feed_id = s.to_feed_id
            WHERE s.user_id = $1
            GROUP BY f.user_id
        ) sub
        WHERE u.user_id = sub.owner_id
        ",
        &[&user_id],
    )
    .await?;
    let outgoing = tx
        .execute("DELETE FROM subscriptions WHERE user_id = $1", &[&user_id])
        .await?;

    // incoming: decrement subscribers' subscription counts
    tx.execute(
        "
        UPDATE users u
        SET subscriptions_count = GREATEST(subscriptions_count - sub.n, 0)
        FROM (
            SELECT s.user_id AS subscriber_id, COUNT(*) AS n
            FROM subscriptions s
            JOIN feeds f ON f.feed_id = s.to_feed_id
            WHERE f.user_id = $1
            GROUP BY s.user_id
        ) sub
        WHERE u.user_id = sub.subscriber_id
        ",
        &[&user_id],
    )
    .await?;
    let incoming = tx
        .execute(
            "
            DELETE FROM subscriptions s
            USING feeds f
            WHERE f.feed_id = s.to_feed_id AND f.user_id = $1
            ",
            &[&user_id],
        )
        .await?;

    let requests = tx
        .execute(
            "
            DELETE FROM subscription_requests
            WHERE from_user_id = $1 OR to_user_id = $1
            ",
            &[&user_id],
        )
        .await?;

    Ok(outgoing + incoming + requests)
}
