use deadpool_postgres::Transaction;
use tracing::debug;

use crate::{
    database::{
        bans,
        conn::{DbError, LazyConn},
        feeds, groups, subscriptions, timelines,
    },
    entities::feed::FeedName,
    entities::post::{DestinationFeed, Post},
    entities::user::User,
    services::ServiceError,
    utils::perms::{GroupPermission, role_permissions},
};

/// How many of a feed's recent posts flow into a fresh subscriber's river.
const BACKFILL_POSTS: i64 = 30;

/// Check that the author may address every requested destination feed and
/// return the loaded descriptors.
///
/// Allowed destinations: the author's own Posts and Directs feeds, the
/// Directs feed of another active user (unless a ban crosses the pair),
/// and the Posts feed of a group the author belongs to.
pub async fn resolve_destinations(
    author: &User,
    destination_feed_ids: &[i32],
    conn: &mut LazyConn,
) -> Result<Vec<DestinationFeed>, ServiceError> {
    let loaded = feeds::load_destination_feeds(destination_feed_ids, conn).await?;
    if loaded.len() != destination_feed_ids.len() {
        return Err(ServiceError::NotFound("destination feed"));
    }

    for dest in &loaded {
        if !dest.name.is_destination() {
            return Err(ServiceError::Forbidden("feed is not a destination"));
        }

        let feed = feeds::get_feed(dest.feed_id, conn)
            .await?
            .ok_or(ServiceError::NotFound("destination feed"))?;

        if feed.user_id == author.user_id {
            continue;
        }

        match feed.name {
            FeedName::Directs => {
                if bans::is_banned(feed.user_id, author.user_id, conn).await?
                    || bans::is_banned(author.user_id, feed.user_id, conn).await?
                {
                    return Err(ServiceError::Forbidden("direct recipient unavailable"));
                }
            }
            FeedName::Posts => {
                let role = groups::member_role(feed.user_id, author.user_id, conn)
                    .await?
                    .ok_or(ServiceError::Forbidden("not a group member"))?;
                if !role_permissions(role).contains(GroupPermission::POST) {
                    return Err(ServiceError::Forbidden("cannot post to group"));
                }
            }
            _ => return Err(ServiceError::Forbidden("feed is not a destination")),
        }
    }

    Ok(loaded)
}

/// Materialize the full membership set for a new post: its destinations,
/// the author's own river, direct recipients' rivers, and the selected home
/// feeds of every subscriber of each destination Posts feed.
pub async fn fanout_feed_ids(
    author_id: i64,
    destinations: &[DestinationFeed],
    conn: &mut LazyConn,
) -> Result<Vec<i32>, DbError> {
    let mut out: Vec<i32> = destinations.iter().map(|d| d.feed_id).collect();

    let push = |id: i32, out: &mut Vec<i32>| {
        if !out.contains(&id) {
            out.push(id);
        }
    };

    if let Some(river) = feeds::get_user_named_feed(author_id, FeedName::RiverOfNews, conn).await? {
        push(river.feed_id, &mut out);
    }

    for dest in destinations {
        let Some(feed) = feeds::get_feed(dest.feed_id, conn).await? else {
            continue;
        };

        match feed.name {
            FeedName::Directs if feed.user_id != author_id => {
                if let Some(river) =
                    feeds::get_user_named_feed(feed.user_id, FeedName::RiverOfNews, conn).await?
                {
                    push(river.feed_id, &mut out);
                }
            }
            FeedName::Posts => {
                for subscriber in subscriptions::list_feed_subscribers(feed.feed_id, conn).await? {
                    for home_id in subscriber.home_feed_ids {
                        push(home_id, &mut out);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementKind {
    Like,
    Comment,
}

impl EngagementKind {
    fn feed_name(&self) -> FeedName {
        match self {
            EngagementKind::Like => FeedName::Likes,
            EngagementKind::Comment => FeedName::Comments,
        }
    }
}

/// Write-time propagation of a like or comment.
///
/// The post lands in the actor's Likes/Comments and MyDiscussions feeds.
/// When the post is propagable it also surfaces, with a local bump, in the
/// home feeds of the actor's subscribers who can't already see it and who
/// don't cross a ban with the author.
pub async fn propagate_engagement(
    actor_id: i64,
    kind: EngagementKind,
    post: &Post,
    conn: &mut LazyConn,
    tx: &mut Transaction<'_>,
) -> Result<(), ServiceError> {
    let mut member_ids: Vec<i32> = Vec::new();

    if let Some(feed) = feeds::get_user_named_feed(actor_id, kind.feed_name(), conn).await? {
        member_ids.push(feed.feed_id);
    }
    if let Some(discussions) =
        feeds::get_user_named_feed(actor_id, FeedName::MyDiscussions, conn).await?
    {
        member_ids.push(discussions.feed_id);
    }

    let mut bumped_users: Vec<i64> = Vec::new();

    if post.is_propagable {
        if let Some(actor_posts) =
            feeds::get_user_named_feed(actor_id, FeedName::Posts, conn).await?
        {
            for subscriber in
                subscriptions::list_feed_subscribers(actor_posts.feed_id, conn).await?
            {
                if subscriber.user_id == post.user_id {
                    continue;
                }
                if bans::is_banned(subscriber.user_id, post.user_id, conn).await?
                    || bans::is_banned(post.user_id, subscriber.user_id, conn).await?
                {
                    continue;
                }

                let already_visible = subscriber
                    .home_feed_ids
                    .iter()
                    .any(|id| post.feed_ids.contains(id));
                if already_visible {
                    continue;
                }

                member_ids.extend(subscriber.home_feed_ids.iter().copied());
                bumped_users.push(subscriber.user_id);
            }
        }
    }

    timelines::add_post_to_feeds(post.post_id, &member_ids, tx).await?;
    for user_id in &bumped_users {
        timelines::insert_local_bump(post.post_id, *user_id, tx).await?;
    }

    debug!(
        post_id = post.post_id,
        actor_id,
        surfaced = bumped_users.len(),
        "engagement propagated"
    );
    Ok(())
}

/// Undo the actor-owned memberships after their last like/comment on the
/// post is gone. Home-feed copies surfaced for other viewers stay; their
/// local bumps already encode when and why they appeared.
pub async fn withdraw_engagement(
    actor_id: i64,
    kind: EngagementKind,
    post_id: i64,
    still_engaged_elsewhere: bool,
    conn: &mut LazyConn,
    tx: &mut Transaction<'_>,
) -> Result<(), ServiceError> {
    let mut member_ids: Vec<i32> = Vec::new();

    if let Some(feed) = feeds::get_user_named_feed(actor_id, kind.feed_name(), conn).await? {
        member_ids.push(feed.feed_id);
    }
    if !still_engaged_elsewhere {
        if let Some(discussions) =
            feeds::get_user_named_feed(actor_id, FeedName::MyDiscussions, conn).await?
        {
            member_ids.push(discussions.feed_id);
        }
    }

    timelines::remove_post_from_feeds(post_id, &member_ids, tx).await?;
    Ok(())
}

/// A fresh subscription pulls the target feed's recent propagable posts
/// into the selected home feeds.
pub async fn backfill_home_feeds(
    target_feed_id: i32,
    home_feed_ids: &[i32],
    conn: &mut LazyConn,
    tx: &mut Transaction<'_>,
) -> Result<u64, ServiceError> {
    let post_ids = timelines::recent_propagable_posts(target_feed_id, BACKFILL_POSTS, conn).await?;
    let mut added = 0;
    for post_id in post_ids {
        timelines::add_post_to_feeds(post_id, home_feed_ids, tx).await?;
        added += 1;
    }
    Ok(added)
}

/// After an unsubscribe, drop the target's posts out of the subscriber's
/// home feeds unless another remaining subscription or the subscriber's own
/// feeds still justify them.
pub async fn cleanup_after_unsubscribe(
    subscriber_id: i64,
    target_feed_id: i32,
    conn: &mut LazyConn,
    tx: &mut Transaction<'_>,
) -> Result<u64, ServiceError> {
    let home_ids = feeds::user_feed_ids(subscriber_id, Some(FeedName::RiverOfNews), conn).await?;
    if home_ids.is_empty() {
        return Ok(0);
    }

    let mut reachable = subscriptions::subscribed_feed_ids(subscriber_id, conn).await?;
    reachable.extend(feeds::user_feed_ids(subscriber_id, None, conn).await?);

    let removed = tx
        .execute(
            "
            UPDATE posts
            SET feed_ids = ARRAY(SELECT unnest(feed_ids) EXCEPT SELECT unnest($1::INT[]))
            WHERE destination_feed_ids @> ARRAY[$2]
              AND NOT destination_feed_ids && $3::INT[]
              AND feed_ids && $1::INT[]
            ",
            &[&home_ids, &target_feed_id, &reachable],
        )
        .await
        .map_err(DbError::from)?;

    debug!(
        subscriber_id,
        target_feed_id, removed, "unsubscribe cleanup finished"
    );
    Ok(removed)
}
