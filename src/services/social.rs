use tracing::info;

use crate::{
    create_tx,
    database::{bans, feeds, groups, subscriptions, timelines, visibility::Viewer},
    entities::feed::{Feed, FeedName},
    entities::post::Post,
    entities::user::User,
    get_conn,
    services::ServiceError,
    services::fanout,
    utils::perms::{GroupPermission, GroupRole, role_permissions},
    utils::state::ArcAppState,
};

/// Load everything the visibility filter needs to know about a viewer.
pub async fn load_viewer(state: &ArcAppState, user_id: Option<i64>) -> Result<Viewer, ServiceError> {
    let Some(user_id) = user_id else {
        return Ok(Viewer::anonymous());
    };

    let mut conn = get_conn!(state);
    Ok(Viewer {
        user_id: Some(user_id),
        subscribed_feed_ids: subscriptions::subscribed_feed_ids(user_id, &mut conn).await?,
        own_feed_ids: feeds::user_feed_ids(user_id, None, &mut conn).await?,
        banned_user_ids: bans::banned_user_ids(user_id, &mut conn).await?,
        banned_by_user_ids: bans::banned_by_user_ids(user_id, &mut conn).await?,
    })
}

/// Subscribe to a user's or group's Posts feed.
///
/// Private targets go through a subscription request instead; the
/// subscription only materializes on acceptance. Returns true when the
/// subscription (not a request) now exists.
pub async fn subscribe(
    state: &ArcAppState,
    subscriber: &User,
    target: &User,
    home_feed_ids: Option<Vec<i32>>,
) -> Result<bool, ServiceError> {
    if !subscriber.is_active() {
        return Err(ServiceError::GoneUser);
    }
    if subscriber.user_id == target.user_id {
        return Err(ServiceError::Forbidden("self subscription"));
    }
    if !target.is_active() {
        return Err(ServiceError::NotFound("user"));
    }

    let mut conn = get_conn!(state);
    if bans::is_banned(target.user_id, subscriber.user_id, &mut conn).await?
        || bans::is_banned(subscriber.user_id, target.user_id, &mut conn).await?
    {
        return Err(ServiceError::Forbidden("ban in effect"));
    }

    let posts_feed = feeds::get_user_named_feed(target.user_id, FeedName::Posts, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("posts feed"))?;

    let accepted = subscriptions::is_subscribed(subscriber.user_id, posts_feed.feed_id, &mut conn)
        .await?;
    if target.is_private && !accepted {
        let mut tx_conn = get_conn!(state);
        let mut tx = create_tx!(tx_conn);
        subscriptions::create_subscription_request(subscriber.user_id, target.user_id, &mut tx)
            .await?;
        tx.commit().await.map_err(ServiceError::from)?;
        info!(
            from = subscriber.user_id,
            to = target.user_id,
            "subscription requested"
        );
        return Ok(false);
    }

    let home_feed_ids = match home_feed_ids {
        Some(ids) if !ids.is_empty() => {
            // every selected feed must be one of the subscriber's own home feeds
            let own = feeds::user_feed_ids(subscriber.user_id, Some(FeedName::RiverOfNews), &mut conn)
                .await?;
            if ids.iter().any(|id| !own.contains(id)) {
                return Err(ServiceError::Forbidden("not a home feed"));
            }
            ids
        }
        _ => {
            let inherent =
                feeds::get_user_named_feed(subscriber.user_id, FeedName::RiverOfNews, &mut conn)
                    .await?
                    .ok_or(ServiceError::NotFound("home feed"))?;
            vec![inherent.feed_id]
        }
    };

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    let created = subscriptions::insert_subscription(
        subscriber.user_id,
        posts_feed.feed_id,
        target.user_id,
        &home_feed_ids,
        &mut tx,
    )
    .await?;
    fanout::backfill_home_feeds(posts_feed.feed_id, &home_feed_ids, &mut conn, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;

    info!(
        subscriber = subscriber.user_id,
        target = target.user_id,
        "subscribed"
    );
    Ok(created)
}

/// Accept a pending request to a private account: consumes the request and
/// materializes the subscription into the requester's inherent home feed.
pub async fn accept_subscription_request(
    state: &ArcAppState,
    owner: &User,
    requester_id: i64,
) -> Result<(), ServiceError> {
    let mut conn = get_conn!(state);
    if !subscriptions::has_subscription_request(requester_id, owner.user_id, &mut conn).await? {
        return Err(ServiceError::NotFound("request"));
    }

    let posts_feed = feeds::get_user_named_feed(owner.user_id, FeedName::Posts, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("posts feed"))?;
    let inherent = feeds::get_user_named_feed(requester_id, FeedName::RiverOfNews, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("home feed"))?;
    let home_feed_ids = vec![inherent.feed_id];

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    subscriptions::delete_subscription_request(requester_id, owner.user_id, &mut tx).await?;
    subscriptions::insert_subscription(
        requester_id,
        posts_feed.feed_id,
        owner.user_id,
        &home_feed_ids,
        &mut tx,
    )
    .await?;
    fanout::backfill_home_feeds(posts_feed.feed_id, &home_feed_ids, &mut conn, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(())
}

pub async fn reject_subscription_request(
    state: &ArcAppState,
    owner: &User,
    requester_id: i64,
) -> Result<bool, ServiceError> {
    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    let removed =
        subscriptions::delete_subscription_request(requester_id, owner.user_id, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(removed)
}

pub async fn unsubscribe(
    state: &ArcAppState,
    subscriber: &User,
    target: &User,
) -> Result<bool, ServiceError> {
    let mut conn = get_conn!(state);
    let posts_feed = feeds::get_user_named_feed(target.user_id, FeedName::Posts, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("posts feed"))?;

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    let removed = subscriptions::delete_subscription(
        subscriber.user_id,
        posts_feed.feed_id,
        target.user_id,
        &mut tx,
    )
    .await?;
    if removed {
        fanout::cleanup_after_unsubscribe(
            subscriber.user_id,
            posts_feed.feed_id,
            &mut conn,
            &mut tx,
        )
        .await?;
    }
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(removed)
}

/// Ban a user: the relation is asymmetric but severs subscriptions and
/// pending requests in both directions immediately.
pub async fn ban(state: &ArcAppState, banner: &User, banned: &User) -> Result<bool, ServiceError> {
    if banner.user_id == banned.user_id {
        return Err(ServiceError::Forbidden("self ban"));
    }

    let mut conn = get_conn!(state);
    let banner_posts = feeds::get_user_named_feed(banner.user_id, FeedName::Posts, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("posts feed"))?;
    let banned_posts = feeds::get_user_named_feed(banned.user_id, FeedName::Posts, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("posts feed"))?;

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    let inserted = bans::insert_ban(banner.user_id, banned.user_id, &mut tx).await?;
    if inserted {
        subscriptions::delete_subscription(
            banner.user_id,
            banned_posts.feed_id,
            banned.user_id,
            &mut tx,
        )
        .await?;
        subscriptions::delete_subscription(
            banned.user_id,
            banner_posts.feed_id,
            banner.user_id,
            &mut tx,
        )
        .await?;
        subscriptions::delete_subscription_request(banner.user_id, banned.user_id, &mut tx).await?;
        subscriptions::delete_subscription_request(banned.user_id, banner.user_id, &mut tx).await?;

        fanout::cleanup_after_unsubscribe(banner.user_id, banned_posts.feed_id, &mut conn, &mut tx)
            .await?;
        fanout::cleanup_after_unsubscribe(banned.user_id, banner_posts.feed_id, &mut conn, &mut tx)
            .await?;
    }
    tx.commit().await.map_err(ServiceError::from)?;

    if inserted {
        info!(banner = banner.user_id, banned = banned.user_id, "ban created");
    }
    Ok(inserted)
}

pub async fn unban(state: &ArcAppState, banner: &User, banned: &User) -> Result<bool, ServiceError> {
    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    let removed = bans::delete_ban(banner.user_id, banned.user_id, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(removed)
}

/// Join a public group. Private groups take the subscription-request path
/// and membership is granted by an admin.
pub async fn join_group(
    state: &ArcAppState,
    user: &User,
    group: &User,
) -> Result<bool, ServiceError> {
    if !user.is_active() {
        return Err(ServiceError::GoneUser);
    }
    if !group.is_group() || !group.is_active() {
        return Err(ServiceError::NotFound("group"));
    }
    if group.is_private {
        return Err(ServiceError::Forbidden("private group"));
    }

    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    let joined = groups::insert_member(group.user_id, user.user_id, GroupRole::Member, &mut tx)
        .await?;
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(joined)
}

pub async fn leave_group(
    state: &ArcAppState,
    user: &User,
    group: &User,
) -> Result<bool, ServiceError> {
    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    let left = groups::remove_member(group.user_id, user.user_id, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(left)
}

/// Promote or demote a member. Only admins hold MANAGE_MEMBERS.
pub async fn set_group_role(
    state: &ArcAppState,
    actor: &User,
    group: &User,
    member_id: i64,
    role: GroupRole,
) -> Result<bool, ServiceError> {
    let mut conn = get_conn!(state);
    let actor_role = groups::member_role(group.user_id, actor.user_id, &mut conn)
        .await?
        .ok_or(ServiceError::Forbidden("not a group member"))?;
    if !role_permissions(actor_role).contains(GroupPermission::MANAGE_MEMBERS) {
        return Err(ServiceError::Forbidden("cannot manage members"));
    }

    let mut tx = create_tx!(conn);
    let updated = groups::set_member_role(group.user_id, member_id, role, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(updated)
}

/// One page of a viewer's home feed.
pub async fn read_home_feed(
    state: &ArcAppState,
    viewer_user: &User,
    feed: &Feed,
    page: timelines::TimelinePage,
) -> Result<Vec<Post>, ServiceError> {
    if feed.user_id != viewer_user.user_id || !feed.is_home() {
        return Err(ServiceError::Forbidden("not your home feed"));
    }
    let viewer = load_viewer(state, Some(viewer_user.user_id)).await?;
    let mut conn = get_conn!(state);
    Ok(timelines::read_feed_page(feed, &viewer, page, &mut conn).await?)
}

/// One page of a profile feed (Posts, Likes or Comments of some user),
/// filtered for the viewer.
pub async fn read_profile_feed(
    state: &ArcAppState,
    viewer_id: Option<i64>,
    owner: &User,
    name: FeedName,
    page: timelines::TimelinePage,
) -> Result<Vec<Post>, ServiceError> {
    if !matches!(name, FeedName::Posts | FeedName::Likes | FeedName::Comments) {
        return Err(ServiceError::Forbidden("not a profile feed"));
    }
    if !owner.is_active() {
        return Err(ServiceError::NotFound("user"));
    }

    let mut conn = get_conn!(state);
    let feed = feeds::get_user_named_feed(owner.user_id, name, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("feed"))?;

    let viewer = load_viewer(state, viewer_id).await?;
    Ok(timelines::read_feed_page(&feed, &viewer, page, &mut conn).await?)
}

/// Users stuck behind a private account see nothing of it until accepted.
pub async fn can_view_profile(
    state: &ArcAppState,
    viewer_id: Option<i64>,
    owner: &User,
) -> Result<bool, ServiceError> {
    if !owner.is_private {
        return Ok(viewer_id.is_some() || !owner.is_protected);
    }
    let Some(viewer_id) = viewer_id else {
        return Ok(false);
    };
    if viewer_id == owner.user_id {
        return Ok(true);
    }

    let mut conn = get_conn!(state);
    let posts_feed = feeds::get_user_named_feed(owner.user_id, FeedName::Posts, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("posts feed"))?;
    Ok(subscriptions::is_subscribed(viewer_id, posts_feed.feed_id, &mut conn).await?)
}

pub async fn list_home_feeds(state: &ArcAppState, owner: &User) -> Result<Vec<Feed>, ServiceError> {
    let mut conn = get_conn!(state);
    Ok(feeds::list_home_feeds(owner.user_id, &mut conn).await?)
}

pub async fn create_home_feed(
    state: &ArcAppState,
    owner: &User,
    title: &str,
) -> Result<Feed, ServiceError> {
    if !owner.is_active() {
        return Err(ServiceError::GoneUser);
    }
    if title.is_empty() || title.len() > 100 {
        return Err(ServiceError::Forbidden("bad title"));
    }

    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    let feed = feeds::create_home_feed(owner.user_id, title, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(feed)
}

pub async fn update_home_feed(
    state: &ArcAppState,
    owner: &User,
    feed_id: i32,
    title: Option<&str>,
    ord: Option<i32>,
) -> Result<bool, ServiceError> {
    let mut conn = get_conn!(state);
    let feed = feeds::get_feed(feed_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("feed"))?;
    if feed.user_id != owner.user_id {
        return Err(ServiceError::Forbidden("not your feed"));
    }

    let mut tx = create_tx!(conn);
    let updated = feeds::update_home_feed(feed_id, title, ord, &mut tx).await?;
    if updated {
        tx.commit().await.map_err(ServiceError::from)?;
    }
    Ok(updated)
}

/// Deleting an auxiliary home feed re-points its subscriptions and
/// memberships at the inherent one.
pub async fn delete_home_feed(
    state: &ArcAppState,
    owner: &User,
    feed_id: i32,
) -> Result<bool, ServiceError> {
    let mut conn = get_conn!(state);
    let feed = feeds::get_feed(feed_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("feed"))?;
    if feed.user_id != owner.user_id {
        return Err(ServiceError::Forbidden("not your feed"));
    }
    if feed.is_inherent {
        return Err(ServiceError::Forbidden("inherent home feed"));
    }

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    let deleted = feeds::delete_home_feed(&feed, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(deleted)
}
