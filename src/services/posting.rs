use tracing::info;
use validator::Validate;

use crate::{
    create_tx,
    database::{engagement, feeds, groups, posts, timelines},
    entities::engagement::Comment,
    entities::feed::FeedName,
    entities::post::{Post, PrivacyFlags},
    entities::user::User,
    get_conn,
    services::events::{self, EventKind},
    services::fanout::{self, EngagementKind},
    services::input::{NewCommentInput, NewPostInput},
    services::ServiceError,
    utils::perms::{GroupPermission, role_permissions},
    utils::state::ArcAppState,
};

/// Create a post: authorize the destinations, derive the privacy flags,
/// materialize the fan-out set, write the row.
pub async fn create_post(
    state: &ArcAppState,
    author: &User,
    input: NewPostInput,
) -> Result<Post, ServiceError> {
    input.validate()?;
    if !author.is_active() {
        return Err(ServiceError::GoneUser);
    }

    let mut conn = get_conn!(state);
    let destinations =
        fanout::resolve_destinations(author, &input.destination_feed_ids, &mut conn).await?;
    let flags = PrivacyFlags::derive(&destinations);
    let feed_ids = fanout::fanout_feed_ids(author.user_id, &destinations, &mut conn).await?;

    let row = posts::NewPostRow {
        post_id: state.snowflake.generate(),
        user_id: author.user_id,
        body: input.body,
        destination_feed_ids: input.destination_feed_ids,
        feed_ids,
        flags,
    };

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    let post = posts::insert_post(&row, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;

    info!(post_id = post.post_id, author = author.user_id, "post created");
    events::publish(state, EventKind::PostNew, post.post_id, &post.feed_ids).await;
    Ok(post)
}

pub async fn update_post_body(
    state: &ArcAppState,
    actor: &User,
    post_id: i64,
    body: &str,
) -> Result<Post, ServiceError> {
    let mut conn = get_conn!(state);
    let post = posts::get_post(post_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("post"))?;
    if post.user_id != actor.user_id {
        return Err(ServiceError::Forbidden("not the author"));
    }

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    posts::update_post_body(post_id, body, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;

    events::publish(state, EventKind::PostUpdate, post_id, &post.feed_ids).await;

    let mut conn = get_conn!(state);
    posts::get_post(post_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("post"))
}

/// Re-target an existing post. Flags and fan-out are rebuilt from the new
/// destination set; memberships that only existed for the old set go away.
pub async fn update_post_destinations(
    state: &ArcAppState,
    actor: &User,
    post_id: i64,
    destination_feed_ids: Vec<i32>,
) -> Result<Post, ServiceError> {
    if destination_feed_ids.is_empty() {
        return Err(ServiceError::Forbidden("no destinations"));
    }

    let mut conn = get_conn!(state);
    let post = posts::get_post(post_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("post"))?;
    if post.user_id != actor.user_id {
        return Err(ServiceError::Forbidden("not the author"));
    }

    let destinations =
        fanout::resolve_destinations(actor, &destination_feed_ids, &mut conn).await?;
    let flags = PrivacyFlags::derive(&destinations);
    let feed_ids = fanout::fanout_feed_ids(actor.user_id, &destinations, &mut conn).await?;

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    posts::set_destinations(post_id, &destination_feed_ids, &feed_ids, flags, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;

    events::publish(state, EventKind::PostUpdate, post_id, &feed_ids).await;

    let mut conn = get_conn!(state);
    posts::get_post(post_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("post"))
}

/// Delete a post. The author may always do it; a group moderator may pull
/// a post out of the group by deleting it when it targets only that group.
pub async fn delete_post(
    state: &ArcAppState,
    actor: &User,
    post_id: i64,
) -> Result<(), ServiceError> {
    let mut conn = get_conn!(state);
    let post = posts::get_post(post_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("post"))?;

    if post.user_id != actor.user_id {
        let mut allowed = false;
        for dest in feeds::load_destination_feeds(&post.destination_feed_ids, &mut conn).await? {
            let Some(feed) = feeds::get_feed(dest.feed_id, &mut conn).await? else {
                continue;
            };
            if feed.name != FeedName::Posts || feed.user_id == post.user_id {
                continue;
            }
            if let Some(role) = groups::member_role(feed.user_id, actor.user_id, &mut conn).await? {
                if role_permissions(role).contains(GroupPermission::MODERATE_POSTS) {
                    allowed = true;
                    break;
                }
            }
        }
        if !allowed {
            return Err(ServiceError::Forbidden("not the author"));
        }
    }

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    posts::delete_post(post_id, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;

    info!(post_id, actor = actor.user_id, "post deleted");
    events::publish(state, EventKind::PostDestroy, post_id, &post.feed_ids).await;
    Ok(())
}

pub async fn add_comment(
    state: &ArcAppState,
    actor: &User,
    post_id: i64,
    input: NewCommentInput,
) -> Result<Comment, ServiceError> {
    input.validate()?;
    if !actor.is_active() {
        return Err(ServiceError::GoneUser);
    }

    let mut conn = get_conn!(state);
    let post = posts::get_post(post_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("post"))?;

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    let comment = engagement::insert_comment(
        state.snowflake.generate(),
        post_id,
        actor.user_id,
        &input.body,
        &mut tx,
    )
    .await?;
    posts::adjust_comments_count(post_id, 1, &mut tx).await?;
    posts::bump_post(post_id, &mut tx).await?;
    fanout::propagate_engagement(actor.user_id, EngagementKind::Comment, &post, &mut conn, &mut tx)
        .await?;
    tx.commit().await.map_err(ServiceError::from)?;

    events::publish(state, EventKind::CommentNew, comment.comment_id, &post.feed_ids).await;
    Ok(comment)
}

pub async fn delete_comment(
    state: &ArcAppState,
    actor: &User,
    comment_id: i64,
) -> Result<(), ServiceError> {
    let mut conn = get_conn!(state);
    let comment = engagement::get_comment(comment_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("comment"))?;
    if comment.user_id != actor.user_id {
        return Err(ServiceError::Forbidden("not the author"));
    }

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    engagement::delete_comment(comment_id, &mut tx).await?;
    posts::adjust_comments_count(comment.post_id, -1, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;

    // membership withdrawal needs the post-delete view of the table
    let mut conn = get_conn!(state);
    let still_commenting =
        engagement::user_commented_post(actor.user_id, comment.post_id, &mut conn).await?;
    let liked = engagement::get_like(comment.post_id, actor.user_id, &mut conn)
        .await?
        .is_some();

    if !still_commenting {
        let mut tx_conn = get_conn!(state);
        let mut tx = create_tx!(tx_conn);
        fanout::withdraw_engagement(
            actor.user_id,
            EngagementKind::Comment,
            comment.post_id,
            liked,
            &mut conn,
            &mut tx,
        )
        .await?;
        tx.commit().await.map_err(ServiceError::from)?;
    }
    Ok(())
}

pub async fn like_post(
    state: &ArcAppState,
    actor: &User,
    post_id: i64,
) -> Result<bool, ServiceError> {
    if !actor.is_active() {
        return Err(ServiceError::GoneUser);
    }

    let mut conn = get_conn!(state);
    let post = posts::get_post(post_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("post"))?;
    if post.user_id == actor.user_id {
        return Err(ServiceError::Forbidden("own post"));
    }

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    let inserted = engagement::insert_like(post_id, actor.user_id, &mut tx).await?;
    if !inserted {
        tx.rollback().await.map_err(ServiceError::from)?;
        return Ok(false);
    }
    posts::adjust_likes_count(post_id, 1, &mut tx).await?;
    fanout::propagate_engagement(actor.user_id, EngagementKind::Like, &post, &mut conn, &mut tx)
        .await?;
    tx.commit().await.map_err(ServiceError::from)?;

    events::publish(state, EventKind::LikeNew, post_id, &post.feed_ids).await;
    Ok(true)
}

pub async fn unlike_post(
    state: &ArcAppState,
    actor: &User,
    post_id: i64,
) -> Result<bool, ServiceError> {
    let mut conn = get_conn!(state);
    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    let deleted = engagement::delete_like(post_id, actor.user_id, &mut tx).await?;
    if !deleted {
        tx.rollback().await.map_err(ServiceError::from)?;
        return Ok(false);
    }
    posts::adjust_likes_count(post_id, -1, &mut tx).await?;

    let still_commenting =
        engagement::user_commented_post(actor.user_id, post_id, &mut conn).await?;
    fanout::withdraw_engagement(
        actor.user_id,
        EngagementKind::Like,
        post_id,
        still_commenting,
        &mut conn,
        &mut tx,
    )
    .await?;
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(true)
}

/// Move the author's post back to the top of every feed it lives in.
pub async fn bump_post(
    state: &ArcAppState,
    actor: &User,
    post_id: i64,
) -> Result<(), ServiceError> {
    let mut conn = get_conn!(state);
    let post = posts::get_post(post_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("post"))?;
    if post.user_id != actor.user_id {
        return Err(ServiceError::Forbidden("not the author"));
    }

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    posts::bump_post(post_id, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;

    events::publish(state, EventKind::PostUpdate, post_id, &post.feed_ids).await;
    Ok(())
}

/// Membership edit on the viewer's own singleton feed (Hides or Saves).
async fn toggle_viewer_feed(
    state: &ArcAppState,
    viewer: &User,
    post_id: i64,
    name: FeedName,
    add: bool,
) -> Result<(), ServiceError> {
    let mut conn = get_conn!(state);
    posts::get_post(post_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("post"))?;
    let feed = feeds::get_user_named_feed(viewer.user_id, name, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("feed"))?;

    let mut tx_conn = get_conn!(state);
    let mut tx = create_tx!(tx_conn);
    if add {
        timelines::add_post_to_feeds(post_id, &[feed.feed_id], &mut tx).await?;
    } else {
        timelines::remove_post_from_feeds(post_id, &[feed.feed_id], &mut tx).await?;
    }
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(())
}

pub async fn hide_post(state: &ArcAppState, viewer: &User, post_id: i64) -> Result<(), ServiceError> {
    toggle_viewer_feed(state, viewer, post_id, FeedName::Hides, true).await
}

pub async fn unhide_post(
    state: &ArcAppState,
    viewer: &User,
    post_id: i64,
) -> Result<(), ServiceError> {
    toggle_viewer_feed(state, viewer, post_id, FeedName::Hides, false).await
}

pub async fn save_post(state: &ArcAppState, viewer: &User, post_id: i64) -> Result<(), ServiceError> {
    toggle_viewer_feed(state, viewer, post_id, FeedName::Saves, true).await
}

pub async fn unsave_post(
    state: &ArcAppState,
    viewer: &User,
    post_id: i64,
) -> Result<(), ServiceError> {
    toggle_viewer_feed(state, viewer, post_id, FeedName::Saves, false).await
}
