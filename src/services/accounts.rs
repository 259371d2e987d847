use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::{
    create_tx,
    database::{feeds, groups, jobs, sessions, users, users::UserProfileUpdate},
    entities::user::{GoneStatus, User, UserType},
    get_conn,
    services::deletion::{COOLDOWN_SECS, JOB_GONE_CLEANUP},
    services::events::{self, EventKind},
    services::input::{NewGroupInput, NewUserInput},
    services::{ServiceError, input},
    utils::perms::GroupRole,
    utils::security::{self, TokenKind},
    utils::state::ArcAppState,
};

/// Create a user and its fixed feed set in one transaction.
pub async fn create_user(state: &ArcAppState, input: NewUserInput) -> Result<User, ServiceError> {
    input.validate()?;

    let mut conn = get_conn!(state);
    if users::get_user_by_username(&input.username, &mut conn)
        .await?
        .is_some()
    {
        return Err(ServiceError::Conflict("username taken"));
    }

    let user_id = state.snowflake.generate();
    let hashed = security::store_password_async(input.password).await;

    let row = users::NewUserRow {
        user_id,
        username: input.username,
        screen_name: input.screen_name,
        user_type: UserType::User,
        email: input.email,
        hashed_password: Some(hashed),
        is_private: input.is_private,
        is_protected: input.is_protected || input.is_private,
    };

    let mut tx = create_tx!(conn);
    users::insert_user(&row, &mut tx).await?;
    feeds::ensure_default_feeds(user_id, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;

    info!(user_id, "user created");

    let mut conn = get_conn!(state);
    users::get_user(user_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("user"))
}

/// Groups are users of type `group`: no credentials, same feed set. The
/// creator becomes the first admin.
pub async fn create_group(
    state: &ArcAppState,
    creator: &User,
    input: NewGroupInput,
) -> Result<User, ServiceError> {
    input.validate()?;

    if !creator.is_active() {
        return Err(ServiceError::GoneUser);
    }

    let mut conn = get_conn!(state);
    if users::get_user_by_username(&input.username, &mut conn)
        .await?
        .is_some()
    {
        return Err(ServiceError::Conflict("username taken"));
    }

    let group_id = state.snowflake.generate();
    let row = users::NewUserRow {
        user_id: group_id,
        username: input.username,
        screen_name: input.screen_name,
        user_type: UserType::Group,
        email: None,
        hashed_password: None,
        is_private: input.is_private,
        is_protected: input.is_private,
    };

    let mut tx = create_tx!(conn);
    users::insert_user(&row, &mut tx).await?;
    feeds::ensure_default_feeds(group_id, &mut tx).await?;
    groups::insert_member(group_id, creator.user_id, GroupRole::Admin, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;

    info!(group_id, creator = creator.user_id, "group created");

    let mut conn = get_conn!(state);
    users::get_user(group_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("group"))
}

pub async fn update_profile(
    state: &ArcAppState,
    user_id: i64,
    input: input::ProfileUpdateInput,
) -> Result<bool, ServiceError> {
    input.validate()?;
    let update = crate::map_struct!(input => UserProfileUpdate { screen_name, email });

    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    let dirty = users::update_user_profile(user_id, update, &mut tx).await?;
    if dirty {
        tx.commit().await.map_err(ServiceError::from)?;
    }
    Ok(dirty)
}

/// Flip account privacy. The derived flags of existing posts follow via
/// the schema cascade.
pub async fn update_privacy(
    state: &ArcAppState,
    user_id: i64,
    is_private: bool,
    is_protected: bool,
) -> Result<(), ServiceError> {
    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    users::update_privacy(user_id, is_private, is_protected, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(())
}

/// User-initiated freeze. Content stays but stops surfacing anywhere.
pub async fn suspend(state: &ArcAppState, user: &User) -> Result<(), ServiceError> {
    match user.gone_status {
        None => {}
        Some(s) if s.is_resumable() => return Err(ServiceError::Conflict("already gone")),
        Some(_) => return Err(ServiceError::GoneUser),
    }

    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    users::set_gone_status(user.user_id, Some(GoneStatus::Suspended), &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;

    info!(user_id = user.user_id, "user suspended");
    events::publish(state, EventKind::UserGone, user.user_id, &[]).await;
    Ok(())
}

/// Request account deletion: enter cooldown and schedule the cleanup job
/// to fire when the grace window lapses. One pending job per user.
pub async fn request_deletion(state: &ArcAppState, user: &User) -> Result<(), ServiceError> {
    match user.gone_status {
        None | Some(GoneStatus::Suspended) => {}
        Some(GoneStatus::Cooldown) => return Err(ServiceError::Conflict("already requested")),
        Some(_) => return Err(ServiceError::GoneUser),
    }

    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    users::set_gone_status(user.user_id, Some(GoneStatus::Cooldown), &mut tx).await?;
    jobs::create_job(
        state.snowflake.generate(),
        JOB_GONE_CLEANUP,
        &json!({ "user_id": user.user_id }),
        Some(&user.user_id.to_string()),
        COOLDOWN_SECS,
        &mut tx,
    )
    .await?;
    tx.commit().await.map_err(ServiceError::from)?;

    info!(user_id = user.user_id, "deletion requested");
    events::publish(state, EventKind::UserGone, user.user_id, &[]).await;
    Ok(())
}

/// Come back from a resumable gone stage. Cancels the pending cleanup job
/// when the user was in cooldown.
pub async fn resume(state: &ArcAppState, user: &User) -> Result<(), ServiceError> {
    match user.gone_status {
        Some(s) if s.is_resumable() => {}
        Some(_) => return Err(ServiceError::GoneUser),
        None => return Err(ServiceError::Conflict("not gone")),
    }

    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    users::set_gone_status(user.user_id, None, &mut tx).await?;
    jobs::delete_job_by_key(JOB_GONE_CLEANUP, &user.user_id.to_string(), &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;

    info!(user_id = user.user_id, "user resumed");
    Ok(())
}

pub struct Tokens {
    pub access: String,
    pub refresh: String,
}

/// Password login: verify credentials, open a session row, mint the token
/// pair bound to it.
pub async fn create_session(
    state: &ArcAppState,
    email: &str,
    password: &str,
) -> Result<Tokens, ServiceError> {
    let mut conn = get_conn!(state);
    let auth_user = users::get_auth_user_by_email(email, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("user"))?;

    if auth_user.gone_status.is_some() {
        return Err(ServiceError::GoneUser);
    }

    let Some(stored) = auth_user.hashed_password.clone() else {
        return Err(ServiceError::Forbidden("no password login"));
    };
    if !security::check_password_async(stored, password.to_string()).await {
        return Err(ServiceError::Forbidden("bad credentials"));
    }

    let session_id = state.snowflake.generate();
    let secret = security::generate_key(16);

    let mut tx = create_tx!(conn);
    sessions::insert_session(session_id, auth_user.user_id, &secret, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;

    let signature_key = &state.config.signature_key;
    Ok(Tokens {
        access: security::generate_token(
            auth_user.user_id,
            session_id,
            TokenKind::Access,
            &secret,
            signature_key,
        ),
        refresh: security::generate_token(
            auth_user.user_id,
            session_id,
            TokenKind::Refresh,
            &secret,
            signature_key,
        ),
    })
}

/// Verify an access token end to end: signature, expiry, session row,
/// account state. Returns the authenticated user.
pub async fn verify_session(state: &ArcAppState, token: &str) -> Result<User, ServiceError> {
    let decoded = security::decode_token(token, Some(TokenKind::Access), &state.config.signature_key)
        .map_err(|_| ServiceError::Forbidden("invalid token"))?;
    if decoded.is_expired {
        return Err(ServiceError::Forbidden("expired token"));
    }

    let mut conn = get_conn!(state);
    let valid = sessions::check_session_secret(
        decoded.user_id,
        decoded.session_id,
        &decoded.secret,
        &mut conn,
    )
    .await?;
    if !valid {
        return Err(ServiceError::Forbidden("revoked session"));
    }

    let user = users::get_user(decoded.user_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("user"))?;
    if !user.is_active() {
        return Err(ServiceError::GoneUser);
    }
    Ok(user)
}

/// Trade a refresh token for a fresh access token bound to the same
/// session.
pub async fn refresh_session(state: &ArcAppState, token: &str) -> Result<String, ServiceError> {
    let decoded =
        security::decode_token(token, Some(TokenKind::Refresh), &state.config.signature_key)
            .map_err(|_| ServiceError::Forbidden("invalid token"))?;
    if decoded.is_expired {
        return Err(ServiceError::Forbidden("expired token"));
    }

    let mut conn = get_conn!(state);
    let valid = sessions::check_session_secret(
        decoded.user_id,
        decoded.session_id,
        &decoded.secret,
        &mut conn,
    )
    .await?;
    if !valid {
        return Err(ServiceError::Forbidden("revoked session"));
    }

    let auth_user = users::get_auth_user(decoded.user_id, &mut conn)
        .await?
        .ok_or(ServiceError::NotFound("user"))?;
    if auth_user.gone_status.is_some() {
        return Err(ServiceError::GoneUser);
    }

    Ok(security::generate_token(
        decoded.user_id,
        decoded.session_id,
        TokenKind::Access,
        &decoded.secret,
        &state.config.signature_key,
    ))
}

pub async fn revoke_session(state: &ArcAppState, session_id: i64) -> Result<bool, ServiceError> {
    let mut conn = get_conn!(state);
    let mut tx = create_tx!(conn);
    let revoked = sessions::delete_session(session_id, &mut tx).await?;
    tx.commit().await.map_err(ServiceError::from)?;
    Ok(revoked)
}
