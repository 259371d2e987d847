use deadpool_postgres::Transaction;
use tokio_postgres::Row;

use crate::{
    database::conn::{DbError, LazyConn},
    entities::user::{AuthUser, GoneStatus, User, UserType},
};

const USER_COLUMNS: &str = "
    user_id, username, screen_name, user_type,
    is_private, is_protected, gone_status,
    EXTRACT(EPOCH FROM gone_at)::BIGINT AS gone_at,
    subscribers_count, subscriptions_count
";

fn row_to_user(row: &Row) -> User {
    let gone_status: Option<String> = row.get("gone_status");
    User {
        user_id: row.get("user_id"),
        username: row.get("username"),
        screen_name: row.get("screen_name"),
        user_type: UserType::from_db(row.get("user_type")),
        is_private: row.get("is_private"),
        is_protected: row.get("is_protected"),
        gone_status: gone_status.as_deref().and_then(GoneStatus::from_db),
        gone_at: row.get("gone_at"),
        subscribers_count: row.get("subscribers_count"),
        subscriptions_count: row.get("subscriptions_count"),
    }
}

fn row_to_auth_user(row: &Row) -> AuthUser {
    let gone_status: Option<String> = row.get("gone_status");
    AuthUser {
        user_id: row.get("user_id"),
        username: row.get("username"),
        email: row.get("email"),
        hashed_password: row.get("hashed_password"),
        gone_status: gone_status.as_deref().and_then(GoneStatus::from_db),
    }
}

pub async fn get_user(user_id: i64, conn: &mut LazyConn) -> Result<Option<User>, DbError> {
    let db = conn.get_client().await?;
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
    let row = db.query_opt(&sql, &[&user_id]).await?;
    Ok(row.as_ref().map(row_to_user))
}

pub async fn get_user_by_username(
    username: &str,
    conn: &mut LazyConn,
) -> Result<Option<User>, DbError> {
    let db = conn.get_client().await?;
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
    let row = db.query_opt(&sql, &[&username]).await?;
    Ok(row.as_ref().map(row_to_user))
}

pub async fn get_auth_user(user_id: i64, conn: &mut LazyConn) -> Result<Option<AuthUser>, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt(
            "
            SELECT user_id, username, email, hashed_password, gone_status
            FROM users
            WHERE user_id = $1
            ",
            &[&user_id],
        )
        .await?;
    Ok(row.as_ref().map(row_to_auth_user))
}

pub async fn get_auth_user_by_email(
    email: &str,
    conn: &mut LazyConn,
) -> Result<Option<AuthUser>, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt(
            "
            SELECT user_id, username, email, hashed_password, gone_status
            FROM users
            WHERE email = $1
            ",
            &[&email],
        )
        .await?;
    Ok(row.as_ref().map(row_to_auth_user))
}

pub struct NewUserRow {
    pub user_id: i64,
    pub username: String,
    pub screen_name: String,
    pub user_type: UserType,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
    pub is_private: bool,
    pub is_protected: bool,
}

pub async fn insert_user(row: &NewUserRow, tx: &mut Transaction<'_>) -> Result<(), DbError> {
    tx.execute(
        "
        INSERT INTO users (user_id, username, screen_name, user_type, email,
                           hashed_password, is_private, is_protected)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
        &[
            &row.user_id,
            &row.username,
            &row.screen_name,
            &row.user_type.as_str(),
            &row.email,
            &row.hashed_password,
            &row.is_private,
            &row.is_protected,
        ],
    )
    .await?;
    Ok(())
}

#[derive(Default, Debug)]
pub struct UserProfileUpdate {
    pub screen_name: Option<String>,
    pub email: Option<String>,
}

/// Dynamic SET clause; returns false when there is nothing to update.
pub async fn update_user_profile(
    user_id: i64,
    update: UserProfileUpdate,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let mut set_clauses = Vec::new();
    let mut values: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = Vec::new();

    if let Some(ref screen_name) = update.screen_name {
        values.push(screen_name);
        set_clauses.push(format!("screen_name = ${}", values.len() + 1));
    }
    if let Some(ref email) = update.email {
        values.push(email);
        set_clauses.push(format!("email = ${}", values.len() + 1));
    }

    if set_clauses.is_empty() {
        return Ok(false);
    }
    set_clauses.push("updated_at = now()".to_string());

    let query = format!(
        "UPDATE users SET {} WHERE user_id = $1",
        set_clauses.join(", ")
    );

    let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = vec![&user_id];
    params.extend(values);

    tx.execute(query.as_str(), &params).await?;
    Ok(true)
}

/// Flip the owner privacy flags. The schema cascades the change into the
/// derived flags of every post addressed to this owner's feeds.
pub async fn update_privacy(
    user_id: i64,
    is_private: bool,
    is_protected: bool,
    tx: &mut Transaction<'_>,
) -> Result<(), DbError> {
    // private accounts are always protected
    let is_protected = is_protected || is_private;
    tx.execute(
        "
        UPDATE users
        SET is_private = $2, is_protected = $3, updated_at = now()
        WHERE user_id = $1
        ",
        &[&user_id, &is_private, &is_protected],
    )
    .await?;
    Ok(())
}

pub async fn set_gone_status(
    user_id: i64,
    status: Option<GoneStatus>,
    tx: &mut Transaction<'_>,
) -> Result<(), DbError> {
    let status_str = status.map(|s| s.as_str());
    tx.execute(
        "
        UPDATE users
        SET gone_status = $2,
            gone_at = CASE WHEN $2::TEXT IS NULL THEN NULL ELSE now() END,
            updated_at = now()
        WHERE user_id = $1
        ",
        &[&user_id, &status_str],
    )
    .await?;
    Ok(())
}

pub async fn zero_counters(user_id: i64, tx: &mut Transaction<'_>) -> Result<(), DbError> {
    tx.execute(
        "
        UPDATE users
        SET subscribers_count = 0, subscriptions_count = 0, updated_at = now()
        WHERE user_id = $1
        ",
        &[&user_id],
    )
    .await?;
    Ok(())
}

/// Users sitting in cooldown whose grace window lapsed before the
/// scheduled cleanup fired.
pub async fn list_overdue_cooldown_users(
    cooldown_secs: i64,
    conn: &mut LazyConn,
) -> Result<Vec<i64>, DbError> {
    let db = conn.get_client().await?;
    let rows = db
        .query(
            "
            SELECT user_id
            FROM users
            WHERE gone_status = 'cooldown'
              AND gone_at < now() - make_interval(secs => $1::BIGINT::DOUBLE PRECISION)
            ",
            &[&cooldown_secs],
        )
        .await?;
    Ok(rows.iter().map(|r| r.get("user_id")).collect())
}
