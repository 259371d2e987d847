use deadpool_postgres::Transaction;

use crate::{
    database::conn::{DbError, LazyConn},
    utils::perms::GroupRole,
};

pub async fn insert_member(
    group_id: i64,
    user_id: i64,
    role: GroupRole,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let inserted = tx
        .execute(
            "
            INSERT INTO group_members (group_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (group_id, user_id) DO NOTHING
            ",
            &[&group_id, &user_id, &role.as_str()],
        )
        .await?;
    Ok(inserted > 0)
}

pub async fn remove_member(
    group_id: i64,
    user_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let deleted = tx
        .execute(
            "DELETE FROM group_members WHERE group_id = $1 AND user_id = $2",
            &[&group_id, &user_id],
        )
        .await?;
    Ok(deleted > 0)
}

pub async fn set_member_role(
    group_id: i64,
    user_id: i64,
    role: GroupRole,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let updated = tx
        .execute(
            "UPDATE group_members SET role = $3 WHERE group_id = $1 AND user_id = $2",
            &[&group_id, &user_id, &role.as_str()],
        )
        .await?;
    Ok(updated > 0)
}

pub async fn member_role(
    group_id: i64,
    user_id: i64,
    conn: &mut LazyConn,
) -> Result<Option<GroupRole>, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt(
            "SELECT role FROM group_members WHERE group_id = $1 AND user_id = $2",
            &[&group_id, &user_id],
        )
        .await?;
    Ok(row.and_then(|r| GroupRole::from_db(r.get("role"))))
}

pub async fn remove_memberships_of_user(
    user_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<u64, DbError> {
    Ok(tx
        .execute("DELETE FROM group_members WHERE user_id = $1", &[&user_id])
        .await?)
}
