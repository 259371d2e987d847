use tracing::info;

use crate::database::conn::{DbError, LazyConn};

const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_schema", include_str!("../../migrations/0001_schema.sql")),
    (
        "0002_privacy_triggers",
        include_str!("../../migrations/0002_privacy_triggers.sql"),
    ),
];

/// Apply pending migrations in order, tracked in a `migrations` table.
/// Each migration runs in its own transaction.
pub async fn run_migrations(conn: &mut LazyConn) -> Result<(), DbError> {
    {
        let db = conn.get_client().await?;
        db.execute(
            "
            CREATE TABLE IF NOT EXISTS migrations (
                name       TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            ",
            &[],
        )
        .await?;
    }

    for (name, sql) in MIGRATIONS {
        let applied = {
            let db = conn.get_client().await?;
            db.query_opt("SELECT 1 FROM migrations WHERE name = $1", &[name])
                .await?
                .is_some()
        };
        if applied {
            continue;
        }

        let tx = conn.transaction().await?;
        tx.batch_execute(sql).await?;
        tx.execute("INSERT INTO migrations (name) VALUES ($1)", &[name])
            .await?;
        tx.commit().await?;
        info!(migration = name, "applied migration");
    }

    Ok(())
}
