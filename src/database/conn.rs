use std::sync::Arc;

use deadpool_postgres::{Object, Pool, PoolError, Transaction};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("query error: {0}")]
    Query(#[from] tokio_postgres::Error),
}

/// Checks a connection out of the pool on first use, so call paths that
/// never touch the database never hold one.
pub struct LazyConn {
    pool: Arc<Pool>,
    client: Option<Object>,
}

impl LazyConn {
    pub fn new(pool: Arc<Pool>) -> Self {
        Self { pool, client: None }
    }

    pub async fn get_client(&mut self) -> Result<&mut Object, PoolError> {
        if self.client.is_none() {
            let conn = self.pool.get().await?;
            self.client = Some(conn);
        }
        Ok(self.client.as_mut().unwrap())
    }

    pub async fn transaction(&mut self) -> Result<Transaction<'_>, DbError> {
        let client = self.get_client().await?;
        Ok(client.transaction().await?)
    }
}
