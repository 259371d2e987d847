use thiserror::Error;

use crate::database::conn::DbError;

pub mod accounts;
pub mod deletion;
pub mod events;
pub mod fanout;
pub mod input;
pub mod maintenance;
pub mod posting;
pub mod social;
pub mod worker;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("NOT_FOUND: {0}")]
    NotFound(&'static str),

    #[error("FORBIDDEN: {0}")]
    Forbidden(&'static str),

    #[error("CONFLICT: {0}")]
    Conflict(&'static str),

    #[error("GONE_USER")]
    GoneUser,

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<deadpool_postgres::PoolError> for ServiceError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        ServiceError::Db(DbError::Pool(err))
    }
}

impl From<tokio_postgres::Error> for ServiceError {
    fn from(err: tokio_postgres::Error) -> Self {
        ServiceError::Db(DbError::Query(err))
    }
}
