/// Lazily check a connection out of the state's pool.
#[macro_export]
macro_rules! get_conn {
    ($state:expr) => {
        $crate::database::conn::LazyConn::new($state.db_pool.clone())
    };
}

/// Open a transaction on a `LazyConn`; propagates pool errors.
#[macro_export]
macro_rules! create_tx {
    ($conn:expr) => {
        $conn.transaction().await?
    };
}

#[macro_export]
macro_rules! map_struct {
    ($src:expr => $dst:ident { $($field:ident),+ $(,)? }) => {
        $dst {
            $(
                $field: $src.$field,
            )+
        }
    };
}
