use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::env;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use fred::clients::Client as RedisClient;
use fred::prelude::{self, ClientLike};
use thiserror::Error;
use tokio_postgres::NoTls;
use tracing::info;

use crate::utils::snowflake::SnowflakeGenerator;

fn required(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("${key} missing"))
}

fn optional<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default {default}");
            default.to_string()
        })
        .parse()
        .unwrap_or_else(|e| panic!("invalid {key}: {e}"))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub signature_key: String,
    pub node_id: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            signature_key: required("SIGNATURE_KEY"),
            node_id: optional("NODE_ID", "0"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
    pub password: String,
    pub pool_size: usize,
}

impl PostgresConfig {
    pub fn from_env() -> Self {
        Self {
            host: required("POSTGRES_HOST"),
            port: optional("POSTGRES_PORT", "5432"),
            user: required("POSTGRES_USER"),
            database: required("POSTGRES_DATABASE"),
            password: required("POSTGRES_PASSWORD"),
            pool_size: optional("POSTGRES_CONNECTIONS", "32"),
        }
    }

    fn pg_config(&self) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(&self.database);
        cfg
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub pubsub_url: String,
}

impl RedisConfig {
    pub fn from_env() -> Self {
        Self {
            pubsub_url: required("PUBSUB_REDIS_URL"),
        }
    }
}

#[derive(Debug)]
pub struct AppState {
    pub db_pool: Arc<Pool>,
    pub config: Arc<Config>,
    pub pubsub_redis: Arc<RedisClient>,
    pub snowflake: SnowflakeGenerator,
}

#[derive(Error, Debug)]
pub enum AppStateError {
    #[error("pool build error: {0}")]
    Pool(#[from] deadpool_postgres::BuildError),

    #[error("redis error: {0}")]
    Redis(#[from] fred::error::Error),
}

impl AppState {
    pub async fn create_from_env() -> Result<AppState, AppStateError> {
        let config = Config::from_env();
        let pg = PostgresConfig::from_env();
        let redis = RedisConfig::from_env();

        let mgr = Manager::from_config(
            pg.pg_config(),
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let db_pool = Pool::builder(mgr).max_size(pg.pool_size).build()?;

        let pubsub_redis =
            prelude::Builder::from_config(prelude::Config::from_url(&redis.pubsub_url)?).build()?;
        pubsub_redis.init().await?;

        let snowflake = SnowflakeGenerator::new(config.node_id);

        Ok(AppState {
            db_pool: Arc::new(db_pool),
            config: Arc::new(config),
            pubsub_redis: Arc::new(pubsub_redis),
            snowflake,
        })
    }
}

pub type ArcAppState = Arc<AppState>;
