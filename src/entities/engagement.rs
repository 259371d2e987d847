use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::utils::snowflake::SnowflakeGenerator;

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Comment {
    pub comment_id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub body: String,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

impl Comment {
    pub fn snowflake_time(&self) -> f64 {
        SnowflakeGenerator::parse(self.comment_id).0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Like {
    pub post_id: i64,
    pub user_id: i64,
    pub created_at: i64,
}
