use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::utils::snowflake::SnowflakeGenerator;

/// Lifecycle stage of an account that is no longer plainly active.
/// `None` on the user row means the account is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoneStatus {
    /// User froze their own account; fully resumable.
    Suspended,
    /// Deletion requested, grace window running; still resumable.
    Cooldown,
    /// Deletion workflow is running.
    Deletion,
    /// Terminal. Row is kept as a tombstone.
    Deleted,
}

impl GoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoneStatus::Suspended => "suspended",
            GoneStatus::Cooldown => "cooldown",
            GoneStatus::Deletion => "deletion",
            GoneStatus::Deleted => "deleted",
        }
    }

    pub fn from_db(value: &str) -> Option<GoneStatus> {
        match value {
            "suspended" => Some(GoneStatus::Suspended),
            "cooldown" => Some(GoneStatus::Cooldown),
            "deletion" => Some(GoneStatus::Deletion),
            "deleted" => Some(GoneStatus::Deleted),
            _ => None,
        }
    }

    /// Whether the account can still be brought back by its owner.
    pub fn is_resumable(&self) -> bool {
        matches!(self, GoneStatus::Suspended | GoneStatus::Cooldown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    User,
    Group,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::User => "user",
            UserType::Group => "group",
        }
    }

    pub fn from_db(value: &str) -> UserType {
        match value {
            "group" => UserType::Group,
            _ => UserType::User,
        }
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub screen_name: String,
    pub user_type: UserType,
    pub is_private: bool,
    pub is_protected: bool,
    pub gone_status: Option<GoneStatus>,
    pub gone_at: Option<i64>,
    pub subscribers_count: i32,
    pub subscriptions_count: i32,
}

impl User {
    pub fn created_at(&self) -> f64 {
        SnowflakeGenerator::parse(self.user_id).0
    }

    pub fn is_active(&self) -> bool {
        self.gone_status.is_none()
    }

    pub fn is_group(&self) -> bool {
        self.user_type == UserType::Group
    }
}

/// Credential-bearing view of a user row, never serialized outward.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
    pub gone_status: Option<GoneStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gone_status_round_trip() {
        for s in [
            GoneStatus::Suspended,
            GoneStatus::Cooldown,
            GoneStatus::Deletion,
            GoneStatus::Deleted,
        ] {
            assert_eq!(GoneStatus::from_db(s.as_str()), Some(s));
        }
        assert_eq!(GoneStatus::from_db("active"), None);
    }

    #[test]
    fn resumable_stages() {
        assert!(GoneStatus::Suspended.is_resumable());
        assert!(GoneStatus::Cooldown.is_resumable());
        assert!(!GoneStatus::Deletion.is_resumable());
        assert!(!GoneStatus::Deleted.is_resumable());
    }
}
