use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::entities::feed::FeedName;
use crate::utils::snowflake::SnowflakeGenerator;

/// What a post needs to know about one of its destination feeds to derive
/// its own privacy flags.
#[derive(Debug, Clone, Copy)]
pub struct DestinationFeed {
    pub feed_id: i32,
    pub name: FeedName,
    pub owner_is_private: bool,
    pub owner_is_protected: bool,
}

/// Derived visibility flags on a post.
///
/// The same reduction exists as trigger functions in the schema; rows are
/// written with these values so the two never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyFlags {
    pub is_private: bool,
    pub is_protected: bool,
    pub is_propagable: bool,
}

impl PrivacyFlags {
    /// Reduce the destination feeds' owner flags:
    /// private and protected are ANDs over the owners, propagable is an OR
    /// over "destination is a Posts feed of a non-private owner".
    ///
    /// A post addressed only to Directs feeds is never propagable. An empty
    /// destination set is treated as maximally restricted.
    pub fn derive(destinations: &[DestinationFeed]) -> PrivacyFlags {
        if destinations.is_empty() {
            return PrivacyFlags {
                is_private: true,
                is_protected: true,
                is_propagable: false,
            };
        }

        let is_private = destinations.iter().all(|d| d.owner_is_private);
        // A private owner counts as protected even if the row disagrees.
        let is_protected = destinations
            .iter()
            .all(|d| d.owner_is_protected || d.owner_is_private);
        let is_propagable = destinations
            .iter()
            .any(|d| d.name == FeedName::Posts && !d.owner_is_private);

        PrivacyFlags {
            is_private,
            is_protected,
            is_propagable,
        }
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Post {
    pub post_id: i64,
    pub user_id: i64,
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// Sort key for feeds; moved forward by `bump_post`.
    pub bumped_at: i64,
    pub destination_feed_ids: Vec<i32>,
    /// Materialized membership: destinations plus fan-out targets.
    pub feed_ids: Vec<i32>,
    pub is_private: bool,
    pub is_protected: bool,
    pub is_propagable: bool,
    pub comments_count: i32,
    pub likes_count: i32,
}

impl Post {
    pub fn privacy(&self) -> PrivacyFlags {
        PrivacyFlags {
            is_private: self.is_private,
            is_protected: self.is_protected,
            is_propagable: self.is_propagable,
        }
    }

    pub fn snowflake_time(&self) -> f64 {
        SnowflakeGenerator::parse(self.post_id).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest(name: FeedName, private: bool, protected: bool) -> DestinationFeed {
        DestinationFeed {
            feed_id: 1,
            name,
            owner_is_private: private,
            owner_is_protected: protected,
        }
    }

    #[test]
    fn public_post() {
        let flags = PrivacyFlags::derive(&[dest(FeedName::Posts, false, false)]);
        assert!(!flags.is_private);
        assert!(!flags.is_protected);
        assert!(flags.is_propagable);
    }

    #[test]
    fn fully_private_post() {
        let flags = PrivacyFlags::derive(&[dest(FeedName::Posts, true, true)]);
        assert!(flags.is_private);
        assert!(flags.is_protected);
        assert!(!flags.is_propagable);
    }

    #[test]
    fn one_public_destination_unlocks() {
        let flags = PrivacyFlags::derive(&[
            dest(FeedName::Posts, true, true),
            dest(FeedName::Posts, false, false),
        ]);
        assert!(!flags.is_private);
        assert!(!flags.is_protected);
        assert!(flags.is_propagable);
    }

    #[test]
    fn protected_but_not_private() {
        let flags = PrivacyFlags::derive(&[
            dest(FeedName::Posts, false, true),
            dest(FeedName::Posts, false, true),
        ]);
        assert!(!flags.is_private);
        assert!(flags.is_protected);
        assert!(flags.is_propagable);
    }

    #[test]
    fn directs_never_propagate() {
        let flags = PrivacyFlags::derive(&[
            dest(FeedName::Directs, false, false),
            dest(FeedName::Directs, false, false),
        ]);
        assert!(!flags.is_private);
        assert!(!flags.is_protected);
        assert!(!flags.is_propagable);
    }

    #[test]
    fn private_owner_counts_as_protected() {
        // users flip is_private without is_protected in old rows
        let flags = PrivacyFlags::derive(&[dest(FeedName::Posts, true, false)]);
        assert!(flags.is_private);
        assert!(flags.is_protected);
    }

    #[test]
    fn empty_destinations_are_restricted() {
        let flags = PrivacyFlags::derive(&[]);
        assert!(flags.is_private);
        assert!(flags.is_protected);
        assert!(!flags.is_propagable);
    }
}
