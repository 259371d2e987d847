use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// The fixed set of feed kinds every account owns.
///
/// All kinds are singletons per owner except `RiverOfNews`, which may have
/// extra instances ("home feeds") next to the inherent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedName {
    Posts,
    Likes,
    Comments,
    Directs,
    RiverOfNews,
    MyDiscussions,
    Saves,
    Hides,
}

impl FeedName {
    pub const ALL: [FeedName; 8] = [
        FeedName::Posts,
        FeedName::Likes,
        FeedName::Comments,
        FeedName::Directs,
        FeedName::RiverOfNews,
        FeedName::MyDiscussions,
        FeedName::Saves,
        FeedName::Hides,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedName::Posts => "Posts",
            FeedName::Likes => "Likes",
            FeedName::Comments => "Comments",
            FeedName::Directs => "Directs",
            FeedName::RiverOfNews => "RiverOfNews",
            FeedName::MyDiscussions => "MyDiscussions",
            FeedName::Saves => "Saves",
            FeedName::Hides => "Hides",
        }
    }

    pub fn from_db(value: &str) -> Option<FeedName> {
        FeedName::ALL.iter().copied().find(|n| n.as_str() == value)
    }

    /// Singleton kinds get a partial unique index on (owner, name).
    pub fn is_singleton(&self) -> bool {
        !matches!(self, FeedName::RiverOfNews)
    }

    /// Feeds a post can be addressed to directly.
    pub fn is_destination(&self) -> bool {
        matches!(self, FeedName::Posts | FeedName::Directs)
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Feed {
    pub feed_id: i32,
    pub user_id: i64,
    pub name: FeedName,
    /// Display title, home feeds only.
    pub title: Option<String>,
    /// The one undeletable RiverOfNews instance.
    pub is_inherent: bool,
    pub ord: Option<i32>,
}

impl Feed {
    pub fn is_home(&self) -> bool {
        self.name == FeedName::RiverOfNews
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_name_round_trip() {
        for name in FeedName::ALL {
            assert_eq!(FeedName::from_db(name.as_str()), Some(name));
        }
        assert_eq!(FeedName::from_db("Bookmarks"), None);
    }

    #[test]
    fn only_river_repeats() {
        assert!(!FeedName::RiverOfNews.is_singleton());
        assert!(FeedName::Posts.is_singleton());
        assert!(FeedName::Hides.is_singleton());
    }

    #[test]
    fn destinations() {
        assert!(FeedName::Posts.is_destination());
        assert!(FeedName::Directs.is_destination());
        assert!(!FeedName::RiverOfNews.is_destination());
        assert!(!FeedName::Likes.is_destination());
    }
}
