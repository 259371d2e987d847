pub mod bans;
pub mod conn;
pub mod engagement;
pub mod feeds;
pub mod groups;
pub mod jobs;
pub mod posts;
pub mod schema;
pub mod sessions;
pub mod subscriptions;
pub mod timelines;
pub mod users;
pub mod visibility;
