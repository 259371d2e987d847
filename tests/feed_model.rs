//! Model-level checks of the visibility pipeline: flag derivation on the
//! write path and the read-path predicate have to agree on who sees what.

use riverbend::database::visibility::{BanScope, Viewer, posts_visibility_sql};
use riverbend::entities::feed::FeedName;
use riverbend::entities::post::{DestinationFeed, PrivacyFlags};

fn posts_feed(feed_id: i32, private: bool) -> DestinationFeed {
    DestinationFeed {
        feed_id,
        name: FeedName::Posts,
        owner_is_private: private,
        owner_is_protected: private,
    }
}

fn directs_feed(feed_id: i32) -> DestinationFeed {
    DestinationFeed {
        feed_id,
        name: FeedName::Directs,
        owner_is_private: false,
        owner_is_protected: false,
    }
}

#[test]
fn private_group_post_stays_private_until_a_public_destination_appears() {
    let private_only = PrivacyFlags::derive(&[posts_feed(10, true), posts_feed(11, true)]);
    assert!(private_only.is_private);
    assert!(!private_only.is_propagable);

    let crossposted = PrivacyFlags::derive(&[posts_feed(10, true), posts_feed(12, false)]);
    assert!(!crossposted.is_private);
    assert!(crossposted.is_propagable);
}

#[test]
fn directs_between_public_users_are_not_propagable() {
    let flags = PrivacyFlags::derive(&[directs_feed(20), directs_feed(21)]);
    assert!(!flags.is_private);
    assert!(!flags.is_propagable);
}

#[test]
fn subscriber_of_private_feed_passes_the_read_predicate() {
    // write side: the post is private
    let flags = PrivacyFlags::derive(&[posts_feed(10, true)]);
    assert!(flags.is_private);

    // read side: a subscriber of feed 10 gets an escape hatch for it
    let subscriber = Viewer {
        user_id: Some(500),
        subscribed_feed_ids: vec![10],
        ..Viewer::default()
    };
    let sql = posts_visibility_sql(&subscriber, BanScope::TwoWay);
    assert!(sql.contains("p.destination_feed_ids && '{10}'::INT[]"));

    // a stranger does not
    let stranger = Viewer {
        user_id: Some(501),
        ..Viewer::default()
    };
    let sql = posts_visibility_sql(&stranger, BanScope::TwoWay);
    assert!(sql.contains("NOT p.is_private"));
    assert!(!sql.contains("destination_feed_ids &&"));
}

#[test]
fn anonymous_readers_never_get_a_private_escape_hatch() {
    let sql = posts_visibility_sql(&Viewer::anonymous(), BanScope::TwoWay);
    assert!(sql.contains("NOT p.is_protected"));
    assert!(!sql.contains("destination_feed_ids"));
}

#[test]
fn ban_scopes_differ_between_river_and_profile() {
    let viewer = Viewer {
        user_id: Some(7),
        banned_user_ids: vec![41],
        banned_by_user_ids: vec![42],
        ..Viewer::default()
    };

    let river = posts_visibility_sql(&viewer, BanScope::TwoWay);
    let profile = posts_visibility_sql(&viewer, BanScope::ViewerOnly);

    assert!(river.contains("'{41}'::BIGINT[]"));
    assert!(river.contains("'{42}'::BIGINT[]"));
    assert!(profile.contains("'{41}'::BIGINT[]"));
    assert!(!profile.contains("'{42}'::BIGINT[]"));
}

#[test]
fn every_account_gets_the_full_feed_set() {
    assert_eq!(FeedName::ALL.len(), 8);
    let singletons = FeedName::ALL.iter().filter(|n| n.is_singleton()).count();
    assert_eq!(singletons, 7);
    let destinations = FeedName::ALL.iter().filter(|n| n.is_destination()).count();
    assert_eq!(destinations, 2);
}
