//! Read-time privacy filtering.
//!
//! Builds the SQL predicate restricting a posts query to what one viewer
//! may see. The builder is pure: feed and user ids are embedded as integer
//! array literals, so the output composes into any posts query without
//! shifting its bind parameters and is testable as plain strings.

/// Everything the builder needs to know about who is reading.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    /// None for anonymous reads.
    pub user_id: Option<i64>,
    /// Feeds the viewer subscribes to (accepted subscriptions only).
    pub subscribed_feed_ids: Vec<i32>,
    /// Feeds the viewer owns.
    pub own_feed_ids: Vec<i32>,
    /// Users the viewer banned.
    pub banned_user_ids: Vec<i64>,
    /// Users who banned the viewer.
    pub banned_by_user_ids: Vec<i64>,
}

impl Viewer {
    pub fn anonymous() -> Viewer {
        Viewer::default()
    }

    fn reachable_feed_ids(&self) -> Vec<i32> {
        let mut ids = self.own_feed_ids.clone();
        for id in &self.subscribed_feed_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}

/// How bans apply to the query being built: the home feed hides content in
/// both directions, profile feeds only honor the viewer's own ban list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanScope {
    TwoWay,
    ViewerOnly,
}

fn int_array_literal<T: std::fmt::Display>(ids: &[T], cast: &str) -> String {
    let mut out = String::from("'{");
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&id.to_string());
    }
    out.push_str("}'::");
    out.push_str(cast);
    out
}

/// Predicate over `posts p` rows visible to `viewer`.
///
/// Anonymous viewers see only unprotected public posts. Authenticated
/// viewers additionally see protected posts, and private posts exactly when
/// the post was addressed to a feed the viewer owns or subscribes to. Posts
/// whose author is gone (beyond a resumable stage is handled at write time;
/// any gone stage hides content at read time) never surface, nor do posts
/// crossing the ban relation in the given scope.
pub fn posts_visibility_sql(viewer: &Viewer, ban_scope: BanScope) -> String {
    let mut clauses: Vec<String> = Vec::new();

    match viewer.user_id {
        None => {
            clauses.push("NOT p.is_protected".to_string());
        }
        Some(viewer_id) => {
            let reachable = viewer.reachable_feed_ids();
            if reachable.is_empty() {
                clauses.push("NOT p.is_private".to_string());
            } else {
                clauses.push(format!(
                    "(NOT p.is_private OR p.destination_feed_ids && {})",
                    int_array_literal(&reachable, "INT[]")
                ));
            }

            if !viewer.banned_user_ids.is_empty() {
                clauses.push(format!(
                    "NOT (p.user_id = ANY ({}))",
                    int_array_literal(&viewer.banned_user_ids, "BIGINT[]")
                ));
            }
            if ban_scope == BanScope::TwoWay && !viewer.banned_by_user_ids.is_empty() {
                clauses.push(format!(
                    "NOT (p.user_id = ANY ({}))",
                    int_array_literal(&viewer.banned_by_user_ids, "BIGINT[]")
                ));
            }

            // own posts are always readable, whatever the flags say
            clauses = vec![format!(
                "(p.user_id = {} OR ({}))",
                viewer_id,
                clauses.join(" AND ")
            )];
        }
    }

    clauses.push(
        "p.user_id NOT IN (SELECT user_id FROM users WHERE gone_status IS NOT NULL)".to_string(),
    );

    clauses.join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const GONE_FILTER: &str =
        "p.user_id NOT IN (SELECT user_id FROM users WHERE gone_status IS NOT NULL)";

    #[test]
    fn anonymous_sees_only_unprotected() {
        let sql = posts_visibility_sql(&Viewer::anonymous(), BanScope::TwoWay);
        assert_eq!(sql, format!("NOT p.is_protected AND {GONE_FILTER}"));
    }

    #[test]
    fn viewer_with_no_feeds_sees_public_only() {
        let viewer = Viewer {
            user_id: Some(7),
            ..Viewer::default()
        };
        let sql = posts_visibility_sql(&viewer, BanScope::TwoWay);
        assert_eq!(
            sql,
            format!("(p.user_id = 7 OR (NOT p.is_private)) AND {GONE_FILTER}")
        );
    }

    #[test]
    fn private_posts_open_through_reachable_feeds() {
        let viewer = Viewer {
            user_id: Some(7),
            subscribed_feed_ids: vec![12, 44],
            own_feed_ids: vec![3],
            ..Viewer::default()
        };
        let sql = posts_visibility_sql(&viewer, BanScope::TwoWay);
        assert!(sql.contains("p.destination_feed_ids && '{3,12,44}'::INT[]"));
    }

    #[test]
    fn reachable_feeds_deduplicated() {
        let viewer = Viewer {
            user_id: Some(7),
            subscribed_feed_ids: vec![3, 12],
            own_feed_ids: vec![3],
            ..Viewer::default()
        };
        let sql = posts_visibility_sql(&viewer, BanScope::TwoWay);
        assert!(sql.contains("'{3,12}'::INT[]"));
    }

    #[test]
    fn bans_exclude_both_directions_in_river() {
        let viewer = Viewer {
            user_id: Some(7),
            banned_user_ids: vec![100],
            banned_by_user_ids: vec![200],
            ..Viewer::default()
        };
        let sql = posts_visibility_sql(&viewer, BanScope::TwoWay);
        assert!(sql.contains("'{100}'::BIGINT[]"));
        assert!(sql.contains("'{200}'::BIGINT[]"));
    }

    #[test]
    fn profile_reads_ignore_reverse_bans() {
        let viewer = Viewer {
            user_id: Some(7),
            banned_user_ids: vec![100],
            banned_by_user_ids: vec![200],
            ..Viewer::default()
        };
        let sql = posts_visibility_sql(&viewer, BanScope::ViewerOnly);
        assert!(sql.contains("'{100}'::BIGINT[]"));
        assert!(!sql.contains("'{200}'::BIGINT[]"));
    }

    #[test]
    fn own_posts_bypass_filters() {
        let viewer = Viewer {
            user_id: Some(7),
            banned_by_user_ids: vec![200],
            ..Viewer::default()
        };
        let sql = posts_visibility_sql(&viewer, BanScope::TwoWay);
        assert!(sql.starts_with("(p.user_id = 7 OR "));
    }

    #[test]
    fn gone_authors_always_filtered() {
        for viewer in [
            Viewer::anonymous(),
            Viewer {
                user_id: Some(7),
                ..Viewer::default()
            },
        ] {
            let sql = posts_visibility_sql(&viewer, BanScope::TwoWay);
            assert!(sql.contains(GONE_FILTER));
        }
    }
}
