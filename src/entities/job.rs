use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

/// A keyed, re-lockable unit of deferred work drawn from the polling queue.
///
/// `uniq_key` deduplicates pending instances per name; a locked job is
/// invisible to `fetch_jobs` until `unlock_at` lapses, which is also how
/// failed runs get retried.
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub payload: Value,
    pub uniq_key: Option<String>,
    pub created_at: i64,
    pub unlock_at: i64,
    pub attempts: i32,
    pub failures: i32,
}

impl Job {
    /// i64 payload fields arrive as JSON numbers.
    pub fn payload_i64(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_field_access() {
        let job = Job {
            id: 1,
            name: "gone-cleanup".to_string(),
            payload: json!({ "user_id": 91234 }),
            uniq_key: Some("91234".to_string()),
            created_at: 0,
            unlock_at: 0,
            attempts: 0,
            failures: 0,
        };
        assert_eq!(job.payload_i64("user_id"), Some(91234));
        assert_eq!(job.payload_i64("missing"), None);
    }
}
