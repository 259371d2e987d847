use serde::Deserialize;
use validator::{Validate, ValidationError};

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(ValidationError::new("username_charset"));
    }
    if username.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("username_starts_with_digit"));
    }
    Ok(())
}

fn validate_destinations(ids: &Vec<i32>) -> Result<(), ValidationError> {
    if ids.is_empty() {
        return Err(ValidationError::new("no_destinations"));
    }
    if ids.len() > 32 {
        return Err(ValidationError::new("too_many_destinations"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewUserInput {
    #[validate(length(min = 3, max = 25), custom(function = "validate_username"))]
    pub username: String,
    #[validate(length(min = 1, max = 100))]
    pub screen_name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 72))]
    pub password: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_protected: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewGroupInput {
    #[validate(length(min = 3, max = 25), custom(function = "validate_username"))]
    pub username: String,
    #[validate(length(min = 1, max = 100))]
    pub screen_name: String,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProfileUpdateInput {
    #[validate(length(min = 1, max = 100))]
    pub screen_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewPostInput {
    #[validate(length(min = 1, max = 3000))]
    pub body: String,
    #[validate(custom(function = "validate_destinations"))]
    pub destination_feed_ids: Vec<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewCommentInput {
    #[validate(length(min = 1, max = 3000))]
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        let ok = NewUserInput {
            username: "riverfan9".to_string(),
            screen_name: "River Fan".to_string(),
            email: None,
            password: "longenough".to_string(),
            is_private: false,
            is_protected: false,
        };
        assert!(ok.validate().is_ok());

        let mut bad = NewUserInput {
            username: "River Fan".to_string(),
            ..ok
        };
        assert!(bad.validate().is_err());

        bad.username = "9lives".to_string();
        assert!(bad.validate().is_err());

        bad.username = "ab".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn post_needs_destinations() {
        let post = NewPostInput {
            body: "hello".to_string(),
            destination_feed_ids: vec![],
        };
        assert!(post.validate().is_err());

        let post = NewPostInput {
            body: "hello".to_string(),
            destination_feed_ids: vec![1],
        };
        assert!(post.validate().is_ok());
    }

    #[test]
    fn empty_bodies_rejected() {
        let comment = NewCommentInput {
            body: String::new(),
        };
        assert!(comment.validate().is_err());
    }
}
