//! Product review aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Option<Uuid>,
    pub author_name: String,
    pub author_email: Option<String>,
    pub rating: i32,
    pub title: Option<String>,
    pub content: String,
    /// Only approved reviews are shown on the storefront.
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    /// Case-insensitive match on author, email, title or body.
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [Some(&self.author_name), self.author_email.as_ref(), self.title.as_ref(), Some(&self.content)]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// Moderation settings; new storefront reviews wait for approval unless auto-approve is on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSettings { pub auto_approve_reviews: bool }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mentions_checks_every_text_field() {
        let now = Utc::now();
        let review = Review {
            id: Uuid::new_v4(), product_id: Uuid::new_v4(), user_id: None, author_name: "Marta".into(),
            author_email: Some("marta@example.com".into()), rating: 5, title: None, content: "Muy buen café".into(),
            is_approved: false, created_at: now, updated_at: now,
        };
        assert!(review.mentions("MARTA"));
        assert!(review.mentions("example.com"));
        assert!(review.mentions("café"));
        assert!(!review.mentions("arroz"));
    }
}
