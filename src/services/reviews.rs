//! Product reviews: storefront submissions and admin moderation.

use std::sync::Arc;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::review::{MAX_RATING, MIN_RATING};
use crate::domain::aggregates::{Review, ReviewSettings};
use crate::services::Paginated;
use crate::store::{ReviewFilter, ReviewPatch, Store};
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDraft {
    #[validate(length(min = 1, max = 100))]
    pub author_name: String,
    #[validate(email)]
    pub author_email: Option<String>,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
}

/// Admin-created review; may name the user and skip moderation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminReviewDraft {
    pub product_id: Uuid,
    pub user_id: Option<Uuid>,
    #[serde(flatten)]
    #[validate]
    pub review: ReviewDraft,
    #[serde(default)]
    pub is_approved: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSettingsPatch { pub auto_approve_reviews: Option<bool> }

#[derive(Clone)]
pub struct ReviewService { store: Arc<dyn Store> }

impl ReviewService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    async fn ensure_product(&self, product_id: Uuid) -> Result<()> {
        match self.store.get_product(product_id).await? {
            Some(_) => Ok(()),
            None => Err(EcommerceError::not_found("Product")),
        }
    }

    async fn insert(&self, product_id: Uuid, user_id: Option<Uuid>, draft: ReviewDraft, is_approved: bool) -> Result<Review> {
        let now = Utc::now();
        let review = Review {
            id: Uuid::now_v7(),
            product_id,
            user_id,
            author_name: draft.author_name.trim().to_string(),
            author_email: draft.author_email,
            rating: draft.rating,
            title: draft.title,
            content: draft.content,
            is_approved,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_review(&review).await?;
        info!(review_id = %review.id, product_id = %product_id, is_approved, "review created");
        Ok(review)
    }

    pub async fn list_approved(&self, product_id: Uuid) -> Result<Vec<Review>> {
        Ok(self.store.approved_reviews(product_id).await?)
    }

    /// Storefront submission; approved right away only when auto-approve is on.
    #[instrument(skip(self, draft))]
    pub async fn create_public(&self, product_id: Uuid, draft: ReviewDraft) -> Result<Review> {
        draft.validate()?;
        self.ensure_product(product_id).await?;
        let settings = self.store.review_settings().await?;
        self.insert(product_id, None, draft, settings.auto_approve_reviews).await
    }

    pub async fn settings(&self) -> Result<ReviewSettings> {
        Ok(self.store.review_settings().await?)
    }

    #[instrument(skip(self))]
    pub async fn update_settings(&self, patch: ReviewSettingsPatch) -> Result<ReviewSettings> {
        let mut settings = self.store.review_settings().await?;
        if let Some(v) = patch.auto_approve_reviews { settings.auto_approve_reviews = v; }
        self.store.save_review_settings(&settings).await?;
        Ok(settings)
    }

    pub async fn list(&self, filter: ReviewFilter) -> Result<Paginated<Review>> {
        let (reviews, total) = self.store.list_reviews(&filter).await?;
        Ok(Paginated::new(reviews, total, filter.page, filter.limit))
    }

    pub async fn get(&self, id: Uuid) -> Result<Review> {
        self.store.get_review(id).await?.ok_or_else(|| EcommerceError::not_found("Review"))
    }

    #[instrument(skip(self, draft))]
    pub async fn create(&self, draft: AdminReviewDraft) -> Result<Review> {
        draft.validate()?;
        self.ensure_product(draft.product_id).await?;
        self.insert(draft.product_id, draft.user_id, draft.review, draft.is_approved).await
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: ReviewPatch) -> Result<Review> {
        if patch.rating.is_some_and(|r| !(MIN_RATING..=MAX_RATING).contains(&r)) {
            return Err(EcommerceError::bad_request(format!("Rating must be between {} and {}", MIN_RATING, MAX_RATING)));
        }
        if patch.author_name.as_deref().is_some_and(|n| n.trim().is_empty())
            || patch.content.as_deref().is_some_and(|c| c.trim().is_empty())
        {
            return Err(EcommerceError::bad_request("Author name and content cannot be empty"));
        }
        self.store.update_review(id, &patch).await?.ok_or_else(|| EcommerceError::not_found("Review"))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_review(id).await? {
            return Err(EcommerceError::not_found("Review"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::product;
    use crate::store::memory::MemoryStore;
    use crate::store::CatalogStore;
    use rust_decimal_macros::dec;

    fn draft(rating: i32) -> ReviewDraft {
        ReviewDraft {
            author_name: "Marta".into(), author_email: Some("marta@example.com".into()), rating,
            title: Some("Rico".into()), content: "Llegó rápido y bien empacado".into(),
        }
    }

    async fn setup() -> (ReviewService, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let p = product("Café Serrano", Some(dec!(8)), 5);
        store.insert_product(&p).await.unwrap();
        (ReviewService::new(store), p.id)
    }

    #[tokio::test]
    async fn test_public_reviews_wait_for_approval() {
        let (svc, product_id) = setup().await;
        let review = svc.create_public(product_id, draft(5)).await.unwrap();
        assert!(!review.is_approved);
        assert!(svc.list_approved(product_id).await.unwrap().is_empty());

        let approve = ReviewPatch { is_approved: Some(true), ..Default::default() };
        svc.update(review.id, approve).await.unwrap();
        assert_eq!(svc.list_approved(product_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_auto_approve_setting() {
        let (svc, product_id) = setup().await;
        assert!(!svc.settings().await.unwrap().auto_approve_reviews);
        svc.update_settings(ReviewSettingsPatch { auto_approve_reviews: Some(true) }).await.unwrap();
        assert!(svc.create_public(product_id, draft(4)).await.unwrap().is_approved);
        assert!(svc.settings().await.unwrap().auto_approve_reviews);
    }

    #[tokio::test]
    async fn test_rating_bounds_and_unknown_product() {
        let (svc, product_id) = setup().await;
        assert!(matches!(svc.create_public(product_id, draft(6)).await, Err(EcommerceError::Validation(_))));
        assert!(matches!(svc.create_public(Uuid::new_v4(), draft(3)).await, Err(EcommerceError::NotFound(_))));

        let review = svc.create_public(product_id, draft(3)).await.unwrap();
        let zero = ReviewPatch { rating: Some(0), ..Default::default() };
        assert!(matches!(svc.update(review.id, zero).await, Err(EcommerceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_admin_list_filters_and_delete() {
        let (svc, product_id) = setup().await;
        let pending = svc.create_public(product_id, draft(2)).await.unwrap();
        svc.create(AdminReviewDraft { product_id, user_id: None, review: draft(5), is_approved: true }).await.unwrap();

        let approved = ReviewFilter { is_approved: Some(true), page: 1, limit: 20, ..Default::default() };
        assert_eq!(svc.list(approved).await.unwrap().total, 1);
        let by_product_name = ReviewFilter { search: Some("serrano".into()), page: 1, limit: 20, ..Default::default() };
        assert_eq!(svc.list(by_product_name).await.unwrap().total, 2);

        assert_eq!(svc.get(pending.id).await.unwrap().rating, 2);
        svc.delete(pending.id).await.unwrap();
        assert!(matches!(svc.get(pending.id).await, Err(EcommerceError::NotFound(_))));
        assert!(matches!(svc.delete(pending.id).await, Err(EcommerceError::NotFound(_))));
    }
}
