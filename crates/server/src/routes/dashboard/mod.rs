//! Seller dashboard (`/api/stores`).
//!
//! Every handler resolves the store from the path through [`owned_store`]:
//! the store's owner and platform admins may act on it, anyone else gets 403.
//! Writes that can change what the storefront shows invalidate the store's
//! catalog cache.

pub mod analytics;
pub mod categories;
pub mod courses;
pub mod customers;
pub mod deliveries;
pub mod orders;
pub mod products;
pub mod promotions;
pub mod stores;
pub mod transactions;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
};
use serde::{Deserialize, Deserializer};

use bazaar_core::{Slug, StoreId};

use crate::db::StoreRepository;
use crate::error::{AppError, Result};
use crate::middleware::stored_user;
use crate::models::CurrentUser;
use crate::models::store::Store;
use crate::services::images::MAX_IMAGE_BYTES;
use crate::state::AppState;

/// Most files accepted by one upload request.
pub(crate) const MAX_UPLOAD_FILES: usize = 10;

/// Room for multipart boundaries and part headers on top of the file bytes.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Request body limit for image uploads.
pub(crate) const MAX_UPLOAD_BODY_BYTES: usize =
    MAX_IMAGE_BYTES * MAX_UPLOAD_FILES + MULTIPART_OVERHEAD_BYTES;

/// Load a store the user may manage.
///
/// # Errors
///
/// Returns 404 for unknown stores and 403 when the user neither owns the
/// store nor is an admin.
pub(crate) async fn owned_store(
    state: &AppState,
    user: &CurrentUser,
    store_id: StoreId,
) -> Result<Store> {
    let store = StoreRepository::new(state.pool())
        .get_by_id(store_id)
        .await?
        .ok_or_else(|| AppError::NotFound("store not found".to_string()))?;

    if store.owner_id != user.id && !is_current_admin(state, user).await? {
        tracing::warn!(store_id = %store_id, user_id = %user.id, "Store access denied");
        return Err(AppError::Forbidden(
            "you do not have access to this store".to_string(),
        ));
    }
    Ok(store)
}

/// Admin rights as stored now, not as of login.
pub(crate) async fn is_current_admin(state: &AppState, user: &CurrentUser) -> Result<bool> {
    Ok(stored_user(state.pool(), user)
        .await?
        .is_some_and(|u| u.is_admin()))
}

/// Use the given slug, or derive one from the display name.
///
/// # Errors
///
/// Returns 400 if the slug is malformed or the name has no sluggable characters.
pub(crate) fn slug_or_name(slug: Option<&str>, name: &str) -> Result<Slug> {
    match slug.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => Slug::parse(slug),
        None => Slug::from_name(name),
    }
    .map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Trimmed, non-empty name of at most `max` characters.
///
/// # Errors
///
/// Returns 400 naming the field otherwise.
pub(crate) fn required_text(field: &str, value: &str, max: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() || value.chars().count() > max {
        return Err(AppError::BadRequest(format!(
            "{field} must be 1-{max} characters"
        )));
    }
    Ok(value.to_owned())
}

/// Distinguish an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in PATCH bodies.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Build the seller dashboard router.
pub fn router() -> Router<AppState> {
    Router::new()
        // Stores
        .route("/", get(stores::index).post(stores::create))
        .route(
            "/{store_id}",
            get(stores::show).patch(stores::update).delete(stores::destroy),
        )
        // Categories
        .route(
            "/{store_id}/categories",
            get(categories::index).post(categories::create),
        )
        .route("/{store_id}/categories/reorder", put(categories::reorder))
        .route(
            "/{store_id}/categories/{category_id}",
            patch(categories::update).delete(categories::destroy),
        )
        // Products
        .route(
            "/{store_id}/products",
            get(products::index).post(products::create),
        )
        .route(
            "/{store_id}/products/{product_id}",
            get(products::show)
                .patch(products::update)
                .delete(products::destroy),
        )
        .route(
            "/{store_id}/products/{product_id}/images",
            put(products::replace_images),
        )
        .route(
            "/{store_id}/products/{product_id}/images/upload",
            post(products::upload_images)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES)),
        )
        .route(
            "/{store_id}/products/{product_id}/images/reorder",
            put(products::reorder_images),
        )
        .route(
            "/{store_id}/products/{product_id}/images/{image_id}",
            delete(products::delete_image),
        )
        // Orders
        .route("/{store_id}/orders", get(orders::index))
        .route("/{store_id}/orders/export", get(orders::export))
        .route("/{store_id}/orders/{order_id}", get(orders::show))
        .route(
            "/{store_id}/orders/{order_id}/status",
            patch(orders::update_status),
        )
        .route("/{store_id}/orders/{order_id}/print", get(orders::print))
        .route(
            "/{store_id}/orders/{order_id}/delivery",
            post(deliveries::create),
        )
        // Deliveries
        .route("/{store_id}/deliveries", get(deliveries::index))
        .route(
            "/{store_id}/deliveries/{delivery_id}",
            patch(deliveries::update),
        )
        // Promotions
        .route(
            "/{store_id}/promotions",
            get(promotions::index).post(promotions::create),
        )
        .route(
            "/{store_id}/promotions/{promotion_id}",
            get(promotions::show)
                .patch(promotions::update)
                .delete(promotions::destroy),
        )
        // Ledger
        .route("/{store_id}/transactions", get(transactions::index))
        .route("/{store_id}/transactions/summary", get(transactions::summary))
        .route("/{store_id}/transactions/payouts", post(transactions::payout))
        // Customers and analytics
        .route("/{store_id}/customers", get(customers::index))
        .route("/{store_id}/analytics", get(analytics::show))
        // Courses
        .route(
            "/{store_id}/courses",
            get(courses::index).post(courses::create),
        )
        .route(
            "/{store_id}/courses/{course_id}",
            get(courses::show)
                .patch(courses::update)
                .delete(courses::destroy),
        )
        .route(
            "/{store_id}/courses/{course_id}/chapters",
            post(courses::create_chapter),
        )
        .route(
            "/{store_id}/courses/{course_id}/chapters/reorder",
            put(courses::reorder_chapters),
        )
        .route(
            "/{store_id}/chapters/{chapter_id}",
            patch(courses::update_chapter).delete(courses::delete_chapter),
        )
        .route(
            "/{store_id}/chapters/{chapter_id}/sections",
            post(courses::create_section),
        )
        .route(
            "/{store_id}/chapters/{chapter_id}/sections/reorder",
            put(courses::reorder_sections),
        )
        .route(
            "/{store_id}/sections/{section_id}",
            patch(courses::update_section).delete(courses::delete_section),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        description: Option<Option<String>>,
    }

    #[test]
    fn test_nullable_distinguishes_null_from_absent() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.description, None);

        let null: Patch = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(null.description, Some(None));

        let set: Patch = serde_json::from_str(r#"{"description": "Hand thrown"}"#).unwrap();
        assert_eq!(set.description, Some(Some("Hand thrown".to_string())));
    }

    #[test]
    fn test_slug_or_name() {
        assert_eq!(
            slug_or_name(None, "Clay Works").unwrap().as_str(),
            "clay-works"
        );
        assert_eq!(
            slug_or_name(Some(" studio "), "Clay Works").unwrap().as_str(),
            "studio"
        );
        assert!(slug_or_name(Some("Not Valid"), "x").is_err());
    }

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("name", "  Mugs ", 10).unwrap(), "Mugs");
        assert!(required_text("name", "   ", 10).is_err());
        assert!(required_text("name", "abcdefghijk", 10).is_err());
    }

    #[test]
    fn test_upload_limit_fits_full_size_files() {
        let full_size_files: usize = (0..MAX_UPLOAD_FILES).map(|_| MAX_IMAGE_BYTES).sum();
        assert!(full_size_files + 64 * 1024 <= MAX_UPLOAD_BODY_BYTES);
    }
}
