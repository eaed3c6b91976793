//! Product and product image management.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use bazaar_core::{
    CategoryId, Page, PageRequest, PositionUpdate, ProductId, ProductImageId, Slug, StoreId,
    ensure_same_members, round_cents, validate_reorder,
};

use super::{MAX_UPLOAD_FILES, nullable, owned_store, required_text, slug_or_name};
use crate::db::products::ListScope;
use crate::db::{CategoryRepository, ProductRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::catalog::{
    NewProduct, Product, ProductDetail, ProductFilter, ProductImage, ProductUpdate,
};
use crate::models::store::Store;
use crate::services::ImageHostError;
use crate::services::images::ImageUpload;
use crate::state::AppState;

const MAX_NAME_LENGTH: usize = 200;
const MAX_DESCRIPTION_LENGTH: usize = 10_000;
const MAX_IMAGES: usize = 20;
const MAX_URL_LENGTH: usize = 2048;

/// New product request body.
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub featured: bool,
    pub category_id: Option<CategoryId>,
}

/// Product PATCH body.
#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub compare_at_price: Option<Option<Decimal>>,
    pub stock: Option<i32>,
    pub featured: Option<bool>,
    pub archived: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub category_id: Option<Option<CategoryId>>,
}

/// Image list replacement body.
#[derive(Debug, Deserialize)]
pub struct ImageUrlsRequest {
    pub urls: Vec<String>,
}

fn check_amount(field: &str, amount: Decimal) -> Result<Decimal> {
    if amount.is_sign_negative() {
        return Err(AppError::BadRequest(format!("{field} cannot be negative")));
    }
    Ok(round_cents(amount))
}

fn check_stock(stock: i32) -> Result<i32> {
    if stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".to_string()));
    }
    Ok(stock)
}

fn check_description(description: &str) -> Result<String> {
    let description = description.trim();
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(AppError::BadRequest(format!(
            "description must be at most {MAX_DESCRIPTION_LENGTH} characters"
        )));
    }
    Ok(description.to_owned())
}

/// A product keeps at most `MAX_IMAGES` images after `adding` more.
fn check_image_capacity(existing: usize, adding: usize) -> Result<()> {
    if existing.saturating_add(adding) > MAX_IMAGES {
        return Err(AppError::BadRequest(format!(
            "a product can have at most {MAX_IMAGES} images"
        )));
    }
    Ok(())
}

/// Absolute http(s) URLs only.
fn check_image_urls(urls: &[String]) -> Result<Vec<String>> {
    check_image_capacity(0, urls.len())?;
    urls.iter()
        .map(|raw| {
            let raw = raw.trim();
            let valid = raw.len() <= MAX_URL_LENGTH
                && Url::parse(raw).is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
            if valid {
                Ok(raw.to_owned())
            } else {
                Err(AppError::BadRequest(format!("invalid image URL: {raw}")))
            }
        })
        .collect()
}

async fn ensure_category(state: &AppState, store: &Store, id: Option<CategoryId>) -> Result<()> {
    if let Some(id) = id
        && CategoryRepository::new(state.pool())
            .get(store.id, id)
            .await?
            .is_none()
    {
        return Err(AppError::BadRequest(format!("unknown category {id}")));
    }
    Ok(())
}

async fn store_product(
    state: &AppState,
    store: &Store,
    product_id: ProductId,
) -> Result<Product> {
    ProductRepository::new(state.pool())
        .get(store.id, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("product not found".to_string()))
}

/// Products including archived ones unless `archived=false` is given.
///
/// GET /api/stores/{store_id}/products
///
/// # Errors
///
/// Returns 403/404 per the store ownership rules.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Query(filter): Query<ProductFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Product>>> {
    let store = owned_store(&state, &user, store_id).await?;
    let products = ProductRepository::new(state.pool())
        .list(store.id, &filter, ListScope::Dashboard, page)
        .await?;
    Ok(Json(products))
}

/// Create a product.
///
/// POST /api/stores/{store_id}/products
///
/// # Errors
///
/// Returns 400 for invalid fields or an unknown category and 409 for
/// duplicate slugs.
#[instrument(skip(state, user, body))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Json(body): Json<CreateProductRequest>,
) -> Result<impl IntoResponse> {
    let store = owned_store(&state, &user, store_id).await?;
    ensure_category(&state, &store, body.category_id).await?;

    let name = required_text("name", &body.name, MAX_NAME_LENGTH)?;
    let new_product = NewProduct {
        store_id: store.id,
        category_id: body.category_id,
        slug: slug_or_name(body.slug.as_deref(), &name)?,
        name,
        description: check_description(&body.description)?,
        price: check_amount("price", body.price)?,
        compare_at_price: body
            .compare_at_price
            .map(|p| check_amount("compare_at_price", p))
            .transpose()?,
        stock: check_stock(body.stock)?,
        featured: body.featured,
    };

    let product = ProductRepository::new(state.pool())
        .create(&new_product)
        .await?;
    state.catalog_cache().invalidate_store(store.id);

    tracing::info!(product_id = %product.id, store_id = %store.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// Product with its images.
///
/// GET /api/stores/{store_id}/products/{product_id}
///
/// # Errors
///
/// Returns 404 if the product is not in the store.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, product_id)): Path<(StoreId, ProductId)>,
) -> Result<Json<ProductDetail>> {
    let store = owned_store(&state, &user, store_id).await?;
    let product = store_product(&state, &store, product_id).await?;
    let images = ProductRepository::new(state.pool())
        .images(product.id)
        .await?;
    Ok(Json(ProductDetail { product, images }))
}

/// Update a product. `null` clears the category or compare-at price.
///
/// PATCH /api/stores/{store_id}/products/{product_id}
///
/// # Errors
///
/// Returns 400 for invalid fields and 404 if the product is not in the store.
#[instrument(skip(state, user, body))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, product_id)): Path<(StoreId, ProductId)>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<Json<Product>> {
    let store = owned_store(&state, &user, store_id).await?;
    if let Some(category_id) = body.category_id {
        ensure_category(&state, &store, category_id).await?;
    }

    let update = ProductUpdate {
        category_id: body.category_id,
        name: body
            .name
            .as_deref()
            .map(|n| required_text("name", n, MAX_NAME_LENGTH))
            .transpose()?,
        slug: body
            .slug
            .as_deref()
            .map(|s| Slug::parse(s).map_err(|e| AppError::BadRequest(e.to_string())))
            .transpose()?,
        description: body.description.as_deref().map(check_description).transpose()?,
        price: body.price.map(|p| check_amount("price", p)).transpose()?,
        compare_at_price: body
            .compare_at_price
            .map(|p| p.map(|p| check_amount("compare_at_price", p)).transpose())
            .transpose()?,
        stock: body.stock.map(check_stock).transpose()?,
        featured: body.featured,
        archived: body.archived,
    };

    let product = ProductRepository::new(state.pool())
        .update(store.id, product_id, &update)
        .await?;
    state.catalog_cache().invalidate_store(store.id);
    Ok(Json(product))
}

/// Delete a product. Order history keeps the name and price snapshots.
///
/// DELETE /api/stores/{store_id}/products/{product_id}
///
/// # Errors
///
/// Returns 404 if the product is not in the store.
pub async fn destroy(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, product_id)): Path<(StoreId, ProductId)>,
) -> Result<StatusCode> {
    let store = owned_store(&state, &user, store_id).await?;
    ProductRepository::new(state.pool())
        .delete(store.id, product_id)
        .await?;
    state.catalog_cache().invalidate_store(store.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the product's images with the given URLs, in order.
///
/// PUT /api/stores/{store_id}/products/{product_id}/images
///
/// # Errors
///
/// Returns 400 for invalid URLs.
pub async fn replace_images(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, product_id)): Path<(StoreId, ProductId)>,
    Json(body): Json<ImageUrlsRequest>,
) -> Result<Json<Vec<ProductImage>>> {
    let store = owned_store(&state, &user, store_id).await?;
    let product = store_product(&state, &store, product_id).await?;
    let urls = check_image_urls(&body.urls)?;

    let images = ProductRepository::new(state.pool())
        .replace_images(product.id, &urls)
        .await?;
    state.catalog_cache().invalidate_store(store.id);
    Ok(Json(images))
}

/// Upload image files to the image host and append them to the product.
///
/// Every file is validated before anything is sent; if any upload fails,
/// nothing is stored.
///
/// POST /api/stores/{store_id}/products/{product_id}/images/upload
///
/// # Errors
///
/// Returns 400 for bad files or when uploads are not configured, and 502
/// when the image host fails.
#[instrument(skip(state, user, multipart))]
pub async fn upload_images(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, product_id)): Path<(StoreId, ProductId)>,
    mut multipart: Multipart,
) -> Result<Json<Vec<ProductImage>>> {
    let store = owned_store(&state, &user, store_id).await?;
    let product = store_product(&state, &store, product_id).await?;
    let client = state.image_host().ok_or(ImageHostError::NotConfigured)?;
    let products = ProductRepository::new(state.pool());
    let existing = products.image_ids(product.id).await?.len();
    check_image_capacity(existing, 1)?;

    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if uploads.len() == MAX_UPLOAD_FILES {
            return Err(AppError::BadRequest(format!(
                "at most {MAX_UPLOAD_FILES} files per upload"
            )));
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        uploads.push(ImageUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    if uploads.is_empty() {
        return Err(AppError::BadRequest("no files uploaded".to_string()));
    }
    check_image_capacity(existing, uploads.len())?;

    let count = uploads.len();
    let urls = client.upload_all(uploads).await?;
    let images = products.append_images(product.id, &urls).await?;
    state.catalog_cache().invalidate_store(store.id);

    tracing::info!(product_id = %product.id, count, "Product images uploaded");
    Ok(Json(images))
}

/// Remove one image.
///
/// DELETE /api/stores/{store_id}/products/{product_id}/images/{image_id}
///
/// # Errors
///
/// Returns 404 if the image is not on the product.
pub async fn delete_image(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, product_id, image_id)): Path<(StoreId, ProductId, ProductImageId)>,
) -> Result<StatusCode> {
    let store = owned_store(&state, &user, store_id).await?;
    let product = store_product(&state, &store, product_id).await?;
    ProductRepository::new(state.pool())
        .delete_image(product.id, image_id)
        .await?;
    state.catalog_cache().invalidate_store(store.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Set the display order of the product's images.
///
/// PUT /api/stores/{store_id}/products/{product_id}/images/reorder
///
/// # Errors
///
/// Returns 400 unless the list names each image once.
pub async fn reorder_images(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, product_id)): Path<(StoreId, ProductId)>,
    Json(updates): Json<Vec<PositionUpdate<ProductImageId>>>,
) -> Result<Json<Vec<ProductImage>>> {
    let store = owned_store(&state, &user, store_id).await?;
    let product = store_product(&state, &store, product_id).await?;
    let repo = ProductRepository::new(state.pool());

    let sorted = validate_reorder(&updates)?;
    ensure_same_members(&sorted, &repo.image_ids(product.id).await?)?;
    repo.reorder_images(product.id, &sorted).await?;

    state.catalog_cache().invalidate_store(store.id);
    Ok(Json(repo.images(product.id).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_check_amount() {
        assert_eq!(
            check_amount("price", Decimal::new(12_345, 3)).unwrap(),
            Decimal::new(1235, 2)
        );
        assert_eq!(check_amount("price", Decimal::ZERO).unwrap(), Decimal::ZERO);
        assert!(check_amount("price", Decimal::new(-1, 0)).is_err());
    }

    #[test]
    fn test_check_stock() {
        assert_eq!(check_stock(0).unwrap(), 0);
        assert!(check_stock(-1).is_err());
    }

    #[test]
    fn test_check_image_urls() {
        let urls = check_image_urls(&[
            " https://img.example.com/a.jpg ".to_string(),
            "http://img.example.com/b.png".to_string(),
        ])
        .unwrap();
        assert_eq!(urls[0], "https://img.example.com/a.jpg");

        assert!(check_image_urls(&["ftp://example.com/a.jpg".to_string()]).is_err());
        assert!(check_image_urls(&["not a url".to_string()]).is_err());
        assert!(check_image_urls(&vec!["https://a.example/x.jpg".to_string(); MAX_IMAGES + 1]).is_err());
        assert!(check_image_urls(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_check_image_capacity() {
        assert!(check_image_capacity(0, MAX_IMAGES).is_ok());
        assert!(check_image_capacity(10, 10).is_ok());
        assert!(check_image_capacity(15, 10).is_err());
        assert!(check_image_capacity(MAX_IMAGES, 1).is_err());
        assert!(check_image_capacity(usize::MAX, 1).is_err());
    }
}
