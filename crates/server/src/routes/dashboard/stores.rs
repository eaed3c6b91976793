//! Store management.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use bazaar_core::{CurrencyCode, Slug, StoreId, UnknownCurrency, UserRole, round_cents};

use super::{is_current_admin, nullable, owned_store, required_text, slug_or_name};
use crate::db::{StoreRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::middleware::{RequireAuth, set_current_user};
use crate::models::CurrentUser;
use crate::models::store::{NewStore, Store, StoreUpdate};
use crate::state::AppState;

const MAX_NAME_LENGTH: usize = 120;
const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// New store request body.
#[derive(Debug, Deserialize)]
pub struct CreateStoreRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub currency: Option<String>,
    pub shipping_fee: Option<Decimal>,
}

/// Store PATCH body.
#[derive(Debug, Deserialize)]
pub struct UpdateStoreRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub currency: Option<String>,
    pub shipping_fee: Option<Decimal>,
    pub active: Option<bool>,
}

fn parse_currency(code: &str) -> Result<CurrencyCode> {
    code.parse()
        .map_err(|e: UnknownCurrency| AppError::BadRequest(e.to_string()))
}

fn check_shipping_fee(fee: Decimal) -> Result<Decimal> {
    if fee.is_sign_negative() {
        return Err(AppError::BadRequest(
            "shipping_fee cannot be negative".to_string(),
        ));
    }
    Ok(round_cents(fee))
}

fn clean_description(description: Option<String>) -> Result<Option<String>> {
    let description = description
        .map(|d| d.trim().to_owned())
        .filter(|d| !d.is_empty());
    if description
        .as_ref()
        .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LENGTH)
    {
        return Err(AppError::BadRequest(format!(
            "description must be at most {MAX_DESCRIPTION_LENGTH} characters"
        )));
    }
    Ok(description)
}

/// The caller's stores; admins see every store.
///
/// GET /api/stores
///
/// # Errors
///
/// Returns 401 when not logged in.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Store>>> {
    let repo = StoreRepository::new(state.pool());
    let stores = if is_current_admin(&state, &user).await? {
        repo.list_all().await?
    } else {
        repo.list_for_owner(user.id).await?
    };
    Ok(Json(stores))
}

/// Open a store owned by the caller.
///
/// A customer opening their first store becomes a seller; the session is
/// refreshed so the new role applies immediately.
///
/// POST /api/stores
///
/// # Errors
///
/// Returns 400 for invalid fields and 409 if the slug is taken.
#[instrument(skip(state, session, user, body), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Json(body): Json<CreateStoreRequest>,
) -> Result<impl IntoResponse> {
    let name = required_text("name", &body.name, MAX_NAME_LENGTH)?;
    let new_store = NewStore {
        owner_id: user.id,
        slug: slug_or_name(body.slug.as_deref(), &name)?,
        name,
        description: clean_description(body.description)?,
        currency: body
            .currency
            .as_deref()
            .map(parse_currency)
            .transpose()?
            .unwrap_or_default(),
        shipping_fee: check_shipping_fee(body.shipping_fee.unwrap_or(Decimal::ZERO))?,
    };

    let store = StoreRepository::new(state.pool()).create(&new_store).await?;

    if user.role == UserRole::Customer
        && let Some(refreshed) = UserRepository::new(state.pool()).get_by_id(user.id).await?
    {
        set_current_user(&session, &CurrentUser::from(&refreshed)).await?;
    }

    tracing::info!(store_id = %store.id, slug = %store.slug, "Store created");
    Ok((StatusCode::CREATED, Json(store)))
}

/// A store the caller manages.
///
/// GET /api/stores/{store_id}
///
/// # Errors
///
/// Returns 404 for unknown stores and 403 for stores the caller does not own.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
) -> Result<Json<Store>> {
    Ok(Json(owned_store(&state, &user, store_id).await?))
}

/// Update store settings.
///
/// PATCH /api/stores/{store_id}
///
/// # Errors
///
/// Returns 400 for invalid fields and 409 if a new slug is taken.
#[instrument(skip(state, user, body))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Json(body): Json<UpdateStoreRequest>,
) -> Result<Json<Store>> {
    let store = owned_store(&state, &user, store_id).await?;

    let update = StoreUpdate {
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
        description: body.description.map(clean_description).transpose()?,
        currency: body.currency.as_deref().map(parse_currency).transpose()?,
        shipping_fee: body.shipping_fee.map(check_shipping_fee).transpose()?,
        active: body.active,
    };

    let updated = StoreRepository::new(state.pool())
        .update(store.id, &update)
        .await?;
    state.catalog_cache().invalidate_store(store.id);
    Ok(Json(updated))
}

/// Delete a store and its catalog. Stores with orders cannot be deleted.
///
/// DELETE /api/stores/{store_id}
///
/// # Errors
///
/// Returns 409 if the store has orders.
#[instrument(skip(state, user))]
pub async fn destroy(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
) -> Result<StatusCode> {
    let store = owned_store(&state, &user, store_id).await?;
    StoreRepository::new(state.pool()).delete(store.id).await?;
    state.catalog_cache().invalidate_store(store.id);

    tracing::info!(store_id = %store.id, "Store deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_check_shipping_fee() {
        assert_eq!(
            check_shipping_fee(Decimal::new(4999, 3)).unwrap(),
            Decimal::new(500, 2)
        );
        assert!(check_shipping_fee(Decimal::new(-1, 2)).is_err());
    }

    #[test]
    fn test_clean_description() {
        assert_eq!(clean_description(Some("  ".to_string())).unwrap(), None);
        assert_eq!(
            clean_description(Some(" Pots ".to_string())).unwrap(),
            Some("Pots".to_string())
        );
        assert!(clean_description(Some("x".repeat(MAX_DESCRIPTION_LENGTH + 1))).is_err());
    }

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_currency("eur").unwrap(), CurrencyCode::EUR);
        assert!(parse_currency("XYZ").is_err());
    }
}
