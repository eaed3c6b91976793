//! Promotion code management.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use bazaar_core::{PromotionId, PromotionKind, StoreId};

use super::{nullable, owned_store};
use crate::db::PromotionRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::promotion::{Promotion, PromotionTerms, normalize_code};
use crate::state::AppState;

const fn default_active() -> bool {
    true
}

/// New promotion request body.
#[derive(Debug, Deserialize)]
pub struct CreatePromotionRequest {
    pub code: String,
    pub kind: PromotionKind,
    #[serde(default)]
    pub value: Decimal,
    pub min_subtotal: Option<Decimal>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Promotion PATCH body. `null` clears an optional limit.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePromotionRequest {
    pub code: Option<String>,
    pub kind: Option<PromotionKind>,
    pub value: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub min_subtotal: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "nullable")]
    pub starts_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub ends_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub usage_limit: Option<Option<i32>>,
    pub active: Option<bool>,
}

impl From<CreatePromotionRequest> for PromotionTerms {
    fn from(body: CreatePromotionRequest) -> Self {
        Self {
            code: body.code,
            kind: body.kind,
            value: body.value,
            min_subtotal: body.min_subtotal,
            starts_at: body.starts_at,
            ends_at: body.ends_at,
            usage_limit: body.usage_limit,
            active: body.active,
        }
    }
}

impl UpdatePromotionRequest {
    /// Overlay the changed fields on the current terms.
    fn merge(self, mut terms: PromotionTerms) -> PromotionTerms {
        if let Some(code) = self.code {
            terms.code = code;
        }
        if let Some(kind) = self.kind {
            terms.kind = kind;
        }
        if let Some(value) = self.value {
            terms.value = value;
        }
        if let Some(min_subtotal) = self.min_subtotal {
            terms.min_subtotal = min_subtotal;
        }
        if let Some(starts_at) = self.starts_at {
            terms.starts_at = starts_at;
        }
        if let Some(ends_at) = self.ends_at {
            terms.ends_at = ends_at;
        }
        if let Some(usage_limit) = self.usage_limit {
            terms.usage_limit = usage_limit;
        }
        if let Some(active) = self.active {
            terms.active = active;
        }
        terms
    }
}

/// Normalise the code and validate the terms before writing.
fn prepare(mut terms: PromotionTerms) -> Result<PromotionTerms> {
    terms.code = normalize_code(&terms.code)?;
    if terms.kind == PromotionKind::FreeShipping {
        terms.value = Decimal::ZERO;
    }
    terms.validate()?;
    Ok(terms)
}

async fn store_promotion(
    state: &AppState,
    store_id: StoreId,
    promotion_id: PromotionId,
) -> Result<Promotion> {
    PromotionRepository::new(state.pool())
        .get(store_id, promotion_id)
        .await?
        .ok_or_else(|| AppError::NotFound("promotion not found".to_string()))
}

/// The store's promotions.
///
/// GET /api/stores/{store_id}/promotions
///
/// # Errors
///
/// Returns 403/404 per the store ownership rules.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
) -> Result<Json<Vec<Promotion>>> {
    let store = owned_store(&state, &user, store_id).await?;
    Ok(Json(PromotionRepository::new(state.pool()).list(store.id).await?))
}

/// Create a promotion code.
///
/// POST /api/stores/{store_id}/promotions
///
/// # Errors
///
/// Returns 400 for invalid terms and 409 if the code exists in the store.
#[instrument(skip(state, user, body))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Json(body): Json<CreatePromotionRequest>,
) -> Result<impl IntoResponse> {
    let store = owned_store(&state, &user, store_id).await?;
    let terms = prepare(body.into())?;

    let promotion = PromotionRepository::new(state.pool())
        .create(store.id, &terms)
        .await?;
    tracing::info!(promotion_id = %promotion.id, code = %promotion.code, "Promotion created");
    Ok((StatusCode::CREATED, Json(promotion)))
}

/// One promotion.
///
/// GET /api/stores/{store_id}/promotions/{promotion_id}
///
/// # Errors
///
/// Returns 404 if the promotion is not in the store.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, promotion_id)): Path<(StoreId, PromotionId)>,
) -> Result<Json<Promotion>> {
    let store = owned_store(&state, &user, store_id).await?;
    Ok(Json(store_promotion(&state, store.id, promotion_id).await?))
}

/// Change a promotion's terms. Usage so far is kept.
///
/// PATCH /api/stores/{store_id}/promotions/{promotion_id}
///
/// # Errors
///
/// Returns 400 if the merged terms are invalid and 409 if a new code is taken.
#[instrument(skip(state, user, body))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, promotion_id)): Path<(StoreId, PromotionId)>,
    Json(body): Json<UpdatePromotionRequest>,
) -> Result<Json<Promotion>> {
    let store = owned_store(&state, &user, store_id).await?;
    let current = store_promotion(&state, store.id, promotion_id).await?;
    let terms = prepare(body.merge(PromotionTerms::from(&current)))?;

    let promotion = PromotionRepository::new(state.pool())
        .update(store.id, promotion_id, &terms)
        .await?;
    Ok(Json(promotion))
}

/// Delete a promotion.
///
/// DELETE /api/stores/{store_id}/promotions/{promotion_id}
///
/// # Errors
///
/// Returns 404 if the promotion is not in the store.
pub async fn destroy(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, promotion_id)): Path<(StoreId, PromotionId)>,
) -> Result<StatusCode> {
    let store = owned_store(&state, &user, store_id).await?;
    PromotionRepository::new(state.pool())
        .delete(store.id, promotion_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn terms() -> PromotionTerms {
        PromotionTerms {
            code: "SPRING10".to_string(),
            kind: PromotionKind::Percentage,
            value: Decimal::new(10, 0),
            min_subtotal: Some(Decimal::new(20, 0)),
            starts_at: None,
            ends_at: None,
            usage_limit: Some(100),
            active: true,
        }
    }

    #[test]
    fn test_create_defaults_to_active() {
        let body: CreatePromotionRequest =
            serde_json::from_str(r#"{"code": "ship", "kind": "free_shipping"}"#).unwrap();
        assert!(body.active);
        let terms = prepare(body.into()).unwrap();
        assert_eq!(terms.code, "SHIP");
        assert_eq!(terms.value, Decimal::ZERO);
    }

    #[test]
    fn test_prepare_rejects_bad_terms() {
        let mut bad = terms();
        bad.value = Decimal::new(150, 0);
        assert!(prepare(bad).is_err());

        let mut bad = terms();
        bad.code = "a b".to_string();
        assert!(prepare(bad).is_err());
    }

    #[test]
    fn test_merge_keeps_unchanged_fields() {
        let patch: UpdatePromotionRequest =
            serde_json::from_str(r#"{"value": "15", "usage_limit": null}"#).unwrap();
        let merged = patch.merge(terms());

        assert_eq!(merged.value, Decimal::new(15, 0));
        assert_eq!(merged.usage_limit, None);
        assert_eq!(merged.min_subtotal, Some(Decimal::new(20, 0)));
        assert_eq!(merged.code, "SPRING10");
    }
}
