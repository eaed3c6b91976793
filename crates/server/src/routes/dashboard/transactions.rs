//! Store ledger: entries, totals and payouts.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use bazaar_core::{Page, PageRequest, StoreId, round_cents};

use super::owned_store;
use crate::db::TransactionRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::transaction::{LedgerSummary, Transaction, TransactionFilter};
use crate::state::AppState;

/// Payout request body.
#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    pub amount: Decimal,
}

/// Ledger entries, newest first.
///
/// GET /api/stores/{store_id}/transactions
///
/// # Errors
///
/// Returns 403/404 per the store ownership rules.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Query(filter): Query<TransactionFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Transaction>>> {
    let store = owned_store(&state, &user, store_id).await?;
    let transactions = TransactionRepository::new(state.pool())
        .list(store.id, filter, page)
        .await?;
    Ok(Json(transactions))
}

/// Totals per entry kind and the payable balance.
///
/// GET /api/stores/{store_id}/transactions/summary
///
/// # Errors
///
/// Returns 403/404 per the store ownership rules.
pub async fn summary(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
) -> Result<Json<LedgerSummary>> {
    let store = owned_store(&state, &user, store_id).await?;
    Ok(Json(
        TransactionRepository::new(state.pool())
            .summary(store.id)
            .await?,
    ))
}

/// Payout amount rounded to cents; must stay above zero.
fn payout_amount(requested: Decimal) -> Result<Decimal> {
    let amount = round_cents(requested);
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "payout amount must be greater than 0".to_string(),
        ));
    }
    Ok(amount)
}

/// Pay out part of the balance.
///
/// POST /api/stores/{store_id}/transactions/payouts
///
/// # Errors
///
/// Returns 400 for non-positive amounts and 409 when the amount exceeds
/// the balance.
#[instrument(skip(state, user))]
pub async fn payout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Json(body): Json<PayoutRequest>,
) -> Result<impl IntoResponse> {
    let store = owned_store(&state, &user, store_id).await?;
    let amount = payout_amount(body.amount)?;

    let transaction = TransactionRepository::new(state.pool())
        .record_payout(store.id, amount)
        .await?;

    tracing::info!(store_id = %store.id, amount = %amount, "Payout recorded");
    Ok((StatusCode::CREATED, Json(transaction)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payout_amount() {
        assert_eq!(
            payout_amount(Decimal::new(12_345, 3)).unwrap(),
            Decimal::new(1235, 2)
        );
        assert!(matches!(
            payout_amount(Decimal::ZERO),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            payout_amount(Decimal::new(-500, 2)),
            Err(AppError::BadRequest(_))
        ));
        // rounds to zero
        assert!(payout_amount(Decimal::new(4, 3)).is_err());
    }
}
