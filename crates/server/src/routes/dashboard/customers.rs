//! Customers who have ordered from a store.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use bazaar_core::{Page, PageRequest, StoreId};

use super::owned_store;
use crate::db::CustomerRepository;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::customer::{Customer, CustomerFilter};
use crate::state::AppState;

/// Customers with order count, total spent and last order date.
///
/// GET /api/stores/{store_id}/customers
///
/// # Errors
///
/// Returns 403/404 per the store ownership rules.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Query(filter): Query<CustomerFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Customer>>> {
    let store = owned_store(&state, &user, store_id).await?;
    let customers = CustomerRepository::new(state.pool())
        .list(store.id, &filter, page)
        .await?;
    Ok(Json(customers))
}
