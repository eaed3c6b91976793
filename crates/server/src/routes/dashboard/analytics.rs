//! Store analytics.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::instrument;

use bazaar_core::StoreId;

use super::owned_store;
use crate::db::AnalyticsRepository;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::analytics::{AnalyticsQuery, StoreAnalytics};
use crate::state::AppState;

/// Revenue, sales and top products over the last `months` months.
///
/// GET /api/stores/{store_id}/analytics
///
/// # Errors
///
/// Returns 403/404 per the store ownership rules.
#[instrument(skip(state, user))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<StoreAnalytics>> {
    let store = owned_store(&state, &user, store_id).await?;
    let analytics = AnalyticsRepository::new(state.pool())
        .store(store.id, query.months())
        .await?;
    Ok(Json(analytics))
}
