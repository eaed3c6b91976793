//! Store (tenant) domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use bazaar_core::{CurrencyCode, Slug, StoreId, UserId};

/// A seller's store.
#[derive(Debug, Clone, Serialize)]
pub struct Store {
    pub id: StoreId,
    /// Owning seller.
    pub owner_id: UserId,
    pub name: String,
    /// Globally unique URL segment.
    pub slug: Slug,
    pub description: Option<String>,
    /// Currency all prices in the store are quoted in.
    pub currency: CurrencyCode,
    /// Flat shipping fee added to every order.
    pub shipping_fee: Decimal,
    /// Inactive stores are hidden from the storefront.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new store.
#[derive(Debug, Clone)]
pub struct NewStore {
    pub owner_id: UserId,
    pub name: String,
    pub slug: Slug,
    pub description: Option<String>,
    pub currency: CurrencyCode,
    pub shipping_fee: Decimal,
}

/// Partial update of a store. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct StoreUpdate {
    pub name: Option<String>,
    pub slug: Option<Slug>,
    pub description: Option<Option<String>>,
    pub currency: Option<CurrencyCode>,
    pub shipping_fee: Option<Decimal>,
    pub active: Option<bool>,
}
