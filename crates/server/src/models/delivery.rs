//! Delivery (shipment) domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{DeliveryId, DeliveryStatus, OrderId, StoreId};

/// The shipment of one order.
#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub order_id: OrderId,
    pub store_id: StoreId,
    pub status: DeliveryStatus,
    pub carrier: String,
    pub tracking_number: Option<String>,
    pub estimated_at: Option<DateTime<Utc>>,
    /// Stamped when the delivery reaches `delivered`.
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Delivery listing filters from the query string.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DeliveryFilter {
    pub status: Option<DeliveryStatus>,
}

/// Partial update of a delivery. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct DeliveryUpdate {
    pub status: Option<DeliveryStatus>,
    pub carrier: Option<String>,
    pub tracking_number: Option<Option<String>>,
    pub estimated_at: Option<Option<DateTime<Utc>>>,
    pub delivered_at: Option<DateTime<Utc>>,
}
