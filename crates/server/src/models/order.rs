//! Order domain types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{
    CurrencyCode, Email, OrderId, OrderItemId, OrderStatus, Price, ProductId, StoreId, UserId,
};

use super::delivery::Delivery;

/// Shipping destination captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// A placed order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub store_id: StoreId,
    /// Name of the store the order was placed with.
    pub store_name: String,
    pub currency: CurrencyCode,
    pub user_id: UserId,
    pub customer_email: Email,
    pub customer_name: String,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub promotion_code: Option<String>,
    pub shipping_address: ShippingAddress,
    pub phone: String,
    pub note: Option<String>,
    /// Reference the payment provider reports back in webhooks.
    pub payment_reference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The order total as a formatted price.
    #[must_use]
    pub fn total_price(&self) -> Price {
        Price::new(self.total, self.currency)
    }
}

/// A line of an order. Name and price are snapshots taken at checkout.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// `None` once the product has been deleted.
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl OrderItem {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// An order with its items and delivery.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub delivery: Option<Delivery>,
}

/// Order listing filters from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// Inclusive start date (UTC).
    pub from: Option<NaiveDate>,
    /// Inclusive end date (UTC).
    pub to: Option<NaiveDate>,
    /// Customer email or name substring.
    pub q: Option<String>,
    /// Platform admin only.
    pub store_id: Option<StoreId>,
}

/// Order fields written at checkout.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub store_id: StoreId,
    pub user_id: UserId,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub promotion_code: Option<String>,
    pub shipping_address: ShippingAddress,
    pub phone: String,
    pub note: Option<String>,
    pub payment_reference: String,
}

/// An order line written at checkout.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total() {
        let item = OrderItem {
            id: OrderItemId::new(1),
            order_id: OrderId::new(1),
            product_id: None,
            product_name: "Mug".to_string(),
            unit_price: Decimal::new(1250, 2),
            quantity: 3,
        };
        assert_eq!(item.line_total(), Decimal::new(3750, 2));
    }
}
