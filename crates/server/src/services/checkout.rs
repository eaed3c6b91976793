//! Checkout: turning a session cart into a pending order.
//!
//! Everything happens in one database transaction. Product rows are locked
//! and re-priced, stock is taken with guarded updates and the promotion's
//! usage count is bumped under its own limit, so two shoppers racing for the
//! last unit (or the last promotion use) cannot both win.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use bazaar_core::{ProductId, UserId};

use crate::db::{OrderRepository, RepositoryError, orders, products, promotions};
use crate::models::cart::{Cart, price_cart};
use crate::models::order::{NewOrder, NewOrderItem, Order, ShippingAddress};
use crate::models::promotion::{PromotionError, normalize_code};
use crate::models::store::Store;

const MAX_FIELD_LENGTH: usize = 200;
const MAX_PHONE_LENGTH: usize = 32;
const MAX_NOTE_LENGTH: usize = 1000;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The cart has no lines.
    #[error("cart is empty")]
    EmptyCart,

    /// Contact or shipping details are invalid.
    #[error("{0}")]
    Invalid(String),

    /// A cart product was deleted or archived.
    #[error("product {0} is no longer available")]
    ProductUnavailable(ProductId),

    /// Not enough stock for a line.
    #[error("not enough stock for {0}")]
    InsufficientStock(String),

    /// The attached promotion cannot be used.
    #[error(transparent)]
    Promotion(#[from] PromotionError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for CheckoutError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// Contact and shipping details submitted at checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutDetails {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// Details after trimming and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDetails {
    pub shipping_address: ShippingAddress,
    pub phone: String,
    pub note: Option<String>,
}

fn required(field: &str, value: &str, max: usize) -> Result<String, CheckoutError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CheckoutError::Invalid(format!("{field} is required")));
    }
    if value.chars().count() > max {
        return Err(CheckoutError::Invalid(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value.to_owned())
}

fn optional(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>, CheckoutError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) if v.chars().count() > max => Err(CheckoutError::Invalid(format!(
            "{field} must be at most {max} characters"
        ))),
        other => Ok(other.map(str::to_owned)),
    }
}

impl CheckoutDetails {
    /// Trim and validate every field.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<ValidatedDetails, CheckoutError> {
        let shipping_address = ShippingAddress {
            name: required("name", &self.name, MAX_FIELD_LENGTH)?,
            line1: required("line1", &self.line1, MAX_FIELD_LENGTH)?,
            line2: optional("line2", self.line2.as_deref(), MAX_FIELD_LENGTH)?,
            city: required("city", &self.city, MAX_FIELD_LENGTH)?,
            postal_code: required("postal_code", &self.postal_code, MAX_FIELD_LENGTH)?,
            country: required("country", &self.country, MAX_FIELD_LENGTH)?,
        };
        let phone = required("phone", &self.phone, MAX_PHONE_LENGTH)?;
        if !phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'))
        {
            return Err(CheckoutError::Invalid(
                "phone may only contain digits, spaces and + - ( ) .".to_string(),
            ));
        }
        Ok(ValidatedDetails {
            shipping_address,
            phone,
            note: optional("note", self.note.as_deref(), MAX_NOTE_LENGTH)?,
        })
    }
}

/// New payment reference handed to the payment provider.
#[must_use]
pub fn new_payment_reference() -> String {
    format!("pay_{}", Uuid::new_v4().simple())
}

/// Checkout service.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
}

impl<'a> CheckoutService<'a> {
    /// Create a new checkout service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Place a `pending` order for the cart.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` for an empty cart,
    /// `CheckoutError::ProductUnavailable` or `CheckoutError::InsufficientStock`
    /// when the cart can no longer be fulfilled, and
    /// `CheckoutError::Promotion` when the attached promotion does not apply.
    #[instrument(skip(self, store, cart, details), fields(store_id = %store.id, user_id = %user_id))]
    pub async fn place_order(
        &self,
        store: &Store,
        user_id: UserId,
        cart: &Cart,
        details: ValidatedDetails,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut tx = self.pool.begin().await?;

        let locked = products::lock_many(&mut tx, store.id, &cart.product_ids()).await?;

        let promotion = match cart.promotion_code.as_deref() {
            Some(code) => {
                let code = normalize_code(code)?;
                Some(
                    promotions::lock_by_code(&mut tx, store.id, &code)
                        .await?
                        .ok_or(PromotionError::UnknownCode)?,
                )
            }
            None => None,
        };

        let (view, promotion_error) = price_cart(cart, store, &locked, promotion.as_ref(), now);

        if let Some(missing) = cart
            .lines
            .iter()
            .find(|line| !view.lines.iter().any(|l| l.product_id == line.product_id))
        {
            return Err(CheckoutError::ProductUnavailable(missing.product_id));
        }
        if let Some(e) = promotion_error {
            return Err(e.into());
        }

        for line in &view.lines {
            if !products::decrement_stock(&mut tx, line.product_id, line.quantity).await? {
                return Err(CheckoutError::InsufficientStock(line.name.clone()));
            }
        }

        if let Some(promotion) = &promotion
            && !promotions::consume(&mut tx, promotion.id).await?
        {
            return Err(PromotionError::UsageLimitReached.into());
        }

        let order_id = orders::insert_order(
            &mut tx,
            &NewOrder {
                store_id: store.id,
                user_id,
                subtotal: view.subtotal,
                discount: view.discount,
                shipping: view.shipping,
                total: view.total,
                promotion_code: promotion.as_ref().map(|p| p.code.clone()),
                shipping_address: details.shipping_address,
                phone: details.phone,
                note: details.note,
                payment_reference: new_payment_reference(),
            },
        )
        .await?;

        for line in &view.lines {
            orders::insert_item(
                &mut tx,
                order_id,
                &NewOrderItem {
                    product_id: line.product_id,
                    product_name: line.name.clone(),
                    unit_price: line.unit_price,
                    quantity: line.quantity,
                },
            )
            .await?;
        }

        tx.commit().await?;

        info!(order_id = %order_id, total = %view.total, "Order placed");

        OrderRepository::new(self.pool)
            .get(order_id)
            .await?
            .ok_or(CheckoutError::Repository(RepositoryError::NotFound))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn details() -> CheckoutDetails {
        CheckoutDetails {
            name: " Ada Lovelace ".to_string(),
            line1: "1 Analytical Way".to_string(),
            line2: Some("   ".to_string()),
            city: "London".to_string(),
            postal_code: "N1 9GU".to_string(),
            country: "GB".to_string(),
            phone: "+44 20 7946 0958".to_string(),
            note: None,
        }
    }

    #[test]
    fn test_validate_trims_and_drops_blank_optionals() {
        let validated = details().validate().unwrap();
        assert_eq!(validated.shipping_address.name, "Ada Lovelace");
        assert_eq!(validated.shipping_address.line2, None);
        assert_eq!(validated.note, None);
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let mut d = details();
        d.city = "  ".to_string();
        let err = d.validate().unwrap_err();
        assert_eq!(err.to_string(), "city is required");

        let mut d = details();
        d.phone = "call me".to_string();
        assert!(matches!(d.validate(), Err(CheckoutError::Invalid(_))));

        let mut d = details();
        d.note = Some("x".repeat(MAX_NOTE_LENGTH + 1));
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_payment_reference_format() {
        let reference = new_payment_reference();
        assert!(reference.starts_with("pay_"));
        assert_eq!(reference.len(), 4 + 32);
        assert_ne!(reference, new_payment_reference());
    }
}
