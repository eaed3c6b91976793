//! Session-held carts and cart pricing.
//!
//! A cart only stores product IDs and quantities. Prices, names and stock
//! always come from the live product rows when the cart is viewed or checked
//! out, so a cart never carries a stale price into an order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bazaar_core::{CurrencyCode, ProductId, StoreId};

use super::catalog::Product;
use super::promotion::{Promotion, PromotionError};
use super::store::Store;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 99;

/// Errors from cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("at most {MAX_LINE_QUANTITY} of a product can be in the cart")]
    QuantityLimit,
    #[error("product is not in the cart")]
    NotInCart,
}

/// One product line in a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// The cart held in the session for one store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
    pub promotion_code: Option<String>,
}

impl Cart {
    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Quantity of a product currently in the cart.
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> i32 {
        self.lines
            .iter()
            .find(|l| l.product_id == product_id)
            .map_or(0, |l| l.quantity)
    }

    /// Add `quantity` units, merging with an existing line.
    ///
    /// Returns the new line quantity.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] if `quantity` is not positive or the line would
    /// exceed [`MAX_LINE_QUANTITY`].
    pub fn add(&mut self, product_id: ProductId, quantity: i32) -> Result<i32, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity);
        }
        let merged = self.quantity_of(product_id).saturating_add(quantity);
        if merged > MAX_LINE_QUANTITY {
            return Err(CartError::QuantityLimit);
        }

        match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => line.quantity = merged,
            None => self.lines.push(CartLine {
                product_id,
                quantity: merged,
            }),
        }
        Ok(merged)
    }

    /// Set a line's quantity; zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] for negative or over-limit quantities, or if
    /// the product is not in the cart.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: i32) -> Result<(), CartError> {
        if quantity < 0 {
            return Err(CartError::InvalidQuantity);
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::QuantityLimit);
        }
        if quantity == 0 {
            return self.remove(product_id);
        }
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or(CartError::NotInCart)?;
        line.quantity = quantity;
        Ok(())
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NotInCart`] if the product is not in the cart.
    pub fn remove(&mut self, product_id: ProductId) -> Result<(), CartError> {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() == before {
            return Err(CartError::NotInCart);
        }
        Ok(())
    }

    /// Drop lines whose product no longer exists or is archived.
    ///
    /// Returns `true` if any line was dropped.
    pub fn prune(&mut self, products: &[Product]) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| {
            products
                .iter()
                .any(|p| p.id == line.product_id && !p.archived)
        });
        self.lines.len() != before
    }

    /// Product IDs in the cart.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.lines.iter().map(|l| l.product_id).collect()
    }
}

/// A cart line priced from the live product.
#[derive(Debug, Clone, Serialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub name: String,
    pub slug: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    /// Units currently in stock.
    pub stock: i32,
    /// Whether the requested quantity can be sold right now.
    pub available: bool,
}

/// A fully priced cart.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub store_id: StoreId,
    pub currency: CurrencyCode,
    pub lines: Vec<PricedLine>,
    pub item_count: i32,
    pub promotion_code: Option<String>,
    /// Why the attached promotion does not currently apply.
    pub promotion_error: Option<String>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl CartView {
    /// Lines that cannot be fulfilled from current stock.
    pub fn unavailable_lines(&self) -> impl Iterator<Item = &PricedLine> {
        self.lines.iter().filter(|l| !l.available)
    }
}

/// Price a cart against live products and an optional promotion.
///
/// Lines whose product is missing or archived are skipped. When the
/// promotion does not apply, the view carries no discount and the reason is
/// returned alongside it.
#[must_use]
pub fn price_cart(
    cart: &Cart,
    store: &Store,
    products: &[Product],
    promotion: Option<&Promotion>,
    now: DateTime<Utc>,
) -> (CartView, Option<PromotionError>) {
    let lines: Vec<PricedLine> = cart
        .lines
        .iter()
        .filter_map(|line| {
            let product = products
                .iter()
                .find(|p| p.id == line.product_id && !p.archived)?;
            Some(PricedLine {
                product_id: product.id,
                name: product.name.clone(),
                slug: product.slug.to_string(),
                unit_price: product.price,
                quantity: line.quantity,
                line_total: product.price * Decimal::from(line.quantity),
                stock: product.stock,
                available: product.can_sell(line.quantity),
            })
        })
        .collect();

    let subtotal: Decimal = lines.iter().map(|l| l.line_total).sum();
    let item_count = lines.iter().map(|l| l.quantity).sum();
    let base_shipping = if lines.is_empty() {
        Decimal::ZERO
    } else {
        store.shipping_fee
    };

    let (discount, shipping, promotion_error) = match promotion {
        Some(promo) if !lines.is_empty() => match promo.check_applicable(subtotal, now) {
            Ok(()) => {
                let d = promo.discount(subtotal, base_shipping);
                (d.amount, d.shipping, None)
            }
            Err(e) => (Decimal::ZERO, base_shipping, Some(e)),
        },
        _ => (Decimal::ZERO, base_shipping, None),
    };

    let view = CartView {
        store_id: store.id,
        currency: store.currency,
        lines,
        item_count,
        promotion_code: cart.promotion_code.clone(),
        promotion_error: promotion_error.as_ref().map(ToString::to_string),
        subtotal,
        discount,
        shipping,
        total: subtotal - discount + shipping,
    };
    (view, promotion_error)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::{PromotionId, PromotionKind, Slug, UserId};

    use super::*;

    fn store() -> Store {
        Store {
            id: StoreId::new(1),
            owner_id: UserId::new(1),
            name: "Clay Works".to_string(),
            slug: Slug::parse("clay-works").unwrap(),
            description: None,
            currency: CurrencyCode::USD,
            shipping_fee: Decimal::new(500, 2),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn product(id: i32, price: Decimal, stock: i32, archived: bool) -> Product {
        Product {
            id: ProductId::new(id),
            store_id: StoreId::new(1),
            category_id: None,
            name: format!("Product {id}"),
            slug: Slug::parse(&format!("product-{id}")).unwrap(),
            description: String::new(),
            price,
            compare_at_price: None,
            stock,
            featured: false,
            archived,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn percent_off(value: i64) -> Promotion {
        Promotion {
            id: PromotionId::new(1),
            store_id: StoreId::new(1),
            code: "TENOFF".to_string(),
            kind: PromotionKind::Percentage,
            value: Decimal::new(value, 0),
            min_subtotal: Some(Decimal::new(20, 0)),
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            times_used: 0,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_merges_and_limits() {
        let mut cart = Cart::default();
        let id = ProductId::new(1);
        assert_eq!(cart.add(id, 2).unwrap(), 2);
        assert_eq!(cart.add(id, 3).unwrap(), 5);
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.add(id, 95), Err(CartError::QuantityLimit));
        assert_eq!(cart.add(id, 0), Err(CartError::InvalidQuantity));
        assert_eq!(cart.quantity_of(id), 5);
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = Cart::default();
        let id = ProductId::new(1);
        cart.add(id, 2).unwrap();
        cart.set_quantity(id, 7).unwrap();
        assert_eq!(cart.quantity_of(id), 7);
        cart.set_quantity(id, 0).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.set_quantity(id, 1), Err(CartError::NotInCart));
        assert_eq!(cart.set_quantity(id, 100), Err(CartError::QuantityLimit));
    }

    #[test]
    fn test_prune_drops_missing_and_archived() {
        let mut cart = Cart::default();
        cart.add(ProductId::new(1), 1).unwrap();
        cart.add(ProductId::new(2), 1).unwrap();
        cart.add(ProductId::new(3), 1).unwrap();
        let products = vec![
            product(1, Decimal::ONE, 5, false),
            product(2, Decimal::ONE, 5, true),
        ];
        assert!(cart.prune(&products));
        assert_eq!(cart.product_ids(), vec![ProductId::new(1)]);
        assert!(!cart.prune(&products));
    }

    #[test]
    fn test_price_cart_totals() {
        let mut cart = Cart::default();
        cart.add(ProductId::new(1), 2).unwrap();
        cart.add(ProductId::new(2), 1).unwrap();
        let products = vec![
            product(1, Decimal::new(1000, 2), 5, false),
            product(2, Decimal::new(450, 2), 0, false),
        ];

        let (view, err) = price_cart(&cart, &store(), &products, None, Utc::now());
        assert!(err.is_none());
        assert_eq!(view.subtotal, Decimal::new(2450, 2));
        assert_eq!(view.shipping, Decimal::new(500, 2));
        assert_eq!(view.total, Decimal::new(2950, 2));
        assert_eq!(view.item_count, 3);
        assert_eq!(view.unavailable_lines().count(), 1);
    }

    #[test]
    fn test_price_cart_with_promotion() {
        let mut cart = Cart::default();
        cart.add(ProductId::new(1), 3).unwrap();
        let products = vec![product(1, Decimal::new(1000, 2), 5, false)];
        let promo = percent_off(10);

        let (view, err) = price_cart(&cart, &store(), &products, Some(&promo), Utc::now());
        assert!(err.is_none());
        assert_eq!(view.discount, Decimal::new(300, 2));
        assert_eq!(view.total, Decimal::new(3200, 2));
    }

    #[test]
    fn test_price_cart_reports_unmet_minimum() {
        let mut cart = Cart::default();
        cart.add(ProductId::new(1), 1).unwrap();
        let products = vec![product(1, Decimal::new(1000, 2), 5, false)];
        let promo = percent_off(10);

        let (view, err) = price_cart(&cart, &store(), &products, Some(&promo), Utc::now());
        assert!(matches!(err, Some(PromotionError::MinimumNotMet(_))));
        assert_eq!(view.discount, Decimal::ZERO);
        assert!(view.promotion_error.is_some());
    }

    #[test]
    fn test_empty_cart_has_no_shipping() {
        let (view, _) = price_cart(&Cart::default(), &store(), &[], None, Utc::now());
        assert_eq!(view.total, Decimal::ZERO);
    }
}
