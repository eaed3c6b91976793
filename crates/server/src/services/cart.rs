//! Session-held carts.
//!
//! Each store gets its own cart under [`session_keys::cart`]. The service
//! loads and saves it around every mutation and prices it against live
//! product rows on every read.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tower_sessions::Session;
use tracing::{debug, instrument};

use bazaar_core::ProductId;

use crate::db::{ProductRepository, PromotionRepository, RepositoryError};
use crate::models::cart::{Cart, CartError, CartView, price_cart};
use crate::models::promotion::{PromotionError, normalize_code};
use crate::models::session_keys;
use crate::models::store::Store;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartServiceError {
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Product missing, archived or in another store.
    #[error("product not found")]
    ProductNotFound,

    /// Requested quantity exceeds stock.
    #[error("only {available} left in stock")]
    InsufficientStock { available: i32 },

    #[error(transparent)]
    Promotion(#[from] PromotionError),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Cart operations for one request's session.
pub struct CartService<'a> {
    pool: &'a PgPool,
    session: &'a Session,
}

impl<'a> CartService<'a> {
    /// Create a cart service over the request's session.
    #[must_use]
    pub const fn new(pool: &'a PgPool, session: &'a Session) -> Self {
        Self { pool, session }
    }

    /// The stored cart for a store (empty if none).
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Session` if the session cannot be read.
    pub async fn load(&self, store: &Store) -> Result<Cart, CartServiceError> {
        Ok(self
            .session
            .get::<Cart>(&session_keys::cart(store.id))
            .await?
            .unwrap_or_default())
    }

    /// Persist the cart for a store.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Session` if the session cannot be written.
    pub async fn save(&self, store: &Store, cart: &Cart) -> Result<(), CartServiceError> {
        self.session.insert(&session_keys::cart(store.id), cart).await?;
        Ok(())
    }

    /// Remove the store's cart from the session.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Session` if the session cannot be written.
    pub async fn clear(&self, store: &Store) -> Result<(), CartServiceError> {
        self.session
            .remove::<Cart>(&session_keys::cart(store.id))
            .await?;
        Ok(())
    }

    /// Price the cart against live products.
    ///
    /// Lines for vanished or archived products are dropped from the stored
    /// cart as a side effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or database cannot be read.
    #[instrument(skip(self, store), fields(store_id = %store.id))]
    pub async fn view(&self, store: &Store, now: DateTime<Utc>) -> Result<CartView, CartServiceError> {
        let mut cart = self.load(store).await?;
        self.price(store, &mut cart, now).await
    }

    /// Add units of a product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::ProductNotFound` for products that cannot
    /// be bought from this store and `CartServiceError::InsufficientStock`
    /// when the merged quantity exceeds stock.
    #[instrument(skip(self, store), fields(store_id = %store.id))]
    pub async fn add_item(
        &self,
        store: &Store,
        product_id: ProductId,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<CartView, CartServiceError> {
        let product = ProductRepository::new(self.pool)
            .get(store.id, product_id)
            .await?
            .filter(|p| !p.archived)
            .ok_or(CartServiceError::ProductNotFound)?;

        let mut cart = self.load(store).await?;
        let merged = cart.add(product_id, quantity)?;
        if merged > product.stock {
            return Err(CartServiceError::InsufficientStock {
                available: product.stock,
            });
        }
        self.save(store, &cart).await?;

        debug!(quantity = merged, "Cart line updated");
        self.price(store, &mut cart, now).await
    }

    /// Set a line's quantity; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Cart` if the product is not in the cart and
    /// `CartServiceError::InsufficientStock` when stock is short.
    #[instrument(skip(self, store), fields(store_id = %store.id))]
    pub async fn set_quantity(
        &self,
        store: &Store,
        product_id: ProductId,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<CartView, CartServiceError> {
        let mut cart = self.load(store).await?;

        if quantity > 0 {
            let product = ProductRepository::new(self.pool)
                .get(store.id, product_id)
                .await?
                .filter(|p| !p.archived)
                .ok_or(CartServiceError::ProductNotFound)?;
            if quantity > product.stock {
                return Err(CartServiceError::InsufficientStock {
                    available: product.stock,
                });
            }
        }

        cart.set_quantity(product_id, quantity)?;
        self.save(store, &cart).await?;
        self.price(store, &mut cart, now).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Cart` if the product is not in the cart.
    pub async fn remove_item(
        &self,
        store: &Store,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<CartView, CartServiceError> {
        let mut cart = self.load(store).await?;
        cart.remove(product_id)?;
        self.save(store, &cart).await?;
        self.price(store, &mut cart, now).await
    }

    /// Attach a promotion code to the cart.
    ///
    /// A code whose minimum subtotal is not met yet is still attached; the
    /// cart view reports why no discount applies.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Promotion` for unknown, inactive, expired
    /// or exhausted codes.
    #[instrument(skip(self, store), fields(store_id = %store.id))]
    pub async fn apply_promotion(
        &self,
        store: &Store,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<CartView, CartServiceError> {
        let code = normalize_code(code)?;
        let promotion = PromotionRepository::new(self.pool)
            .get_by_code(store.id, &code)
            .await?
            .ok_or(PromotionError::UnknownCode)?;

        let mut cart = self.load(store).await?;
        let view = self.price(store, &mut cart, now).await?;
        match promotion.check_applicable(view.subtotal, now) {
            Ok(()) | Err(PromotionError::MinimumNotMet(_)) => {}
            Err(e) => return Err(e.into()),
        }

        cart.promotion_code = Some(promotion.code);
        self.save(store, &cart).await?;
        self.price(store, &mut cart, now).await
    }

    /// Detach the promotion code.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or database cannot be accessed.
    pub async fn remove_promotion(
        &self,
        store: &Store,
        now: DateTime<Utc>,
    ) -> Result<CartView, CartServiceError> {
        let mut cart = self.load(store).await?;
        cart.promotion_code = None;
        self.save(store, &cart).await?;
        self.price(store, &mut cart, now).await
    }

    async fn price(
        &self,
        store: &Store,
        cart: &mut Cart,
        now: DateTime<Utc>,
    ) -> Result<CartView, CartServiceError> {
        let products = ProductRepository::new(self.pool)
            .get_many(store.id, &cart.product_ids())
            .await?;
        if cart.prune(&products) {
            debug!("Dropped unavailable products from cart");
            self.save(store, cart).await?;
        }

        let promotion = match cart.promotion_code.as_deref() {
            Some(code) => {
                PromotionRepository::new(self.pool)
                    .get_by_code(store.id, code)
                    .await?
            }
            None => None,
        };

        let (mut view, _) = price_cart(cart, store, &products, promotion.as_ref(), now);
        if cart.promotion_code.is_some() && promotion.is_none() {
            view.promotion_error = Some(PromotionError::UnknownCode.to_string());
        }
        Ok(view)
    }
}
