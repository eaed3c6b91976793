//! Catalog domain types: categories, products and product images.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{CategoryId, ProductId, ProductImageId, Slug, StoreId};

/// A store-scoped product category.
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub store_id: StoreId,
    pub name: String,
    /// Unique within the store.
    pub slug: Slug,
    /// Display order, ascending.
    pub position: i32,
}

/// A product listed in a store.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub category_id: Option<CategoryId>,
    pub name: String,
    /// Unique within the store.
    pub slug: Slug,
    pub description: String,
    pub price: Decimal,
    /// Original price shown struck through, if the product is on sale.
    pub compare_at_price: Option<Decimal>,
    /// Units available for sale. Never negative.
    pub stock: i32,
    pub featured: bool,
    /// Archived products are hidden from the storefront and cannot be bought.
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether `quantity` units can be sold right now.
    #[must_use]
    pub const fn can_sell(&self, quantity: i32) -> bool {
        !self.archived && quantity > 0 && self.stock >= quantity
    }
}

/// An image attached to a product.
#[derive(Debug, Clone, Serialize)]
pub struct ProductImage {
    pub id: ProductImageId,
    pub product_id: ProductId,
    pub url: String,
    pub position: i32,
}

/// A product with its images, in display order.
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub images: Vec<ProductImage>,
}

/// Fields for a new product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub store_id: StoreId,
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub slug: Slug,
    pub description: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub stock: i32,
    pub featured: bool,
}

/// Partial update of a product. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub category_id: Option<Option<CategoryId>>,
    pub name: Option<String>,
    pub slug: Option<Slug>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Option<Decimal>>,
    pub stock: Option<i32>,
    pub featured: Option<bool>,
    pub archived: Option<bool>,
}

/// Sort order for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    /// SQL `ORDER BY` clause for the sort, with `id` as a stable tiebreaker.
    #[must_use]
    pub const fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "p.created_at DESC, p.id DESC",
            Self::PriceAsc => "p.price ASC, p.id ASC",
            Self::PriceDesc => "p.price DESC, p.id DESC",
            Self::Name => "lower(p.name) ASC, p.id ASC",
        }
    }
}

/// Product listing filters from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    /// Category slug.
    pub category: Option<String>,
    /// Case-insensitive substring of the name or description.
    pub q: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub featured: Option<bool>,
    pub in_stock: Option<bool>,
    #[serde(default)]
    pub sort: ProductSort,
    /// Only honoured on the seller dashboard.
    pub archived: Option<bool>,
}

impl ProductFilter {
    /// Trimmed search term, if any.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(stock: i32, archived: bool) -> Product {
        Product {
            id: ProductId::new(1),
            store_id: StoreId::new(1),
            category_id: None,
            name: "Mug".to_string(),
            slug: Slug::parse("mug").unwrap(),
            description: String::new(),
            price: Decimal::new(1200, 2),
            compare_at_price: None,
            stock,
            featured: false,
            archived,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_can_sell() {
        assert!(product(3, false).can_sell(3));
        assert!(!product(3, false).can_sell(4));
        assert!(!product(3, false).can_sell(0));
        assert!(!product(3, true).can_sell(1));
    }

    #[test]
    fn test_filter_search_term() {
        let filter = ProductFilter {
            q: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(filter.search_term(), None);

        let filter = ProductFilter {
            q: Some(" mug ".to_string()),
            ..Default::default()
        };
        assert_eq!(filter.search_term(), Some("mug"));
    }

    #[test]
    fn test_sort_from_query_value() {
        let sort: ProductSort = serde_json::from_str("\"price_desc\"").unwrap();
        assert_eq!(sort, ProductSort::PriceDesc);
        assert_eq!(ProductSort::default().order_by(), "p.created_at DESC, p.id DESC");
    }
}
