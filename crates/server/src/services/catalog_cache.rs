//! In-memory cache for public catalog reads.
//!
//! Storefront category lists and product pages are cached for 60 seconds.
//! Seller writes drop every entry of the affected store.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::warn;

use bazaar_core::StoreId;

use crate::models::catalog::{Category, ProductDetail};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Entry {
    Categories,
    Product(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    store_id: StoreId,
    entry: Entry,
}

#[derive(Clone)]
enum CacheValue {
    Categories(Arc<Vec<Category>>),
    Product(Arc<ProductDetail>),
}

/// Per-store catalog cache, cheap to clone.
#[derive(Clone)]
pub struct CatalogCache {
    cache: Cache<CacheKey, CacheValue>,
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogCache {
    /// Create an empty cache (1000 entries, 60 second TTL).
    #[must_use]
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(60))
            .support_invalidation_closures()
            .build();
        Self { cache }
    }

    /// Cached category list of a store.
    pub async fn categories(&self, store_id: StoreId) -> Option<Arc<Vec<Category>>> {
        let key = CacheKey {
            store_id,
            entry: Entry::Categories,
        };
        match self.cache.get(&key).await {
            Some(CacheValue::Categories(categories)) => Some(categories),
            _ => None,
        }
    }

    /// Cache a store's category list.
    pub async fn put_categories(&self, store_id: StoreId, categories: Arc<Vec<Category>>) {
        let key = CacheKey {
            store_id,
            entry: Entry::Categories,
        };
        self.cache
            .insert(key, CacheValue::Categories(categories))
            .await;
    }

    /// Cached product page by slug.
    pub async fn product(&self, store_id: StoreId, slug: &str) -> Option<Arc<ProductDetail>> {
        let key = CacheKey {
            store_id,
            entry: Entry::Product(slug.to_owned()),
        };
        match self.cache.get(&key).await {
            Some(CacheValue::Product(product)) => Some(product),
            _ => None,
        }
    }

    /// Cache a product page under its slug.
    pub async fn put_product(&self, store_id: StoreId, product: Arc<ProductDetail>) {
        let key = CacheKey {
            store_id,
            entry: Entry::Product(product.product.slug.as_str().to_owned()),
        };
        self.cache.insert(key, CacheValue::Product(product)).await;
    }

    /// Drop every cached entry of a store.
    pub fn invalidate_store(&self, store_id: StoreId) {
        if let Err(e) = self
            .cache
            .invalidate_entries_if(move |key, _| key.store_id == store_id)
        {
            warn!(error = %e, store_id = %store_id, "Failed to invalidate catalog cache");
            self.cache.invalidate_all();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::{CategoryId, Slug};

    use super::*;

    fn categories(store: i32) -> Arc<Vec<Category>> {
        Arc::new(vec![Category {
            id: CategoryId::new(1),
            store_id: StoreId::new(store),
            name: "Mugs".to_string(),
            slug: Slug::parse("mugs").unwrap(),
            position: 0,
        }])
    }

    #[tokio::test]
    async fn test_categories_round_trip() {
        let cache = CatalogCache::new();
        let store = StoreId::new(1);
        assert!(cache.categories(store).await.is_none());

        cache.put_categories(store, categories(1)).await;
        let cached = cache.categories(store).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert!(cache.product(store, "mugs").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_store_is_scoped() {
        let cache = CatalogCache::new();
        let first = StoreId::new(1);
        let second = StoreId::new(2);
        cache.put_categories(first, categories(1)).await;
        cache.put_categories(second, categories(2)).await;

        cache.invalidate_store(first);

        assert!(cache.categories(first).await.is_none());
        assert!(cache.categories(second).await.is_some());
    }
}
