//! Seed the database with a demo seller, store and catalog.
//!
//! Every insert uses `ON CONFLICT DO NOTHING`, so the command can be run
//! repeatedly. Set `BAZAAR_SEED_PASSWORD` to give the demo seller a
//! password they can log in with.

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use tracing::info;

use bazaar_server::db;
use bazaar_server::services::auth::{hash_password, validate_password};

const SELLER_EMAIL: &str = "seller@bazaar.test";
const SELLER_NAME: &str = "Demo Seller";
const STORE_SLUG: &str = "demo-store";
const STORE_NAME: &str = "Demo Store";

/// `(slug, name)` of each demo category, in display order.
const CATEGORIES: [(&str, &str); 3] = [
    ("apparel", "Apparel"),
    ("home", "Home"),
    ("stationery", "Stationery"),
];

struct DemoProduct {
    category: &'static str,
    slug: &'static str,
    name: &'static str,
    description: &'static str,
    /// Price in cents.
    price: i64,
    stock: i32,
    featured: bool,
}

const PRODUCTS: [DemoProduct; 5] = [
    DemoProduct {
        category: "apparel",
        slug: "canvas-tote",
        name: "Canvas Tote",
        description: "Heavy cotton tote with an inside pocket.",
        price: 2400,
        stock: 40,
        featured: true,
    },
    DemoProduct {
        category: "apparel",
        slug: "wool-beanie",
        name: "Wool Beanie",
        description: "Ribbed merino beanie.",
        price: 3200,
        stock: 25,
        featured: false,
    },
    DemoProduct {
        category: "home",
        slug: "stoneware-mug",
        name: "Stoneware Mug",
        description: "Hand-glazed 350 ml mug.",
        price: 1800,
        stock: 60,
        featured: true,
    },
    DemoProduct {
        category: "home",
        slug: "linen-napkins",
        name: "Linen Napkins (set of 4)",
        description: "Stonewashed linen napkins.",
        price: 2800,
        stock: 0,
        featured: false,
    },
    DemoProduct {
        category: "stationery",
        slug: "dot-grid-notebook",
        name: "Dot Grid Notebook",
        description: "A5 notebook, 160 pages.",
        price: 1500,
        stock: 100,
        featured: false,
    },
];

/// Insert the demo data.
///
/// # Errors
///
/// Returns an error if environment variables are missing or a database
/// operation fails.
pub async fn demo() -> Result<(), Box<dyn std::error::Error>> {
    let database_url = super::database_url()?;
    let password = std::env::var("BAZAAR_SEED_PASSWORD")
        .ok()
        .map(SecretString::from);

    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let seller_id = seed_seller(&pool, password.as_ref()).await?;
    let store_id = seed_store(&pool, seller_id).await?;
    let categories = seed_categories(&pool, store_id).await?;
    let products = seed_products(&pool, store_id).await?;

    info!("Seeding complete!");
    info!("  Seller: {SELLER_EMAIL}");
    info!("  Store: /api/shop/{STORE_SLUG}");
    info!("  Categories inserted: {categories}");
    info!("  Products inserted: {products}");

    Ok(())
}

async fn seed_seller(
    pool: &PgPool,
    password: Option<&SecretString>,
) -> Result<i32, Box<dyn std::error::Error>> {
    sqlx::query(
        r"
        INSERT INTO bazaar.user (email, name, role)
        VALUES ($1, $2, 'seller')
        ON CONFLICT (email) DO NOTHING
        ",
    )
    .bind(SELLER_EMAIL)
    .bind(SELLER_NAME)
    .execute(pool)
    .await?;

    let seller_id =
        sqlx::query_scalar::<_, i32>("SELECT id FROM bazaar.user WHERE email = $1")
            .bind(SELLER_EMAIL)
            .fetch_one(pool)
            .await?;

    if let Some(password) = password {
        validate_password(password.expose_secret())?;
        let hash = hash_password(password.expose_secret())?;
        sqlx::query(
            r"
            INSERT INTO bazaar.user_password (user_id, password_hash)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            ",
        )
        .bind(seller_id)
        .bind(hash)
        .execute(pool)
        .await?;
    } else {
        tracing::warn!("BAZAAR_SEED_PASSWORD not set, demo seller cannot log in");
    }

    Ok(seller_id)
}

async fn seed_store(pool: &PgPool, owner_id: i32) -> Result<i32, sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO bazaar.store (owner_id, name, slug, description, currency, shipping_fee)
        VALUES ($1, $2, $3, 'Everyday goods for the demo storefront.', 'USD', $4)
        ON CONFLICT (slug) DO NOTHING
        ",
    )
    .bind(owner_id)
    .bind(STORE_NAME)
    .bind(STORE_SLUG)
    .bind(Decimal::new(500, 2))
    .execute(pool)
    .await?;

    sqlx::query_scalar::<_, i32>("SELECT id FROM bazaar.store WHERE slug = $1")
        .bind(STORE_SLUG)
        .fetch_one(pool)
        .await
}

async fn seed_categories(pool: &PgPool, store_id: i32) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for (position, (slug, name)) in (0_i32..).zip(CATEGORIES) {
        inserted += sqlx::query(
            r"
            INSERT INTO bazaar.category (store_id, name, slug, position)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (store_id, slug) DO NOTHING
            ",
        )
        .bind(store_id)
        .bind(name)
        .bind(slug)
        .bind(position)
        .execute(pool)
        .await?
        .rows_affected();
    }
    Ok(inserted)
}

async fn seed_products(pool: &PgPool, store_id: i32) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for product in &PRODUCTS {
        inserted += sqlx::query(
            r"
            INSERT INTO bazaar.product
                (store_id, category_id, name, slug, description, price, stock, featured)
            SELECT $1, c.id, $3, $4, $5, $6, $7, $8
            FROM bazaar.category c
            WHERE c.store_id = $1 AND c.slug = $2
            ON CONFLICT (store_id, slug) DO NOTHING
            ",
        )
        .bind(store_id)
        .bind(product.category)
        .bind(product.name)
        .bind(product.slug)
        .bind(product.description)
        .bind(Decimal::new(product.price, 2))
        .bind(product.stock)
        .bind(product.featured)
        .execute(pool)
        .await?
        .rows_affected();
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_products_reference_known_categories() {
        let categories: HashSet<&str> = CATEGORIES.iter().map(|(slug, _)| *slug).collect();
        assert!(PRODUCTS.iter().all(|p| categories.contains(p.category)));
    }

    #[test]
    fn test_demo_slugs_are_valid() {
        for slug in std::iter::once(STORE_SLUG)
            .chain(CATEGORIES.iter().map(|(slug, _)| *slug))
            .chain(PRODUCTS.iter().map(|p| p.slug))
        {
            assert!(bazaar_core::Slug::parse(slug).is_ok(), "{slug}");
        }
    }
}
