//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! BAZAAR_ADMIN_PASSWORD=... bazaar admin create -e admin@example.com -n "Admin Name"
//! ```
//!
//! Running the command for an existing account promotes it to admin and
//! replaces its password.
//!
//! # Environment Variables
//!
//! - `BAZAAR_DATABASE_URL` - `PostgreSQL` connection string
//! - `BAZAAR_ADMIN_PASSWORD` - Password for the account

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use bazaar_core::{Email, UserId};
use bazaar_server::db::{self, RepositoryError, UserRepository};
use bazaar_server::services::AuthError;
use bazaar_server::services::auth::{hash_password, validate_password};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Repository error while writing the user.
    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Empty display name.
    #[error("Name cannot be empty")]
    EmptyName,

    /// Password rejected or could not be hashed.
    #[error(transparent)]
    Password(#[from] AuthError),
}

/// Create a new admin user, or promote an existing one.
///
/// # Arguments
///
/// * `email` - Admin's email address
/// * `name` - Admin's display name
///
/// # Returns
///
/// The ID of the admin user.
///
/// # Errors
///
/// Returns `AdminError` if input is invalid or the database write fails.
pub async fn create_user(email: &str, name: &str) -> Result<UserId, AdminError> {
    let database_url =
        super::database_url().map_err(|_| AdminError::MissingEnvVar("BAZAAR_DATABASE_URL"))?;

    let email = Email::parse(email).map_err(|e| AdminError::InvalidEmail(e.to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(AdminError::EmptyName);
    }

    let password = std::env::var("BAZAAR_ADMIN_PASSWORD")
        .map(SecretString::from)
        .map_err(|_| AdminError::MissingEnvVar("BAZAAR_ADMIN_PASSWORD"))?;
    validate_password(password.expose_secret())?;
    let password_hash = hash_password(password.expose_secret())?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Creating admin user: {}", email);
    let user = UserRepository::new(&pool)
        .upsert_admin(&email, name, &password_hash)
        .await?;

    tracing::info!(
        "Admin user ready! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );

    Ok(user.id)
}
