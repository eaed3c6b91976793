//! Authentication extractors.
//!
//! The session holds a [`CurrentUser`] after login. Handlers ask for it
//! through one of the extractors below; rejections are JSON errors.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use sqlx::PgPool;
use tower_sessions::Session;

use crate::db::UserRepository;
use crate::error::AppError;
use crate::models::user::User;
use crate::models::{CurrentUser, session_keys};
use crate::state::AppState;

/// Extractor that requires a logged-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that requires a platform administrator.
///
/// The role is read from the database, not the login snapshot, and the
/// session is refreshed when they differ. Rejects with 401 when nobody is
/// logged in or the account is gone, and 403 for other roles.
pub struct RequireAdmin(pub CurrentUser);

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject anonymous requests.
pub struct OptionalAuth(pub Option<CurrentUser>);

async fn current_user(parts: &Parts) -> Option<CurrentUser> {
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user(parts)
            .await
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("Login required".to_string()))
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let snapshot = current_user(parts)
            .await
            .ok_or_else(|| AppError::Unauthorized("Login required".to_string()))?;

        let state = AppState::from_ref(state);
        let session = parts.extensions.get::<Session>().cloned();
        let Some(user) = stored_user(state.pool(), &snapshot).await? else {
            if let Some(session) = &session {
                clear_current_user(session).await?;
            }
            return Err(AppError::Unauthorized("Login required".to_string()));
        };
        if user != snapshot
            && let Some(session) = &session
        {
            set_current_user(session, &user).await?;
        }
        if !user.is_admin() {
            tracing::warn!(user_id = %user.id, role = %user.role, "Admin access denied");
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(Self(user))
    }
}

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(current_user(parts).await))
    }
}

/// Load the account behind a session user as it is stored now.
///
/// Returns `None` if the account no longer exists.
///
/// # Errors
///
/// Returns an error if the lookup fails.
pub async fn stored_user(
    pool: &PgPool,
    user: &CurrentUser,
) -> Result<Option<CurrentUser>, AppError> {
    let stored = UserRepository::new(pool).get_by_id(user.id).await?;
    Ok(refreshed(user, stored.as_ref()))
}

fn refreshed(user: &CurrentUser, stored: Option<&User>) -> Option<CurrentUser> {
    stored.filter(|s| s.id == user.id).map(CurrentUser::from)
}

/// Helper to set the current user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use bazaar_core::{Email, UserId, UserRole};

    use super::*;

    fn session_user(role: UserRole) -> CurrentUser {
        CurrentUser {
            id: UserId::new(7),
            email: Email::parse("ops@example.com").unwrap(),
            name: "Ops".to_string(),
            role,
        }
    }

    fn stored(id: i32, role: UserRole) -> User {
        User {
            id: UserId::new(id),
            email: Email::parse("ops@example.com").unwrap(),
            name: "Ops".to_string(),
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_refreshed_takes_stored_role() {
        let snapshot = session_user(UserRole::Admin);
        let user = refreshed(&snapshot, Some(&stored(7, UserRole::Customer))).unwrap();
        assert_eq!(user.role, UserRole::Customer);
        assert!(!user.is_admin());
        assert_ne!(user, snapshot);
    }

    #[test]
    fn test_refreshed_keeps_unchanged_user() {
        let snapshot = session_user(UserRole::Admin);
        let user = refreshed(&snapshot, Some(&stored(7, UserRole::Admin))).unwrap();
        assert_eq!(user, snapshot);
    }

    #[test]
    fn test_refreshed_rejects_missing_or_other_account() {
        let snapshot = session_user(UserRole::Admin);
        assert!(refreshed(&snapshot, None).is_none());
        assert!(refreshed(&snapshot, Some(&stored(8, UserRole::Admin))).is_none());
    }
}
