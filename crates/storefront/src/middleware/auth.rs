//! Authentication extractors.
//!
//! Sign-in itself happens outside this service; it leaves a [`CurrentUser`]
//! in the session under [`session_keys::CURRENT_USER`]. These extractors read
//! it back so cart handlers can pick the account cart over the guest cart.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::{CurrentUser, session_keys};

/// Extractor that requires a signed-in user.
///
/// Rejects with [`AppError::Unauthorized`] when nobody is signed in.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.id)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let OptionalAuth(user) = OptionalAuth::from_request_parts(parts, state)
            .await
            .unwrap_or(OptionalAuth(None));
        user.map(Self)
            .ok_or_else(|| AppError::Unauthorized("Sign in to continue.".to_owned()))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is signed in.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CurrentUser>(session_keys::CURRENT_USER)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        if let Some(user) = &user {
            crate::error::set_sentry_user(&user.id);
        }

        Ok(Self(user))
    }
}
