//! Request extractors that reject with the JSON error envelope.
//!
//! Axum's own `Json` and `Path` rejections answer in plain text. These
//! wrappers turn them into [`AppError::BadRequest`] so a malformed body or
//! line ID gets the same `{ success: false, error }` shape as every other
//! cart error.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON request body.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "rejected request body");
                Err(AppError::BadRequest(rejection.body_text()))
            }
        }
    }
}

/// Typed path parameters.
pub struct PathParam<T>(pub T);

impl<S, T> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "rejected path");
                Err(AppError::BadRequest(rejection.body_text()))
            }
        }
    }
}
