//! JSON body extractor with an explicit validation step.
//!
//! Malformed JSON and bodies that fail [`Validate`] are rejected with
//! `VALIDATION_ERROR` before any handler logic runs.

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::http::error::AppError;

/// Shape checks for a request body.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// A deserialized body that passed [`Validate::validate`].
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        value.validate().map_err(AppError::Validation)?;
        Ok(ValidatedJson(value))
    }
}
