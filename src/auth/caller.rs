use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;

use crate::{appresult::ChatError, AppError};

use super::{Authenticator, Identity};

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// The verified identity behind a request. Extraction fails with 401 before
/// the handler (or a websocket upgrade) ever runs.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Identity);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    Authenticator: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer(parts) else {
            return Err(ChatError::MissingCredential.into());
        };

        let identity = Authenticator::from_ref(state).verify(&token)?;
        Ok(Caller(identity))
    }
}

fn bearer(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned());

    // browsers can't set headers on a websocket upgrade
    header
        .or_else(|| Query::<TokenQuery>::try_from_uri(&parts.uri).ok()?.0.token)
        .filter(|token| !token.is_empty())
}
