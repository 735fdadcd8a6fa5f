//! Bearer-token authentication for the public API (§6.1: "All requests
//! carry `Authorization: Bearer <key>`").

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use tessera_db::users::User;
use tessera_protocol::error::TesseraError;

use crate::http::ApiError;
use crate::state::AppState;

/// Extractor resolving the bearer token in `Authorization` to a user row.
/// Any handler taking `AuthedUser` as an argument gets `401 UNAUTHENTICATED`
/// for free on a missing or unrecognized key.
pub struct AuthedUser(pub User);

impl<S> FromRequestParts<S> for AuthedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(TesseraError::Unauthenticated)?;
        let api_key = header
            .strip_prefix("Bearer ")
            .ok_or(TesseraError::Unauthenticated)?;

        let user = tessera_db::users::find_by_api_key(&app_state.pool, api_key)
            .await
            .map_err(|e| TesseraError::Internal(e.to_string()))?
            .ok_or(TesseraError::Unauthenticated)?;

        Ok(AuthedUser(user))
    }
}
