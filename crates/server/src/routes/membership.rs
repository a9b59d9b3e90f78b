//! Membership check for a signature that arrived without a nonce.

use axum::{
    extract::{Query, State},
    response::Response,
};
use tracing::instrument;

use super::access::SignatureQuery;
use super::found;
use crate::error::{AppError, Result};
use crate::services::OAuthStart;
use crate::state::AppState;

/// Send a qualifying wallet through Discord OAuth, anyone else to checkout.
#[instrument(skip(state, query))]
pub async fn check(
    State(state): State<AppState>,
    Query(query): Query<SignatureQuery>,
) -> Result<Response> {
    let signature = query
        .signature
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing signature".to_string()))?;

    match state.resolver().begin_oauth(&signature).await? {
        OAuthStart::Qualified { state: nonce, .. } => {
            Ok(found(state.identity().authorize_url(&nonce).as_str()))
        }
        OAuthStart::NotQualified => Ok(found(state.config().public_url("/checkout").as_str())),
        OAuthStart::OracleUnavailable => Err(AppError::OracleUnavailable),
    }
}
