//! Access resolution routes.
//!
//! - `/access/{nonce}` is where checkout returns with a wallet signature
//! - `/access` is the Discord OAuth callback for the nonce-less path

use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use lockgate_core::NonceId;
use serde::Deserialize;
use tracing::{info, instrument};

use super::found;
use crate::error::{AppError, Result, set_sentry_user};
use crate::services::{AccessError, AccessOutcome};
use crate::state::AppState;

/// Query of a checkout return.
#[derive(Debug, Deserialize)]
pub struct SignatureQuery {
    pub signature: Option<String>,
}

/// Query of the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Resolve a checkout return.
#[instrument(skip(state, query))]
pub async fn resolve(
    State(state): State<AppState>,
    Path(nonce): Path<String>,
    Query(query): Query<SignatureQuery>,
) -> Result<Response> {
    let nonce = NonceId::parse(&nonce).map_err(|_| AccessError::NonceNotFound)?;
    let signature = query
        .signature
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing signature".to_string()))?;

    match state.resolver().resolve_access(&nonce, &signature).await? {
        AccessOutcome::Granted { user, .. } => {
            set_sentry_user(&user);
            Ok(found(&state.config().guild_url()))
        }
        AccessOutcome::NotQualified { .. } => {
            let mut url = state.config().public_url("/membership");
            url.query_pairs_mut().append_pair("signature", &signature);
            Ok(found(url.as_str()))
        }
        AccessOutcome::OracleUnavailable { .. } => Err(AppError::OracleUnavailable),
    }
}

/// Finish the OAuth path: join the guild with the wallet carried by `state`.
#[instrument(skip(state, query))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Response> {
    let server_name = &state.config().server_name;
    let fail = |reason: String| AppError::OAuthFailed {
        server_name: server_name.clone(),
        reason,
    };

    let (Some(code), Some(nonce)) = (query.code, query.state) else {
        return Err(fail("missing code or state".to_string()));
    };
    let nonce = NonceId::parse(&nonce).map_err(|e| fail(e.to_string()))?;

    let identity = state.identity();
    let token = identity
        .exchange_code(&code)
        .await
        .map_err(|e| fail(e.to_string()))?;
    let user = identity
        .current_user(&token)
        .await
        .map_err(|e| fail(e.to_string()))?;
    set_sentry_user(&user.id);

    let wallet = state
        .resolver()
        .complete_oauth(&nonce, &user, &token)
        .await
        .map_err(|e| fail(e.to_string()))?;

    info!(user = %user.id, wallet = %wallet, "OAuth access completed");
    Ok(found(&state.config().guild_url()))
}
