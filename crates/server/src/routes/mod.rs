//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database)
//!
//! # Checkout (rate limited)
//! GET  /checkout               - Redirect to checkout, returning to /membership
//! GET  /checkout/{nonce}       - Redirect to checkout, returning to /access/{nonce}
//!
//! # Access (rate limited)
//! GET  /access/{nonce}         - Resolve a checkout return (?signature=)
//! GET  /membership             - Check a nonce-less signature, start OAuth
//! GET  /access                 - OAuth callback (?code=&state=)
//!
//! # Discord
//! POST /discord/interactions   - Interaction webhook (Ed25519 signed)
//! ```

pub mod access;
pub mod checkout;
pub mod interactions;
pub mod membership;

use axum::{
    Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::state::AppState;

/// Create the browser-facing checkout and access routes.
pub fn access_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", get(checkout::start))
        .route("/checkout/{nonce}", get(checkout::start_with_nonce))
        .route("/access", get(access::oauth_callback))
        .route("/access/{nonce}", get(access::resolve))
        .route("/membership", get(membership::check))
}

/// Create the Discord interaction webhook routes.
pub fn interaction_routes() -> Router<AppState> {
    Router::new().route("/discord/interactions", post(interactions::handle))
}

/// Create all application routes, without rate limiting.
pub fn routes() -> Router<AppState> {
    access_routes().merge(interaction_routes())
}

/// `302 Found` redirect to `location`.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
