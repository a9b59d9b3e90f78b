//! Integration tests for the HTTP routes.
//!
//! Requests go through the real axum router with in-memory collaborators.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use lockgate_core::{NonceId, UserId};
use lockgate_integration_tests::{GUILD, Harness, TestWallet};
use lockgate_server::db::NonceStore;
use tower::ServiceExt;
use url::Url;

const USER: UserId = UserId::new(42);

async fn get(h: &Harness, uri: &str) -> Response {
    h.router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
        .await
        .expect("router responds")
}

fn location(response: &Response) -> Url {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("redirect location")
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

fn query(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_checkout_redirects_with_paywall_config() {
    let h = Harness::new();

    let response = get(&h, "/checkout/abc123").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let url = location(&response);
    assert_eq!(url.host_str(), Some("app.unlock-protocol.com"));
    assert_eq!(
        query(&url, "redirectUri").as_deref(),
        Some("https://gate.example.org/access/abc123")
    );

    let paywall: serde_json::Value =
        serde_json::from_str(&query(&url, "paywallConfig").expect("paywallConfig"))
            .expect("json");
    assert_eq!(paywall["locks"].as_object().map(serde_json::Map::len), Some(2));
    assert_eq!(
        paywall["locks"]["0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359"]["name"],
        "Bankship Polygon"
    );
}

#[tokio::test]
async fn test_checkout_without_nonce_returns_to_membership() {
    let h = Harness::new();

    let response = get(&h, "/checkout").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        query(&location(&response), "redirectUri").as_deref(),
        Some("https://gate.example.org/membership")
    );
}

// =============================================================================
// /access/{nonce}
// =============================================================================

#[tokio::test]
async fn test_access_grants_and_redirects_to_guild() {
    let h = Harness::new();
    let wallet = TestWallet::from_seed(1);
    h.gateway.add_member(USER, false);
    h.reader.grant_key(h.lock(0), wallet.address());
    let nonce = h.nonces.create(Some(USER)).await.expect("nonce");

    let response = get(
        &h,
        &format!("/access/{nonce}?signature={}", wallet.sign_challenge()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response).as_str(),
        format!("https://discord.com/channels/{GUILD}")
    );
    assert!(h.gateway.has_role(USER));
}

#[tokio::test]
async fn test_access_not_qualified_redirects_to_membership() {
    let h = Harness::new();
    let wallet = TestWallet::from_seed(2);
    h.gateway.add_member(USER, false);
    let nonce = h.nonces.create(Some(USER)).await.expect("nonce");
    let signature = wallet.sign_challenge();

    let response = get(&h, &format!("/access/{nonce}?signature={signature}")).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let url = location(&response);
    assert_eq!(url.path(), "/membership");
    assert_eq!(query(&url, "signature"), Some(signature));

    // Replaying the processed nonce is a client error
    let replay = get(&h, &format!("/access/{nonce}?signature=0x00")).await;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_access_unknown_nonce_is_not_found() {
    let h = Harness::new();
    let signature = TestWallet::from_seed(3).sign_challenge();

    let response = get(&h, &format!("/access/nope?signature={signature}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&h, &format!("/access/bad!nonce?signature={signature}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_access_oracle_outage_is_service_unavailable() {
    let h = Harness::new();
    let wallet = TestWallet::from_seed(4);
    h.gateway.add_member(USER, false);
    h.reader.fail_lock(h.lock(0));
    h.reader.fail_lock(h.lock(1));
    let nonce = h.nonces.create(Some(USER)).await.expect("nonce");

    let response = get(
        &h,
        &format!("/access/{nonce}?signature={}", wallet.sign_challenge()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_access_gateway_failure_is_bad_gateway() {
    let h = Harness::new();
    let wallet = TestWallet::from_seed(5);
    h.gateway.add_member(USER, false);
    h.gateway.fail_member(USER);
    h.reader.grant_key(h.lock(0), wallet.address());
    let nonce = h.nonces.create(Some(USER)).await.expect("nonce");

    let response = get(
        &h,
        &format!("/access/{nonce}?signature={}", wallet.sign_challenge()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(!body_text(response).await.contains("member"));
}

// =============================================================================
// /membership and the OAuth callback
// =============================================================================

#[tokio::test]
async fn test_membership_requires_signature() {
    let h = Harness::new();

    let response = get(&h, "/membership").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_membership_non_member_goes_to_checkout() {
    let h = Harness::new();
    let signature = TestWallet::from_seed(6).sign_challenge();

    let response = get(&h, &format!("/membership?signature={signature}")).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response).as_str(),
        "https://gate.example.org/checkout"
    );
}

#[tokio::test]
async fn test_membership_then_oauth_callback_joins_guild() {
    let h = Harness::new();
    let wallet = TestWallet::from_seed(7);
    h.reader.grant_key(h.lock(0), wallet.address());
    h.identity.register_code("good-code", USER);

    let response = get(
        &h,
        &format!("/membership?signature={}", wallet.sign_challenge()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let authorize = location(&response);
    assert_eq!(authorize.host_str(), Some("discord.com"));
    let state = query(&authorize, "state").expect("state");

    let stored = h
        .nonces
        .get(&NonceId::parse(&state).expect("valid state"))
        .await
        .expect("store reachable")
        .expect("state stored");
    assert_eq!(stored.wallet_address, Some(wallet.address()));

    let response = get(&h, &format!("/access?code=good-code&state={state}")).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response).as_str(),
        format!("https://discord.com/channels/{GUILD}")
    );
    assert!(h.gateway.has_role(USER));
}

#[tokio::test]
async fn test_oauth_callback_failures_ask_to_contact_team() {
    let h = Harness::new();
    let wallet = TestWallet::from_seed(8);
    h.reader.grant_key(h.lock(0), wallet.address());
    let state = h
        .nonces
        .create_with_wallet(None, wallet.address())
        .await
        .expect("state");

    for uri in [
        format!("/access?code=unknown&state={state}"),
        "/access?code=unknown".to_string(),
        "/access".to_string(),
    ] {
        let response = get(&h, &uri).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        assert_eq!(
            body_text(response).await,
            "There was an error in accessing Bankship Discord. Please contact one of the team members."
        );
    }
    assert!(!h.gateway.is_member(USER));
}
