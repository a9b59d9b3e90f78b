//! Integration tests for the Discord interaction webhook.
//!
//! Requests are signed with the test Ed25519 key the harness configures as
//! the application public key.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use lockgate_core::UserId;
use lockgate_integration_tests::{
    GUILD, Harness, ROLE, TestWallet, sign_interaction,
};
use lockgate_server::db::UserWalletStore;
use lockgate_server::discord::messages::CLAIM_LABEL;
use lockgate_server::discord::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use serde_json::{Value, json};
use tower::ServiceExt;

const USER: UserId = UserId::new(80_351_110_224_678_912);

fn now() -> String {
    chrono::Utc::now().timestamp().to_string()
}

async fn post_signed(h: &Harness, payload: &Value) -> Response {
    let body = serde_json::to_vec(payload).expect("serializable");
    let timestamp = now();
    let signature = sign_interaction(&timestamp, &body);

    h.router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/discord/interactions")
                .header("content-type", "application/json")
                .header(SIGNATURE_HEADER, signature)
                .header(TIMESTAMP_HEADER, timestamp)
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("router responds")
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn command(name: &str, roles: &[String]) -> Value {
    json!({
        "id": "1",
        "application_id": "1001",
        "type": 2,
        "token": "interaction-token",
        "guild_id": GUILD.to_string(),
        "data": { "id": "9", "name": name, "type": 1 },
        "member": {
            "user": { "id": USER.to_string(), "username": "nelly" },
            "roles": roles,
        }
    })
}

#[tokio::test]
async fn test_ping_is_answered_with_pong() {
    let h = Harness::new();
    let payload = json!({
        "id": "1",
        "application_id": "1001",
        "type": 1,
        "token": "t",
    });

    let response = post_signed(&h, &payload).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "type": 1 }));
}

#[tokio::test]
async fn test_unsigned_or_tampered_requests_are_rejected() {
    let h = Harness::new();
    let body = serde_json::to_vec(&json!({ "type": 1 })).expect("serializable");
    let timestamp = now();
    let signature = sign_interaction(&timestamp, &body);

    let unsigned = h
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/discord/interactions")
                .body(Body::from(body.clone()))
                .expect("request"),
        )
        .await
        .expect("router responds");
    assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);

    let tampered = h
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/discord/interactions")
                .header(SIGNATURE_HEADER, signature)
                .header(TIMESTAMP_HEADER, timestamp)
                .body(Body::from(r#"{"type":2}"#))
                .expect("request"),
        )
        .await
        .expect("router responds");
    assert_eq!(tampered.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_garbage_is_bad_request() {
    let h = Harness::new();

    let response = post_signed(&h, &json!({ "hello": "world" })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ping_command_replies_pong() {
    let h = Harness::new();

    let response = post_signed(&h, &command("ping", &[])).await;

    let body = json_body(response).await;
    assert_eq!(body["type"], 4);
    assert_eq!(body["data"]["content"], "Pong!");
    assert_eq!(body["data"]["flags"], 64);
}

#[tokio::test]
async fn test_unlock_for_role_holder_replies_immediately() {
    let h = Harness::new();

    let response = post_signed(&h, &command("unlock", &[ROLE.to_string()])).await;

    let body = json_body(response).await;
    assert_eq!(body["type"], 4);
    assert!(
        body["data"]["content"]
            .as_str()
            .expect("content")
            .contains("already a member")
    );
    assert!(h.gateway.role_mutations().is_empty());
}

#[tokio::test]
async fn test_unlock_without_wallet_edits_in_checkout_link() {
    let h = Harness::new();
    h.gateway.add_member(USER, false);

    let response = post_signed(&h, &command("unlock", &[])).await;

    let body = json_body(response).await;
    assert_eq!(body, json!({ "type": 5, "data": { "flags": 64 } }));

    let (token, message) = h.responder.first_edit().await;
    assert_eq!(token, "interaction-token");
    let row = message.components.first().expect("action row");
    let button = row.components.first().expect("button");
    assert_eq!(button.label, CLAIM_LABEL);
    let url = button.url.as_deref().expect("link button");
    assert!(url.starts_with("https://gate.example.org/checkout/"));
}

#[tokio::test]
async fn test_unlock_button_with_qualifying_wallet_grants() {
    let h = Harness::new();
    let wallet = TestWallet::from_seed(1);
    h.gateway.add_member(USER, false);
    h.users.add_wallet(USER, wallet.address()).await.expect("stored");
    h.reader.grant_key(h.lock(0), wallet.address());

    let payload = json!({
        "id": "1",
        "application_id": "1001",
        "type": 3,
        "token": "button-token",
        "guild_id": GUILD.to_string(),
        "data": { "custom_id": "unlock", "component_type": 2 },
        "member": {
            "user": { "id": USER.to_string(), "username": "nelly" },
            "roles": [],
        }
    });
    let response = post_signed(&h, &payload).await;
    assert_eq!(json_body(response).await["type"], 5);

    let (token, message) = h.responder.first_edit().await;
    assert_eq!(token, "button-token");
    assert!(
        message
            .content
            .expect("content")
            .contains(&wallet.address().to_string())
    );
    assert!(h.gateway.has_role(USER));
}
