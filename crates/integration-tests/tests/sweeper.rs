//! Integration tests for the reconciliation sweeper.

use chrono::{Duration, Utc};
use lockgate_core::{Nonce, UserId};
use lockgate_integration_tests::{GatewayCall, Harness, ROLE, TestWallet};
use lockgate_server::db::{NonceStore, UserWalletStore};

const ALICE: UserId = UserId::new(1);
const BOB: UserId = UserId::new(2);
const CAROL: UserId = UserId::new(3);

#[tokio::test]
async fn test_sweep_revokes_when_keys_expire() {
    let h = Harness::new();
    let wallet = TestWallet::from_seed(1);
    h.gateway.add_member(ALICE, true);
    h.users.add_wallet(ALICE, wallet.address()).await.expect("stored");

    let report = h.sweeper().sweep().await;

    assert_eq!(report.checked, 1);
    assert_eq!(report.revoked, 1);
    assert!(!h.gateway.has_role(ALICE));
    assert_eq!(h.gateway.role_mutations(), vec![GatewayCall::RemoveRole(ALICE, ROLE)]);
}

#[tokio::test]
async fn test_sweep_grants_when_a_wallet_passes() {
    let h = Harness::new();
    let stale = TestWallet::from_seed(2);
    let fresh = TestWallet::from_seed(3);
    h.gateway.add_member(ALICE, false);
    h.users.add_wallet(ALICE, stale.address()).await.expect("stored");
    h.users.add_wallet(ALICE, fresh.address()).await.expect("stored");
    h.reader.grant_key(h.lock(1), fresh.address());

    let report = h.sweeper().sweep().await;

    assert_eq!(report.granted, 1);
    assert!(h.gateway.has_role(ALICE));
}

#[tokio::test]
async fn test_sweep_leaves_consistent_members_alone() {
    let h = Harness::new();
    let holder = TestWallet::from_seed(4);
    let other = TestWallet::from_seed(5);
    h.gateway.add_member(ALICE, true);
    h.gateway.add_member(BOB, false);
    h.users.add_wallet(ALICE, holder.address()).await.expect("stored");
    h.users.add_wallet(BOB, other.address()).await.expect("stored");
    h.reader.grant_key(h.lock(0), holder.address());

    let report = h.sweeper().sweep().await;

    assert_eq!(report.unchanged, 2);
    assert!(h.gateway.role_mutations().is_empty());
}

#[tokio::test]
async fn test_one_failing_member_does_not_stop_the_sweep() {
    let h = Harness::new();
    for (user, seed) in [(ALICE, 6), (BOB, 7), (CAROL, 8)] {
        h.gateway.add_member(user, true);
        h.users
            .add_wallet(user, TestWallet::from_seed(seed).address())
            .await
            .expect("stored");
    }
    h.gateway.fail_member(BOB);

    let report = h.sweeper().sweep().await;

    assert_eq!(report.checked, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.revoked, 2);
    assert!(!h.gateway.has_role(ALICE));
    assert!(h.gateway.has_role(BOB));
    assert!(!h.gateway.has_role(CAROL));
}

#[tokio::test]
async fn test_all_chain_errors_skip_instead_of_revoking() {
    let h = Harness::new();
    h.gateway.add_member(ALICE, true);
    h.users
        .add_wallet(ALICE, TestWallet::from_seed(9).address())
        .await
        .expect("stored");
    h.reader.fail_lock(h.lock(0));
    h.reader.fail_lock(h.lock(1));

    let report = h.sweeper().sweep().await;

    assert_eq!(report.skipped, 1);
    assert_eq!(report.revoked, 0);
    assert!(h.gateway.has_role(ALICE));
}

#[tokio::test]
async fn test_partial_chain_errors_still_decide() {
    let h = Harness::new();
    let wallet = TestWallet::from_seed(10);
    h.gateway.add_member(ALICE, false);
    h.users.add_wallet(ALICE, wallet.address()).await.expect("stored");
    h.reader.fail_lock(h.lock(0));
    h.reader.grant_key(h.lock(1), wallet.address());

    let report = h.sweeper().sweep().await;

    assert_eq!(report.granted, 1);
    assert!(h.gateway.has_role(ALICE));
}

#[tokio::test]
async fn test_users_outside_the_guild_are_skipped() {
    let h = Harness::new();
    h.users
        .add_wallet(ALICE, TestWallet::from_seed(11).address())
        .await
        .expect("stored");

    let report = h.sweeper().sweep().await;

    assert_eq!(report.skipped, 1);
    assert!(h.gateway.role_mutations().is_empty());
}

#[tokio::test]
async fn test_sweep_purges_expired_nonces() {
    let h = Harness::new();
    let mut expired = Nonce::issue(Some(ALICE), None);
    expired.created_at = Utc::now() - Duration::days(2);
    h.nonces.insert(&expired).await.expect("stored");
    let fresh = h.nonces.create(Some(BOB)).await.expect("stored");

    let report = h.sweeper().sweep().await;

    assert_eq!(report.purged, 1);
    assert!(h.nonces.get(&expired.id).await.expect("store reachable").is_none());
    assert!(h.nonces.get(&fresh).await.expect("store reachable").is_some());
}

#[tokio::test]
async fn test_unrepresentable_nonce_ttl_still_reconciles() {
    let mut h = Harness::new();
    h.config.nonce_ttl = std::time::Duration::from_secs(10_000_000_000_000);
    let wallet = TestWallet::from_seed(12);
    h.gateway.add_member(ALICE, false);
    h.users.add_wallet(ALICE, wallet.address()).await.expect("stored");
    h.reader.grant_key(h.lock(0), wallet.address());
    let nonce = h.nonces.create(Some(BOB)).await.expect("stored");

    let report = h.sweeper().sweep().await;

    assert_eq!(report.granted, 1);
    assert_eq!(report.purged, 0);
    assert!(h.gateway.has_role(ALICE));
    assert!(h.nonces.get(&nonce).await.expect("store reachable").is_some());
}
