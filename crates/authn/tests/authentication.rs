//! End-to-end authentication scenarios against an in-memory directory.
//!
//! Each test builds a directory, a cache and an authenticator, then drives
//! directory changes through `DirectoryConnector::modify` the way an
//! operator's edits would arrive.

#![allow(clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use credbroker_authn::{
    AuthMetrics, Authenticator, DEFAULT_TIMEOUT_SECS, UserCache, UserCacheConfig, assert_auth_error,
    parse_public_key,
    testutil::{RsaHash, TEST_ROLE_ATTRIBUTE, TestKeyPair, random_challenge, test_config},
};
use credbroker_directory::{
    DirectoryConnector, DirectoryError, MemoryDirectory, ModifyRequest,
    testutil::{TEST_BASE_DN, account_dn, account_entry, account_entry_with_rdn},
};

const ARN_READ: &str = "arn:aws:iam::123456789012:role/read";
const ARN_ADMIN: &str = "arn:aws:iam::123456789012:role/admin";

struct Harness {
    directory: MemoryDirectory,
    metrics: AuthMetrics,
    authenticator: Authenticator,
}

impl Harness {
    async fn start(directory: MemoryDirectory) -> Self {
        Self::start_with(directory, test_config()).await
    }

    async fn start_with(directory: MemoryDirectory, config: UserCacheConfig) -> Self {
        let metrics = AuthMetrics::new();
        let cache =
            UserCache::connect(Arc::new(directory.clone()), config, Arc::new(metrics.clone()))
                .await
                .expect("initial refresh");
        Self { directory, metrics, authenticator: Authenticator::new(cache) }
    }

    async fn authenticate(&self, username: &str, pair: &TestKeyPair) -> credbroker_authn::Result<()> {
        let challenge = random_challenge();
        self.authenticator.authenticate(username, &challenge, &pair.sign(&challenge)).await.map(|_| ())
    }
}

#[tokio::test]
async fn alice_authenticates_and_resolves_policy() {
    let k1 = TestKeyPair::generate_ed25519();
    let harness = Harness::start(MemoryDirectory::with_entries([account_entry("alice")
        .with_attribute("sshPublicKey", [k1.raw_key()])
        .with_attribute(TEST_ROLE_ATTRIBUTE, [ARN_READ, ARN_ADMIN])
        .with_attribute("timeoutAttribute", ["7200"])]))
    .await;

    let challenge = random_challenge();
    let user = harness
        .authenticator
        .authenticate("alice", &challenge, &k1.sign(&challenge))
        .await
        .expect("alice authenticates");

    let groups = harness.authenticator.groups();
    let group = &groups[&user.dns()[0]];
    assert_eq!(group.arns, [ARN_READ, ARN_ADMIN]);
    assert_eq!(group.timeout, 7200);
}

#[tokio::test]
async fn key_rotation_takes_effect_after_refresh() {
    let k1 = TestKeyPair::generate_ed25519();
    let k2 = TestKeyPair::generate_ed25519();
    let harness = Harness::start(MemoryDirectory::with_entries([
        account_entry("alice").with_attribute("sshPublicKey", [k1.raw_key()])
    ]))
    .await;
    harness.authenticate("alice", &k1).await.expect("k1 before rotation");

    harness
        .directory
        .modify(
            &ModifyRequest::new(account_dn("alice"))
                .delete("sshPublicKey", vec![k1.raw_key()])
                .add("sshPublicKey", vec![k2.raw_key()]),
        )
        .await
        .expect("rotate key");

    // Until the cache refreshes, the old key set is authoritative.
    harness.authenticate("alice", &k1).await.expect("k1 still cached");
    assert_auth_error!(harness.authenticate("alice", &k2).await, NotAuthenticated);

    harness.authenticator.update().await.expect("refresh");

    assert_auth_error!(harness.authenticate("alice", &k1).await, NotAuthenticated);
    harness.authenticate("alice", &k2).await.expect("k2 after rotation");
}

#[tokio::test]
async fn first_sight_user_triggers_one_refresh() {
    let harness = Harness::start(MemoryDirectory::new()).await;
    assert_eq!(harness.directory.search_count(), 1);

    let bob = TestKeyPair::generate_ed25519();
    harness
        .directory
        .insert(account_entry("bob").with_attribute("sshPublicKey", [bob.raw_key()]));

    harness.authenticate("bob", &bob).await.expect("bob authenticates after forced refresh");
    assert_eq!(harness.directory.search_count(), 2);

    // Now cached: no further searches.
    harness.authenticate("bob", &bob).await.expect("bob from cache");
    assert_eq!(harness.directory.search_count(), 2);
    assert_eq!(harness.metrics.snapshot().forced_refreshes, 1);
}

#[tokio::test]
async fn unknown_user_is_denied_after_one_refresh() {
    let harness = Harness::start(MemoryDirectory::new()).await;
    let mallory = TestKeyPair::generate_ed25519();

    assert_auth_error!(harness.authenticate("mallory", &mallory).await, NotAuthenticated);
    assert_eq!(harness.directory.search_count(), 2);
}

#[tokio::test]
async fn any_of_several_keys_authenticates() {
    let keys = [
        TestKeyPair::generate_ed25519(),
        TestKeyPair::generate_rsa(),
        TestKeyPair::generate_ecdsa_p256(),
        TestKeyPair::generate_ecdsa_p384(),
        TestKeyPair::generate_ed25519(),
    ];
    let harness = Harness::start(MemoryDirectory::with_entries([account_entry("alice")
        .with_attribute("sshPublicKey", keys.iter().map(TestKeyPair::raw_key))]))
    .await;

    for pair in &keys {
        harness.authenticate("alice", pair).await.expect("each key authenticates");
    }
    let stranger = TestKeyPair::generate_ed25519();
    assert_auth_error!(harness.authenticate("alice", &stranger).await, NotAuthenticated);
    assert_eq!(harness.metrics.snapshot().auth_successes, 5);
    assert_eq!(harness.metrics.snapshot().auth_failures, 1);
}

#[tokio::test]
async fn rsa_sha512_signature_authenticates() {
    let pair = TestKeyPair::generate_rsa();
    let harness = Harness::start(MemoryDirectory::with_entries([
        account_entry("alice").with_attribute("sshPublicKey", [pair.authorized_key("ops")])
    ]))
    .await;
    let challenge = random_challenge();

    harness
        .authenticator
        .authenticate("alice", &challenge, &pair.sign_rsa(&challenge, RsaHash::Sha512))
        .await
        .expect("rsa-sha2-512");
}

#[tokio::test]
async fn rsa_legacy_sha1_signature_authenticates() {
    let pair = TestKeyPair::generate_rsa();
    let harness = Harness::start(MemoryDirectory::with_entries([
        account_entry("alice").with_attribute("sshPublicKey", [pair.raw_key()])
    ]))
    .await;
    let challenge = random_challenge();

    let user = harness
        .authenticator
        .authenticate("alice", &challenge, &pair.sign_rsa(&challenge, RsaHash::Sha1))
        .await
        .expect("ssh-rsa signature");
    assert_eq!(user.name(), "alice");
}

#[tokio::test]
async fn ecdsa_keys_authenticate_in_both_forms() {
    let laptop = TestKeyPair::generate_ecdsa_p256();
    let server = TestKeyPair::generate_ecdsa_p384();
    let harness = Harness::start(MemoryDirectory::with_entries([account_entry("alice")
        .with_attribute("sshPublicKey", [laptop.authorized_key("alice@laptop"), server.raw_key()])]))
    .await;

    harness.authenticate("alice", &laptop).await.expect("p256 key from authorized_keys line");
    harness.authenticate("alice", &server).await.expect("p384 key from raw blob");
    assert_eq!(harness.metrics.snapshot().key_parse_errors, 0);
}

#[tokio::test]
async fn raw_and_authorized_key_forms_are_interchangeable() {
    let pair = TestKeyPair::generate_ed25519();
    let harness = Harness::start(MemoryDirectory::with_entries([
        account_entry_with_rdn("alice-laptop", "alice")
            .with_attribute("sshPublicKey", [pair.authorized_key("alice@laptop")]),
        account_entry_with_rdn("alice-server", "alice").with_attribute("sshPublicKey", [pair.raw_key()]),
    ]))
    .await;

    let user = harness.authenticator.users()["alice"].clone();
    assert_eq!(user.keys().len(), 1, "both forms describe one key");
    assert_eq!(user.keys()[0], parse_public_key(&pair.raw_key()).expect("key"));
    harness.authenticate("alice", &pair).await.expect("authenticates");
}

#[tokio::test]
async fn malformed_keys_do_not_affect_other_keys_or_users() {
    let good = TestKeyPair::generate_ed25519();
    let bob = TestKeyPair::generate_ed25519();
    let harness = Harness::start(MemoryDirectory::with_entries([
        account_entry("alice").with_attribute(
            "sshPublicKey",
            [String::from("ssh-ed25519 AAAA-not-base64 broken"), good.raw_key()],
        ),
        account_entry("bob").with_attribute("sshPublicKey", [bob.raw_key()]),
    ]))
    .await;

    harness.authenticate("alice", &good).await.expect("alice's good key");
    harness.authenticate("bob", &bob).await.expect("bob unaffected");
    assert_eq!(harness.metrics.snapshot().key_parse_errors, 1);
}

#[tokio::test]
async fn timeouts_fall_back_to_default() {
    let harness = Harness::start(MemoryDirectory::with_entries([
        account_entry("missing"),
        account_entry("garbage").with_attribute("timeoutAttribute", ["not_an_integer"]),
        account_entry("explicit").with_attribute("timeoutAttribute", ["7200"]),
    ]))
    .await;

    let groups = harness.authenticator.groups();
    assert_eq!(groups[&account_dn("missing")].timeout, DEFAULT_TIMEOUT_SECS);
    assert_eq!(groups[&account_dn("garbage")].timeout, DEFAULT_TIMEOUT_SECS);
    assert_eq!(groups[&account_dn("explicit")].timeout, 7200);
    assert!(groups.values().all(|g| g.timeout > 0));
}

#[tokio::test]
async fn same_named_entries_keep_separate_groups() {
    let dev = TestKeyPair::generate_ed25519();
    let ops = TestKeyPair::generate_ed25519();
    let harness = Harness::start(MemoryDirectory::with_entries([
        account_entry_with_rdn("alice-dev", "alice")
            .with_attribute("sshPublicKey", [dev.raw_key()])
            .with_attribute(TEST_ROLE_ATTRIBUTE, [ARN_READ]),
        account_entry_with_rdn("alice-ops", "alice")
            .with_attribute("sshPublicKey", [ops.raw_key()])
            .with_attribute(TEST_ROLE_ATTRIBUTE, [ARN_ADMIN]),
    ]))
    .await;

    harness.authenticate("alice", &dev).await.expect("dev key");
    harness.authenticate("alice", &ops).await.expect("ops key");

    let groups = harness.authenticator.groups();
    assert_eq!(groups[&account_dn("alice-dev")].arns, [ARN_READ]);
    assert_eq!(groups[&account_dn("alice-ops")].arns, [ARN_ADMIN]);
}

#[tokio::test]
async fn alternate_key_attribute_is_authoritative() {
    let primary = TestKeyPair::generate_ed25519();
    let alternate = TestKeyPair::generate_ed25519();
    let config = UserCacheConfig::builder()
        .base_dn(TEST_BASE_DN)
        .alternate_key_attribute("altSshPublicKey")
        .use_alternate_key_attribute(true)
        .build()
        .expect("config");
    let harness = Harness::start_with(
        MemoryDirectory::with_entries([account_entry("alice")
            .with_attribute("sshPublicKey", [primary.raw_key()])
            .with_attribute("altSshPublicKey", [alternate.raw_key()])]),
        config,
    )
    .await;

    harness.authenticate("alice", &alternate).await.expect("alternate key accepted");
    assert_auth_error!(harness.authenticate("alice", &primary).await, NotAuthenticated);
}

#[tokio::test]
async fn unknown_user_is_denied_when_directory_is_down() {
    let harness = Harness::start(MemoryDirectory::new()).await;
    harness.directory.set_search_failure(Some(DirectoryError::timeout()));
    let mallory = TestKeyPair::generate_ed25519();

    assert_auth_error!(harness.authenticate("mallory", &mallory).await, NotAuthenticated);
    assert_eq!(harness.metrics.snapshot().refresh_failures, 1);
    assert_eq!(harness.metrics.snapshot().auth_failures, 1);
}

#[tokio::test]
async fn user_without_keys_cannot_authenticate() {
    let pair = TestKeyPair::generate_ed25519();
    let harness = Harness::start(MemoryDirectory::with_entries([
        account_entry("carol").with_attribute(TEST_ROLE_ATTRIBUTE, [ARN_READ])
    ]))
    .await;

    assert_auth_error!(harness.authenticate("carol", &pair).await, NotAuthenticated);
    // Known user: denial is terminal, no refresh.
    assert_eq!(harness.directory.search_count(), 1);
}
