//! Owner and context isolation: a token only ever unlocks its own owner's
//! handles, under the domain and contracts it was signed for.

mod common;

use std::time::Duration;

use common::{context, domain, fixture, CONTRACT, VERIFIER};
use rememberpass::auth::AuthorizationTokenIssuer;
use rememberpass::error::WrapError;
use rememberpass::signer::{LocalSigner, StructuredSigner};
use rememberpass::typed_data::Eip712Domain;
use rememberpass::wrap::{ComputeLayer, DecryptRequest};
use rememberpass::{Address, KeyWrapClient, VaultError};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::test]
async fn test_other_owner_token_cannot_unwrap() {
    let f = fixture();
    f.vault.store(f.alice.address(), "mail", b"alice-pw").await.unwrap();
    let record = f.vault.list(f.alice.address()).await.unwrap().remove(0);

    let client = KeyWrapClient::new(f.compute.clone(), context());
    let bob_token = AuthorizationTokenIssuer::new(domain())
        .issue(&f.bob, vec![CONTRACT], DAY)
        .await
        .unwrap();

    // Bob asks for his own view of alice's handle.
    let err = client
        .unwrap(&record.key_handle, &bob_token, f.bob.address(), None)
        .await
        .unwrap_err();
    assert_eq!(err, WrapError::Unauthorized);
}

#[tokio::test]
async fn test_token_owner_must_match_requested_owner() {
    let f = fixture();
    f.vault.store(f.bob.address(), "mail", b"bob-pw").await.unwrap();
    let record = f.vault.list(f.bob.address()).await.unwrap().remove(0);

    let client = KeyWrapClient::new(f.compute.clone(), context());
    let alice_token = AuthorizationTokenIssuer::new(domain())
        .issue(&f.alice, vec![CONTRACT], DAY)
        .await
        .unwrap();

    let err = client
        .unwrap(&record.key_handle, &alice_token, f.bob.address(), None)
        .await
        .unwrap_err();
    assert_eq!(err, WrapError::Unauthorized);
}

#[tokio::test]
async fn test_other_owner_cannot_reveal_by_index() {
    let f = fixture();
    f.vault.store(f.alice.address(), "mail", b"alice-pw").await.unwrap();

    // Bob has no record 0 of his own.
    let err = f.vault.reveal(&f.bob, 0).await.unwrap_err();
    assert!(matches!(err, VaultError::Ledger(_)));
    assert_eq!(err.user_message(), "input invalid");
}

#[tokio::test]
async fn test_token_from_other_domain_rejected() {
    let f = fixture();
    f.vault.store(f.alice.address(), "mail", b"pw").await.unwrap();

    let foreign = Eip712Domain::decryption(1, VERIFIER);
    let token = AuthorizationTokenIssuer::new(foreign)
        .issue(&f.alice, vec![CONTRACT], DAY)
        .await
        .unwrap();

    let err = f.vault.reveal_with_token(&token, 0).await.unwrap_err();
    assert!(matches!(err, VaultError::Wrap(WrapError::Unauthorized)));
    assert_eq!(err.user_message(), "cannot decrypt");
}

#[tokio::test]
async fn test_token_scoped_to_other_contract_rejected() {
    let f = fixture();
    f.vault.store(f.alice.address(), "mail", b"pw").await.unwrap();

    let token = AuthorizationTokenIssuer::new(domain())
        .issue(&f.alice, vec![Address::from_bytes([0xee; 20])], DAY)
        .await
        .unwrap();

    let err = f.vault.reveal_with_token(&token, 0).await.unwrap_err();
    assert!(matches!(err, VaultError::Wrap(WrapError::Unauthorized)));
}

#[tokio::test]
async fn test_unregistered_signer_rejected() {
    let f = fixture();
    let mallory = LocalSigner::from_seed(&[0x66; 32]).unwrap();

    // Mallory can store: wrapping needs no signature.
    f.vault.store(mallory.address(), "x", b"y").await.unwrap();

    // The compute layer has no key for mallory's address.
    let err = f.vault.reveal(&mallory, 0).await.unwrap_err();
    assert!(matches!(err, VaultError::Wrap(WrapError::Unauthorized)));
}

#[tokio::test]
async fn test_handles_are_bound_to_context() {
    let f = fixture();
    f.vault.store(f.alice.address(), "mail", b"pw").await.unwrap();
    let record = f.vault.list(f.alice.address()).await.unwrap().remove(0);

    // Same layer, same owner, a different contract in both the client and
    // the token scope.
    let other = Address::from_bytes([0xee; 20]);
    let mut other_context = context();
    other_context.contract = other;
    let client = KeyWrapClient::new(f.compute.clone(), other_context);
    let token = AuthorizationTokenIssuer::new(domain())
        .issue(&f.alice, vec![other], DAY)
        .await
        .unwrap();

    let err = client
        .unwrap(&record.key_handle, &token, f.alice.address(), None)
        .await
        .unwrap_err();
    assert_eq!(err, WrapError::Unauthorized);
}

#[tokio::test]
async fn test_compute_layer_binds_signature_to_claimed_owner() {
    let f = fixture();
    f.vault.store(f.alice.address(), "mail", b"alice-pw").await.unwrap();
    let record = f.vault.list(f.alice.address()).await.unwrap().remove(0);

    // Bob signs, then claims to be alice when talking to the layer directly.
    let bob_token = AuthorizationTokenIssuer::new(domain())
        .issue(&f.bob, vec![CONTRACT], DAY)
        .await
        .unwrap();
    let forged = DecryptRequest {
        handles: vec![(record.key_handle, CONTRACT)],
        public_key: bob_token.public_key(),
        signature: bob_token.signature().to_vec(),
        contracts: bob_token.scope().to_vec(),
        owner: f.alice.address(),
        window: bob_token.window(),
    };
    let err = f
        .compute
        .user_decrypt(&forged, bob_token.key_pair())
        .await
        .unwrap_err();
    assert_eq!(err, WrapError::Unauthorized);

    // The same request under bob's own address is well-formed but the
    // handle belongs to alice.
    let as_bob = DecryptRequest {
        owner: f.bob.address(),
        ..forged
    };
    let err = f
        .compute
        .user_decrypt(&as_bob, bob_token.key_pair())
        .await
        .unwrap_err();
    assert_eq!(err, WrapError::Unauthorized);
}
