//! Authorization tokens for user decryption.
//!
//! A token binds a fresh ephemeral public key, the compute contexts it may
//! be used against, and a validity window into an EIP-712 message signed by
//! the owner. The compute layer rebuilds the message from the token fields
//! with [`decrypt_request_message`] and checks the signature against it.
//!
//! Tokens are not renewable. Issue one per reveal session; a caller may
//! reuse it until [`ValidityWindow::expires_at`].

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::crypto;
use crate::encoding::Address;
use crate::error::{AuthError, CryptoError};
use crate::keys;
use crate::signer::StructuredSigner;
use crate::typed_data::{Eip712Domain, FieldType, FieldValue, TypeDescriptor, TypedMessage};

/// Primary type name of the decrypt authorization message.
pub const DECRYPT_REQUEST_TYPE: &str = "UserDecryptRequestVerification";

// ---------------------------------------------------------------------------
// Ephemeral key pair
// ---------------------------------------------------------------------------

/// An X25519 key pair generated per token. The compute layer seals
/// recovered values to its public half.
///
/// The secret is zeroised on drop.
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; 32];
        crypto::fill_random(&mut bytes)?;
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Open a value sealed by [`seal_for_recipient`].
    pub fn open(&self, sender_public: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*sender_public));
        let key = keys::derive_reencryption_key(shared.as_bytes())?;
        crypto::open(&key, sealed)
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Seal `plaintext` to `recipient_public` with a one-off sender key.
///
/// Returns the sender public key and `nonce ‖ ciphertext ‖ tag`.
pub fn seal_for_recipient(
    recipient_public: &[u8; 32],
    plaintext: &[u8],
) -> Result<([u8; 32], Vec<u8>), CryptoError> {
    let sender = EphemeralKeyPair::generate()?;
    let shared = sender
        .secret
        .diffie_hellman(&PublicKey::from(*recipient_public));
    let key = keys::derive_reencryption_key(shared.as_bytes())?;
    Ok((sender.public_key(), crypto::seal(&key, plaintext)?))
}

// ---------------------------------------------------------------------------
// Validity window
// ---------------------------------------------------------------------------

/// `[start, start + duration]`, second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    /// Unix seconds.
    pub start: i64,
    pub duration_secs: u64,
}

impl ValidityWindow {
    pub fn starting_at(start: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start: start.timestamp(),
            duration_secs: duration.as_secs(),
        }
    }

    pub fn expires_at(&self) -> i64 {
        self.start
            .saturating_add(i64::try_from(self.duration_secs).unwrap_or(i64::MAX))
    }

    /// True if `now` lies in the window. A start up to `skew_secs` in the
    /// future is tolerated.
    pub fn contains(&self, now: DateTime<Utc>, skew_secs: i64) -> bool {
        let now = now.timestamp();
        now >= self.start.saturating_sub(skew_secs) && now <= self.expires_at()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.expires_at()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// `UserDecryptRequestVerification(bytes publicKey,address[] contractAddresses,
/// uint256 startTimestamp,uint256 durationSeconds,bytes extraData)`
pub fn decrypt_request_type() -> TypeDescriptor {
    TypeDescriptor {
        name: DECRYPT_REQUEST_TYPE.to_string(),
        fields: vec![
            ("publicKey".to_string(), FieldType::Bytes),
            ("contractAddresses".to_string(), FieldType::AddressArray),
            ("startTimestamp".to_string(), FieldType::Uint256),
            ("durationSeconds".to_string(), FieldType::Uint256),
            ("extraData".to_string(), FieldType::Bytes),
        ],
    }
}

/// Build the message a decrypt authorization signs. Issuer and verifier
/// must both go through this function.
pub fn decrypt_request_message(
    public_key: &[u8; 32],
    scope: &[Address],
    window: &ValidityWindow,
) -> TypedMessage {
    let start = u64::try_from(window.start).unwrap_or(0);
    let mut msg = TypedMessage::new();
    msg.insert("publicKey".into(), FieldValue::Bytes(public_key.to_vec()));
    msg.insert("contractAddresses".into(), FieldValue::AddressArray(scope.to_vec()));
    msg.insert("startTimestamp".into(), FieldValue::uint(start));
    msg.insert("durationSeconds".into(), FieldValue::uint(window.duration_secs));
    msg.insert("extraData".into(), FieldValue::Bytes(Vec::new()));
    msg
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A signed, time-bounded proof of the owner's consent to decrypt.
pub struct AuthorizationToken {
    key_pair: EphemeralKeyPair,
    owner: Address,
    scope: Vec<Address>,
    window: ValidityWindow,
    signature: Vec<u8>,
}

impl AuthorizationToken {
    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn scope(&self) -> &[Address] {
        &self.scope
    }

    pub fn window(&self) -> ValidityWindow {
        self.window
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key_pair.public_key()
    }

    pub fn key_pair(&self) -> &EphemeralKeyPair {
        &self.key_pair
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.window.is_expired(now)
    }
}

impl fmt::Debug for AuthorizationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationToken")
            .field("owner", &self.owner)
            .field("scope", &self.scope)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

/// Builds and signs [`AuthorizationToken`]s under one signing domain.
#[derive(Debug, Clone)]
pub struct AuthorizationTokenIssuer {
    domain: Eip712Domain,
}

impl AuthorizationTokenIssuer {
    pub fn new(domain: Eip712Domain) -> Self {
        Self { domain }
    }

    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    /// Issue a token valid from now for `duration`.
    pub async fn issue(
        &self,
        signer: &dyn StructuredSigner,
        scope: Vec<Address>,
        duration: Duration,
    ) -> Result<AuthorizationToken, AuthError> {
        self.issue_at(signer, scope, Utc::now(), duration).await
    }

    /// Issue a token whose window starts at `start`.
    pub async fn issue_at(
        &self,
        signer: &dyn StructuredSigner,
        scope: Vec<Address>,
        start: DateTime<Utc>,
        duration: Duration,
    ) -> Result<AuthorizationToken, AuthError> {
        // The signed start is a uint256.
        if start.timestamp() < 0 {
            return Err(AuthError::MalformedMessage("start before unix epoch".into()));
        }
        let key_pair = EphemeralKeyPair::generate().map_err(|_| AuthError::KeyGenerationFailure)?;
        let window = ValidityWindow::starting_at(start, duration);
        let message = decrypt_request_message(&key_pair.public_key(), &scope, &window);

        let signature = signer
            .sign_typed_data(&self.domain, &decrypt_request_type(), &message)
            .await?;

        debug!(
            owner = %signer.address(),
            contexts = scope.len(),
            expires_at = window.expires_at(),
            "issued authorization token"
        );

        Ok(AuthorizationToken {
            key_pair,
            owner: signer.address(),
            scope,
            window,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{verify_typed_data, LocalSigner};
    use async_trait::async_trait;

    struct Declining;

    #[async_trait]
    impl StructuredSigner for Declining {
        fn address(&self) -> Address {
            Address::from_bytes([0xde; 20])
        }

        async fn sign_typed_data(
            &self,
            _: &Eip712Domain,
            _: &TypeDescriptor,
            _: &TypedMessage,
        ) -> Result<Vec<u8>, AuthError> {
            Err(AuthError::SigningDeclined)
        }
    }

    fn issuer() -> AuthorizationTokenIssuer {
        AuthorizationTokenIssuer::new(Eip712Domain::decryption(1, Address::from_bytes([5; 20])))
    }

    #[tokio::test]
    async fn test_token_signature_verifies_against_rebuilt_message() {
        let signer = LocalSigner::from_seed(&[9u8; 32]).unwrap();
        let scope = vec![Address::from_bytes([1; 20])];
        let token = issuer()
            .issue(&signer, scope.clone(), Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(token.owner(), signer.address());
        let rebuilt = decrypt_request_message(&token.public_key(), &scope, &token.window());
        assert!(verify_typed_data(
            &signer.public_key(),
            issuer().domain(),
            &decrypt_request_type(),
            &rebuilt,
            token.signature(),
        ));
    }

    #[tokio::test]
    async fn test_declined_signing() {
        let err = issuer()
            .issue(&Declining, vec![], Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::SigningDeclined);
    }

    #[tokio::test]
    async fn test_pre_epoch_start_rejected() {
        let signer = LocalSigner::from_seed(&[9u8; 32]).unwrap();
        let start = DateTime::<Utc>::from_timestamp(-1, 0).unwrap();
        let err = issuer()
            .issue_at(&signer, vec![], start, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedMessage(_)));

        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let token = issuer()
            .issue_at(&signer, vec![], epoch, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(token.window().start, 0);
    }

    #[tokio::test]
    async fn test_each_token_has_fresh_key_pair() {
        let signer = LocalSigner::from_seed(&[9u8; 32]).unwrap();
        let a = issuer().issue(&signer, vec![], Duration::from_secs(60)).await.unwrap();
        let b = issuer().issue(&signer, vec![], Duration::from_secs(60)).await.unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_window_bounds() {
        let start = Utc::now();
        let w = ValidityWindow::starting_at(start, Duration::from_secs(100));
        assert!(w.contains(start, 0));
        assert!(w.contains(start + chrono::Duration::seconds(100), 0));
        assert!(!w.contains(start + chrono::Duration::seconds(101), 0));
        assert!(w.is_expired(start + chrono::Duration::seconds(101)));

        // Future start tolerated only within the skew.
        assert!(w.contains(start - chrono::Duration::seconds(30), 60));
        assert!(!w.contains(start - chrono::Duration::seconds(90), 60));
    }

    #[test]
    fn test_reencryption_roundtrip() {
        let recipient = EphemeralKeyPair::generate().unwrap();
        let (sender_pub, sealed) = seal_for_recipient(&recipient.public_key(), b"12345").unwrap();
        assert_eq!(recipient.open(&sender_pub, &sealed).unwrap(), b"12345");

        let stranger = EphemeralKeyPair::generate().unwrap();
        assert_eq!(
            stranger.open(&sender_pub, &sealed),
            Err(CryptoError::AuthenticationFailure)
        );
    }
}
