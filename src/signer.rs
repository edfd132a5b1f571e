//! The owner's signing capability.
//!
//! A wallet or HSM sits behind [`StructuredSigner`]; this crate never holds
//! the owner's long-term private key. [`LocalSigner`] is a deterministic
//! Ed25519 implementation for tests and local tooling.

use async_trait::async_trait;
use ring::signature::{self, Ed25519KeyPair, KeyPair, UnparsedPublicKey};

use crate::encoding::{Address, ADDRESS_LEN};
use crate::error::AuthError;
use crate::typed_data::{self, Eip712Domain, TypeDescriptor, TypedMessage};

/// Signs typed structured data on behalf of an owner.
#[async_trait]
pub trait StructuredSigner: Send + Sync {
    /// The identity signatures are attributed to.
    fn address(&self) -> Address;

    /// Sign `message` under `domain`. Returns `AuthError::SigningDeclined` if
    /// the owner refuses or the device errors.
    async fn sign_typed_data(
        &self,
        domain: &Eip712Domain,
        types: &TypeDescriptor,
        message: &TypedMessage,
    ) -> Result<Vec<u8>, AuthError>;
}

/// Deterministic Ed25519 signer over the EIP-712 digest.
pub struct LocalSigner {
    key_pair: Ed25519KeyPair,
    address: Address,
}

impl LocalSigner {
    /// Build a signer from a 32-byte seed. The same seed always yields the
    /// same key pair and address.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, AuthError> {
        let key_pair =
            Ed25519KeyPair::from_seed_unchecked(seed).map_err(|_| AuthError::SigningDeclined)?;
        let address = address_for_public_key(key_pair.public_key().as_ref());
        Ok(Self { key_pair, address })
    }

    pub fn public_key(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.key_pair.public_key().as_ref());
        out
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner").field("address", &self.address).finish()
    }
}

#[async_trait]
impl StructuredSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_typed_data(
        &self,
        domain: &Eip712Domain,
        types: &TypeDescriptor,
        message: &TypedMessage,
    ) -> Result<Vec<u8>, AuthError> {
        let digest = typed_data::signing_digest(domain, types, message)?;
        Ok(self.key_pair.sign(&digest).as_ref().to_vec())
    }
}

/// Low 20 bytes of `keccak256(public_key)`.
pub fn address_for_public_key(public_key: &[u8]) -> Address {
    let hash = typed_data::keccak256(public_key);
    let mut bytes = [0u8; ADDRESS_LEN];
    bytes.copy_from_slice(&hash[32 - ADDRESS_LEN..]);
    Address::from_bytes(bytes)
}

/// Check an Ed25519 signature over the typed-data digest.
pub fn verify_typed_data(
    public_key: &[u8; 32],
    domain: &Eip712Domain,
    types: &TypeDescriptor,
    message: &TypedMessage,
    sig: &[u8],
) -> bool {
    let Ok(digest) = typed_data::signing_digest(domain, types, message) else {
        return false;
    };
    UnparsedPublicKey::new(&signature::ED25519, public_key)
        .verify(&digest, sig)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed_data::{FieldType, FieldValue};

    fn sample() -> (Eip712Domain, TypeDescriptor, TypedMessage) {
        let domain = Eip712Domain::decryption(31337, Address::from_bytes([7; 20]));
        let types = TypeDescriptor {
            name: "Ping".into(),
            fields: vec![("n".into(), FieldType::Uint256)],
        };
        let mut msg = TypedMessage::new();
        msg.insert("n".into(), FieldValue::uint(42));
        (domain, types, msg)
    }

    #[tokio::test]
    async fn test_sign_and_verify() {
        let signer = LocalSigner::from_seed(&[1u8; 32]).unwrap();
        let (domain, types, msg) = sample();
        let sig = signer.sign_typed_data(&domain, &types, &msg).await.unwrap();

        assert!(verify_typed_data(&signer.public_key(), &domain, &types, &msg, &sig));

        let other = LocalSigner::from_seed(&[2u8; 32]).unwrap();
        assert!(!verify_typed_data(&other.public_key(), &domain, &types, &msg, &sig));

        let mut changed = msg.clone();
        changed.insert("n".into(), FieldValue::uint(43));
        assert!(!verify_typed_data(&signer.public_key(), &domain, &types, &changed, &sig));
    }

    #[test]
    fn test_address_is_deterministic() {
        let a = LocalSigner::from_seed(&[3u8; 32]).unwrap();
        let b = LocalSigner::from_seed(&[3u8; 32]).unwrap();
        let c = LocalSigner::from_seed(&[4u8; 32]).unwrap();
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), c.address());
    }
}
