//! Symmetric cipher engine.
//!
//! This module and `keys` are the only places that touch `ring`'s AEAD and
//! RNG directly. Everything else encrypts and decrypts through the
//! functions exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (128-bit tag)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per operation via `SystemRandom`
//! - **Transport**: standard base64 of `nonce ‖ ciphertext ‖ tag`

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::aead::{self, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::keys::DerivedKey;

/// The AEAD algorithm used throughout rememberpass.
const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of a derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// An encrypted secret in its storage form.
///
/// Base64 of `[ nonce (12 bytes) ][ ciphertext + GCM tag ]`. The nonce
/// travels with the ciphertext so decryption needs only the key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ciphertext(String);

impl Ciphertext {
    /// Wrap an already-encoded string, e.g. one read back from the ledger.
    /// Validity is only checked on decryption.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Encode raw `nonce ‖ ciphertext ‖ tag` bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode to raw bytes, checking only that a nonce fits.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        let raw = STANDARD
            .decode(self.0.as_bytes())
            .map_err(|_| CryptoError::MalformedInput)?;
        if raw.len() < NONCE_LEN {
            return Err(CryptoError::MalformedInput);
        }
        Ok(raw)
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ciphertext({} chars)", self.0.len())
    }
}

impl fmt::Display for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A nonce generated for a single encryption operation.
/// Each `Nonce` is consumed on use.
struct OwnedNonce(Nonce);

/// Fill `buf` from `ring::rand::SystemRandom`, the only source of randomness
/// in the crate.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    let rng = SystemRandom::new();
    rng.fill(buf).map_err(|_| CryptoError::RngFailure)
}

/// A fresh nonce for every encryption call. There is no nonce caching or
/// counter-based generation.
fn generate_nonce() -> Result<OwnedNonce, CryptoError> {
    let mut buf = [0u8; NONCE_LEN];
    fill_random(&mut buf)?;
    Ok(OwnedNonce(Nonce::assume_unique_for_key(buf)))
}

fn aead_key(key: &DerivedKey) -> Result<LessSafeKey, CryptoError> {
    let unbound = UnboundKey::new(ALGORITHM, key.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt into raw `nonce ‖ ciphertext ‖ tag` bytes.
pub(crate) fn seal(key: &DerivedKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = aead_key(key)?;
    let nonce = generate_nonce()?;

    let mut output = Vec::with_capacity(NONCE_LEN + plaintext.len() + TAG_LEN);
    output.extend_from_slice(nonce.0.as_ref());
    output.extend_from_slice(plaintext);

    // Encrypts `output[NONCE_LEN..]` in place; the tag goes on the end.
    let tag = key
        .seal_in_place_separate_tag(nonce.0, aead::Aad::empty(), &mut output[NONCE_LEN..])
        .map_err(|_| CryptoError::MalformedInput)?;
    output.extend_from_slice(tag.as_ref());

    Ok(output)
}

/// Decrypt raw `nonce ‖ ciphertext ‖ tag` bytes.
///
/// The caller receives no partial plaintext when the tag fails.
pub(crate) fn open(key: &DerivedKey, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::MalformedInput);
    }
    let (nonce_bytes, body) = sealed.split_at(NONCE_LEN);
    let nonce_bytes: [u8; NONCE_LEN] = nonce_bytes
        .try_into()
        .map_err(|_| CryptoError::MalformedInput)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let key = aead_key(key)?;
    let mut payload = body.to_vec();
    let plaintext = key
        .open_in_place(nonce, aead::Aad::empty(), &mut payload)
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    Ok(plaintext.to_vec())
}

/// Encrypt a secret payload under `key`.
///
/// Fails only if secure randomness is unavailable.
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> Result<Ciphertext, CryptoError> {
    Ok(Ciphertext::from_bytes(&seal(key, plaintext)?))
}

/// Decrypt a [`Ciphertext`] under `key`.
///
/// `MalformedInput` if the string is not base64 or is shorter than a nonce;
/// `AuthenticationFailure` for a wrong key or any tampering.
pub fn decrypt(ciphertext: &Ciphertext, key: &DerivedKey) -> Result<Vec<u8>, CryptoError> {
    open(key, &ciphertext.to_bytes()?)
}
