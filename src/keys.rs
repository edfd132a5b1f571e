//! Key material and derivation.
//!
//! This module owns two responsibilities:
//! 1. Holding seed material and derived keys in types that are opaque,
//!    non-cloneable, and zeroised on drop.
//! 2. Deriving 256-bit AES keys from them using HKDF-SHA256.
//!
//! ## Derivation structure
//!
//! ```text
//! HKDF-SHA256(
//!     ikm  = seed (20 bytes),
//!     salt = 16 zero bytes,
//!     info = "rememberpass-aes"
//! )
//! ```
//!
//! The same seed always yields the same key. The key is never stored; it is
//! re-derived after the seed has been recovered from the compute layer.

use std::fmt;

use ring::hkdf;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{self, KEY_LEN};
use crate::encoding::{self, Field, ADDRESS_LEN};
use crate::error::CryptoError;

/// Size of seed material in bytes (160 bits).
pub const SEED_LEN: usize = ADDRESS_LEN;

/// Domain-separation label for secret-payload keys.
const PAYLOAD_INFO: &[u8] = b"rememberpass-aes";

/// Domain-separation label for keys that seal compute-layer responses to an
/// ephemeral key pair.
const REENCRYPT_INFO: &[u8] = b"rememberpass-reencrypt";

/// Fixed all-zero salt.
const SALT: [u8; 16] = [0u8; 16];

// ---------------------------------------------------------------------------
// Seed material
// ---------------------------------------------------------------------------

/// 160 bits of random key seed, generated once per secret.
///
/// - Not `Clone`. Exists only for the duration of a store or reveal flow.
/// - Zeroised on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SeedMaterial {
    bytes: [u8; SEED_LEN],
}

impl SeedMaterial {
    /// Draw fresh seed material from the system RNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; SEED_LEN];
        crypto::fill_random(&mut bytes)?;
        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self { bytes }
    }

    /// Recover seed material from a compute-layer field element. Only the
    /// low 160 bits are kept.
    pub fn from_field(field: &Field) -> Self {
        Self {
            bytes: encoding::low_160_bits(field),
        }
    }

    /// The seed zero-extended to the compute layer's 256-bit field.
    pub fn to_field(&self) -> Field {
        let mut field = [0u8; encoding::FIELD_LEN];
        field[encoding::FIELD_LEN - SEED_LEN..].copy_from_slice(&self.bytes);
        field
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.bytes
    }

    /// Canonical `0x` + 40 hex character form.
    pub fn to_hex(&self) -> String {
        encoding::to_padded_hex(&self.bytes)
    }
}

impl fmt::Debug for SeedMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SeedMaterial(..)")
    }
}

// ---------------------------------------------------------------------------
// Derived key
// ---------------------------------------------------------------------------

/// A 256-bit AES key derived from seed material.
///
/// - Not `Clone`.
/// - Zeroised on drop.
/// - Raw bytes never leave the crate.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

fn hkdf_sha256(ikm: &[u8], info: &[u8]) -> Result<DerivedKey, CryptoError> {
    // Extract phase: pseudorandom key from the input keying material.
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &SALT);
    let prk = salt.extract(ikm);

    // Expand phase: 32 bytes bound to the protocol label.
    let info_slices = [info];
    let okm = prk
        .expand(&info_slices, hkdf::HKDF_SHA256)
        .map_err(|_| CryptoError::KeyDerivationFailure)?;

    let mut derived = DerivedKey { bytes: [0u8; KEY_LEN] };
    okm.fill(&mut derived.bytes)
        .map_err(|_| CryptoError::KeyDerivationFailure)?;
    Ok(derived)
}

/// Derive the payload key for a seed. Deterministic; no data-dependent
/// branching on the seed bytes.
pub fn derive_key(seed: &SeedMaterial) -> Result<DerivedKey, CryptoError> {
    hkdf_sha256(&seed.bytes, PAYLOAD_INFO)
}

/// Derive the key sealing a compute-layer response from an X25519 shared
/// secret.
pub(crate) fn derive_reencryption_key(shared_secret: &[u8; 32]) -> Result<DerivedKey, CryptoError> {
    hkdf_sha256(shared_secret, REENCRYPT_INFO)
}
