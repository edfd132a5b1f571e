//! # rememberpass
//!
//! Hybrid secret storage for public ledgers.
//!
//! Each secret is encrypted locally with AES-256-GCM under a key derived
//! from 160 bits of fresh seed material. The seed itself is wrapped by a
//! confidential-compute layer and only the resulting opaque handle is
//! stored next to the ciphertext. Recovering the seed requires a
//! time-bounded authorization signed by the owner.
//!
//! ## Layout
//!
//! - [`keys`] and [`crypto`]: seed material, HKDF, AES-GCM.
//! - [`wrap`]: the [`ComputeLayer`](wrap::ComputeLayer) seam and
//!   [`KeyWrapClient`](wrap::KeyWrapClient).
//! - [`auth`], [`signer`], [`typed_data`]: EIP-712 authorization tokens.
//! - [`ledger`]: the record store seam.
//! - [`vault`]: the store and reveal flows.
//! - [`compute`]: in-memory and gateway compute layers.

pub mod audit;
pub mod auth;
pub mod compute;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod signer;
pub mod typed_data;
pub mod vault;
pub mod wrap;

pub use config::VaultConfig;
pub use encoding::Address;
pub use error::{AuthError, CryptoError, LedgerError, VaultError, WrapError};
pub use keys::{DerivedKey, SeedMaterial};
pub use vault::Vault;
pub use wrap::{ComputeContext, KeyWrapClient, WrapHandle};

/// Generate fresh seed material for one secret.
///
/// This is the entry point for producing key material. Each secret gets its
/// own seed; seeds are never reused.
pub fn generate_seed_material() -> Result<SeedMaterial, CryptoError> {
    SeedMaterial::generate()
}
