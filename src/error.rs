//! Error types for rememberpass.
//!
//! Each component has its own error enum so callers can tell which stage of
//! a flow failed. Messages are intentionally minimal: they signal *what*
//! failed without carrying key material, handles, or remote response bodies.

use thiserror::Error;

/// Failures of the symmetric engine. Always terminal for the current
/// operation; retrying on the same inputs cannot succeed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RngFailure,

    /// The AEAD tag did not verify: wrong key or tampered ciphertext.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// The encoded ciphertext is not valid base64 or is shorter than a nonce.
    #[error("malformed input")]
    MalformedInput,

    /// `ring` rejected the key bytes.
    #[error("invalid key")]
    InvalidKey,

    /// HKDF expansion failed.
    #[error("key derivation failed")]
    KeyDerivationFailure,
}

/// Failures of the numeric conversions in [`crate::encoding`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid hex string")]
    InvalidHex,

    #[error("invalid decimal string")]
    InvalidDecimal,

    #[error("value exceeds 256 bits")]
    Overflow,

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Failures of the key-wrap client and the compute layer behind it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WrapError {
    /// The token's signature, owner, scope or window was rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// The compute layer does not know the handle.
    #[error("handle not found")]
    HandleNotFound,

    /// The compute layer did not answer within the caller's deadline.
    #[error("compute layer timed out")]
    Timeout,

    /// The compute layer answered with a value that is not a field element.
    #[error("malformed compute layer response")]
    MalformedResponse,

    /// Transport-level failure talking to a remote compute layer.
    #[error("compute layer unavailable: {0}")]
    Unavailable(String),
}

/// Failures while building or signing an authorization token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The owner's signing capability refused or errored.
    #[error("signing declined")]
    SigningDeclined,

    /// The ephemeral key pair could not be generated.
    #[error("ephemeral key generation failed")]
    KeyGenerationFailure,

    /// The typed message does not match its type descriptor.
    #[error("malformed typed message: {0}")]
    MalformedMessage(String),
}

/// Failures reported by the ledger collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    /// A submission arrived without a usable input proof.
    #[error("invalid input proof")]
    InvalidProof,

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Failures while loading a [`crate::config::VaultConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Coarse classification a caller uses to pick what to show the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The compute layer is not initialized.
    NotReady,
    /// A required field was missing or out of bounds.
    InvalidInput,
    /// Any component failure.
    Failed,
}

/// The error returned by every [`crate::vault::Vault`] flow.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("compute layer not ready")]
    NotReady,

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Wrap(#[from] WrapError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotReady => ErrorKind::NotReady,
            Self::InvalidInput(_) | Self::Ledger(LedgerError::IndexOutOfBounds(_)) => {
                ErrorKind::InvalidInput
            }
            _ => ErrorKind::Failed,
        }
    }

    /// A message safe to show to the end user. Never includes internal
    /// detail from the underlying error.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotReady => "service not ready",
            Self::InvalidInput(_) | Self::Ledger(LedgerError::IndexOutOfBounds(_)) => {
                "input invalid"
            }
            Self::Wrap(WrapError::Unauthorized | WrapError::HandleNotFound) => "cannot decrypt",
            Self::Auth(AuthError::SigningDeclined) => "authorization cancelled by user",
            _ => "operation failed",
        }
    }

    /// Only compute-layer timeouts may be retried with a fresh attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Wrap(WrapError::Timeout))
    }
}
