//! Key wrapping through the confidential-compute layer.
//!
//! The compute layer encrypts seed material "under wraps" and hands back an
//! opaque [`WrapHandle`] with an [`InputProof`]. Recovering the seed needs
//! the same handle plus an [`AuthorizationToken`] signed by its owner.
//!
//! [`ComputeLayer`] is the seam to that service. Its request shapes follow
//! the service's client API: a wrap request builder carrying 256-bit values
//! and a user-decrypt request keyed by `(handle, contract)` pairs. Recovered
//! values come back as decimal strings.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::auth::{AuthorizationToken, EphemeralKeyPair, ValidityWindow};
use crate::encoding::{self, Address, Field};
use crate::error::{EncodingError, WrapError};
use crate::keys::SeedMaterial;
use crate::typed_data::Eip712Domain;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Opaque 32-byte reference to a wrapped value inside the compute layer.
/// It is neither the key nor decryptable by inspection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WrapHandle([u8; 32]);

impl WrapHandle {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        encoding::to_padded_hex(&self.0)
    }

    pub fn parse_hex(s: &str) -> Result<Self, EncodingError> {
        Ok(Self(encoding::parse_fixed_hex(s)?))
    }
}

impl TryFrom<String> for WrapHandle {
    type Error = EncodingError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse_hex(&s)
    }
}

impl From<WrapHandle> for String {
    fn from(h: WrapHandle) -> Self {
        h.to_hex()
    }
}

impl fmt::Debug for WrapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Enough to tell handles apart in test output, not enough to use one.
        write!(f, "WrapHandle({}..)", &hex::encode(&self.0[..4]))
    }
}

/// Input-validity proof attesting a handle is well-formed and bound to its
/// owner. The ledger verifies it; this crate only carries it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InputProof(Vec<u8>);

impl InputProof {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<String> for InputProof {
    type Error = EncodingError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Ok(Self(encoding::parse_hex_bytes(&s)?))
    }
}

impl From<InputProof> for String {
    fn from(p: InputProof) -> Self {
        encoding::to_padded_hex(&p.0)
    }
}

impl fmt::Debug for InputProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputProof({} bytes)", self.0.len())
    }
}

/// Builder for a wrap request scoped to `(contract, owner)`.
///
/// Values are zeroised when the request is dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct WrapRequest {
    #[zeroize(skip)]
    contract: Address,
    #[zeroize(skip)]
    owner: Address,
    values: Vec<Field>,
}

impl WrapRequest {
    pub fn new(contract: Address, owner: Address) -> Self {
        Self {
            contract,
            owner,
            values: Vec::new(),
        }
    }

    /// Append a 256-bit value.
    pub fn add256(mut self, value: Field) -> Self {
        self.values.push(value);
        self
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn values(&self) -> &[Field] {
        &self.values
    }
}

/// One handle per wrapped value, plus a proof covering all of them.
#[derive(Debug, Clone)]
pub struct WrapOutput {
    pub handles: Vec<WrapHandle>,
    pub proof: InputProof,
}

/// Everything the compute layer needs to authorize a user decryption.
#[derive(Debug, Clone)]
pub struct DecryptRequest {
    pub handles: Vec<(WrapHandle, Address)>,
    pub public_key: [u8; 32],
    pub signature: Vec<u8>,
    pub contracts: Vec<Address>,
    pub owner: Address,
    pub window: ValidityWindow,
}

/// The confidential-compute service.
#[async_trait]
pub trait ComputeLayer: Send + Sync {
    /// Whether the client is initialized and able to serve requests.
    async fn is_ready(&self) -> bool {
        true
    }

    /// Wrap every value in `request`.
    async fn encrypt(&self, request: WrapRequest) -> Result<WrapOutput, WrapError>;

    /// Recover the values behind `request.handles` as decimal strings.
    /// `key_pair` is the token's ephemeral key pair; remote services seal
    /// their answers to it.
    async fn user_decrypt(
        &self,
        request: &DecryptRequest,
        key_pair: &EphemeralKeyPair,
    ) -> Result<HashMap<WrapHandle, String>, WrapError>;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The compute context a flow runs against: the contract holding handles
/// and the domain authorization tokens are signed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeContext {
    pub contract: Address,
    pub domain: Eip712Domain,
}

/// Wraps and unwraps seed material for one compute context.
#[derive(Clone)]
pub struct KeyWrapClient {
    layer: Arc<dyn ComputeLayer>,
    context: ComputeContext,
}

impl KeyWrapClient {
    pub fn new(layer: Arc<dyn ComputeLayer>, context: ComputeContext) -> Self {
        Self { layer, context }
    }

    pub fn context(&self) -> &ComputeContext {
        &self.context
    }

    /// Ask the compute layer whether it can serve requests. A layer that
    /// does not answer within `deadline` fails with `WrapError::Timeout`.
    pub async fn is_ready(&self, deadline: Option<Duration>) -> Result<bool, WrapError> {
        with_deadline(deadline, async { Ok(self.layer.is_ready().await) }).await
    }

    /// Wrap `seed` for `owner`. The proof is returned alongside the handle
    /// and must be submitted with it.
    #[instrument(skip_all, fields(owner = %owner))]
    pub async fn wrap(
        &self,
        seed: &SeedMaterial,
        owner: Address,
        deadline: Option<Duration>,
    ) -> Result<(WrapHandle, InputProof), WrapError> {
        let request = WrapRequest::new(self.context.contract, owner).add256(seed.to_field());
        let output = with_deadline(deadline, self.layer.encrypt(request)).await?;

        let [handle] = output.handles.as_slice() else {
            warn!(count = output.handles.len(), "unexpected handle count from compute layer");
            return Err(WrapError::MalformedResponse);
        };
        if output.proof.is_empty() {
            warn!("compute layer returned an empty input proof");
            return Err(WrapError::MalformedResponse);
        }
        debug!("seed wrapped");
        Ok((*handle, output.proof))
    }

    /// Recover the seed behind `handle` using `token`.
    #[instrument(skip_all, fields(owner = %owner))]
    pub async fn unwrap(
        &self,
        handle: &WrapHandle,
        token: &AuthorizationToken,
        owner: Address,
        deadline: Option<Duration>,
    ) -> Result<SeedMaterial, WrapError> {
        if token.owner() != owner || !token.scope().contains(&self.context.contract) {
            return Err(WrapError::Unauthorized);
        }

        let request = DecryptRequest {
            handles: vec![(*handle, self.context.contract)],
            public_key: token.public_key(),
            signature: token.signature().to_vec(),
            contracts: token.scope().to_vec(),
            owner,
            window: token.window(),
        };
        let mut values =
            with_deadline(deadline, self.layer.user_decrypt(&request, token.key_pair())).await?;

        let mut decimal = values.remove(handle).ok_or(WrapError::HandleNotFound)?;
        for (_, mut other) in values.drain() {
            other.zeroize();
        }
        let field = encoding::decimal_to_field(&decimal);
        decimal.zeroize();
        let mut field = field.map_err(|_| WrapError::MalformedResponse)?;

        let seed = SeedMaterial::from_field(&field);
        field.zeroize();
        debug!("seed recovered");
        Ok(seed)
    }
}

impl fmt::Debug for KeyWrapClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyWrapClient")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Run `fut`, failing with `WrapError::Timeout` once `deadline` elapses.
/// `None` waits indefinitely.
pub(crate) async fn with_deadline<T, F>(deadline: Option<Duration>, fut: F) -> Result<T, WrapError>
where
    F: Future<Output = Result<T, WrapError>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| WrapError::Timeout)?,
        None => fut.await,
    }
}
