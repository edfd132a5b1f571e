//! In-process compute layer.
//!
//! Values are stored by random handle together with the `(contract, owner)`
//! pair they were wrapped for. A user decryption succeeds only when:
//! 1. the owner has a registered signing key,
//! 2. the signature verifies over the rebuilt authorization message,
//! 3. the current time lies in the validity window,
//! 4. every requested contract is in the signed scope, and
//! 5. every handle was wrapped for that contract and that owner.
//!
//! Responses are returned in the clear since they never leave the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::auth::{decrypt_request_message, decrypt_request_type, EphemeralKeyPair};
use crate::crypto;
use crate::encoding::{self, Address, Field};
use crate::error::WrapError;
use crate::signer::{self, LocalSigner, StructuredSigner};
use crate::typed_data::{keccak256, Eip712Domain};
use crate::wrap::{ComputeLayer, DecryptRequest, InputProof, WrapHandle, WrapOutput, WrapRequest};

/// How far in the future a token's start may lie.
pub const CLOCK_SKEW_SECS: i64 = 60;

const PROOF_LABEL: &[u8] = b"rememberpass-input-proof";

#[derive(Zeroize, ZeroizeOnDrop)]
struct Entry {
    value: Field,
    #[zeroize(skip)]
    contract: Address,
    #[zeroize(skip)]
    owner: Address,
}

/// Compute layer backed by process memory.
pub struct InMemoryComputeLayer {
    domain: Eip712Domain,
    entries: RwLock<HashMap<WrapHandle, Entry>>,
    owners: RwLock<HashMap<Address, [u8; 32]>>,
    ready: AtomicBool,
    latency: Option<Duration>,
}

impl InMemoryComputeLayer {
    /// A ready layer that accepts signatures under `domain`.
    pub fn new(domain: Eip712Domain) -> Self {
        Self {
            domain,
            entries: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(true),
            latency: None,
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register the Ed25519 key signatures from `owner` are checked against.
    pub fn register_owner(&self, owner: Address, public_key: [u8; 32]) {
        self.owners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(owner, public_key);
    }

    pub fn trust_signer(&self, signer: &LocalSigner) {
        self.register_owner(signer.address(), signer.public_key());
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Drop a wrapped value, as the service does when its retention period
    /// ends. Returns whether the handle existed.
    pub fn forget(&self, handle: &WrapHandle) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The proof this layer issues for `handles` wrapped under
    /// `(contract, owner)`.
    pub fn input_proof(handles: &[WrapHandle], contract: Address, owner: Address) -> InputProof {
        let mut buf = Vec::with_capacity(PROOF_LABEL.len() + 40 + 32 * handles.len());
        buf.extend_from_slice(PROOF_LABEL);
        buf.extend_from_slice(contract.as_bytes());
        buf.extend_from_slice(owner.as_bytes());
        for h in handles {
            buf.extend_from_slice(h.as_bytes());
        }
        InputProof::from_bytes(keccak256(&buf).to_vec())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn authorize(&self, request: &DecryptRequest) -> Result<(), WrapError> {
        let public_key = self
            .owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.owner)
            .copied()
            .ok_or(WrapError::Unauthorized)?;

        let message = decrypt_request_message(&request.public_key, &request.contracts, &request.window);
        if !signer::verify_typed_data(
            &public_key,
            &self.domain,
            &decrypt_request_type(),
            &message,
            &request.signature,
        ) {
            warn!(owner = %request.owner, "rejected decrypt request: bad signature");
            return Err(WrapError::Unauthorized);
        }

        if !request.window.contains(Utc::now(), CLOCK_SKEW_SECS) {
            warn!(owner = %request.owner, "rejected decrypt request: outside validity window");
            return Err(WrapError::Unauthorized);
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryComputeLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryComputeLayer")
            .field("domain", &self.domain)
            .field("entries", &self.len())
            .field("ready", &self.ready.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl ComputeLayer for InMemoryComputeLayer {
    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn encrypt(&self, request: WrapRequest) -> Result<WrapOutput, WrapError> {
        self.simulate_latency().await;

        let mut handles = Vec::with_capacity(request.values().len());
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for value in request.values() {
            let mut bytes = [0u8; 32];
            crypto::fill_random(&mut bytes).map_err(|_| WrapError::Unavailable("rng".into()))?;
            let handle = WrapHandle::from_bytes(bytes);
            entries.insert(
                handle,
                Entry {
                    value: *value,
                    contract: request.contract(),
                    owner: request.owner(),
                },
            );
            handles.push(handle);
        }
        drop(entries);

        let proof = Self::input_proof(&handles, request.contract(), request.owner());
        debug!(count = handles.len(), "wrapped values");
        Ok(WrapOutput { handles, proof })
    }

    async fn user_decrypt(
        &self,
        request: &DecryptRequest,
        _key_pair: &EphemeralKeyPair,
    ) -> Result<HashMap<WrapHandle, String>, WrapError> {
        self.simulate_latency().await;
        self.authorize(request)?;

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = HashMap::with_capacity(request.handles.len());
        for (handle, contract) in &request.handles {
            if !request.contracts.contains(contract) {
                return Err(WrapError::Unauthorized);
            }
            let entry = entries.get(handle).ok_or(WrapError::HandleNotFound)?;
            if entry.contract != *contract || entry.owner != request.owner {
                return Err(WrapError::Unauthorized);
            }
            out.insert(*handle, encoding::field_to_decimal(&entry.value));
        }
        Ok(out)
    }
}
