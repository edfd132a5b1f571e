//! Relayer gateway adapter.
//!
//! Speaks JSON over HTTPS:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | readiness | `GET  /v1/health` |
//! | wrap | `POST /v1/wrap` |
//! | user decrypt | `POST /v1/user-decrypt` |
//!
//! The gateway never returns recovered values in the clear. Each result is
//! sealed to the token's ephemeral public key and opened here.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;
use zeroize::Zeroize;

use crate::auth::EphemeralKeyPair;
use crate::encoding::{self, Address};
use crate::error::WrapError;
use crate::wrap::{ComputeLayer, DecryptRequest, InputProof, WrapHandle, WrapOutput, WrapRequest};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WrapBody {
    contract_address: Address,
    user_address: Address,
    values: Vec<String>,
}

impl Drop for WrapBody {
    fn drop(&mut self) {
        self.values.zeroize();
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WrapResponse {
    handles: Vec<WrapHandle>,
    input_proof: InputProof,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HandlePair {
    handle: WrapHandle,
    contract_address: Address,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecryptBody {
    handle_contract_pairs: Vec<HandlePair>,
    public_key: String,
    signature: String,
    contract_addresses: Vec<Address>,
    user_address: Address,
    start_timestamp: i64,
    duration_seconds: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SealedResult {
    handle: WrapHandle,
    sender_public_key: String,
    sealed: String,
}

#[derive(Deserialize)]
struct DecryptResponse {
    results: Vec<SealedResult>,
}

/// Compute layer reached through a relayer gateway.
#[derive(Debug, Clone)]
pub struct GatewayComputeLayer {
    client: reqwest::Client,
    base_url: Url,
}

impl GatewayComputeLayer {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Use a preconfigured client (proxies, TLS roots, connect timeouts).
    pub fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn endpoint(&self, path: &str) -> Result<Url, WrapError> {
        self.base_url
            .join(path)
            .map_err(|_| WrapError::Unavailable("invalid gateway url".into()))
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, WrapError> {
        let response = self
            .client
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, path, "gateway rejected request");
            return Err(status_error(status));
        }
        response.json().await.map_err(|_| WrapError::MalformedResponse)
    }
}

fn status_error(status: StatusCode) -> WrapError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => WrapError::Unauthorized,
        StatusCode::NOT_FOUND => WrapError::HandleNotFound,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => WrapError::Timeout,
        other => WrapError::Unavailable(format!("gateway returned {}", other.as_u16())),
    }
}

fn transport_error(err: reqwest::Error) -> WrapError {
    if err.is_timeout() {
        WrapError::Timeout
    } else if err.is_connect() {
        WrapError::Unavailable("connection failed".into())
    } else {
        WrapError::Unavailable("request failed".into())
    }
}

fn open_result(result: &SealedResult, key_pair: &EphemeralKeyPair) -> Result<String, WrapError> {
    let sender: [u8; 32] =
        encoding::parse_fixed_hex(&result.sender_public_key).map_err(|_| WrapError::MalformedResponse)?;
    let sealed = STANDARD
        .decode(result.sealed.as_bytes())
        .map_err(|_| WrapError::MalformedResponse)?;
    let plain = key_pair
        .open(&sender, &sealed)
        .map_err(|_| WrapError::MalformedResponse)?;
    String::from_utf8(plain).map_err(|e| {
        let mut bytes = e.into_bytes();
        bytes.zeroize();
        WrapError::MalformedResponse
    })
}

#[async_trait]
impl ComputeLayer for GatewayComputeLayer {
    async fn is_ready(&self) -> bool {
        let Ok(url) = self.endpoint("v1/health") else {
            return false;
        };
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    #[instrument(skip_all, fields(owner = %request.owner()))]
    async fn encrypt(&self, request: WrapRequest) -> Result<WrapOutput, WrapError> {
        let body = WrapBody {
            contract_address: request.contract(),
            user_address: request.owner(),
            values: request.values().iter().map(encoding::field_to_decimal).collect(),
        };
        let response: WrapResponse = self.post_json("v1/wrap", &body).await?;
        if response.handles.len() != request.values().len() {
            return Err(WrapError::MalformedResponse);
        }
        debug!(count = response.handles.len(), "gateway wrapped values");
        Ok(WrapOutput {
            handles: response.handles,
            proof: response.input_proof,
        })
    }

    #[instrument(skip_all, fields(owner = %request.owner))]
    async fn user_decrypt(
        &self,
        request: &DecryptRequest,
        key_pair: &EphemeralKeyPair,
    ) -> Result<HashMap<WrapHandle, String>, WrapError> {
        let body = DecryptBody {
            handle_contract_pairs: request
                .handles
                .iter()
                .map(|(handle, contract)| HandlePair {
                    handle: *handle,
                    contract_address: *contract,
                })
                .collect(),
            public_key: hex::encode(request.public_key),
            signature: hex::encode(&request.signature),
            contract_addresses: request.contracts.clone(),
            user_address: request.owner,
            start_timestamp: request.window.start,
            duration_seconds: request.window.duration_secs,
        };
        let response: DecryptResponse = self.post_json("v1/user-decrypt", &body).await?;

        let mut out = HashMap::with_capacity(response.results.len());
        for result in &response.results {
            out.insert(result.handle, open_result(result, key_pair)?);
        }
        debug!(count = out.len(), "gateway returned sealed values");
        Ok(out)
    }
}
