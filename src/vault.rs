//! Store and reveal flows.
//!
//! ```text
//! store:  seed ─┬─ derive key ─ encrypt ─┐
//!               └─ wrap ─────────────────┴─ submit to ledger
//!
//! reveal: ledger ─ issue token ─ unwrap ─ derive key ─ decrypt
//! ```
//!
//! Encrypt and wrap run concurrently and are joined: both must succeed
//! before anything reaches the ledger. The reveal path is strictly
//! sequential. Seed material and derived keys live only inside a single
//! flow and are zeroised when it ends, successfully or not. The ledger only
//! ever sees ciphertext, the wrap handle and its proof.
//!
//! Deleting a record does not revoke its wrap handle. The wrapped seed may
//! stay recoverable by its owner until the compute layer's own retention
//! period ends.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use crate::audit::{AuditAction, AuditLog, AuditRecord, AuditSink};
use crate::auth::{AuthorizationToken, AuthorizationTokenIssuer};
use crate::config::VaultConfig;
use crate::crypto::{self, Ciphertext};
use crate::encoding::Address;
use crate::error::{ConfigError, LedgerError, VaultError, WrapError};
use crate::keys::{self, SeedMaterial};
use crate::ledger::{Ledger, RecordSubmission, SecretRecord, TxReceipt};
use crate::signer::StructuredSigner;
use crate::wrap::{ComputeContext, ComputeLayer, InputProof, KeyWrapClient, WrapHandle};

/// Entry point tying the ledger, the compute layer and the signing flow
/// together for one compute context.
pub struct Vault {
    ledger: Arc<dyn Ledger>,
    wrap: KeyWrapClient,
    issuer: AuthorizationTokenIssuer,
    config: VaultConfig,
    audit: Mutex<AuditLog>,
}

impl Vault {
    /// Build a vault over the given collaborators. `config` is validated
    /// here as well, since its fields can be set without `from_json`.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        compute: Arc<dyn ComputeLayer>,
        context: ComputeContext,
        config: VaultConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let issuer = AuthorizationTokenIssuer::new(context.domain.clone());
        Ok(Self {
            ledger,
            wrap: KeyWrapClient::new(compute, context),
            issuer,
            config,
            audit: Mutex::new(AuditLog::new()),
        })
    }

    pub fn context(&self) -> &ComputeContext {
        self.wrap.context()
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Forward every audit record to `sink` as well.
    pub fn add_audit_sink(&self, sink: Box<dyn AuditSink>) {
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_forward_sink(sink);
    }

    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    fn record_audit(&self, owner: Address, action: AuditAction, index: usize) {
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(AuditRecord::now(owner, action, index));
    }

    async fn ensure_ready(&self) -> Result<(), VaultError> {
        if self.wrap.is_ready(self.config.compute_timeout()).await? {
            Ok(())
        } else {
            Err(VaultError::NotReady)
        }
    }

    fn validate(&self, title: &str, secret: &[u8]) -> Result<(), VaultError> {
        if title.trim().is_empty() {
            return Err(VaultError::InvalidInput("title is required"));
        }
        if secret.is_empty() {
            return Err(VaultError::InvalidInput("secret is required"));
        }
        if title.len() > self.config.max_title_len {
            return Err(VaultError::InvalidInput("title too long"));
        }
        if secret.len() > self.config.max_secret_len {
            return Err(VaultError::InvalidInput("secret too long"));
        }
        Ok(())
    }

    /// Encrypt `secret` under a key derived from `seed` while wrapping
    /// `seed` for `owner`.
    async fn seal_secret(
        &self,
        seed: &SeedMaterial,
        owner: Address,
        secret: &[u8],
    ) -> Result<(Ciphertext, (WrapHandle, InputProof)), VaultError> {
        let encrypt = async {
            let key = keys::derive_key(seed)?;
            Ok::<_, VaultError>(crypto::encrypt(secret, &key)?)
        };
        let wrap = async {
            self.wrap
                .wrap(seed, owner, self.config.compute_timeout())
                .await
                .map_err(VaultError::from)
        };
        tokio::try_join!(encrypt, wrap)
    }

    async fn prepare_submission(
        &self,
        owner: Address,
        title: &str,
        secret: &[u8],
    ) -> Result<RecordSubmission, VaultError> {
        self.validate(title, secret)?;
        self.ensure_ready().await?;

        let seed = SeedMaterial::generate()?;
        let (ciphertext, (key_handle, proof)) = self.seal_secret(&seed, owner, secret).await?;
        drop(seed);

        Ok(RecordSubmission {
            title: title.to_string(),
            ciphertext,
            key_handle,
            proof,
        })
    }

    /// Encrypt and store a new secret for `owner`.
    #[instrument(skip_all, fields(owner = %owner))]
    pub async fn store(
        &self,
        owner: Address,
        title: &str,
        secret: &[u8],
    ) -> Result<TxReceipt, VaultError> {
        let submission = self.prepare_submission(owner, title, secret).await?;
        let receipt = self.ledger.submit_record(owner, submission).await?;

        self.record_audit(owner, AuditAction::Stored, receipt.index);
        info!(index = receipt.index, "secret stored");
        Ok(receipt)
    }

    /// Replace the secret at `index` with a fresh seed, key and handle.
    #[instrument(skip_all, fields(owner = %owner, index))]
    pub async fn update(
        &self,
        owner: Address,
        index: usize,
        title: &str,
        secret: &[u8],
    ) -> Result<TxReceipt, VaultError> {
        self.record(owner, index).await?;
        let submission = self.prepare_submission(owner, title, secret).await?;
        let receipt = self.ledger.update_record(owner, index, submission).await?;

        self.record_audit(owner, AuditAction::Updated, index);
        info!("secret updated");
        Ok(receipt)
    }

    /// Remove the record at `index`. Later records shift down one index.
    /// The wrapped seed is not revoked.
    #[instrument(skip_all, fields(owner = %owner, index))]
    pub async fn delete(&self, owner: Address, index: usize) -> Result<(), VaultError> {
        self.ledger.delete_record(owner, index).await?;
        self.record_audit(owner, AuditAction::Deleted, index);
        info!("secret deleted");
        Ok(())
    }

    /// All records for `owner`. Titles and ciphertexts are public.
    pub async fn list(&self, owner: Address) -> Result<Vec<SecretRecord>, VaultError> {
        Ok(self.ledger.list_records(owner).await?)
    }

    async fn record(&self, owner: Address, index: usize) -> Result<SecretRecord, VaultError> {
        self.ledger
            .list_records(owner)
            .await?
            .into_iter()
            .nth(index)
            .ok_or(VaultError::Ledger(LedgerError::IndexOutOfBounds(index)))
    }

    /// Ask `signer` for a token over this vault's compute context, valid
    /// for the configured window.
    pub async fn issue_token(
        &self,
        signer: &dyn StructuredSigner,
    ) -> Result<AuthorizationToken, VaultError> {
        let scope = vec![self.context().contract];
        Ok(self
            .issuer
            .issue(signer, scope, self.config.token_validity())
            .await?)
    }

    /// Decrypt the secret at `index` for the signer's own address. Issues a
    /// fresh token for this call.
    #[instrument(skip_all, fields(owner = %signer.address(), index))]
    pub async fn reveal(
        &self,
        signer: &dyn StructuredSigner,
        index: usize,
    ) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        self.ensure_ready().await?;
        let owner = signer.address();
        let record = self.record(owner, index).await?;
        let token = self.issue_token(signer).await?;
        let plaintext = self.open_record(&token, &record).await?;

        self.record_audit(owner, AuditAction::Revealed, index);
        info!("secret revealed");
        Ok(plaintext)
    }

    /// Decrypt the secret at `index` with a token issued earlier in the same
    /// session. Expired tokens are refused without contacting the compute
    /// layer.
    #[instrument(skip_all, fields(owner = %token.owner(), index))]
    pub async fn reveal_with_token(
        &self,
        token: &AuthorizationToken,
        index: usize,
    ) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        if token.is_expired(Utc::now()) {
            debug!("token expired");
            return Err(WrapError::Unauthorized.into());
        }
        self.ensure_ready().await?;
        let owner = token.owner();
        let record = self.record(owner, index).await?;
        let plaintext = self.open_record(token, &record).await?;

        self.record_audit(owner, AuditAction::Revealed, index);
        info!("secret revealed");
        Ok(plaintext)
    }

    async fn open_record(
        &self,
        token: &AuthorizationToken,
        record: &SecretRecord,
    ) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let seed = self
            .wrap
            .unwrap(
                &record.key_handle,
                token,
                token.owner(),
                self.config.compute_timeout(),
            )
            .await?;
        let key = keys::derive_key(&seed)?;
        drop(seed);
        Ok(Zeroizing::new(crypto::decrypt(&record.ciphertext, &key)?))
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("wrap", &self.wrap)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
