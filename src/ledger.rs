//! The public record store.
//!
//! The ledger holds `(title, ciphertext, key handle)` per owner and verifies
//! the input proof that accompanies each handle. Anyone may read records;
//! only the wrapped key is access-controlled.
//!
//! [`InMemoryLedger`] keeps each owner's records as an ordered list.
//! Deleting a record shifts later records down one index.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::crypto::Ciphertext;
use crate::encoding::Address;
use crate::error::LedgerError;
use crate::typed_data::keccak256;
use crate::wrap::{InputProof, WrapHandle};

/// One stored secret. Holds nothing that decrypts without the owner's
/// authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub title: String,
    pub ciphertext: Ciphertext,
    pub key_handle: WrapHandle,
    pub created_at: DateTime<Utc>,
}

/// What a store or update flow hands to the ledger.
#[derive(Debug, Clone)]
pub struct RecordSubmission {
    pub title: String,
    pub ciphertext: Ciphertext,
    pub key_handle: WrapHandle,
    pub proof: InputProof,
}

/// Acknowledgement of an accepted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: [u8; 32],
    pub index: usize,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Append a record for `owner`. Resubmitting the same handle returns the
    /// original receipt instead of inserting twice.
    async fn submit_record(
        &self,
        owner: Address,
        submission: RecordSubmission,
    ) -> Result<TxReceipt, LedgerError>;

    async fn list_records(&self, owner: Address) -> Result<Vec<SecretRecord>, LedgerError>;

    /// Replace the record at `index`.
    async fn update_record(
        &self,
        owner: Address,
        index: usize,
        submission: RecordSubmission,
    ) -> Result<TxReceipt, LedgerError>;

    async fn delete_record(&self, owner: Address, index: usize) -> Result<(), LedgerError>;
}

/// Ledger kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: RwLock<HashMap<Address, Vec<(SecretRecord, TxReceipt)>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held for `owner`.
    pub async fn count(&self, owner: Address) -> usize {
        self.records.read().await.get(&owner).map_or(0, Vec::len)
    }
}

fn tx_hash(owner: Address, submission: &RecordSubmission, at: DateTime<Utc>) -> [u8; 32] {
    let mut buf = Vec::new();
    buf.extend_from_slice(owner.as_bytes());
    buf.extend_from_slice(submission.key_handle.as_bytes());
    buf.extend_from_slice(submission.ciphertext.as_str().as_bytes());
    buf.extend_from_slice(&at.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    keccak256(&buf)
}

fn into_record(submission: RecordSubmission, at: DateTime<Utc>) -> SecretRecord {
    SecretRecord {
        title: submission.title,
        ciphertext: submission.ciphertext,
        key_handle: submission.key_handle,
        created_at: at,
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn submit_record(
        &self,
        owner: Address,
        submission: RecordSubmission,
    ) -> Result<TxReceipt, LedgerError> {
        if submission.proof.is_empty() {
            return Err(LedgerError::InvalidProof);
        }
        let mut records = self.records.write().await;
        let list = records.entry(owner).or_default();

        if let Some((_, receipt)) = list
            .iter()
            .find(|(r, _)| r.key_handle == submission.key_handle)
        {
            return Ok(*receipt);
        }

        let now = Utc::now();
        let receipt = TxReceipt {
            tx_hash: tx_hash(owner, &submission, now),
            index: list.len(),
        };
        list.push((into_record(submission, now), receipt));
        Ok(receipt)
    }

    async fn list_records(&self, owner: Address) -> Result<Vec<SecretRecord>, LedgerError> {
        Ok(self
            .records
            .read()
            .await
            .get(&owner)
            .map(|list| list.iter().map(|(r, _)| r.clone()).collect())
            .unwrap_or_default())
    }

    async fn update_record(
        &self,
        owner: Address,
        index: usize,
        submission: RecordSubmission,
    ) -> Result<TxReceipt, LedgerError> {
        if submission.proof.is_empty() {
            return Err(LedgerError::InvalidProof);
        }
        let mut records = self.records.write().await;
        let slot = records
            .get_mut(&owner)
            .and_then(|list| list.get_mut(index))
            .ok_or(LedgerError::IndexOutOfBounds(index))?;

        let now = Utc::now();
        let receipt = TxReceipt {
            tx_hash: tx_hash(owner, &submission, now),
            index,
        };
        *slot = (into_record(submission, now), receipt);
        Ok(receipt)
    }

    async fn delete_record(&self, owner: Address, index: usize) -> Result<(), LedgerError> {
        let mut records = self.records.write().await;
        let list = records
            .get_mut(&owner)
            .filter(|list| index < list.len())
            .ok_or(LedgerError::IndexOutOfBounds(index))?;
        list.remove(index);
        // Later records moved down one slot.
        for (i, (_, receipt)) in list.iter_mut().enumerate().skip(index) {
            receipt.index = i;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(title: &str, handle: u8) -> RecordSubmission {
        RecordSubmission {
            title: title.to_string(),
            ciphertext: Ciphertext::from_encoded("AAAA"),
            key_handle: WrapHandle::from_bytes([handle; 32]),
            proof: InputProof::from_bytes(vec![1]),
        }
    }

    const ALICE: Address = Address::from_bytes([0xa1; 20]);
    const BOB: Address = Address::from_bytes([0xb0; 20]);

    #[tokio::test]
    async fn test_owners_are_independent() {
        let ledger = InMemoryLedger::new();
        ledger.submit_record(ALICE, submission("a", 1)).await.unwrap();
        ledger.submit_record(BOB, submission("b", 2)).await.unwrap();

        assert_eq!(ledger.count(ALICE).await, 1);
        assert_eq!(ledger.list_records(BOB).await.unwrap()[0].title, "b");
    }

    #[tokio::test]
    async fn test_resubmission_is_idempotent() {
        let ledger = InMemoryLedger::new();
        let first = ledger.submit_record(ALICE, submission("a", 1)).await.unwrap();
        let again = ledger.submit_record(ALICE, submission("a", 1)).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(ledger.count(ALICE).await, 1);
    }

    #[tokio::test]
    async fn test_empty_proof_rejected() {
        let ledger = InMemoryLedger::new();
        let mut s = submission("a", 1);
        s.proof = InputProof::from_bytes(Vec::new());
        assert_eq!(
            ledger.submit_record(ALICE, s).await,
            Err(LedgerError::InvalidProof)
        );
    }

    #[tokio::test]
    async fn test_delete_shifts_indices() {
        let ledger = InMemoryLedger::new();
        for (i, t) in ["a", "b", "c"].iter().enumerate() {
            ledger.submit_record(ALICE, submission(t, i as u8)).await.unwrap();
        }
        ledger.delete_record(ALICE, 0).await.unwrap();

        let titles: Vec<_> = ledger
            .list_records(ALICE)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, ["b", "c"]);

        // Resubmitting "c" reports its shifted index.
        let receipt = ledger.submit_record(ALICE, submission("c", 2)).await.unwrap();
        assert_eq!(receipt.index, 1);
    }

    #[tokio::test]
    async fn test_out_of_bounds() {
        let ledger = InMemoryLedger::new();
        assert_eq!(
            ledger.delete_record(ALICE, 0).await,
            Err(LedgerError::IndexOutOfBounds(0))
        );
        ledger.submit_record(ALICE, submission("a", 1)).await.unwrap();
        assert_eq!(
            ledger.update_record(ALICE, 999, submission("x", 9)).await,
            Err(LedgerError::IndexOutOfBounds(999))
        );
    }

    #[tokio::test]
    async fn test_update_replaces_in_place() {
        let ledger = InMemoryLedger::new();
        ledger.submit_record(ALICE, submission("a", 1)).await.unwrap();
        ledger.submit_record(ALICE, submission("b", 2)).await.unwrap();
        let receipt = ledger.update_record(ALICE, 0, submission("a2", 3)).await.unwrap();
        assert_eq!(receipt.index, 0);

        let records = ledger.list_records(ALICE).await.unwrap();
        assert_eq!(records[0].title, "a2");
        assert_eq!(records[0].key_handle, WrapHandle::from_bytes([3; 32]));
        assert_eq!(records[1].title, "b");
    }
}
