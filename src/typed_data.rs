//! EIP-712 typed structured data.
//!
//! Authorization messages are signed as typed data so the compute layer can
//! rebuild the exact bytes and check the owner's signature. Every byte of
//! the encoding matters: a reordered field or a different domain yields a
//! different digest and the signature is rejected.
//!
//! ```text
//! digest = keccak256(0x19 ‖ 0x01 ‖ domainSeparator ‖ hashStruct(message))
//! ```
//!
//! Only flat structs over `address`, `uint256`, `bytes`, `string` and
//! `address[]` are supported; that is all the decrypt authorization needs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::encoding::{self, Address, Field};
use crate::error::AuthError;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// The signing domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Eip712Domain {
    const TYPE: &'static str =
        "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

    /// The domain user-decryption requests are signed under.
    pub fn decryption(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: "Decryption".to_string(),
            version: "1".to_string(),
            chain_id,
            verifying_contract,
        }
    }

    pub fn separator(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(32 * 5);
        buf.extend_from_slice(&keccak256(Self::TYPE.as_bytes()));
        buf.extend_from_slice(&keccak256(self.name.as_bytes()));
        buf.extend_from_slice(&keccak256(self.version.as_bytes()));
        buf.extend_from_slice(&u64_word(self.chain_id));
        buf.extend_from_slice(&address_word(&self.verifying_contract));
        keccak256(&buf)
    }
}

/// Solidity types a message field may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Address,
    Uint256,
    Bytes,
    String,
    AddressArray,
}

impl FieldType {
    pub fn solidity_name(&self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Uint256 => "uint256",
            Self::Bytes => "bytes",
            Self::String => "string",
            Self::AddressArray => "address[]",
        }
    }
}

/// A named struct type with ordered fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub fields: Vec<(String, FieldType)>,
}

impl TypeDescriptor {
    /// `Name(type1 field1,type2 field2,...)`
    pub fn encode_type(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(name, ty)| format!("{} {}", ty.solidity_name(), name))
            .collect();
        format!("{}({})", self.name, fields.join(","))
    }

    pub fn type_hash(&self) -> [u8; 32] {
        keccak256(self.encode_type().as_bytes())
    }
}

/// A field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Address(Address),
    Uint256(Field),
    Bytes(Vec<u8>),
    String(String),
    AddressArray(Vec<Address>),
}

impl FieldValue {
    pub fn uint(value: u64) -> Self {
        Self::Uint256(u64_word(value))
    }

    fn field_type(&self) -> FieldType {
        match self {
            Self::Address(_) => FieldType::Address,
            Self::Uint256(_) => FieldType::Uint256,
            Self::Bytes(_) => FieldType::Bytes,
            Self::String(_) => FieldType::String,
            Self::AddressArray(_) => FieldType::AddressArray,
        }
    }

    /// The 32-byte word this value contributes to `hashStruct`.
    fn encode(&self) -> [u8; 32] {
        match self {
            Self::Address(a) => address_word(a),
            Self::Uint256(v) => *v,
            Self::Bytes(b) => keccak256(b),
            Self::String(s) => keccak256(s.as_bytes()),
            Self::AddressArray(items) => {
                let mut buf = Vec::with_capacity(items.len() * 32);
                for a in items {
                    buf.extend_from_slice(&address_word(a));
                }
                keccak256(&buf)
            }
        }
    }
}

/// A message payload, keyed by field name.
pub type TypedMessage = BTreeMap<String, FieldValue>;

/// `keccak256(typeHash ‖ enc(field_1) ‖ ... ‖ enc(field_n))` in descriptor
/// order. Missing fields, extra fields and type mismatches are rejected.
pub fn hash_struct(types: &TypeDescriptor, message: &TypedMessage) -> Result<[u8; 32], AuthError> {
    if message.len() != types.fields.len() {
        return Err(AuthError::MalformedMessage(format!(
            "expected {} fields, got {}",
            types.fields.len(),
            message.len()
        )));
    }
    let mut buf = Vec::with_capacity(32 * (types.fields.len() + 1));
    buf.extend_from_slice(&types.type_hash());
    for (name, ty) in &types.fields {
        let value = message
            .get(name)
            .ok_or_else(|| AuthError::MalformedMessage(format!("missing field {name}")))?;
        if value.field_type() != *ty {
            return Err(AuthError::MalformedMessage(format!(
                "field {name} is not {}",
                ty.solidity_name()
            )));
        }
        buf.extend_from_slice(&value.encode());
    }
    Ok(keccak256(&buf))
}

/// The digest a signer signs.
pub fn signing_digest(
    domain: &Eip712Domain,
    types: &TypeDescriptor,
    message: &TypedMessage,
) -> Result<[u8; 32], AuthError> {
    let mut buf = Vec::with_capacity(66);
    buf.extend_from_slice(&[0x19, 0x01]);
    buf.extend_from_slice(&domain.separator());
    buf.extend_from_slice(&hash_struct(types, message)?);
    Ok(keccak256(&buf))
}

fn address_word(a: &Address) -> [u8; 32] {
    // 20 bytes always fit in a field.
    encoding::field_from_bytes(a.as_bytes()).unwrap_or([0u8; 32])
}

fn u64_word(v: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&v.to_be_bytes());
    word
}
