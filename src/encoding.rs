//! Numeric conversions between the three forms key material takes.
//!
//! - **Raw bytes**: the 20-byte seed used for key derivation.
//! - **Field element**: a 256-bit big-endian unsigned integer, the width the
//!   compute layer accepts. Seeds are zero-extended into it.
//! - **Decimal string**: how the compute layer hands recovered values back.
//!
//! Only the low 160 bits of a recovered field element are meaningful when it
//! carries key material.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EncodingError;

/// Width of a compute-layer field element in bytes.
pub const FIELD_LEN: usize = 32;

/// Width of an address (and of seed material) in bytes.
pub const ADDRESS_LEN: usize = 20;

/// A 256-bit big-endian unsigned integer.
pub type Field = [u8; FIELD_LEN];

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte identity: an owner account or a compute-context contract.
///
/// The canonical text form is `0x` followed by 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Parse a hex address. The `0x` prefix is optional and case is ignored.
    pub fn parse_hex(s: &str) -> Result<Self, EncodingError> {
        Ok(Self(parse_fixed_hex(s)?))
    }

    pub fn to_hex(&self) -> String {
        to_padded_hex(&self.0)
    }
}

impl FromStr for Address {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl TryFrom<String> for Address {
    type Error = EncodingError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse_hex(&s)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_hex()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Hex
// ---------------------------------------------------------------------------

/// Parse a fixed-width hex string, with or without a `0x` prefix.
pub fn parse_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], EncodingError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.len() != N * 2 {
        return Err(EncodingError::InvalidLength {
            expected: N,
            actual: digits.len() / 2,
        });
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out).map_err(|_| EncodingError::InvalidHex)?;
    Ok(out)
}

/// Parse a variable-length `0x` hex string.
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, EncodingError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|_| EncodingError::InvalidHex)
}

/// `0x`-prefixed lowercase hex, zero-padded to twice the byte width.
pub fn to_padded_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// ---------------------------------------------------------------------------
// Field elements
// ---------------------------------------------------------------------------

/// Zero-extend big-endian bytes into a field element.
pub fn field_from_bytes(bytes: &[u8]) -> Result<Field, EncodingError> {
    if bytes.len() > FIELD_LEN {
        return Err(EncodingError::InvalidLength {
            expected: FIELD_LEN,
            actual: bytes.len(),
        });
    }
    let mut field = [0u8; FIELD_LEN];
    field[FIELD_LEN - bytes.len()..].copy_from_slice(bytes);
    Ok(field)
}

/// Keep the low 160 bits of a field element.
pub fn low_160_bits(field: &Field) -> [u8; ADDRESS_LEN] {
    let mut out = [0u8; ADDRESS_LEN];
    out.copy_from_slice(&field[FIELD_LEN - ADDRESS_LEN..]);
    out
}

/// Parse an unsigned decimal string into a field element.
///
/// Leading zeros are accepted. Signs, whitespace, and values above
/// 2^256 - 1 are rejected.
pub fn decimal_to_field(s: &str) -> Result<Field, EncodingError> {
    if s.is_empty() {
        return Err(EncodingError::InvalidDecimal);
    }
    let mut field = [0u8; FIELD_LEN];
    for c in s.bytes() {
        if !c.is_ascii_digit() {
            return Err(EncodingError::InvalidDecimal);
        }
        // field = field * 10 + digit, least significant byte first.
        let mut carry = u16::from(c - b'0');
        for byte in field.iter_mut().rev() {
            let v = u16::from(*byte) * 10 + carry;
            *byte = (v & 0xff) as u8;
            carry = v >> 8;
        }
        if carry != 0 {
            return Err(EncodingError::Overflow);
        }
    }
    Ok(field)
}

/// Render a field element as an unsigned decimal string.
pub fn field_to_decimal(field: &Field) -> String {
    let mut work = *field;
    let mut digits = Vec::new();
    while work.iter().any(|b| *b != 0) {
        let mut rem = 0u16;
        for byte in work.iter_mut() {
            let cur = (rem << 8) | u16::from(*byte);
            *byte = (cur / 10) as u8;
            rem = cur % 10;
        }
        digits.push(b'0' + rem as u8);
    }
    if digits.is_empty() {
        return "0".to_string();
    }
    digits.reverse();
    // Only ASCII digits were pushed.
    String::from_utf8(digits).unwrap_or_default()
}
