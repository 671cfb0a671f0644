//! Digest values.
//!
//! A [`Hash`] is an immutable run of bytes compared byte-wise and rendered as
//! concatenated two-digit uppercase hex. Real hashes come out of
//! [`Hash::digest`]; the only other hash a chain ever holds is the empty one
//! the genesis block links to.

use crate::error::HashError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Hash(Box<[u8]>);

impl Hash {
    /// The zero-length hash used as the genesis block's previous hash.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap raw bytes. Intended for decoding and for exercising validators;
    /// block hashes are always derived with [`Hash::digest`].
    pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
        Hash(bytes.into())
    }

    /// SHA-256 over the concatenation of `segments`, fed in order.
    pub fn digest<'a>(segments: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = Sha256::new();
        for segment in segments {
            hasher.update(segment);
        }
        Hash(hasher.finalize().to_vec().into_boxed_slice())
    }

    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        Ok(Hash(hex::decode(hex)?.into_boxed_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn byte_at(&self, index: usize) -> Result<u8, HashError> {
        self.0.get(index).copied().ok_or(HashError::OutOfRange {
            index,
            len: self.0.len(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// An owned copy of the bytes; changing it never affects `self`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Hash::from_hex(&hex).map_err(de::Error::custom)
    }
}
