//! Fixed-width name encoding.
//!
//! A [`Name`] is the normalized, packed form of a human-readable identifier:
//!
//! ```text
//!  byte 0      bytes 1..=len        bytes len+1..32
//! +--------+---------------------+------------------+
//! |  len   |  lowercase ASCII    |   zero padding   |
//! +--------+---------------------+------------------+
//! ```
//!
//! Equality, ordering and hashing are all defined on the packed bytes, so
//! `"Alice"` and `"alice"` are the same name. Normalization and bounds
//! checks happen in [`Name::parse`]; nothing downstream ever sees an
//! unvalidated string.

use std::fmt;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::PrimeField;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DOMAIN_NAME_KEY, MAX_NAME_LENGTH, NAME_ENCODED_LENGTH};
use crate::crypto::hash::domain_separated_hash;

/// Reasons a string can't become a [`Name`] (or a record field).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("name is empty")]
    Empty,

    #[error("name is {len} bytes, maximum is {max}")]
    TooLong { len: usize, max: usize },

    #[error("invalid character {0:?} in name")]
    InvalidCharacter(char),

    #[error("record field `{field}` is {len} bytes, maximum is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// A normalized, fixed-width directory name.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name([u8; NAME_ENCODED_LENGTH]);

impl Name {
    /// Normalize and pack a human-readable name.
    ///
    /// ASCII letters are lowercased. The accepted alphabet after
    /// normalization is `[a-z0-9._-]`.
    pub fn parse(input: &str) -> Result<Self, NameError> {
        if input.is_empty() {
            return Err(NameError::Empty);
        }
        if input.len() > MAX_NAME_LENGTH {
            return Err(NameError::TooLong {
                len: input.len(),
                max: MAX_NAME_LENGTH,
            });
        }

        let mut packed = [0u8; NAME_ENCODED_LENGTH];
        packed[0] = input.len() as u8;
        for (i, ch) in input.chars().enumerate() {
            let c = ch.to_ascii_lowercase();
            if !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_')) {
                return Err(NameError::InvalidCharacter(ch));
            }
            packed[i + 1] = c as u8;
        }
        Ok(Self(packed))
    }

    /// Number of characters in the name.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0[0] as usize
    }

    /// The packed 32-byte encoding.
    pub fn as_bytes(&self) -> &[u8; NAME_ENCODED_LENGTH] {
        &self.0
    }

    /// The normalized text.
    pub fn as_str(&self) -> &str {
        // Only ASCII ever gets packed, so this can't fail.
        std::str::from_utf8(&self.0[1..=self.len()]).unwrap_or_default()
    }

    /// Key of this name in the state tree.
    pub fn key(&self) -> [u8; 32] {
        domain_separated_hash(DOMAIN_NAME_KEY, &self.0)
    }

    /// The packed encoding as one BN254 scalar.
    ///
    /// Read big-endian, the length byte is the most significant byte and is
    /// at most 31, which keeps the integer below the field modulus. No two
    /// names share a field element.
    pub fn to_field(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.0)
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Name {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.as_str().to_string()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?})", self.as_str())
    }
}
