//! The data a name points at.

use serde::{Deserialize, Serialize};

use crate::config::MAX_RECORD_FIELD_LENGTH;
use crate::crypto::keys::Address;

use super::name::NameError;

/// A directory record: the controlling address plus auxiliary references.
///
/// Only `owner` carries authority. `avatar` and `url` are opaque strings
/// the directory stores and commits to but never interprets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    pub owner: Address,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub url: String,
}

impl NameRecord {
    /// A record with empty auxiliary fields.
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            avatar: String::new(),
            url: String::new(),
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = avatar.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Check the auxiliary fields against [`MAX_RECORD_FIELD_LENGTH`].
    pub fn validate(&self) -> Result<(), NameError> {
        for (field, value) in [("avatar", &self.avatar), ("url", &self.url)] {
            if value.len() > MAX_RECORD_FIELD_LENGTH {
                return Err(NameError::FieldTooLong {
                    field,
                    len: value.len(),
                    max: MAX_RECORD_FIELD_LENGTH,
                });
            }
        }
        Ok(())
    }

    /// Unambiguous byte encoding used for leaf hashing:
    /// `owner || u32_be(len) || avatar || u32_be(len) || url`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 8 + self.avatar.len() + self.url.len());
        out.extend_from_slice(self.owner.as_bytes());
        for field in [&self.avatar, &self.url] {
            out.extend_from_slice(&(field.len() as u32).to_be_bytes());
            out.extend_from_slice(field.as_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    #[test]
    fn canonical_bytes_frame_fields() {
        let owner = Keypair::from_seed(&[1u8; 32]).address();
        // Moving a character across the field boundary must change the encoding.
        let a = NameRecord::new(owner).with_avatar("ab").with_url("c");
        let b = NameRecord::new(owner).with_avatar("a").with_url("bc");
        assert_ne!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn validate_bounds_fields() {
        let owner = Keypair::from_seed(&[1u8; 32]).address();
        let ok = NameRecord::new(owner).with_url("x".repeat(MAX_RECORD_FIELD_LENGTH));
        assert!(ok.validate().is_ok());

        let too_long = NameRecord::new(owner).with_avatar("x".repeat(MAX_RECORD_FIELD_LENGTH + 1));
        assert_eq!(
            too_long.validate(),
            Err(NameError::FieldTooLong {
                field: "avatar",
                len: MAX_RECORD_FIELD_LENGTH + 1,
                max: MAX_RECORD_FIELD_LENGTH
            })
        );
    }
}
