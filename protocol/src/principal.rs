//! # Principals
//!
//! A [`Principal`] is the identity of a caller as handed to us by whatever
//! authenticated the request upstream. The vault never inspects its
//! structure beyond one question: is this the *null* identity?
//!
//! Null identities are the empty string, whitespace-only strings, and the
//! all-zero account address (`0x000…0`). They can appear on the wire but
//! must never become an admin or the target of a grant.

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Opaque, stable identifier for a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wraps an identifier. No validation happens here; see [`is_null`](Self::is_null).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Wraps an identifier, rejecting the null identity.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidPrincipal`] if the identifier is null.
    pub fn parse(id: impl Into<String>) -> VaultResult<Self> {
        let principal = Self::new(id);
        principal.ensure_not_null()?;
        Ok(principal)
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty, blank, or all-zero address identity.
    pub fn is_null(&self) -> bool {
        let trimmed = self.0.trim();
        if trimmed.is_empty() {
            return true;
        }
        match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b == b'0'),
            None => false,
        }
    }

    /// Fails with [`VaultError::InvalidPrincipal`] if this is the null identity.
    pub fn ensure_not_null(&self) -> VaultResult<()> {
        if self.is_null() {
            return Err(VaultError::InvalidPrincipal(self.0.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Principal {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for Principal {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
