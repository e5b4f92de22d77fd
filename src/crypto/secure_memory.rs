//! Secure memory handling for sensitive data
//!
//! Recovery phrases read from the terminal are held in a [`SecureString`]
//! that wipes its buffer on drop and never prints its contents.

use std::fmt;
use std::ops::Deref;

use zeroize::Zeroize;

/// A string type that zeros its contents on drop
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Create a new SecureString
    pub fn new(s: impl Into<String>) -> Self {
        Self { inner: s.into() }
    }

    /// Get the string contents
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Check if empty (ignoring surrounding whitespace)
    pub fn is_blank(&self) -> bool {
        self.inner.trim().is_empty()
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl Deref for SecureString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_string_debug_redacted() {
        let s = SecureString::new("apple banana cherry");
        assert_eq!(format!("{:?}", s), "SecureString([REDACTED])");
        assert_eq!(s.as_str(), "apple banana cherry");
    }

    #[test]
    fn test_is_blank() {
        assert!(SecureString::from("  \n".to_string()).is_blank());
        assert!(!SecureString::new("word").is_blank());
    }
}
