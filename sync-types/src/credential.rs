//! Credential handed to the fetch executor.

use std::fmt;

/// An opaque API credential (token or key).
///
/// Acquisition is the caller's business; the engine only carries it from the
/// credential source into requests. An empty credential means "no credential".
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw credential value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for placing into a request.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the value is empty (and so counts as absent).
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// Don't leak credentials in debug output
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([{} chars REDACTED])", self.0.len())
    }
}
