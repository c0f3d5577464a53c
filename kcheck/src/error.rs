//! Error types for the test registry, result buffers and the client decoder.

use alloc::string::String;

/// Errors produced by registry and handle operations.
///
/// Only [`RegistryError::Busy`] is meant to be acted upon by callers; the
/// others are logged where they occur and the operation degrades to a no-op.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid name: {name:?}")]
    InvalidName { name: String },

    #[error("test set {name} already exists")]
    Duplicate { name: String },

    #[error("out of memory")]
    OutOfMemory,

    #[error("test set {group} still active with test {test}")]
    Busy { group: String, test: String },

    #[error("no such test: {group}.{}", .test.as_deref().unwrap_or("*"))]
    NotFound { group: String, test: Option<String> },
}

impl RegistryError {
    /// Whether the error reports registered tests blocking shutdown.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Errors produced when appending attributes to a [`MessageBuffer`](crate::wire::MessageBuffer).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("message buffer full: need {needed} bytes, {available} available")]
    Full { needed: usize, available: usize },

    #[error("attribute payload exceeds the 16-bit length field")]
    AttributeTooLarge,

    #[error("out of memory")]
    OutOfMemory,
}

/// Errors produced when decoding an attribute stream.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("attribute stream truncated")]
    Truncated,

    #[error("attribute has an invalid length")]
    BadLength,

    #[error("string attribute is not valid UTF-8")]
    NotUtf8,

    #[error("unexpected attribute kind {kind}")]
    Unexpected { kind: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_display() {
        let err = RegistryError::NotFound {
            group: "net".into(),
            test: None,
        };
        assert_eq!(err.to_string(), "no such test: net.*");

        let err = RegistryError::NotFound {
            group: "net".into(),
            test: Some("t1".into()),
        };
        assert_eq!(err.to_string(), "no such test: net.t1");

        let err = RegistryError::Busy {
            group: "net".into(),
            test: "t1".into(),
        };
        assert_eq!(err.to_string(), "test set net still active with test t1");
        assert!(err.is_busy());
        assert!(!RegistryError::OutOfMemory.is_busy());
    }
}
