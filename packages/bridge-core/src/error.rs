//! # Error Handling
//!
//! Error types for the platform bridge.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Lifecycle Errors                                                  │
//! │  │   ├── NotInitialized        - No bridge installed                   │
//! │  │   ├── AlreadyInitialized    - Bridge already installed              │
//! │  │   └── InvalidConfig         - Configuration rejected                │
//! │  │                                                                      │
//! │  ├── Marshaling Errors                                                 │
//! │  │   ├── InvalidArgument       - Absent string, interior NUL, ...      │
//! │  │   ├── TypeError             - Key-value of unsupported type         │
//! │  │   ├── InvalidEncoding       - Native string is not UTF-8            │
//! │  │   ├── TimestampOutOfRange   - Instant not representable             │
//! │  │   └── AllocationFailed      - Native allocator returned null        │
//! │  │                                                                      │
//! │  ├── Dispatch Errors                                                   │
//! │  │   ├── DispatchFailed        - Native call returned the sentinel     │
//! │  │   ├── DuplicateRequestHandle- Handle already in flight              │
//! │  │   └── UnknownEntryPoint     - Symbol not bound                      │
//! │  │                                                                      │
//! │  └── Decoding Errors                                                   │
//! │      ├── UnknownMessageType    - Tag outside the closed enumeration    │
//! │      ├── PayloadMismatch       - Extractor does not match the tag      │
//! │      ├── ErrorMessage          - Success payload read on a failure     │
//! │      ├── NotApplicable         - Accessor not valid for this message   │
//! │      ├── MalformedDataStore    - Null or duplicate keys                │
//! │      └── NullPayload           - Accessor returned null                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Operation failures reported by the native side are *not* errors of this
//! type: they arrive as messages with the error flag set and are surfaced
//! as [`crate::ErrorRecord`] inside an [`crate::Envelope`].

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the platform bridge
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Lifecycle Errors (100-199)
    // ========================================================================

    /// No bridge has been installed
    #[error("Platform bridge has not been installed. Call PlatformBridge::install() first.")]
    NotInitialized,

    /// A bridge has already been installed
    #[error("Platform bridge has already been installed.")]
    AlreadyInitialized,

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Marshaling Errors (200-299)
    // ========================================================================

    /// Argument cannot be represented natively
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Key-value entry holds a value the native tagged union cannot carry
    #[error("Unsupported value for key '{key}': {found} (expected string, 32-bit integer or double)")]
    TypeError {
        /// Offending key
        key: String,
        /// Description of the rejected value
        found: &'static str,
    },

    /// Native string is not valid UTF-8
    #[error("Invalid UTF-8 in native string: {0}")]
    InvalidEncoding(String),

    /// Instant cannot be represented as unsigned seconds since the epoch
    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(String),

    /// Native allocator returned null
    #[error("Native allocation of {0} bytes failed")]
    AllocationFailed(usize),

    // ========================================================================
    // Dispatch Errors (300-399)
    // ========================================================================

    /// Native entry point returned the invalid-request sentinel
    #[error("Native call {entry} failed to start a request")]
    DispatchFailed {
        /// Resolved symbol name
        entry: String,
    },

    /// Native layer issued a handle that is still in flight
    #[error("Native layer returned request handle {0} which is already in flight")]
    DuplicateRequestHandle(u64),

    /// Symbol not bound in the native layer
    #[error("Unknown native entry point: {0}")]
    UnknownEntryPoint(String),

    // ========================================================================
    // Decoding Errors (400-499)
    // ========================================================================

    /// Type tag outside the known enumeration
    #[error("Unknown message type tag: {0:#010x}")]
    UnknownMessageType(u32),

    /// Extraction requested a shape the message does not carry
    #[error("Payload mismatch: {message_type} carries {actual}, not {expected}")]
    PayloadMismatch {
        /// Message type symbol
        message_type: &'static str,
        /// Shape the caller asked for
        expected: &'static str,
        /// Shape the tag maps to
        actual: &'static str,
    },

    /// Success payload requested from a message whose error flag is set
    #[error("Message reports a failed operation ({code}): {message}")]
    ErrorMessage {
        /// Native error code
        code: i32,
        /// Machine message
        message: String,
    },

    /// Accessor does not apply to this message
    #[error("Not applicable: {0}")]
    NotApplicable(String),

    /// Data store enumeration produced null or duplicate keys
    #[error("Malformed data store: {0}")]
    MalformedDataStore(String),

    /// Native accessor returned null where a value was required
    #[error("Native accessor returned null for {0}")]
    NullPayload(&'static str),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// - 100-199: Lifecycle
    /// - 200-299: Marshaling
    /// - 300-399: Dispatch
    /// - 400-499: Decoding
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Lifecycle (100-199)
            Error::NotInitialized => 100,
            Error::AlreadyInitialized => 101,
            Error::InvalidConfig(_) => 102,

            // Marshaling (200-299)
            Error::InvalidArgument(_) => 200,
            Error::TypeError { .. } => 201,
            Error::InvalidEncoding(_) => 202,
            Error::TimestampOutOfRange(_) => 203,
            Error::AllocationFailed(_) => 204,

            // Dispatch (300-399)
            Error::DispatchFailed { .. } => 300,
            Error::DuplicateRequestHandle(_) => 301,
            Error::UnknownEntryPoint(_) => 302,

            // Decoding (400-499)
            Error::UnknownMessageType(_) => 400,
            Error::PayloadMismatch { .. } => 401,
            Error::ErrorMessage { .. } => 402,
            Error::NotApplicable(_) => 403,
            Error::MalformedDataStore(_) => 404,
            Error::NullPayload(_) => 405,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
        }
    }

    /// Check if this error is a programmer error at the boundary
    ///
    /// Contract violations abort the specific call; they are never retried.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_)
                | Error::TypeError { .. }
                | Error::InvalidEncoding(_)
                | Error::PayloadMismatch { .. }
                | Error::ErrorMessage { .. }
                | Error::NotApplicable(_)
                | Error::MalformedDataStore(_)
                | Error::UnknownMessageType(_)
        )
    }

    /// Check if this error was reported synchronously by the native layer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::DispatchFailed { .. } | Error::UnknownEntryPoint(_) | Error::AllocationFailed(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NotInitialized.code(), 100);
        assert_eq!(Error::InvalidArgument("x".into()).code(), 200);
        assert_eq!(
            Error::DispatchFailed {
                entry: "plat_User_Get".into()
            }
            .code(),
            300
        );
        assert_eq!(Error::UnknownMessageType(7).code(), 400);
        assert_eq!(Error::Internal("x".into()).code(), 900);
    }

    #[test]
    fn test_contract_violations() {
        assert!(Error::TypeError {
            key: "score".into(),
            found: "bool"
        }
        .is_contract_violation());
        assert!(Error::PayloadMismatch {
            message_type: "User_GetAccessToken",
            expected: "blob",
            actual: "text"
        }
        .is_contract_violation());
        assert!(!Error::DispatchFailed { entry: "x".into() }.is_contract_violation());
        assert!(Error::DispatchFailed { entry: "x".into() }.is_transport());
    }

    #[test]
    fn test_unknown_tag_display() {
        let msg = Error::UnknownMessageType(0xBEEF).to_string();
        assert!(msg.contains("0x0000beef"), "{msg}");
    }
}
