//! Error types for the caching engine.

use std::fmt;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the caching engine.
///
/// All engine operations return `Result<T>` where `Result` is defined as
/// `std::result::Result<T, Error>`. Errors are `Clone` so that a single
/// failed factory or refresh can settle every waiter attached to the same
/// in-flight operation.
#[derive(Debug, Clone)]
pub enum Error {
    /// Serialization failed when converting a payload to cache bytes.
    SerializationError(String),

    /// Deserialization failed when converting cache bytes to a payload.
    ///
    /// Indicates corrupted or malformed data in the backing store.
    ///
    /// **Recovery:** the entry is treated as a miss and recomputed.
    DeserializationError(String),

    /// Invalid cache entry: corrupted envelope or bad magic.
    ///
    /// Returned when the entry header is not a valid engine envelope,
    /// e.g. foreign data stored under one of our keys.
    InvalidCacheEntry(String),

    /// Schema version mismatch between code and cached data.
    ///
    /// Raised after a deployment changed the cached payload schema. The
    /// entry is evicted and recomputed on the next access; no action
    /// needed.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from the cached entry)
        found: u32,
    },

    /// Cache backend error (store unreachable, protocol error, ...).
    ///
    /// Treated as soft on read paths: `remember` falls back to direct
    /// computation instead of failing the request.
    BackendError(String),

    /// Data store failure, classified by [`crate::classifier::classify`].
    StoreError(StoreError),

    /// Configuration error during engine construction.
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::StoreError(e) => write!(f, "Store error: {}", e),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// The shape under which a failed data-access call is inspected.
///
/// Drivers surface failures in many forms; the engine normalizes them into
/// this one value so that classification happens exactly once and the retry
/// executor and availability tracker can never disagree about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The client/pool failed to initialize or lost its connection setup.
    Initialization,
    /// The store rejected or failed a request (carries an SQLSTATE-style code).
    Request,
    /// The driver or wire protocol broke mid-conversation.
    Protocol,
    /// Anything else.
    Other,
}

/// A failure from one logical data-access call.
///
/// `code` is an SQLSTATE-style error code when the store provided one;
/// `target` names the table/constraint/connection the failure points at.
#[derive(Debug, Clone)]
pub struct StoreError {
    kind: StoreErrorKind,
    code: Option<String>,
    message: String,
    target: Option<String>,
}

impl StoreError {
    /// Failure while establishing the client or its connections.
    pub fn initialization(message: impl Into<String>) -> Self {
        StoreError {
            kind: StoreErrorKind::Initialization,
            code: None,
            message: message.into(),
            target: None,
        }
    }

    /// A request-level failure with the store's error code.
    pub fn request(code: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError {
            kind: StoreErrorKind::Request,
            code: Some(code.into()),
            message: message.into(),
            target: None,
        }
    }

    /// A driver/protocol-level failure.
    pub fn protocol(message: impl Into<String>) -> Self {
        StoreError {
            kind: StoreErrorKind::Protocol,
            code: None,
            message: message.into(),
            target: None,
        }
    }

    /// An uncategorized failure.
    pub fn other(message: impl Into<String>) -> Self {
        StoreError {
            kind: StoreErrorKind::Other,
            code: None,
            message: message.into(),
            target: None,
        }
    }

    /// Attach the table/constraint/connection the failure points at.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Short human-readable tag for log lines: the code when present,
    /// otherwise the message.
    pub fn describe(&self) -> &str {
        self.code.as_deref().unwrap_or(&self.message)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::StoreError(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
