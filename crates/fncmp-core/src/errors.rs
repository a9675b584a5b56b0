//! Error codes and the engine-level error type.

use thiserror::Error;

// ── Error code constants ────────────────────────────────────────────

/// Connection, listener, handler or cache entry does not exist.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Cache entry holds a different type than the one requested.
pub const WRONG_TYPE: &str = "WRONG_TYPE";
/// An operation needed a session and none was supplied.
pub const MISSING_SESSION_CONTEXT: &str = "MISSING_SESSION_CONTEXT";
/// The transport rejected or could not carry a message.
pub const TRANSPORT_FAILURE: &str = "TRANSPORT_FAILURE";
/// A dispatch arrived with a function not valid in its direction.
pub const PROTOCOL_VIOLATION: &str = "PROTOCOL_VIOLATION";
/// A listener callback exceeded its time budget.
pub const CALLBACK_TIMEOUT: &str = "CALLBACK_TIMEOUT";
/// A listener or route callback panicked.
pub const CALLBACK_PANICKED: &str = "CALLBACK_PANICKED";
/// A component failed to render.
pub const RENDER_FAILED: &str = "RENDER_FAILED";
/// A frame or payload could not be decoded.
pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";

/// Which queue a dispatch was travelling on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Client to server.
    Inbound,
    /// Server to client.
    Outbound,
}

impl Direction {
    /// Lowercase label used in messages and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while routing, rendering or publishing dispatches.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A lookup missed.
    #[error("{what} not found: {id}")]
    NotFound {
        /// Kind of thing looked up (`"connection"`, `"listener"`, ...).
        what: &'static str,
        /// The id that missed.
        id: String,
    },

    /// A typed read or write hit a value of another type.
    #[error("wrong type: expected {expected}, found {found}")]
    WrongType {
        /// Requested type name.
        expected: &'static str,
        /// Stored type name.
        found: &'static str,
    },

    /// No session was available for a session-scoped operation.
    #[error("missing session context")]
    MissingSessionContext,

    /// The connection is closed or its write failed.
    #[error("transport failure on {conn_id}: {reason}")]
    TransportFailure {
        /// Affected connection.
        conn_id: String,
        /// What went wrong.
        reason: String,
    },

    /// The dispatch function is not allowed in this direction.
    #[error("unexpected {direction} dispatch function '{function}'")]
    ProtocolViolation {
        /// The offending function name.
        function: String,
        /// Queue it arrived on.
        direction: Direction,
    },

    /// A callback did not finish within the configured timeout.
    #[error("callback for listener {listener_id} timed out after {timeout_ms}ms")]
    CallbackTimeout {
        /// Listener whose callback was running.
        listener_id: String,
        /// Budget that was exceeded.
        timeout_ms: u64,
    },

    /// A callback panicked; the panic was contained.
    #[error("callback for {listener_id} panicked")]
    CallbackPanicked {
        /// Listener id or route path of the callback.
        listener_id: String,
    },

    /// Rendering a component failed.
    #[error("render failed: {0}")]
    Render(#[from] std::io::Error),

    /// A frame or payload was not valid JSON for its target type.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

impl DispatchError {
    /// Convenience constructor for lookup misses.
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => NOT_FOUND,
            Self::WrongType { .. } => WRONG_TYPE,
            Self::MissingSessionContext => MISSING_SESSION_CONTEXT,
            Self::TransportFailure { .. } => TRANSPORT_FAILURE,
            Self::ProtocolViolation { .. } => PROTOCOL_VIOLATION,
            Self::CallbackTimeout { .. } => CALLBACK_TIMEOUT,
            Self::CallbackPanicked { .. } => CALLBACK_PANICKED,
            Self::Render(_) => RENDER_FAILED,
            Self::InvalidPayload(_) => INVALID_PAYLOAD,
        }
    }
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
