use thiserror::Error;

/// Wire `kind` strings carried by error responses.
pub mod kind {
    pub const CONNECTION: &str = "connection";
    pub const INCOMPLETE_FRAME: &str = "incomplete_frame";
    pub const FRAME_TOO_LARGE: &str = "frame_too_large";
    pub const UNKNOWN_OPCODE: &str = "unknown_opcode";
    pub const UNEXPECTED_OPCODE: &str = "unexpected_opcode";
    pub const MALFORMED_BODY: &str = "malformed_body";
    pub const EXECUTION: &str = "execution";
    pub const TIMEOUT: &str = "timeout";
    pub const RESULT_TOO_LARGE: &str = "result_too_large";
    pub const TYPE_COERCION: &str = "type_coercion";
    pub const UNSUPPORTED: &str = "unsupported";
}

/// Framing and envelope violations. All of them are fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolErrorKind {
    #[error("incomplete frame")]
    IncompleteFrame,

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u64, max: usize },

    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("unexpected opcode 0x{0:02x}")]
    UnexpectedOpcode(u8),

    #[error("malformed body: {0}")]
    MalformedBody(String),

    /// The peer detected a protocol violation and reported it before closing.
    #[error("peer rejected the exchange ({kind}): {message}")]
    PeerRejected { kind: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentErrorKind {
    #[error("type coercion failed: {0}")]
    TypeCoercion(String),
}

/// Driver protocol error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Dial, read or write failure
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(ProtocolErrorKind),

    /// Failure reported by the backing engine
    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Argument error: {0}")]
    ArgumentError(ArgumentErrorKind),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl DriverError {
    pub(crate) fn type_coercion(msg: impl Into<String>) -> Self {
        DriverError::ArgumentError(ArgumentErrorKind::TypeCoercion(msg.into()))
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        DriverError::ProtocolError(ProtocolErrorKind::MalformedBody(msg.into()))
    }

    /// Whether the connection that produced this error can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::ConnectionError(_) | DriverError::ProtocolError(_)
        )
    }

    /// The wire `kind` string for this error.
    pub fn kind(&self) -> &str {
        match self {
            DriverError::ConnectionError(_) => kind::CONNECTION,
            DriverError::ProtocolError(ProtocolErrorKind::IncompleteFrame) => {
                kind::INCOMPLETE_FRAME
            }
            DriverError::ProtocolError(ProtocolErrorKind::FrameTooLarge { .. }) => {
                kind::FRAME_TOO_LARGE
            }
            DriverError::ProtocolError(ProtocolErrorKind::UnknownOpcode(_)) => kind::UNKNOWN_OPCODE,
            DriverError::ProtocolError(ProtocolErrorKind::UnexpectedOpcode(_)) => {
                kind::UNEXPECTED_OPCODE
            }
            DriverError::ProtocolError(ProtocolErrorKind::MalformedBody(_)) => kind::MALFORMED_BODY,
            DriverError::ProtocolError(ProtocolErrorKind::PeerRejected {
                kind: peer_kind,
                ..
            }) => peer_kind.as_str(),
            DriverError::ExecutionError(_) => kind::EXECUTION,
            DriverError::ArgumentError(ArgumentErrorKind::TypeCoercion(_)) => kind::TYPE_COERCION,
            DriverError::UnsupportedOperation(_) => kind::UNSUPPORTED,
        }
    }

    /// The message without the category prefix, as sent in an error response.
    pub fn detail(&self) -> String {
        match self {
            DriverError::ConnectionError(msg)
            | DriverError::ExecutionError(msg)
            | DriverError::UnsupportedOperation(msg) => msg.clone(),
            DriverError::ArgumentError(ArgumentErrorKind::TypeCoercion(msg)) => msg.clone(),
            DriverError::ProtocolError(kind) => kind.to_string(),
        }
    }
}
