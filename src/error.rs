use std::time::Duration;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::model::reason_phrase::ReasonPhrase;

pub type Result<T> = std::result::Result<T, MoqtError>;

/// Error codes used when terminating a session. They are sent to the peer as the application
///  error code when closing the underlying connection.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum TerminationCode {
    NoError = 0x0,
    InternalError = 0x1,
    Unauthorized = 0x2,
    ProtocolViolation = 0x3,
    InvalidRequestId = 0x4,
    DuplicateTrackAlias = 0x5,
    KeyValueFormattingError = 0x6,
    TooManyRequests = 0x7,
    InvalidPath = 0x8,
    MalformedPath = 0x9,
    GoawayTimeout = 0x10,
    ControlMessageTimeout = 0x11,
    DataStreamTimeout = 0x12,
    AuthTokenCacheOverflow = 0x13,
    DuplicateAuthTokenAlias = 0x14,
    VersionNegotiationFailed = 0x15,
    MalformedAuthToken = 0x16,
    UnknownAuthTokenAlias = 0x17,
    ExpiredAuthToken = 0x18,
    InvalidAuthority = 0x19,
    MalformedAuthority = 0x1A,
}

#[derive(Debug, Error)]
pub enum MoqtError {
    #[error("unexpected end of input: {needed} bytes needed, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("value {0} exceeds the maximum varint value")]
    VarIntBoundsExceeded(u64),

    #[error("key-value formatting error: {0}")]
    KeyValueFormatting(ReasonPhrase),

    #[error("protocol violation ({code:?}): {reason}")]
    ProtocolViolation { code: TerminationCode, reason: ReasonPhrase },

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl MoqtError {
    pub fn protocol_violation(reason: impl AsRef<str>) -> MoqtError {
        Self::violation(TerminationCode::ProtocolViolation, reason)
    }

    /// a protocol violation with a more specific termination code
    pub fn violation(code: TerminationCode, reason: impl AsRef<str>) -> MoqtError {
        MoqtError::ProtocolViolation {
            code,
            reason: ReasonPhrase::truncating(reason.as_ref()),
        }
    }

    pub fn key_value_formatting(reason: impl AsRef<str>) -> MoqtError {
        MoqtError::KeyValueFormatting(ReasonPhrase::truncating(reason.as_ref()))
    }

    pub fn unexpected_end(needed: usize, remaining: usize) -> MoqtError {
        MoqtError::UnexpectedEnd { needed, remaining }
    }

    /// The code to close the session with when this error terminates it. Malformed input is
    ///  treated as a protocol violation.
    pub fn code(&self) -> TerminationCode {
        match self {
            MoqtError::UnexpectedEnd { .. } => TerminationCode::ProtocolViolation,
            MoqtError::VarIntBoundsExceeded(_) => TerminationCode::ProtocolViolation,
            MoqtError::KeyValueFormatting(_) => TerminationCode::KeyValueFormattingError,
            MoqtError::ProtocolViolation { code, .. } => *code,
            MoqtError::Transport(_) => TerminationCode::InternalError,
            MoqtError::Timeout(_) => TerminationCode::ControlMessageTimeout,
        }
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, MoqtError::ProtocolViolation { .. })
    }
}

/// Determines how a session should be terminated after `err`: the first [MoqtError] in the
///  error's chain decides the code, anything else is an internal error.
pub fn termination_of(err: &anyhow::Error) -> (TerminationCode, ReasonPhrase) {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<MoqtError>() {
            return (e.code(), ReasonPhrase::truncating(&format!("{:#}", err)));
        }
    }
    (TerminationCode::InternalError, ReasonPhrase::truncating(&format!("{:#}", err)))
}
