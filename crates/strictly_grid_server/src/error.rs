//! Session error types.

use derive_more::{Display, Error};
use tracing::instrument;

/// Why a request against the session was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SessionErrorKind {
    /// Both slots are taken (or a match is already running).
    #[display("The match is already full")]
    SessionFull,
    /// Reconnect token does not belong to any slot.
    #[display("Unknown player identity, please join again")]
    UnknownIdentity,
    /// Out-of-turn, inactive-session or occupied-cell action.
    #[display("Illegal action")]
    IllegalAction,
    /// Requested board size or mode is not offered.
    #[display("Unsupported configuration: {}", _0)]
    UnsupportedConfiguration(String),
    /// Inbound frame could not be parsed.
    #[display("Malformed message: {}", _0)]
    MalformedMessage(String),
}

impl SessionErrorKind {
    /// Whether the sender gets an `error` reply for this kind.
    ///
    /// Illegal actions and malformed frames are only logged.
    pub fn is_reported(&self) -> bool {
        matches!(
            self,
            SessionErrorKind::SessionFull
                | SessionErrorKind::UnknownIdentity
                | SessionErrorKind::UnsupportedConfiguration(_)
        )
    }
}

/// Session error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Session error: {} at {}:{}", kind, file, line)]
pub struct SessionError {
    /// What went wrong.
    pub kind: SessionErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl SessionError {
    /// Creates a new session error with caller location tracking.
    #[track_caller]
    #[instrument]
    pub fn new(kind: SessionErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Text sent to the client in an `error` reply.
    pub fn client_message(&self) -> String {
        self.kind.to_string()
    }
}

impl From<strictly_grid::BoardError> for SessionError {
    #[track_caller]
    fn from(err: strictly_grid::BoardError) -> Self {
        Self::new(SessionErrorKind::UnsupportedConfiguration(err.to_string()))
    }
}

impl From<serde_json::Error> for SessionError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::new(SessionErrorKind::MalformedMessage(err.to_string()))
    }
}
