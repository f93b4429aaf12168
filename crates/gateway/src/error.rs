use thiserror::Error;

/// Why a participant could not be authenticated. Every variant closes the
/// connection with the policy-violation status.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no identify frame within the handshake window")]
    HandshakeTimeout,
    #[error("connection closed before identify")]
    Disconnected,
    #[error("first frame was not an identify frame with an api key")]
    IdentifyRequired,
    #[error("authority rejected the credential: {status} {body}")]
    Rejected { status: u16, body: String },
    #[error("authority unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("authority returned an unreadable profile: {0}")]
    Malformed(#[source] reqwest::Error),
}

impl AuthError {
    /// Reason text sent in the close frame.
    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::HandshakeTimeout | Self::Disconnected | Self::IdentifyRequired => "Auth required",
            Self::Rejected { .. } | Self::Transport(_) | Self::Malformed(_) => "Invalid API Key",
        }
    }
}

/// Failures talking to the authority outside the identify handshake.
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("authority request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Outcome of waiting on a turn slot that did not yield a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("participant did not respond in time")]
    TimedOut,
    #[error("participant left before responding")]
    Abandoned,
    #[error("another reader is already waiting on this slot")]
    Busy,
}

/// Why a turn response could not be handed to the turn loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("a response is already pending for this participant")]
    SlotOccupied,
    #[error("participant slot was abandoned")]
    Abandoned,
}

/// Why a `start_conversation` request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("no participants connected")]
    NoParticipants,
    #[error("a conversation is already active")]
    AlreadyActive,
}

/// A single outbound frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    #[error("send timed out")]
    TimedOut,
    #[error("frame could not be serialized")]
    Serialize,
}
