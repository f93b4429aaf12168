//! Wire protocol shared by the orchestrator, participant processes and
//! frontends.
//!
//! Every frame is a JSON text message with a `type` discriminator:
//! - participant → orchestrator: [`ParticipantFrame`]
//! - observer → orchestrator: [`ObserverFrame`]
//! - orchestrator → everyone: [`Event`] (broadcast), plus the unicast
//!   [`Event::RoomState`] / [`Event::Error`] and [`TurnRequest`].

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// Route served to frontends (observers).
pub const OBSERVER_PATH: &str = "/frontend";
/// Route served to agents (participants).
pub const PARTICIPANT_PATH: &str = "/agent";

/// WebSocket close codes used by the orchestrator.
pub mod close_codes {
    /// RFC 6455 "policy violation", used for every authentication failure.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// RFC 6455 "going away", sent when a reconnect replaces a connection.
    pub const GOING_AWAY: u16 = 1001;
}

/// Message sent to an observer that asks to start a conversation while no
/// participant is connected.
pub const NO_AGENTS_MESSAGE: &str = "No agents connected";

// ── Profiles ─────────────────────────────────────────────────────────────────

/// Public profile of an authenticated participant, as issued by the
/// external authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub color: String,
}

// ── Inbound frames ───────────────────────────────────────────────────────────

/// Frames a participant may send. Unknown types fail to parse and are
/// ignored by the read loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParticipantFrame {
    Identify {
        #[serde(rename = "apiKey")]
        api_key: String,
    },
    TurnResponse(TurnResponse),
}

/// A participant's answer to a [`TurnRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResponse {
    #[serde(default)]
    pub text: String,
    /// Base64-encoded audio rendering of `text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl TurnResponse {
    /// Audio payload, treating an empty string as absent.
    pub fn audio(&self) -> Option<&str> {
        self.audio.as_deref().filter(|a| !a.is_empty())
    }
}

/// Frames an observer may send.
///
/// `start_conversation` fields are lenient: a value of the wrong shape
/// (a negative or fractional `max_turns`, a non-string `topic`) reads as
/// absent so the configured default applies instead of the frame being
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverFrame {
    StartConversation {
        #[serde(default, deserialize_with = "lenient")]
        topic: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        max_turns: Option<u32>,
    },
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Field<T> {
        Valid(T),
        Invalid(serde::de::IgnoredAny),
    }

    Ok(match Option::<Field<T>>::deserialize(deserializer)? {
        Some(Field::Valid(value)) => Some(value),
        Some(Field::Invalid(_)) | None => None,
    })
}

// ── Outbound frames ──────────────────────────────────────────────────────────

/// Direct request to the participant whose turn it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "turn_request")]
pub struct TurnRequest {
    pub context: String,
    /// Zero-based turn index.
    pub turn: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Events emitted by the orchestrator. Turn numbers in events are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    AgentJoined {
        agent: Profile,
        room_id: String,
    },
    AgentLeft {
        agent: Profile,
        room_id: String,
    },
    AgentThinking {
        agent: Profile,
        room_id: String,
    },
    TurnStart {
        turn: u32,
        speaker: Profile,
        room_id: String,
    },
    AgentResponse {
        agent: Profile,
        text: String,
        turn: u32,
        room_id: String,
    },
    AgentAudio {
        agent: Profile,
        audio: String,
        audio_size: usize,
        turn: u32,
        room_id: String,
    },
    ConversationStart {
        topic: String,
        max_turns: u32,
        room_id: String,
    },
    ConversationEnd {
        total_turns: u32,
        room_id: String,
    },
    /// Unicast to a newly connected observer.
    RoomState {
        room_id: String,
        agents: Vec<Profile>,
        active: bool,
    },
    /// Unicast to an observer whose request failed.
    Error {
        message: String,
    },
}

impl Event {
    /// The wire `type` of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentJoined { .. } => "agent_joined",
            Self::AgentLeft { .. } => "agent_left",
            Self::AgentThinking { .. } => "agent_thinking",
            Self::TurnStart { .. } => "turn_start",
            Self::AgentResponse { .. } => "agent_response",
            Self::AgentAudio { .. } => "agent_audio",
            Self::ConversationStart { .. } => "conversation_start",
            Self::ConversationEnd { .. } => "conversation_end",
            Self::RoomState { .. } => "room_state",
            Self::Error { .. } => "error",
        }
    }
}
