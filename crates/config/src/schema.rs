//! Config schema types (server, authority, conversation).

use std::time::Duration;

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundtableConfig {
    pub server: ServerConfig,
    pub authority: AuthorityConfig,
    pub conversation: ConversationConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Frames buffered per connection before sends start failing.
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8765,
            outbound_queue: 256,
        }
    }
}

/// The external authority (signaling server) that issues participant keys
/// and stores room metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Base URL, e.g. `http://signaling:8080`.
    pub url: String,
    /// Connection URL advertised for this room; participants dial it.
    pub public_url: String,
    /// Shared secret sent as `X-Registration-Secret` when registering the host.
    #[serde(skip_serializing)]
    pub registration_secret: Option<Secret<String>>,
    pub host_name: String,
    pub host_emoji: String,
    pub host_color: String,
    pub request_timeout_secs: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            url: "http://signaling:8080".into(),
            public_url: "ws://orchestrator:8765/agent".into(),
            registration_secret: None,
            host_name: "Orchestrator Host".into(),
            host_emoji: "🤖".into(),
            host_color: "#FF0000".into(),
            request_timeout_secs: 10,
        }
    }
}

impl AuthorityConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Room and turn-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub room_name: String,
    /// Topic used when `start_conversation` does not name one.
    pub topic: String,
    /// Turn count used when `start_conversation` does not give one.
    pub max_turns: u32,
    /// Room setting forwarded to the authority, in minutes.
    pub max_duration_mins: u32,
    pub allow_recording: bool,
    pub turn_timeout_secs: u64,
    pub identify_timeout_secs: u64,
    pub pre_turn_delay_ms: u64,
    pub inter_turn_delay_ms: u64,
    /// Upper bound on a single outbound send during broadcast.
    pub send_timeout_ms: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            room_name: "The future of autonomous AI agents".into(),
            topic: "General AI".into(),
            max_turns: 20,
            max_duration_mins: 60,
            allow_recording: true,
            turn_timeout_secs: 60,
            identify_timeout_secs: 5,
            pre_turn_delay_ms: 1_500,
            inter_turn_delay_ms: 1_000,
            send_timeout_ms: 2_000,
        }
    }
}

impl ConversationConfig {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn identify_timeout(&self) -> Duration {
        Duration::from_secs(self.identify_timeout_secs)
    }

    pub fn pre_turn_delay(&self) -> Duration {
        Duration::from_millis(self.pre_turn_delay_ms)
    }

    pub fn inter_turn_delay(&self) -> Duration {
        Duration::from_millis(self.inter_turn_delay_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}
