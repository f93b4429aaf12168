//! Conversation state machine and the round-robin turn loop.
//!
//! A session moves Idle → Active → Ending → Idle. At most one turn loop runs
//! at a time; the phase check and the transition to Active happen under the
//! same write lock, so two racing starts cannot both win.

use std::{sync::Arc, time::Duration};

use {
    roundtable_config::ConversationConfig,
    roundtable_protocol::{Event, TurnRequest},
    serde::Serialize,
    tokio::{sync::RwLock, task::JoinHandle},
    tracing::{debug, info, warn},
};

use crate::{
    error::{StartError, TurnError},
    registry::{ConnectionRegistry, Participant},
};

// ── Session state ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Active,
    /// Broadcasting `conversation_end`; returns to Idle right after.
    Ending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub speaker: String,
    pub text: String,
}

/// Read-only view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub topic: String,
    pub max_turns: u32,
    pub turn: u32,
}

#[derive(Debug)]
struct SessionState {
    phase: Phase,
    topic: String,
    max_turns: u32,
    turn: u32,
    transcript: Vec<TranscriptEntry>,
    /// Speaking order captured at start; refreshed from the registry when
    /// the selected participant has gone.
    order: Vec<String>,
}

/// Turn-loop tuning, taken from the `conversation` config section.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub default_topic: String,
    pub default_max_turns: u32,
    pub turn_timeout: Duration,
    pub pre_turn_delay: Duration,
    pub inter_turn_delay: Duration,
}

impl From<&ConversationConfig> for SessionSettings {
    fn from(config: &ConversationConfig) -> Self {
        Self {
            default_topic: config.topic.clone(),
            default_max_turns: config.max_turns,
            turn_timeout: config.turn_timeout(),
            pre_turn_delay: config.pre_turn_delay(),
            inter_turn_delay: config.inter_turn_delay(),
        }
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

/// Sole owner of [`SessionState`]. Drives participants through turns and
/// broadcasts every step to the room.
pub struct SessionController {
    registry: Arc<ConnectionRegistry>,
    room_id: String,
    settings: SessionSettings,
    state: RwLock<SessionState>,
}

impl SessionController {
    pub fn new(registry: Arc<ConnectionRegistry>, room_id: String, settings: SessionSettings) -> Self {
        let state = SessionState {
            phase: Phase::Idle,
            topic: settings.default_topic.clone(),
            max_turns: settings.default_max_turns,
            turn: 0,
            transcript: Vec::new(),
            order: Vec::new(),
        };
        Self {
            registry,
            room_id,
            settings,
            state: RwLock::new(state),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.state.read().await.phase != Phase::Idle
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            phase: state.phase,
            topic: state.topic.clone(),
            max_turns: state.max_turns,
            turn: state.turn,
        }
    }

    /// Transcript of the current (or most recent) conversation.
    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.state.read().await.transcript.clone()
    }

    /// Move Idle → Active and spawn the turn loop.
    ///
    /// Missing `topic`/`max_turns` fall back to the configured defaults. The
    /// returned handle resolves to the number of turns taken.
    pub async fn start(
        self: &Arc<Self>,
        topic: Option<String>,
        max_turns: Option<u32>,
    ) -> Result<JoinHandle<u32>, StartError> {
        let order = self.registry.participant_order().await;
        if order.is_empty() {
            return Err(StartError::NoParticipants);
        }

        let (topic, max_turns) = {
            let mut state = self.state.write().await;
            if state.phase != Phase::Idle {
                return Err(StartError::AlreadyActive);
            }
            state.phase = Phase::Active;
            state.topic = topic
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| self.settings.default_topic.clone());
            state.max_turns = max_turns.unwrap_or(self.settings.default_max_turns);
            state.turn = 0;
            state.transcript.clear();
            state.order = order;
            (state.topic.clone(), state.max_turns)
        };

        info!(room_id = %self.room_id, topic = %topic, max_turns, "conversation starting");
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.run(topic, max_turns).await }))
    }

    async fn run(&self, topic: String, max_turns: u32) -> u32 {
        self.registry
            .broadcast(&Event::ConversationStart {
                topic: topic.clone(),
                max_turns,
                room_id: self.room_id.clone(),
            })
            .await;

        let mut context = format!("Topic: {topic}");
        loop {
            let (turn, order) = {
                let state = self.state.read().await;
                (state.turn, state.order.clone())
            };
            if turn >= max_turns {
                break;
            }

            let live = self.registry.participant_order().await;
            if live.is_empty() {
                info!(turn, "no participants left, ending conversation");
                break;
            }

            let speaker = match order.get(turn as usize % order.len().max(1)) {
                Some(id) => self.registry.participant(id).await,
                None => None,
            };
            let Some(speaker) = speaker else {
                debug!(turn, "selected participant is gone, refreshing speaking order");
                self.state.write().await.order = live;
                continue;
            };

            self.take_turn(&speaker, turn, &topic, &mut context).await;

            tokio::time::sleep(self.settings.inter_turn_delay).await;
            self.state.write().await.turn += 1;
        }

        let total_turns = {
            let mut state = self.state.write().await;
            state.phase = Phase::Ending;
            state.turn
        };
        self.registry
            .broadcast(&Event::ConversationEnd {
                total_turns,
                room_id: self.room_id.clone(),
            })
            .await;
        self.state.write().await.phase = Phase::Idle;
        info!(room_id = %self.room_id, total_turns, "conversation ended");
        total_turns
    }

    /// One request/response cycle with `speaker`. Timeouts and departures
    /// leave no transcript entry; the caller moves on either way.
    async fn take_turn(&self, speaker: &Participant, turn: u32, topic: &str, context: &mut String) {
        let profile = &speaker.profile;
        self.registry
            .broadcast(&Event::AgentThinking {
                agent: profile.clone(),
                room_id: self.room_id.clone(),
            })
            .await;
        self.registry
            .broadcast(&Event::TurnStart {
                turn: turn + 1,
                speaker: profile.clone(),
                room_id: self.room_id.clone(),
            })
            .await;

        tokio::time::sleep(self.settings.pre_turn_delay).await;

        if speaker.slot.drain() {
            debug!(agent_id = %profile.id, turn, "dropped stale turn response");
        }
        let request = TurnRequest {
            context: context.clone(),
            turn,
            topic: (turn == 0).then(|| topic.to_string()),
        };
        if let Err(e) = speaker
            .conn
            .send_json(&request, self.registry.send_timeout())
            .await
        {
            warn!(agent_id = %profile.id, turn, error = %e, "failed to send turn request");
            return;
        }
        debug!(agent_id = %profile.id, turn, "turn requested");

        let response = match speaker.slot.take(self.settings.turn_timeout).await {
            Ok(response) => response,
            Err(TurnError::TimedOut) => {
                warn!(agent_id = %profile.id, turn, "participant timed out, skipping turn");
                return;
            },
            Err(e) => {
                info!(agent_id = %profile.id, turn, error = %e, "turn abandoned");
                return;
            },
        };

        info!(agent = %profile.name, turn = turn + 1, "participant responded");
        self.state.write().await.transcript.push(TranscriptEntry {
            speaker: profile.name.clone(),
            text: response.text.clone(),
        });
        context.clone_from(&response.text);

        self.registry
            .broadcast(&Event::AgentResponse {
                agent: profile.clone(),
                text: response.text.clone(),
                turn: turn + 1,
                room_id: self.room_id.clone(),
            })
            .await;
        if let Some(audio) = response.audio() {
            self.registry
                .broadcast(&Event::AgentAudio {
                    agent: profile.clone(),
                    audio: audio.to_string(),
                    audio_size: audio.len(),
                    turn: turn + 1,
                    room_id: self.room_id.clone(),
                })
                .await;
        }
    }
}
