use std::{sync::Arc, time::Duration};

use {
    roundtable_config::RoundtableConfig,
    roundtable_protocol::Event,
};

use crate::{
    auth::IdentityVerifier,
    connection::Connection,
    error::SendError,
    registry::ConnectionRegistry,
    room::{Room, RoomMode},
    session::{SessionController, SessionSettings},
};

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across async tasks.
pub struct GatewayState {
    /// Every live observer and participant connection.
    pub registry: Arc<ConnectionRegistry>,
    /// Owner of the conversation state and turn loop.
    pub session: Arc<SessionController>,
    /// Resolves participant credentials during the identify handshake.
    pub verifier: Arc<dyn IdentityVerifier>,
    pub room_id: String,
    pub room_mode: RoomMode,
    /// How long a participant has to identify after connecting.
    pub identify_timeout: Duration,
    /// Per-connection outbound buffer size.
    pub outbound_queue: usize,
    /// Server version string.
    pub version: String,
}

impl GatewayState {
    pub fn new(
        config: &RoundtableConfig,
        room: &Room,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Arc<Self> {
        let conversation = &config.conversation;
        let registry = Arc::new(ConnectionRegistry::new(conversation.send_timeout()));
        let session = Arc::new(SessionController::new(
            Arc::clone(&registry),
            room.id.clone(),
            SessionSettings::from(conversation),
        ));

        Arc::new(Self {
            registry,
            session,
            verifier,
            room_id: room.id.clone(),
            room_mode: room.mode,
            identify_timeout: conversation.identify_timeout(),
            outbound_queue: config.server.outbound_queue,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Register a newly connected observer. Its one-time `room_state` is
    /// queued ahead of any broadcast it will receive.
    pub async fn add_observer(&self, conn: Arc<Connection>) -> Result<(), SendError> {
        let room_id = self.room_id.clone();
        let active = self.session.is_active().await;
        self.registry
            .add_observer(conn, |agents| Event::RoomState {
                room_id,
                agents,
                active,
            })
            .await
    }
}
