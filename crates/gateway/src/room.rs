//! Room registration with the authority, with a local fallback.
//!
//! When the authority cannot be reached at startup the orchestrator still
//! serves traffic under a locally generated id. That room is unknown to the
//! authority, so the mode is carried on [`Room`] and surfaced by `/health`.

use std::time::{SystemTime, UNIX_EPOCH};

use {
    secrecy::Secret,
    serde::Serialize,
    tracing::{info, warn},
};

use crate::{
    authority::{AuthorityClient, HostIdentity, RoomSpec},
    error::AuthorityError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomMode {
    /// Created by the authority; deleted again on shutdown.
    Registered,
    /// Local id only; the authority does not know this room.
    Fallback,
}

pub struct Room {
    pub id: String,
    pub mode: RoomMode,
    host_key: Option<Secret<String>>,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Room {
    /// A room the authority has never heard of, id `room-<unix seconds>`.
    pub fn fallback() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            id: format!("room-{secs}"),
            mode: RoomMode::Fallback,
            host_key: None,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.mode == RoomMode::Registered
    }
}

/// Register the host and create the room, falling back to a local id if
/// either call fails.
pub async fn open_room(
    client: &AuthorityClient,
    host: &HostIdentity,
    registration_secret: Option<&Secret<String>>,
    spec: &RoomSpec,
) -> Room {
    match register(client, host, registration_secret, spec).await {
        Ok(room) => {
            info!(room_id = %room.id, authority = %client.base_url(), "room registered");
            room
        },
        Err(e) => {
            let room = Room::fallback();
            warn!(
                room_id = %room.id,
                authority = %client.base_url(),
                error = %e,
                "room registration failed, running with an unregistered fallback room"
            );
            room
        },
    }
}

async fn register(
    client: &AuthorityClient,
    host: &HostIdentity,
    registration_secret: Option<&Secret<String>>,
    spec: &RoomSpec,
) -> Result<Room, AuthorityError> {
    let host_key = client.register_host(host, registration_secret).await?;
    let id = client.create_room(&host_key, spec).await?;
    Ok(Room {
        id,
        mode: RoomMode::Registered,
        host_key: Some(host_key),
    })
}

/// Delete a registered room. Fallback rooms are skipped; failures are
/// logged only.
pub async fn close_room(client: &AuthorityClient, room: &Room) {
    let Some(host_key) = room.host_key.as_ref().filter(|_| room.is_registered()) else {
        info!(room_id = %room.id, "fallback room, nothing to delete");
        return;
    };
    match client.delete_room(host_key, &room.id).await {
        Ok(()) => info!(room_id = %room.id, "room deleted"),
        Err(e) => warn!(room_id = %room.id, error = %e, "failed to delete room"),
    }
}
