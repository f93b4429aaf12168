use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    futures::future::join_all,
    roundtable_protocol::{Event, Profile, close_codes},
    tokio::sync::RwLock,
    tracing::{debug, info, warn},
};

use crate::{connection::Connection, error::SendError, turn::TurnSlot};

// ── Participant ──────────────────────────────────────────────────────────────

/// An authenticated agent connection and its turn slot.
#[derive(Clone)]
pub struct Participant {
    pub profile: Profile,
    pub conn: Arc<Connection>,
    pub slot: Arc<TurnSlot>,
    /// Position in join order; kept across a same-id reconnect.
    joined_seq: u64,
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.profile.id)
            .field("name", &self.profile.name)
            .field("conn_id", &self.conn.conn_id)
            .finish()
    }
}

/// Read-only view handed to new observers and the turn loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    /// Participants in join order.
    pub participants: Vec<Profile>,
    pub observer_count: usize,
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Every live connection, split into observers (watch only) and
/// participants (take turns). Broadcast reaches both sets.
pub struct ConnectionRegistry {
    observers: RwLock<HashMap<String, Arc<Connection>>>,
    participants: RwLock<HashMap<String, Participant>>,
    next_seq: AtomicU64,
    /// Upper bound on one connection's share of a broadcast.
    send_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            participants: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            send_timeout,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Register an observer, queueing `greeting` (built from the current
    /// participants) before it becomes visible to broadcast.
    ///
    /// The observers lock is held across the snapshot and the insert, so
    /// the greeting is always the first frame and no broadcast issued after
    /// the snapshot is missed. The observer is registered even if the
    /// greeting could not be queued.
    pub async fn add_observer<F>(
        &self,
        conn: Arc<Connection>,
        greeting: F,
    ) -> Result<(), SendError>
    where
        F: FnOnce(Vec<Profile>) -> Event,
    {
        let mut observers = self.observers.write().await;
        let agents = profiles_in_join_order(&*self.participants.read().await);
        let queued = conn.send_json(&greeting(agents), self.send_timeout).await;
        observers.insert(conn.conn_id.clone(), conn);
        debug!(observers = observers.len(), "observer added");
        queued
    }

    /// Returns `false` if the connection was not registered.
    pub async fn remove_observer(&self, conn_id: &str) -> bool {
        self.observers.write().await.remove(conn_id).is_some()
    }

    /// Register an authenticated participant with a fresh turn slot.
    ///
    /// A previous record with the same id is replaced: its slot is abandoned
    /// and its connection asked to close.
    pub async fn add_participant(&self, profile: Profile, conn: Arc<Connection>) -> Participant {
        let mut participants = self.participants.write().await;
        let previous = participants.remove(&profile.id);
        let joined_seq = previous
            .as_ref()
            .map(|p| p.joined_seq)
            .unwrap_or_else(|| self.next_seq.fetch_add(1, Ordering::Relaxed));

        let participant = Participant {
            profile,
            conn,
            slot: Arc::new(TurnSlot::default()),
            joined_seq,
        };
        participants.insert(participant.profile.id.clone(), participant.clone());
        drop(participants);

        if let Some(old) = previous {
            info!(
                agent_id = %old.profile.id,
                old_conn = %old.conn.conn_id,
                new_conn = %participant.conn.conn_id,
                "participant reconnected, replacing previous connection"
            );
            old.slot.abandon();
            old.conn
                .close(close_codes::GOING_AWAY, "Replaced by a newer connection");
        }
        participant
    }

    /// Remove a participant by id and abandon its slot.
    pub async fn remove_participant(&self, id: &str) -> Option<Participant> {
        let removed = self.participants.write().await.remove(id)?;
        removed.slot.abandon();
        Some(removed)
    }

    /// Remove a participant only if it is still bound to `conn_id`.
    ///
    /// Used by a connection's own teardown so a stale socket cannot evict
    /// the record that replaced it.
    pub async fn release_participant(&self, id: &str, conn_id: &str) -> Option<Participant> {
        let mut participants = self.participants.write().await;
        if participants.get(id)?.conn.conn_id != conn_id {
            return None;
        }
        let removed = participants.remove(id)?;
        drop(participants);
        removed.slot.abandon();
        Some(removed)
    }

    pub async fn participant(&self, id: &str) -> Option<Participant> {
        self.participants.read().await.get(id).cloned()
    }

    /// Participant ids in join order.
    pub async fn participant_order(&self) -> Vec<String> {
        profiles_in_join_order(&*self.participants.read().await)
            .into_iter()
            .map(|p| p.id)
            .collect()
    }

    pub async fn participant_count(&self) -> usize {
        self.participants.read().await.len()
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let participants = profiles_in_join_order(&*self.participants.read().await);
        RoomSnapshot {
            participants,
            observer_count: self.observer_count().await,
        }
    }

    /// Deliver `event` to every observer and participant.
    ///
    /// The event is serialized once. Sends run concurrently, each bounded by
    /// the registry's send timeout; failures are logged and otherwise
    /// ignored. Returns how many connections accepted the frame.
    pub async fn broadcast(&self, event: &Event) -> usize {
        let recipients: Vec<Arc<Connection>> = {
            let observers = self.observers.read().await;
            let participants = self.participants.read().await;
            observers
                .values()
                .cloned()
                .chain(participants.values().map(|p| Arc::clone(&p.conn)))
                .collect()
        };
        if recipients.is_empty() {
            return 0;
        }

        let frame: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(event_type = event.kind(), error = %e, "failed to serialize event");
                return 0;
            },
        };

        let sends = recipients.iter().map(|conn| {
            let frame = Arc::clone(&frame);
            async move {
                match conn.send(frame, self.send_timeout).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(conn_id = %conn.conn_id, error = %e, "failed to send event to client");
                        false
                    },
                }
            }
        });
        let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();
        debug!(
            event_type = event.kind(),
            recipients = recipients.len(),
            delivered,
            "broadcast event"
        );
        delivered
    }
}

fn profiles_in_join_order(participants: &HashMap<String, Participant>) -> Vec<Profile> {
    let mut ordered: Vec<&Participant> = participants.values().collect();
    ordered.sort_by_key(|p| p.joined_seq);
    ordered.into_iter().map(|p| p.profile.clone()).collect()
}
