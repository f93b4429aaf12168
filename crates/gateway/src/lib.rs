//! Orchestrator gateway: WebSocket/HTTP server, participant authentication,
//! connection registry, and the round-robin conversation loop.
//!
//! Lifecycle:
//! 1. Register the host and create the room with the authority (or fall back
//!    to a local room id)
//! 2. Bind and serve `/frontend` (observers), `/agent` (participants), and
//!    `/health`
//! 3. Observers start conversations; the session controller drives turns
//! 4. On Ctrl-C, stop serving and delete the room

pub mod auth;
pub mod authority;
pub mod connection;
pub mod error;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod state;
pub mod turn;
pub mod ws;

pub use {
    error::{AuthError, AuthorityError, DeliveryError, SendError, StartError, TurnError},
    server::{build_gateway_app, serve, start_gateway},
    state::GatewayState,
};
