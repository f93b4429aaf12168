use std::{future::Future, net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::{State, WebSocketUpgrade},
        response::{IntoResponse, Json},
        routing::get,
    },
    roundtable_config::RoundtableConfig,
    roundtable_protocol::{OBSERVER_PATH, PARTICIPANT_PATH},
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use crate::{
    auth::IdentityVerifier,
    authority::{AuthorityClient, HostIdentity, RoomSpec},
    room::{RoomMode, close_room, open_room},
    state::GatewayState,
    ws::{handle_observer, handle_participant},
};

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
///
/// Unknown paths are treated as observer connections.
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route(OBSERVER_PATH, get(observer_upgrade_handler))
        .route(PARTICIPANT_PATH, get(participant_upgrade_handler))
        .fallback(observer_upgrade_handler)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve `state` on an already-bound listener until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<GatewayState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_gateway_app(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Register the room, start the HTTP + WebSocket server, and delete the
/// room again after Ctrl-C.
pub async fn start_gateway(config: RoundtableConfig) -> anyhow::Result<()> {
    let authority = Arc::new(AuthorityClient::from_config(&config.authority)?);
    let room = open_room(
        &authority,
        &HostIdentity::from(&config.authority),
        config.authority.registration_secret.as_ref(),
        &RoomSpec::from_config(&config.authority, &config.conversation),
    )
    .await;

    let verifier: Arc<dyn IdentityVerifier> = authority.clone();
    let state = GatewayState::new(&config, &room, verifier);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;

    // Startup banner.
    let mode = match room.mode {
        RoomMode::Registered => "registered",
        RoomMode::Fallback => "fallback (unregistered, degraded)",
    };
    let lines = [
        format!("roundtable orchestrator v{}", state.version),
        format!("listening on {local}"),
        format!("room {} [{mode}]", room.id),
        format!("authority: {}", authority.base_url()),
        format!(
            "topic: {}, max turns: {}",
            config.conversation.topic, config.conversation.max_turns
        ),
    ];
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    serve(listener, state, shutdown_signal()).await?;

    info!("shutting down");
    close_room(&authority, &room).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let registered = state.room_mode == RoomMode::Registered;
    let status = if registered { "ok" } else { "degraded" };
    Json(serde_json::json!({
        "status": status,
        "version": state.version,
        "room": {
            "id": state.room_id,
            "registered": registered,
        },
        "connections": {
            "observers": state.registry.observer_count().await,
            "participants": state.registry.participant_count().await,
        },
        "active": state.session.is_active().await,
    }))
}

async fn observer_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_observer(socket, state))
}

async fn participant_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_participant(socket, state))
}
