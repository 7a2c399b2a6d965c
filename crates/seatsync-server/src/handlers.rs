//! HTTP handlers for the Seatsync server.
//!
//! Serves the WebSocket endpoint plus a couple of read-only views onto the
//! membership registry.

use crate::adapter::{AdapterConfig, TransportAdapter};
use crate::config::{AuthMode, Config};
use crate::metrics;
use anyhow::Result;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use seatsync_core::{AllowAll, Authenticator, CredentialStore, GameMaster, LogMaster, PlayerId};
use seatsync_transport::WebSocketConnection;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Shared server state.
pub struct AppContext {
    /// Server configuration.
    pub config: Config,
    /// The attached transport adapter, once installed.
    pub transport: Option<Arc<TransportAdapter>>,
}

impl AppContext {
    /// Create a context with no transport attached.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    /// The attached transport adapter.
    #[must_use]
    pub fn transport(&self) -> Option<&Arc<TransportAdapter>> {
        self.transport.as_ref()
    }
}

/// Occupancy of one match.
#[derive(Debug, Serialize)]
pub struct MatchView {
    /// Match identifier.
    pub match_id: String,
    /// Seats currently held.
    pub players: Vec<PlayerId>,
    /// Connections in the match group, spectators included.
    pub connections: usize,
}

fn authenticator(mode: AuthMode) -> Arc<dyn Authenticator> {
    match mode {
        AuthMode::Open => Arc::new(AllowAll),
        AuthMode::FirstClaim => Arc::new(CredentialStore::binding_first_claim()),
    }
}

/// Build the application router over an initialized context.
pub fn app(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route(&ctx.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/matches/:match_id", get(match_handler))
        .with_state(ctx)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let master: Arc<dyn GameMaster> = Arc::new(LogMaster::new());
    let adapter = Arc::new(TransportAdapter::new(
        AdapterConfig::from_config(&config),
        authenticator(config.auth.mode),
        master,
    ));

    let mut ctx = AppContext::new(config);
    adapter.attach(&mut ctx);
    let ctx = Arc::new(ctx);

    let listener = TcpListener::bind(addr).await?;

    info!("Seatsync server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, ctx.config.transport.websocket_path
    );

    axum::serve(
        listener,
        app(Arc::clone(&ctx)).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let (connections, clients, matches) = ctx.transport().map_or((0, 0, 0), |transport| {
        let stats = transport.registry().stats();
        (
            transport.hub().socket_count(),
            stats.client_count,
            stats.match_count,
        )
    });

    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": connections,
        "clients": clients,
        "matches": matches,
    }))
}

/// Seat occupancy of one match.
async fn match_handler(
    Path(match_id): Path<String>,
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<MatchView>, StatusCode> {
    let transport = ctx.transport().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let members = transport.hub().adapter().members(&match_id);
    let seats = transport.registry().room(&match_id);
    if seats.is_none() && members.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(MatchView {
        players: seats.map(|s| s.into_keys().collect()).unwrap_or_default(),
        connections: members.len(),
        match_id,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(ctx): State<Arc<AppContext>>,
) -> Result<impl IntoResponse, StatusCode> {
    let transport = Arc::clone(ctx.transport().ok_or(StatusCode::SERVICE_UNAVAILABLE)?);
    let max_message_size = transport.socket_options().max_message_size;

    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| async move {
            let conn = WebSocketConnection::new(socket, max_message_size).with_remote_addr(remote);
            transport.serve(conn).await;
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatsync_core::{ClientInfo, Event, SyncRequest};

    fn context() -> Arc<AppContext> {
        let adapter = Arc::new(TransportAdapter::new(
            AdapterConfig::default(),
            Arc::new(AllowAll),
            Arc::new(LogMaster::new()),
        ));
        let mut ctx = AppContext::new(Config::default());
        adapter.attach(&mut ctx);
        Arc::new(ctx)
    }

    #[tokio::test]
    async fn test_match_view_lists_seats() {
        let ctx = context();
        let transport = ctx.transport().unwrap();
        let handler = transport.handler();
        let (seat, _rx) = handler.connect("c0");
        let (watcher, _rx_w) = handler.connect("w");

        handler
            .handle(
                &seat,
                Event::Sync(SyncRequest {
                    match_id: "matchID".into(),
                    player_id: Some("0".into()),
                    credentials: None,
                    num_players: 2,
                }),
            )
            .await
            .unwrap();
        handler
            .handle(
                &watcher,
                Event::Sync(SyncRequest {
                    match_id: "matchID".into(),
                    player_id: None,
                    credentials: None,
                    num_players: 2,
                }),
            )
            .await
            .unwrap();
        assert_eq!(
            transport.registry().client("c0"),
            Some(ClientInfo::player("matchID", "0"))
        );

        let Json(view) = match_handler(Path("matchID".into()), State(Arc::clone(&ctx)))
            .await
            .unwrap();
        assert_eq!(view.players, vec!["0".to_string()]);
        assert_eq!(view.connections, 2);
    }

    #[tokio::test]
    async fn test_unknown_match_is_not_found() {
        let ctx = context();
        let err = match_handler(Path("nope".into()), State(ctx)).await.unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_detached_context_unavailable() {
        let ctx = Arc::new(AppContext::new(Config::default()));
        let err = match_handler(Path("matchID".into()), State(ctx)).await.unwrap_err();
        assert_eq!(err, StatusCode::SERVICE_UNAVAILABLE);
    }
}
