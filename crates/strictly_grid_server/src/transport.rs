//! HTTP and WebSocket surface.

use crate::broadcast::Outbound;
use crate::hub::HubHandle;
use axum::body::Body;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tracing::{debug, info, instrument, warn};

/// Builds the application router.
pub fn router(hub: HubHandle) -> Router {
    Router::new()
        .route("/ws", get(upgrade))
        .route("/health", get(health))
        .route("/api/game", get(current_game))
        .layer(ServiceBuilder::new().map_request(log_request))
        .with_state(hub)
}

fn log_request(req: Request<Body>) -> Request<Body> {
    info!(
        method = %req.method(),
        uri = %req.uri(),
        "Incoming HTTP request"
    );
    req
}

async fn health() -> &'static str {
    "ok"
}

async fn current_game(State(hub): State<HubHandle>) -> Response {
    match hub.snapshot().await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(hub): State<HubHandle>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, hub))
}

/// Pumps one socket: a writer task drains the outbound queue while this
/// task forwards text frames to the hub.
#[instrument(skip(socket, hub), fields(connection = tracing::field::Empty))]
async fn serve_socket(socket: WebSocket, hub: HubHandle) {
    let connection = hub.next_connection_id();
    tracing::Span::current().record("connection", connection);
    info!("WebSocket connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    if !hub.connected(connection, tx) {
        warn!("Hub is not running");
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                Outbound::Message(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize message");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if !hub.inbound(connection, text.as_str()) {
                    break;
                }
            }
            Ok(Message::Binary(bytes)) => {
                warn!(len = bytes.len(), "Dropping binary frame");
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Socket read failed");
                break;
            }
        }
    }

    hub.disconnected(connection);
    let _ = writer.await;
    info!("WebSocket closed");
}
