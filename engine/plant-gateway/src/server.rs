//! Warp routes for the gateway

use futures::{SinkExt, StreamExt};
use orchestrator::{Scheduler, StateTracker};
use prodline_types::{AttrValue, CancelToken, Order};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::ws::{Message, WebSocket};
use warp::Filter;

/// Task submission request body
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub attrs: Option<HashMap<String, AttrValue>>,
}

/// Task submission response body
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: String,
    pub id: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// HTTP/WebSocket server in front of the scheduler and state tracker.
pub struct GatewayServer {
    scheduler: Arc<Scheduler>,
    tracker: Arc<StateTracker>,
    registry: Arc<Registry>,
}

impl GatewayServer {
    pub fn new(
        scheduler: Arc<Scheduler>,
        tracker: Arc<StateTracker>,
        registry: Arc<Registry>,
    ) -> Self {
        Self { scheduler, tracker, registry }
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, addr: SocketAddr, shutdown: CancelToken) {
        let routes = self.clone().routes();
        let (bound, server) =
            warp::serve(routes).bind_with_graceful_shutdown(addr, async move {
                shutdown.cancelled().await;
            });
        tracing::info!(addr = %bound, "gateway listening");
        server.await;
        tracing::info!("gateway stopped");
    }

    /// The complete route tree (public for in-process test servers).
    pub fn routes(
        self: Arc<Self>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let submit = {
            let gateway = self.clone();
            warp::path!("api" / "tasks")
                .and(warp::post())
                .and(warp::body::json())
                .and(warp::any().map(move || gateway.clone()))
                .and_then(handle_submit)
        };

        let state = {
            let gateway = self.clone();
            warp::path!("api" / "state")
                .and(warp::get())
                .and(warp::any().map(move || gateway.clone()))
                .and_then(handle_state)
        };

        let metrics = {
            let gateway = self.clone();
            warp::path!("metrics")
                .and(warp::get())
                .and(warp::any().map(move || gateway.clone()))
                .and_then(handle_metrics)
        };

        let ws = {
            let gateway = self.clone();
            warp::path!("ws")
                .and(warp::ws())
                .and(warp::any().map(move || gateway.clone()))
                .map(|upgrade: warp::ws::Ws, gateway: Arc<GatewayServer>| {
                    upgrade.on_upgrade(move |socket| handle_ws(socket, gateway))
                })
        };

        submit.or(state).or(metrics).or(ws)
    }
}

async fn handle_submit(
    request: SubmitRequest,
    gateway: Arc<GatewayServer>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let id = match request.id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => format!("API_ORDER_{}", Uuid::new_v4().simple()),
    };
    let order_type = request
        .order_type
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| orchestrator::workflow::DEFAULT_WORKFLOW.to_uppercase());

    let mut order = Order::new(id.clone(), order_type, request.priority.unwrap_or(0));
    if let Some(attrs) = request.attrs {
        order.attrs = attrs;
    }

    match gateway.scheduler.submit(order).await {
        Ok(()) => Ok(warp::reply::with_status(
            warp::reply::json(&SubmitResponse { status: "accepted".to_string(), id }),
            StatusCode::ACCEPTED,
        )),
        Err(error) => {
            tracing::error!(%error, "order admission failed");
            Ok(warp::reply::with_status(
                warp::reply::json(&ErrorResponse { error: error.to_string() }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

async fn handle_state(gateway: Arc<GatewayServer>) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&gateway.tracker.snapshot()))
}

async fn handle_metrics(gateway: Arc<GatewayServer>) -> Result<impl warp::Reply, warp::Rejection> {
    let encoder = TextEncoder::new();
    let families = gateway.registry.gather();
    let mut buffer = Vec::new();
    if let Err(error) = encoder.encode(&families, &mut buffer) {
        tracing::error!(%error, "failed to encode metrics");
        return Ok(warp::reply::with_status(
            String::from("metrics encoding failed"),
            StatusCode::INTERNAL_SERVER_ERROR,
        ));
    }
    Ok(warp::reply::with_status(
        String::from_utf8_lossy(&buffer).into_owned(),
        StatusCode::OK,
    ))
}

/// Push-only socket: the connecting client gets the current snapshot, then
/// one message per state change. Client messages are drained and ignored.
async fn handle_ws(socket: WebSocket, gateway: Arc<GatewayServer>) {
    let (mut tx, mut rx) = socket.split();

    let snapshot = gateway.tracker.snapshot();
    match serde_json::to_string(&snapshot) {
        Ok(json) => {
            if tx.send(Message::text(json)).await.is_err() {
                return;
            }
        }
        Err(error) => {
            tracing::error!(%error, "failed to serialize state snapshot");
            return;
        }
    }

    let mut updates = gateway.tracker.subscribe();
    loop {
        tokio::select! {
            update = updates.recv() => {
                match update {
                    Ok(state) => {
                        let json = match serde_json::to_string(&state) {
                            Ok(json) => json,
                            Err(error) => {
                                tracing::error!(%error, "failed to serialize state update");
                                continue;
                            }
                        };
                        if tx.send(Message::text(json)).await.is_err() {
                            tracing::debug!("websocket client went away");
                            return;
                        }
                    }
                    // Lagging is fine: every message is a full snapshot, so
                    // the next one covers everything this client missed.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
            incoming = rx.next() => {
                match incoming {
                    Some(Ok(message)) if message.is_close() => return,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => return,
                }
            }
        }
    }
}
