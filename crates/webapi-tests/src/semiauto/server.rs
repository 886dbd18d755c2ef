//! Local HTTP / WebSocket coordination server.
//!
//! Serves the operator page and relays prompts to it. Each connected page
//! receives the current prompt on connect and every change after that.

use super::broker::{PendingPrompt, PromptBroker, PromptReply};
use super::environment::EnvironmentConfig;
use super::PromptKind;
use crate::result::{WebApiError, WebApiResult};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

const OPERATOR_PAGE: &str = include_str!("frontend.html");

/// Messages pushed to the operator page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Show a prompt
    Prompt {
        /// Prompt id to echo back
        id: u64,
        /// Prompt kind
        kind: PromptKind,
        /// Prompt text
        message: String,
    },
    /// Nothing to answer
    Clear,
}

impl From<Option<PendingPrompt>> for ServerMessage {
    fn from(pending: Option<PendingPrompt>) -> Self {
        match pending {
            Some(p) => Self::Prompt {
                id: p.id,
                kind: p.prompt.kind,
                message: p.prompt.message,
            },
            None => Self::Clear,
        }
    }
}

impl ServerMessage {
    /// Serialize to JSON
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"clear"}"#.to_string())
    }
}

/// Messages sent by the operator page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Answer to a prompt
    Reply {
        /// Id of the answered prompt
        id: u64,
        /// OK / yes
        accepted: bool,
    },
}

/// Coordination server
#[derive(Debug)]
pub struct CoordinationServer {
    config: EnvironmentConfig,
    broker: Arc<PromptBroker>,
    shutdown: watch::Sender<bool>,
    local_addr: OnceLock<SocketAddr>,
    clients: Arc<AtomicUsize>,
    served: AtomicBool,
}

impl CoordinationServer {
    /// Create a server for the configured address
    #[must_use]
    pub fn new(config: &EnvironmentConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config: config.clone(),
            broker: Arc::new(PromptBroker::new()),
            shutdown,
            local_addr: OnceLock::new(),
            clients: Arc::new(AtomicUsize::new(0)),
            served: AtomicBool::new(false),
        }
    }

    /// Prompt broker shared with the WebSocket handlers
    #[must_use]
    pub fn broker(&self) -> Arc<PromptBroker> {
        Arc::clone(&self.broker)
    }

    /// Address actually bound, once listening
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Number of connected operator pages
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// Whether shutdown has been requested
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Request a graceful shutdown. Safe to call before `serve`.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.broker.close();
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let app = Router::new()
            .route("/", get(|| async { Html(OPERATOR_PAGE) }))
            .route("/health", get(|| async { "ok" }))
            .route(
                "/ws",
                get({
                    let broker = Arc::clone(&self.broker);
                    let shutdown = self.shutdown.subscribe();
                    let clients = Arc::clone(&self.clients);
                    move |ws: WebSocketUpgrade| {
                        handle_websocket(
                            ws,
                            Arc::clone(&broker),
                            shutdown.clone(),
                            Arc::clone(&clients),
                        )
                    }
                }),
            );

        if self.config.cors {
            app.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            app
        }
    }

    /// Serve on a private runtime, blocking until shutdown
    pub fn serve(&self) -> WebApiResult<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.serve_async())
    }

    /// Serve until shutdown. A server instance serves at most once.
    pub async fn serve_async(&self) -> WebApiResult<()> {
        if self.served.swap(true, Ordering::SeqCst) {
            return Err(WebApiError::environment(
                "coordination server has already been started",
            ));
        }

        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let _ = self.local_addr.set(addr);
        info!(%addr, "coordination server listening");

        let mut stop = self.shutdown.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = stop.wait_for(|requested| *requested).await;
            })
            .await?;

        info!(%addr, "coordination server stopped");
        Ok(())
    }
}

async fn handle_websocket(
    ws: WebSocketUpgrade,
    broker: Arc<PromptBroker>,
    shutdown: watch::Receiver<bool>,
    clients: Arc<AtomicUsize>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_handler(socket, broker, shutdown, clients))
}

async fn websocket_handler(
    socket: WebSocket,
    broker: Arc<PromptBroker>,
    mut shutdown: watch::Receiver<bool>,
    clients: Arc<AtomicUsize>,
) {
    let connected = clients.fetch_add(1, Ordering::SeqCst) + 1;
    debug!(clients = connected, "operator page connected");

    let (mut sender, mut receiver) = socket.split();
    let mut prompts = broker.subscribe();

    let current = ServerMessage::from(prompts.borrow_and_update().clone());
    if sender.send(Message::Text(current.to_json().into())).await.is_ok() {
        loop {
            tokio::select! {
                changed = prompts.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let msg = ServerMessage::from(prompts.borrow_and_update().clone());
                    if sender.send(Message::Text(msg.to_json().into())).await.is_err() {
                        break;
                    }
                }
                () = async {
                    let _ = shutdown.wait_for(|requested| *requested).await;
                } => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                msg_opt = receiver.next() => {
                    match msg_opt {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ClientMessage>(text.as_str()) {
                                Ok(ClientMessage::Reply { id, accepted }) => {
                                    debug!(id, accepted, "operator reply");
                                    broker.reply(PromptReply { id, accepted });
                                }
                                Err(e) => warn!(error = %e, "ignoring malformed operator message"),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if sender.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                        _ => {}
                    }
                }
            }
        }
    }

    let remaining = clients.fetch_sub(1, Ordering::SeqCst) - 1;
    debug!(clients = remaining, "operator page disconnected");
}
