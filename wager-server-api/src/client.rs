use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::HeaderValue,
    response::Response,
    routing::{any, get},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::{select, sync::mpsc::UnboundedSender};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use wager_server_domain::{
    app::LazyAppState,
    identity::{ArcIdentityResolver, Identity, resolve_or_guest},
    transport::{DisconnectReason, ListenerId, ServerMessage, TransportService},
};

use crate::protocol::{encode_server_message, handle_client_message};

const DEFAULT_CORS_ORIGINS: &str =
    "http://localhost:5173,http://localhost:5174,http://localhost:5175";

const ROOM_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone, Debug)]
pub struct TransportSettings {
    pub port: u16,
    pub bind_addr: String,
    pub cors_origins: Vec<String>,
}

impl TransportSettings {
    pub fn from_env() -> Self {
        let port = match std::env::var("WAGER_WS_PORT") {
            Ok(raw) => raw.parse::<u16>().unwrap_or_else(|_| {
                warn!("WAGER_WS_PORT {:?} is not a valid port, using 3001", raw);
                3001
            }),
            Err(_) => 3001,
        };
        let bind_addr =
            std::env::var("WAGER_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
        let cors_origins = parse_origins(
            &std::env::var("WAGER_CORS_ORIGINS")
                .unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string()),
        );
        TransportSettings {
            port,
            bind_addr,
            cors_origins,
        }
    }

    fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {:?}", origin);
                    None
                }
            })
            .collect();
        let allow_origin = if origins.is_empty() {
            AllowOrigin::from(Any)
        } else {
            AllowOrigin::list(origins)
        };
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[derive(Clone)]
pub struct TransportServiceImpl {
    app_state: LazyAppState,
    identity_resolver: ArcIdentityResolver,
    client_senders: Arc<DashMap<ListenerId, (UnboundedSender<String>, CancellationToken)>>,
}

impl TransportServiceImpl {
    pub fn new(app_state: LazyAppState, identity_resolver: ArcIdentityResolver) -> Self {
        Self {
            app_state,
            identity_resolver,
            client_senders: Arc::new(DashMap::new()),
        }
    }

    fn on_disconnect(&self, identity: &Identity, id: ListenerId) {
        self.client_senders.remove(&id);
        self.app_state
            .connection_service()
            .unregister(&identity.id, id);
        info!("{} disconnected (client {})", identity.id, id);
    }

    async fn handle_socket(&self, socket: WebSocket, identity: Identity) {
        let (ws_sender, ws_receiver) = socket.split();
        let id = ListenerId::new();
        let cancellation_token = CancellationToken::new();

        // The sender has to exist before registering so the presence
        // snapshot reaches the new client too.
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        self.client_senders
            .insert(id, (tx, cancellation_token.clone()));
        info!(
            "{} connected as {} (client {})",
            identity.display_name, identity.id, id
        );
        self.app_state
            .connection_service()
            .register(identity.clone(), id);

        let client_service = self.clone();
        let cancellation_token_clone = cancellation_token.clone();
        let receiving_identity = identity.clone();
        let receive_task = tokio::spawn(async move {
            client_service
                .handle_receive(
                    id,
                    receiving_identity,
                    ws_receiver,
                    cancellation_token_clone,
                )
                .await;
        });

        let cancellation_token_clone = cancellation_token.clone();
        let send_task = tokio::spawn(async move {
            handle_send(id, ws_sender, rx, cancellation_token_clone).await;
        });

        let _ = tokio::join!(receive_task, send_task);
        self.on_disconnect(&identity, id);
    }

    async fn handle_receive(
        &self,
        id: ListenerId,
        identity: Identity,
        mut ws_receiver: futures_util::stream::SplitStream<WebSocket>,
        cancellation_token: CancellationToken,
    ) {
        while let Some(Ok(msg)) = select! {
            msg = ws_receiver.next() => msg,
            _ = cancellation_token.cancelled() => None,
        } {
            match msg {
                Message::Text(text) => {
                    handle_client_message(self.app_state.unwrap(), &identity, id, text.as_str());
                }
                Message::Close(_) => break,
                _ => debug!("Client {} sent a non-text frame", id),
            }
        }
        debug!("Client {} receive ended", id);
        cancellation_token.cancel();
    }

    pub async fn close_with_reason(&self, id: ListenerId, reason: DisconnectReason) {
        self.try_listener_send(id, &ServerMessage::ConnectionClosed { reason });
        //wait a moment to allow message to be sent
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.close_client(id);
    }

    fn close_client(&self, id: ListenerId) {
        let Some(entry) = self.client_senders.get(&id) else {
            warn!("Client {} already closed", id);
            return;
        };
        let token = entry.1.clone();
        drop(entry);
        token.cancel();
        info!("Client {} closed", id);
    }

    async fn close_all_clients(&self) {
        let client_ids: Vec<ListenerId> = self
            .client_senders
            .iter()
            .map(|entry| *entry.key())
            .collect();

        let mut futures = vec![];
        for id in client_ids {
            futures.push(self.close_with_reason(id, DisconnectReason::ServerShutdown));
        }
        futures::future::join_all(futures).await;
    }

    async fn launch_room_sweep_task(&self, cancellation_token: CancellationToken) {
        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Room sweep task shutting down");
                    break;
                }
                _ = tokio::time::sleep(ROOM_SWEEP_INTERVAL) => {}
            }
            let removed = self.app_state.matchmaking_service().sweep_stale_rooms();
            if removed > 0 {
                info!("Swept {} stale waiting room(s)", removed);
            }
        }
    }

    pub async fn run(
        self,
        settings: TransportSettings,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) {
        let router = Router::new()
            .route("/", any(ws_handler))
            .route("/ws", any(ws_handler))
            .route("/health", get(health_handler))
            .route("/payout/{stake}", get(payout_handler))
            .layer(settings.cors_layer())
            .with_state(self.clone());

        let addr = format!("{}:{}", settings.bind_addr, settings.port);
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind {}: {}", addr, e);
                return;
            }
        };

        let cancellation_token = CancellationToken::new();

        let self_clone = self.clone();
        let cancellation_token_clone = cancellation_token.clone();
        let room_sweep_handle = tokio::spawn(async move {
            self_clone
                .launch_room_sweep_task(cancellation_token_clone)
                .await;
        });

        let self_clone = self.clone();
        let on_shutdown = async move {
            shutdown_signal.await;
            info!("Shutdown signal received, closing all clients");
            self_clone.close_all_clients().await;
            cancellation_token.cancel();
        };

        info!("WebSocket server listening on {}", addr);
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(on_shutdown)
            .await
        {
            error!("Server error: {}", e);
        }

        if let Err(e) = room_sweep_handle.await {
            error!("Room sweep task failed: {}", e);
        }

        info!("Transport service shut down gracefully");
    }
}

async fn handle_send(
    id: ListenerId,
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<String>,
    cancellation_token: CancellationToken,
) {
    while let Some(msg) = select! {
        msg = rx.recv() => msg,
        _ = cancellation_token.cancelled() => None,
    } {
        if ws_sender.send(Message::Text(msg.into())).await.is_err() {
            break;
        }
    }
    let _ = ws_sender.close().await;
    debug!("Client {} send ended", id);
    cancellation_token.cancel();
}

impl TransportService for TransportServiceImpl {
    fn disconnect_listener(&self, id: ListenerId, reason: DisconnectReason) {
        let transport = self.clone();
        tokio::spawn(async move {
            transport.close_with_reason(id, reason).await;
        });
    }

    fn try_listener_send(&self, id: ListenerId, msg: &ServerMessage) {
        let Some(entry) = self.client_senders.get(&id) else {
            return;
        };
        let sender = entry.0.clone();
        drop(entry);
        let Some(text) = encode_server_message(msg) else {
            return;
        };
        if sender.send(text).is_err() {
            debug!("Client {} is gone, dropping message", id);
        }
    }
}

#[derive(Deserialize)]
struct ConnectParams {
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(transport): State<TransportServiceImpl>,
    Query(params): Query<ConnectParams>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Response {
    let token = params
        .token
        .or_else(|| bearer.map(|TypedHeader(Authorization(b))| b.token().to_string()));
    let identity = resolve_or_guest(&transport.identity_resolver, token.as_deref()).await;
    ws.on_upgrade(move |socket| async move {
        transport.handle_socket(socket, identity).await;
    })
}

async fn health_handler() -> &'static str {
    "ok"
}

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct JsonPayoutQuote {
    stake: u64,
    pot: u64,
    winner_payout: u64,
    platform_margin: u64,
}

async fn payout_handler(
    State(transport): State<TransportServiceImpl>,
    Path(stake): Path<u64>,
) -> Json<JsonPayoutQuote> {
    let quote = transport.app_state.unwrap().config.payout.quote(stake);
    Json(JsonPayoutQuote {
        stake: quote.stake,
        pot: quote.pot,
        winner_payout: quote.winner_payout,
        platform_margin: quote.platform_margin,
    })
}
