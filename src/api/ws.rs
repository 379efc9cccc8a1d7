//! WebSocket streaming transport
//!
//! One connection is one session. Inbound frames are read continuously so
//! heartbeats are answered while a turn streams; user messages that arrive
//! mid-turn wait in a queue and run in order. Closing the socket cancels the
//! running turn.

use super::types::{ClientEvent, ServerEvent};
use super::AppState;
use crate::conversation::Message;
use crate::runtime::{batch_stream, Batch, TurnError};
use crate::session::{resolve_request, ResolvedSession};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures::{SinkExt, Stream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::pin::pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

/// Traffic classes differ only in how finely output is batched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficClass {
    Chat,
    Voice,
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrafficClass::Chat => write!(f, "chat"),
            TrafficClass::Voice => write!(f, "voice"),
        }
    }
}

/// Transport-independent inbound frame
#[derive(Debug)]
pub enum Frame {
    Text(String),
    Close,
}

type Outbound = mpsc::UnboundedSender<ServerEvent>;

pub async fn chat_websocket(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let session = resolve_request(&headers, &query);
    ws.on_upgrade(move |socket| handle_socket(socket, session, TrafficClass::Chat, state))
}

pub async fn voice_websocket(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let session = resolve_request(&headers, &query);
    ws.on_upgrade(move |socket| handle_socket(socket, session, TrafficClass::Voice, state))
}

async fn handle_socket(
    socket: WebSocket,
    session: ResolvedSession,
    class: TrafficClass,
    state: AppState,
) {
    let (mut ws_sender, ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let thread_id = session.thread_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode outbound event");
                    continue;
                }
            };
            if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                tracing::debug!(thread_id = %thread_id, "WebSocket send failed");
                break;
            }
        }
    });

    let inbound = ws_receiver.filter_map(|msg| async move {
        match msg {
            Ok(WsMessage::Text(text)) => Some(Frame::Text(text)),
            Ok(WsMessage::Close(_)) | Err(_) => Some(Frame::Close),
            Ok(_) => None,
        }
    });

    serve(session, class, state, inbound, out_tx).await;
    // Outbound sender is gone; the writer drains what is queued and stops
    let _ = send_task.await;
}

/// Drive one connection until the client leaves
pub async fn serve(
    session: ResolvedSession,
    class: TrafficClass,
    state: AppState,
    inbound: impl Stream<Item = Frame>,
    outbound: Outbound,
) {
    let ResolvedSession { thread_id, is_new } = session;
    tracing::info!(thread_id = %thread_id, is_new, class = %class, "WebSocket connected");
    let _ = outbound.send(ServerEvent::SessionInit {
        session_id: thread_id.clone(),
        is_new,
    });

    let cancel = CancellationToken::new();
    let (queue_tx, queue_rx) = mpsc::unbounded_channel::<Message>();
    let worker = tokio::spawn(run_turns(
        thread_id.clone(),
        class,
        state,
        queue_rx,
        outbound.clone(),
        cancel.clone(),
    ));

    let mut inbound = pin!(inbound);
    while let Some(frame) = inbound.next().await {
        let Frame::Text(text) = frame else { break };
        match ClientEvent::parse(&text) {
            ClientEvent::Heartbeat => {
                let _ = outbound.send(ServerEvent::Pong);
            }
            ClientEvent::UserMessage { id, content } => {
                let message = match id {
                    Some(id) => Message::user(content).with_id(id),
                    None => Message::user(content),
                };
                let _ = queue_tx.send(message);
            }
            ClientEvent::InvalidMessage => {
                let _ = outbound.send(ServerEvent::invalid_payload());
            }
            ClientEvent::Unsupported(event_type) => {
                tracing::debug!(thread_id = %thread_id, event_type = %event_type, "Unsupported event");
                let _ = outbound.send(ServerEvent::unsupported(event_type));
            }
        }
    }

    tracing::info!(thread_id = %thread_id, "WebSocket disconnected");
    cancel.cancel();
    drop(queue_tx);
    let _ = worker.await;
}

/// Run queued turns one at a time, streaming each as batches
async fn run_turns(
    thread_id: String,
    class: TrafficClass,
    state: AppState,
    mut queue: mpsc::UnboundedReceiver<Message>,
    outbound: Outbound,
    cancel: CancellationToken,
) {
    let threshold = state.batch_threshold(class);

    while let Some(message) = queue.recv().await {
        if cancel.is_cancelled() {
            break;
        }
        let message_id = uuid::Uuid::new_v4().to_string();
        let (fragments_tx, fragments_rx) = mpsc::unbounded_channel();

        let orchestrator = &state.orchestrator;
        let turn = async {
            let result = orchestrator
                .run_turn(&thread_id, message, &fragments_tx, &cancel)
                .await;
            drop(fragments_tx);
            result
        };

        let forward = async {
            let mut batches = pin!(batch_stream(
                UnboundedReceiverStream::new(fragments_rx),
                threshold
            ));
            while let Some(batch) = batches.next().await {
                let event = match batch {
                    Batch::Chunk(delta) => ServerEvent::Chunk {
                        message_id: message_id.clone(),
                        delta,
                    },
                    Batch::End => ServerEvent::End {
                        message_id: message_id.clone(),
                    },
                };
                if cancel.is_cancelled() || outbound.send(event).is_err() {
                    break;
                }
            }
        };

        let (result, ()) = tokio::join!(turn, forward);
        if let Err(TurnError::Cancelled) = result {
            break;
        }
    }
}
