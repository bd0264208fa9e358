use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use larder_types::protocol::SyncMessage;

use crate::authority::Authority;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

/// Missed-pong bookkeeping for one connection.
#[derive(Debug, Default)]
struct Heartbeat {
    missed: u8,
}

impl Heartbeat {
    /// Record a heartbeat tick. Returns false once the peer has missed
    /// `MAX_MISSED_PONGS` pongs in a row.
    fn tick(&mut self, pong_seen: bool) -> bool {
        if pong_seen {
            self.missed = 0;
        } else {
            self.missed = self.missed.saturating_add(1);
        }
        self.missed < MAX_MISSED_PONGS
    }
}

/// Serve one client replica of `authority` until either side goes away.
pub async fn handle_connection(socket: WebSocket, authority: Arc<Authority>) {
    let conn_id = Uuid::new_v4();
    let store_id = authority.store_id().to_string();
    let (mut sender, mut receiver) = socket.split();

    info!("Connection {} opened for {}", conn_id, store_id);

    // Direct replies (GetContent) from the recv task to this client only.
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<SyncMessage>();
    let mut relay_rx = authority.subscribe();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let send_authority = authority.clone();
    let mut send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await;
        let mut heartbeat = Heartbeat::default();

        loop {
            let outgoing = tokio::select! {
                result = relay_rx.recv() => match result {
                    Ok(relay) if relay.from == conn_id => continue,
                    Ok(relay) => SyncMessage::Changes { content: relay.content.as_ref().clone() },
                    Err(RecvError::Lagged(n)) => {
                        // Missed deltas: send the whole state instead, merging it is idempotent.
                        warn!("{} relay lagged by {} messages, resyncing {}", conn_id, n, send_authority.store_id());
                        SyncMessage::Changes { content: send_authority.mergeable_content() }
                    }
                    Err(RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
                _ = ping_interval.tick() => {
                    if !heartbeat.tick(pong_flag_send.swap(false, Ordering::Acquire)) {
                        warn!("Heartbeat timeout (missed {} pongs), dropping {}", heartbeat.missed, conn_id);
                        break;
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let text = match outgoing.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode {} for {}: {}", outgoing.kind(), conn_id, e);
                    continue;
                }
            };
            trace!("-> {} {}", conn_id, outgoing.kind());
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_authority = authority.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<SyncMessage>(&text) {
                    Ok(message) => {
                        trace!("<- {} {}", conn_id, message.kind());
                        handle_message(&recv_authority, conn_id, message, &reply_tx);
                    }
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("{} bad frame: {} -- raw: {}", conn_id, e, raw);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Connection {} closed for {}", conn_id, store_id);
}

fn handle_message(
    authority: &Authority,
    conn_id: Uuid,
    message: SyncMessage,
    reply_tx: &mpsc::UnboundedSender<SyncMessage>,
) {
    match message {
        SyncMessage::GetContent => {
            let _ = reply_tx.send(SyncMessage::Content {
                content: authority.mergeable_content(),
            });
        }
        SyncMessage::Content { content } | SyncMessage::Changes { content } => {
            let won = authority.apply(conn_id, &content);
            debug!("{} applied {} of {} cells", conn_id, won, content.cell_count());
        }
    }
}
