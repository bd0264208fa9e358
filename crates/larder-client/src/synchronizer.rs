//! Client side of the sync protocol.
//!
//! One websocket per store id. On every (re)connect the synchronizer asks
//! the server for its content, merges it, then pushes its own full state so
//! both sides converge; after that it forwards local changes as they commit
//! and merges whatever the server relays. Disconnects never block local
//! reads or writes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use backon::{Backoff, BackoffBuilder, ExponentialBuilder};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use larder_store::{Content, MergeableStore, Origin};
use larder_types::protocol::SyncMessage;

use crate::error::ClientError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Connecting,
    /// Handshake done; changes flow both ways.
    Online,
    /// Waiting to reconnect.
    Offline,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Base websocket URL; the store id is appended as a path segment.
    pub base_url: String,
    pub connection_timeout: Duration,
    pub max_reconnect_delay: Duration,
}

pub struct Synchronizer {
    store_id: String,
    status: watch::Receiver<SyncStatus>,
    handshakes: watch::Receiver<u64>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Synchronizer {
    pub fn start(store: Arc<MergeableStore>, store_id: &str, options: SyncOptions) -> Self {
        let (status_tx, status) = watch::channel(SyncStatus::Connecting);
        let (handshake_tx, handshakes) = watch::channel(0u64);
        let cancel = CancellationToken::new();

        let url = store_url(&options.base_url, store_id);
        info!("Synchronizing {} with {}", store_id, url);

        let task = tokio::spawn(run(
            store,
            url,
            options,
            cancel.clone(),
            status_tx,
            handshake_tx,
        ));

        Self {
            store_id: store_id.to_string(),
            status,
            handshakes,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Completed handshakes since start, one per successful (re)connect.
    pub fn handshakes(&self) -> u64 {
        *self.handshakes.borrow()
    }

    /// Wait until the first handshake has merged the server's content.
    /// Returns false on timeout or if the synchronizer stopped first.
    pub async fn wait_for_first_sync(&self, timeout: Duration) -> bool {
        let mut handshakes = self.handshakes.clone();
        matches!(
            tokio::time::timeout(timeout, handshakes.wait_for(|n| *n > 0)).await,
            Ok(Ok(_))
        )
    }

    /// Close the connection and stop reconnecting.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().expect("sync task lock poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    store: Arc<MergeableStore>,
    url: String,
    options: SyncOptions,
    cancel: CancellationToken,
    status_tx: watch::Sender<SyncStatus>,
    handshake_tx: watch::Sender<u64>,
) {
    let mut backoff = build_backoff(options.max_reconnect_delay);

    loop {
        status_tx.send_replace(SyncStatus::Connecting);

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = tokio::time::timeout(options.connection_timeout, connect_async(url.as_str())) => result,
        };

        match connected {
            Ok(Ok((socket, _))) => {
                backoff = build_backoff(options.max_reconnect_delay);
                debug!("Connected to {}", url);
                match run_session(&store, socket, &cancel, &status_tx, &handshake_tx).await {
                    Ok(()) => debug!("Connection to {} closed", url),
                    Err(e) => warn!("Connection to {} failed: {:#}", url, e),
                }
            }
            Ok(Err(e)) => debug!("Connect to {} failed: {}", url, e),
            Err(_) => debug!("Connect to {} timed out", url),
        }

        if cancel.is_cancelled() {
            break;
        }
        status_tx.send_replace(SyncStatus::Offline);

        let delay = backoff.next().unwrap_or(options.max_reconnect_delay);
        debug!("Reconnecting to {} in {:?}", url, delay);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    status_tx.send_replace(SyncStatus::Stopped);
    debug!("Synchronizer for {} stopped", url);
}

/// Jittered exponential backoff from `MIN_RECONNECT_DELAY` up to `max`, never giving up.
fn build_backoff(max: Duration) -> impl Backoff {
    ExponentialBuilder::new()
        .with_min_delay(MIN_RECONNECT_DELAY)
        .with_max_delay(max)
        .with_jitter()
        .without_max_times()
        .build()
}

async fn run_session(
    store: &MergeableStore,
    socket: Socket,
    cancel: &CancellationToken,
    status_tx: &watch::Sender<SyncStatus>,
    handshake_tx: &watch::Sender<u64>,
) -> Result<()> {
    let (mut sink, mut stream) = socket.split();

    // Subscribe before asking, so nothing committed after the full push is missed.
    let mut events = store.subscribe();
    send(&mut sink, &SyncMessage::GetContent).await?;
    let mut synced = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let message = match serde_json::from_str::<SyncMessage>(&text) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!("Ignoring malformed sync frame: {}", e);
                            continue;
                        }
                    };
                    trace!("<- {}", message.kind());
                    match message {
                        SyncMessage::GetContent => {
                            send(&mut sink, &SyncMessage::Content { content: store.mergeable_content() }).await?;
                        }
                        SyncMessage::Content { content } => {
                            let merged = store.apply_changes(&content, Origin::Remote);
                            if !synced {
                                synced = true;
                                send(&mut sink, &SyncMessage::Changes { content: store.mergeable_content() }).await?;
                                status_tx.send_replace(SyncStatus::Online);
                                handshake_tx.send_modify(|n| *n += 1);
                                info!("Sync handshake complete ({} cells merged)", merged);
                            }
                        }
                        SyncMessage::Changes { content } => {
                            let merged = store.apply_changes(&content, Origin::Remote);
                            trace!("Merged {} remote cells", merged);
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            event = events.recv() => match event {
                // Anything committed before the handshake goes out with the full push.
                Ok(event) if synced && event.origin != Origin::Remote => {
                    send(&mut sink, &SyncMessage::Changes { content: event.delta.as_ref().clone() }).await?;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    if synced {
                        warn!("Missed {} local changes, pushing full content", n);
                        send(&mut sink, &SyncMessage::Changes { content: store.mergeable_content() }).await?;
                    }
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

async fn send(sink: &mut SplitSink<Socket, Message>, message: &SyncMessage) -> Result<()> {
    trace!("-> {}", message.kind());
    sink.send(Message::Text(message.to_json()?.into())).await?;
    Ok(())
}

fn store_url(base_url: &str, store_id: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), store_id)
}

/// `ws://` / `wss://` base turned into the matching `http://` / `https://` base.
fn http_base(base_url: &str) -> String {
    base_url
        .trim_end_matches('/')
        .replacen("ws://", "http://", 1)
        .replacen("wss://", "https://", 1)
}

/// Plain read of a store's live tables and values, without syncing.
pub async fn fetch_index_data(base_url: &str, store_id: &str) -> Result<Content, ClientError> {
    let url = format!("{}/{}/index-data", http_base(base_url), store_id);
    let content = reqwest::get(&url)
        .await?
        .error_for_status()?
        .json::<Content>()
        .await?;
    Ok(content)
}
