use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use larder_db::Database;
use larder_gateway::{Authorities, router};
use larder_store::{CellValue, MergeableStore, Schema};
use larder_types::protocol::SyncMessage;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STORE: &str = "shoppingListStore-relay";

async fn spawn_server() -> String {
    let authorities = Authorities::new(Arc::new(Database::open_in_memory().unwrap()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(authorities)).await.unwrap();
    });
    format!("ws://{addr}")
}

async fn send(client: &mut Client, message: &SyncMessage) {
    client
        .send(Message::Text(message.to_json().unwrap().into()))
        .await
        .unwrap();
}

/// Next sync frame, skipping control frames. `None` if nothing arrives in `wait`.
async fn next_message(client: &mut Client, wait: Duration) -> Option<SyncMessage> {
    tokio::time::timeout(wait, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {other:?}"),
            }
        }
    })
    .await
    .ok()
}

/// Connect and complete one `GetContent` round trip, so the connection is
/// subscribed to relays before the test goes on.
async fn connect(url: &str) -> Client {
    let (mut client, _) = connect_async(format!("{url}/{STORE}")).await.unwrap();
    send(&mut client, &SyncMessage::GetContent).await;
    match next_message(&mut client, Duration::from_secs(5)).await {
        Some(SyncMessage::Content { .. }) => client,
        other => panic!("expected Content, got {other:?}"),
    }
}

#[tokio::test]
async fn changes_reach_peers_but_not_the_sender() {
    let url = spawn_server().await;
    let mut sender = connect(&url).await;
    let mut peer = connect(&url).await;

    let replica = MergeableStore::new(Schema::schemaless());
    replica.set_cell("items", "i1", "name", "Milk").unwrap();
    send(&mut sender, &SyncMessage::Changes { content: replica.mergeable_content() }).await;

    match next_message(&mut peer, Duration::from_secs(5)).await {
        Some(SyncMessage::Changes { content }) => {
            assert_eq!(content.cell_count(), 1);
            assert_eq!(
                content.to_content().tables["items"]["i1"]["name"],
                CellValue::from("Milk")
            );
        }
        other => panic!("peer expected Changes, got {other:?}"),
    }

    // The sender's next frame is the reply to its own request, not an echo.
    send(&mut sender, &SyncMessage::GetContent).await;
    match next_message(&mut sender, Duration::from_secs(5)).await {
        Some(SyncMessage::Content { content }) => assert_eq!(content.cell_count(), 1),
        other => panic!("sender expected Content, got {other:?}"),
    }
    assert!(next_message(&mut sender, Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn stale_changes_are_not_relayed() {
    let url = spawn_server().await;
    let mut first = connect(&url).await;
    let mut second = connect(&url).await;

    let replica = MergeableStore::new(Schema::schemaless());
    replica.set_value("name", "Groceries").unwrap();
    let content = replica.mergeable_content();

    send(&mut first, &SyncMessage::Changes { content: content.clone() }).await;
    assert!(matches!(
        next_message(&mut second, Duration::from_secs(5)).await,
        Some(SyncMessage::Changes { .. })
    ));

    // Same cells again: nothing wins, so nothing is relayed.
    send(&mut first, &SyncMessage::Changes { content }).await;
    assert!(next_message(&mut second, Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn malformed_frames_keep_the_connection_open() {
    let url = spawn_server().await;
    let mut client = connect(&url).await;

    client.send(Message::Text("{not json".into())).await.unwrap();
    send(&mut client, &SyncMessage::GetContent).await;
    assert!(matches!(
        next_message(&mut client, Duration::from_secs(5)).await,
        Some(SyncMessage::Content { .. })
    ));
}
