//! A small chat service: clients post messages over WebSocket, the server
//! keeps the recent ones in the store and pushes each to every client.

use futures_util::{SinkExt, StreamExt};
use minidb::{App, Config, ConnectionId, ConnectionRegistry, Message, Store};
use std::sync::Arc;
use tempfile::tempdir;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECENT: &str = "recent_messages";

async fn on_message(app: App, _id: ConnectionId, message: Message) {
    let Some(post) = message.to_json() else {
        return;
    };
    let mut recent = match app.store().get_json(RECENT).await {
        Ok(Some(serde_json::Value::Array(items))) => items,
        _ => Vec::new(),
    };
    recent.push(post.clone());
    if app.store().set_json(RECENT, serde_json::Value::Array(recent)).await.is_ok() {
        app.sockets().broadcast(Message::json(&post)).await;
    }
}

async fn start(app: &App) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app.clone();
    tokio::spawn(async move { app.serve_sockets(listener, on_message).await });
    format!("ws://{addr}")
}

async fn connect(url: &str) -> Client {
    tokio_tungstenite::connect_async(url).await.unwrap().0
}

async fn wait_for_members(registry: &ConnectionRegistry, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while registry.len() != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

async fn next_json(client: &mut Client) -> serde_json::Value {
    loop {
        let frame = timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Some(json) = Message::from_frame(frame).and_then(|m| m.to_json()) {
            return json;
        }
    }
}

#[tokio::test]
async fn chat_messages_are_stored_and_pushed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chat.db");
    let post = serde_json::json!({"user": "Alice", "text": "hi"});

    {
        let store = Store::open(&path, Config::default()).await.unwrap();
        store.set_json(RECENT, serde_json::json!([])).await.unwrap();
        let app = App::new(store, Arc::new(ConnectionRegistry::new()));
        let url = start(&app).await;

        let mut alice = connect(&url).await;
        let mut bob = connect(&url).await;
        wait_for_members(app.sockets(), 2).await;

        alice
            .send(tungstenite::Message::text(post.to_string()))
            .await
            .unwrap();
        assert_eq!(next_json(&mut alice).await, post);
        assert_eq!(next_json(&mut bob).await, post);

        assert_eq!(
            app.store().get_json(RECENT).await.unwrap(),
            Some(serde_json::json!([post.clone()]))
        );
        app.store().close().await.unwrap();
    }

    let store = Store::open(&path, Config::default()).await.unwrap();
    assert_eq!(
        store.get_json(RECENT).await.unwrap(),
        Some(serde_json::json!([{"user": "Alice", "text": "hi"}]))
    );
}

#[tokio::test]
async fn departed_clients_do_not_block_publishing() {
    let app = App::new(Store::open_in_memory().unwrap(), Arc::new(ConnectionRegistry::new()));
    let url = start(&app).await;

    let mut stays = connect(&url).await;
    let leaves = connect(&url).await;
    wait_for_members(app.sockets(), 2).await;
    drop(leaves);
    wait_for_members(app.sockets(), 1).await;

    let doc = serde_json::json!({"user": "Bob", "text": "anyone?"});
    let published = app.persist_and_broadcast("msg:1", doc.clone()).await.unwrap();
    assert_eq!(published.report.delivered, 1);
    assert_eq!(next_json(&mut stays).await, doc);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn published_documents_arrive_in_commit_order() {
    let app = App::new(Store::open_in_memory().unwrap(), Arc::new(ConnectionRegistry::new()));
    let url = start(&app).await;
    let mut client = connect(&url).await;
    wait_for_members(app.sockets(), 1).await;

    for i in 0..20 {
        app.persist_and_broadcast(&format!("msg:{i}"), serde_json::json!({ "n": i }))
            .await
            .unwrap();
    }
    for i in 0..20 {
        assert_eq!(next_json(&mut client).await, serde_json::json!({ "n": i }));
    }
    assert_eq!(app.store().len(), 20);
}
