//! End-to-end tests over real WebSocket connections.

use futures_util::{SinkExt, StreamExt};
use minidb_realtime::{socket, ConnectionRegistry, Message};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Starts a server that rebroadcasts every incoming message.
async fn start_echo_server(registry: &Arc<ConnectionRegistry>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let sockets = Arc::clone(registry);
    tokio::spawn(socket::run(listener, Arc::clone(registry), move |_id, message| {
        let sockets = Arc::clone(&sockets);
        async move {
            sockets.broadcast(message).await;
        }
    }));
    format!("ws://{addr}")
}

async fn connect(url: &str) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    client
}

async fn wait_for_members(registry: &ConnectionRegistry, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while registry.len() != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {expected} members, have {}", registry.len()));
}

async fn next_message(client: &mut Client) -> Message {
    loop {
        let frame = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .unwrap();
        if let Some(message) = Message::from_frame(frame) {
            return message;
        }
    }
}

#[tokio::test]
async fn clients_receive_broadcasts() {
    let registry = Arc::new(ConnectionRegistry::new());
    let url = start_echo_server(&registry).await;

    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    wait_for_members(&registry, 2).await;

    let report = registry.broadcast(Message::text("hello")).await;
    assert_eq!(report.delivered, 2);
    assert_eq!(next_message(&mut alice).await, Message::text("hello"));
    assert_eq!(next_message(&mut bob).await, Message::text("hello"));
}

#[tokio::test]
async fn incoming_messages_reach_the_handler() {
    let registry = Arc::new(ConnectionRegistry::new());
    let url = start_echo_server(&registry).await;

    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    wait_for_members(&registry, 2).await;

    alice.send(tungstenite::Message::text("ping")).await.unwrap();
    assert_eq!(next_message(&mut alice).await, Message::text("ping"));
    assert_eq!(next_message(&mut bob).await, Message::text("ping"));

    bob.send(tungstenite::Message::binary(vec![1u8, 2, 3])).await.unwrap();
    assert_eq!(next_message(&mut alice).await, Message::binary(vec![1u8, 2, 3]));
}

#[tokio::test]
async fn closing_client_is_removed() {
    let registry = Arc::new(ConnectionRegistry::new());
    let url = start_echo_server(&registry).await;

    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    wait_for_members(&registry, 2).await;

    bob.close(None).await.unwrap();
    wait_for_members(&registry, 1).await;

    let report = registry.broadcast(Message::text("still here")).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(next_message(&mut alice).await, Message::text("still here"));
}

#[tokio::test]
async fn dropped_client_is_removed() {
    let registry = Arc::new(ConnectionRegistry::new());
    let url = start_echo_server(&registry).await;

    let client = connect(&url).await;
    wait_for_members(&registry, 1).await;
    drop(client);
    wait_for_members(&registry, 0).await;
}

#[tokio::test]
async fn server_side_disconnect_closes_the_socket() {
    let registry = Arc::new(ConnectionRegistry::new());
    let url = start_echo_server(&registry).await;

    let mut client = connect(&url).await;
    wait_for_members(&registry, 1).await;

    let id = registry.connection_ids()[0];
    assert!(registry.disconnect_id(id));

    let frame = timeout(Duration::from_secs(2), client.next()).await.unwrap();
    match frame {
        None | Some(Ok(tungstenite::Message::Close(_))) | Some(Err(_)) => {}
        Some(Ok(other)) => panic!("expected close, got {other:?}"),
    }
    assert!(registry.is_empty());
}

#[tokio::test]
async fn broadcasts_arrive_in_order() {
    let registry = Arc::new(ConnectionRegistry::new());
    let url = start_echo_server(&registry).await;

    let mut client = connect(&url).await;
    wait_for_members(&registry, 1).await;

    for i in 0..50 {
        registry.broadcast(Message::json(&serde_json::json!({ "n": i }))).await;
    }
    for i in 0..50 {
        let message = next_message(&mut client).await;
        assert_eq!(message.to_json(), Some(serde_json::json!({ "n": i })));
    }
}
