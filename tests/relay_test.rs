//! End-to-end tests: a real relay on an ephemeral port driven by WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_relay::{Chat, ChatId, ChatServer, Config, Frame, InMemoryChatStore, RoomRegistry};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    registry: Arc<RoomRegistry>,
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(chats: &[&str], announce_departures: bool) -> Self {
        let config = Config {
            announce_departures,
            delivery_timeout_ms: 500,
            ..Config::default()
        };
        Self::start_with(chats, config).await
    }

    async fn start_with(chats: &[&str], config: Config) -> Self {
        let store = InMemoryChatStore::with_chats(chats.iter().map(|id| Chat::new(*id, *id)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = ChatServer::new(&config, Arc::new(store));
        let registry = server.registry();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            registry,
            stop: Some(stop),
            task,
        }
    }

    async fn connect(&self) -> Client {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", self.addr))
            .await
            .unwrap();
        let (tx, rx) = ws.split();
        Client { tx, rx }
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .unwrap();
    }
}

struct Client {
    tx: SplitSink<Ws, Message>,
    rx: SplitStream<Ws>,
}

impl Client {
    async fn send(&mut self, action: &str, content: &str, sender: &str, chat_id: &str) {
        let frame = Frame {
            action: action.to_string(),
            content: content.to_string(),
            sender: sender.to_string(),
            chat_id: chat_id.to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        self.tx.send(Message::Text(json.into())).await.unwrap();
    }

    async fn recv(&mut self) -> Frame {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), self.rx.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("websocket error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn assert_silent(&mut self) {
        let got = tokio::time::timeout(Duration::from_millis(200), self.rx.next()).await;
        assert!(got.is_err(), "unexpected message: {:?}", got);
    }

    /// Join, then prove the join was applied by provoking an AlreadyJoined error
    async fn join_synced(&mut self, sender: &str, chat_id: &str) {
        self.send("join_chat", "", sender, chat_id).await;
        self.send("join_chat", "", sender, chat_id).await;
        let err = self.recv().await;
        assert_eq!(err.action, "error");
        assert!(err.content.contains("already joined"), "{}", err.content);
    }
}

async fn wait_until_inactive(registry: &RoomRegistry, chat_id: &str) {
    let id = ChatId::new(chat_id);
    for _ in 0..100 {
        if !registry.is_active(&id).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("room {} still active", chat_id);
}

#[tokio::test]
async fn test_message_reaches_peer_not_sender() {
    let server = TestServer::start(&["r1"], false).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    a.join_synced("A", "r1").await;
    b.join_synced("B", "r1").await;

    a.send("send_text", "hi", "A", "r1").await;

    let got = b.recv().await;
    assert_eq!(got.action, "send_text");
    assert_eq!(got.content, "hi");
    assert_eq!(got.sender, "A");
    assert_eq!(got.chat_id, "r1");
    a.assert_silent().await;

    server.stop().await;
}

#[tokio::test]
async fn test_create_chat_twice() {
    let server = TestServer::start(&[], false).await;
    let mut a = server.connect().await;

    a.send("create_chat", "Second room", "A", "r2").await;
    a.send("create_chat", "Second room", "A", "r2").await;

    let err = a.recv().await;
    assert_eq!(err.action, "error");
    assert_eq!(err.chat_id, "r2");
    assert_eq!(err.content, "chat r2 already exists");

    // Created chat is immediately joinable and listed
    a.join_synced("A", "r2").await;
    let chats = server.registry.get_chats().await.unwrap();
    assert_eq!(chats, vec![Chat::new("r2", "Second room")]);

    server.stop().await;
}

#[tokio::test]
async fn test_double_join_keeps_one_member() {
    let server = TestServer::start(&["r3"], false).await;
    let mut a = server.connect().await;

    a.join_synced("A", "r3").await;

    let room = server.registry.get(&ChatId::new("r3")).await.unwrap();
    assert_eq!(room.member_count().await, 1);

    server.stop().await;
}

#[tokio::test]
async fn test_abrupt_disconnect_evicts_room() {
    let server = TestServer::start(&["r4"], true).await;
    let mut a = server.connect().await;

    a.join_synced("A", "r4").await;
    assert!(server.registry.is_active(&ChatId::new("r4")).await);

    drop(a);
    wait_until_inactive(&server.registry, "r4").await;

    server.stop().await;
}

#[tokio::test]
async fn test_disconnect_notifies_remaining_members() {
    let server = TestServer::start(&["r1"], true).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    a.join_synced("A", "r1").await;
    b.join_synced("B", "r1").await;

    drop(a);

    let notice = b.recv().await;
    assert_eq!(notice.sender, "system");
    assert_eq!(notice.content, "A left chat");

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_frame_closes_only_that_connection() {
    let server = TestServer::start(&["r1"], false).await;
    let mut bad = server.connect().await;
    let mut good = server.connect().await;

    bad.join_synced("X", "r1").await;
    bad.tx
        .send(Message::Text("{not json".to_string().into()))
        .await
        .unwrap();

    let err = bad.recv().await;
    assert_eq!(err.action, "error");
    assert!(err.content.starts_with("protocol error"));

    // The bad connection's membership is released, others keep working
    good.join_synced("G", "r1").await;
    let room = server.registry.get(&ChatId::new("r1")).await.unwrap();
    for _ in 0..50 {
        if room.member_count().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(room.member_count().await, 1);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_action_and_missing_chat() {
    let server = TestServer::start(&[], false).await;
    let mut a = server.connect().await;

    a.send("shrug", "", "A", "r9").await;
    a.send("join_chat", "", "A", "r9").await;

    let err = a.recv().await;
    assert_eq!(err.content, "chat r9 not found");

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_with_flooding_client_that_never_reads() {
    let config = Config {
        outbound_buffer: 2,
        delivery_timeout_ms: 500,
        ..Config::default()
    };
    let server = TestServer::start_with(&[], config).await;
    let Client { mut tx, rx: _rx } = server.connect().await;

    // Every frame fails and wants an error reply the client never reads
    let padding = "x".repeat(4096);
    let flood = tokio::spawn(async move {
        loop {
            let frame = Frame {
                action: "join_chat".to_string(),
                content: padding.clone(),
                sender: "F".to_string(),
                chat_id: "missing".to_string(),
            };
            let json = serde_json::to_string(&frame).unwrap();
            if tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    server.stop().await;
    flood.abort();
}

#[tokio::test]
async fn test_shutdown_releases_joined_rooms() {
    let server = TestServer::start(&["r6"], true).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    a.join_synced("A", "r6").await;
    b.join_synced("B", "r6").await;
    let registry = server.registry.clone();
    assert!(registry.is_active(&ChatId::new("r6")).await);

    server.stop().await;

    assert!(!registry.is_active(&ChatId::new("r6")).await);
    assert_eq!(registry.active_rooms().await, 0);
}
