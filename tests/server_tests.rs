//! WebSocket server tests

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use proxy_speedtest::{
    app::Server,
    config::ServerConfig,
    links::InlineResolver,
    logging::Logger,
    output::TextTableRenderer,
    probe::{PingProbe, ProbeOutcome, SpeedProbe},
    session::Collaborators,
    ProbeError,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

struct InstantPing;

#[async_trait]
impl PingProbe for InstantPing {
    async fn ping(&self, _uri: &str, _deadline: Duration) -> ProbeOutcome<i64> {
        Ok(12)
    }
}

struct NoSpeed;

#[async_trait]
impl SpeedProbe for NoSpeed {
    async fn measure(
        &self,
        _uri: &str,
        _connect: Duration,
        _total: Duration,
        _samples: mpsc::Sender<i64>,
    ) -> ProbeOutcome<i64> {
        Err(ProbeError::Unsupported("trojan".into()))
    }
}

async fn start_server(dir: &TempDir) -> (String, CancellationToken) {
    let config = ServerConfig {
        artifact_dir: dir.path().to_path_buf(),
        ..ServerConfig::default()
    };
    let collaborators = Collaborators {
        resolver: Arc::new(InlineResolver),
        ping_probe: Arc::new(InstantPing),
        speed_probe: Arc::new(NoSpeed),
        renderer: Arc::new(TextTableRenderer::new()),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let shutdown = CancellationToken::new();

    let server = Server::new(config, collaborators, &Logger::silent("TEST"));
    tokio::spawn(server.serve(listener, shutdown.clone()));
    (url, shutdown)
}

async fn collect_until_close<S>(read: &mut S) -> Vec<Value>
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut events = Vec::new();
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(5), read.next()).await {
        match frame {
            Ok(Message::Text(text)) => events.push(serde_json::from_str(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    events
}

#[tokio::test]
async fn test_session_over_websocket() {
    let dir = TempDir::new().unwrap();
    let (url, shutdown) = start_server(&dir).await;

    let (socket, _) = connect_async(url.as_str()).await.unwrap();
    let (mut write, mut read) = socket.split();

    let request = r#"{"concurrency":2,"subscription":"trojan://pw@10.0.0.1:443?sni=x#a\ntrojan://pw@10.0.0.2:443?sni=x#b"}"#;
    write.send(Message::Text(request.to_string())).await.unwrap();

    let events = collect_until_close(&mut read).await;
    let kinds: Vec<&str> = events.iter().map(|e| e["info"].as_str().unwrap()).collect();

    assert_eq!(kinds[0], "started");
    assert_eq!(kinds.iter().filter(|k| **k == "gotserver").count(), 2);
    assert_eq!(kinds.iter().filter(|k| **k == "endone").count(), 2);
    assert!(kinds.contains(&"eof"));
    assert_eq!(*kinds.last().unwrap(), "picdata");

    shutdown.cancel();
}

#[tokio::test]
async fn test_bad_request_gets_fatal_event() {
    let dir = TempDir::new().unwrap();
    let (url, shutdown) = start_server(&dir).await;

    let (socket, _) = connect_async(url.as_str()).await.unwrap();
    let (mut write, mut read) = socket.split();
    write.send(Message::Text("garbage".to_string())).await.unwrap();

    let events = collect_until_close(&mut read).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["info"], "error");

    shutdown.cancel();
}

#[tokio::test]
async fn test_each_connection_is_its_own_session() {
    let dir = TempDir::new().unwrap();
    let (url, shutdown) = start_server(&dir).await;
    let request = r#"{"speedtestMode":"pingonly","subscription":"trojan://pw@10.0.0.1:443?sni=x#a"}"#;

    for _ in 0..2 {
        let (socket, _) = connect_async(url.as_str()).await.unwrap();
        let (mut write, mut read) = socket.split();
        write.send(Message::Text(request.to_string())).await.unwrap();

        let events = collect_until_close(&mut read).await;
        assert_eq!(events.iter().filter(|e| e["info"] == "started").count(), 1);
    }

    shutdown.cancel();
}
