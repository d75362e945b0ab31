#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use tdlayer_client::{Client, Config, Frame, Message, UpdateStream};
use tdlayer_engine::MemoryEngine;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn config() -> Config {
    Config {
        request_timeout: WAIT,
        poll_timeout:    Duration::from_millis(20),
        ..Config::new(94575, "a3406de8d171bb422bb6ddf3bbd800e2")
    }
}

/// Start a client on a fresh in-memory engine and swallow the
/// `setTdlibParameters` it sends on start.
pub async fn start() -> (Client, Arc<MemoryEngine>) {
    start_with(config()).await
}

pub async fn start_with(config: Config) -> (Client, Arc<MemoryEngine>) {
    let engine = Arc::new(MemoryEngine::new());
    let client = Client::start_shared(engine.clone(), config).await.unwrap();
    let first = engine.next_sent(WAIT).expect("parameters sent on start");
    assert_eq!(parse(&first).kind(), Some("setTdlibParameters"));
    (client, engine)
}

pub fn parse(raw: &str) -> Message {
    Message::from_slice(raw.as_bytes()).unwrap()
}

/// Wait (off the async thread) for the next request the client sends.
pub async fn next_sent(engine: &Arc<MemoryEngine>) -> Message {
    let engine = engine.clone();
    let raw = tokio::task::spawn_blocking(move || engine.next_sent(WAIT))
        .await
        .unwrap()
        .expect("client sent a request");
    parse(&raw)
}

/// Push `body` as the reply to `request`, echoing its token.
pub fn reply(engine: &MemoryEngine, request: &Message, mut body: Value) {
    if let Some(extra) = request.extra() {
        body["@extra"] = json!(extra);
    }
    engine.push(body.to_string());
}

/// Answer every request with whatever `handler` returns, until the engine
/// is destroyed.
pub fn serve<F>(engine: Arc<MemoryEngine>, mut handler: F) -> thread::JoinHandle<()>
where
    F: FnMut(&Message) -> Option<Value> + Send + 'static,
{
    thread::spawn(move || {
        while !engine.is_destroyed() {
            let Some(raw) = engine.next_sent(Duration::from_millis(20)) else { continue };
            let request = parse(&raw);
            if let Some(body) = handler(&request) {
                reply(&engine, &request, body);
            }
        }
    })
}

pub async fn next_update(updates: &mut UpdateStream) -> Frame {
    tokio::time::timeout(WAIT, updates.next())
        .await
        .expect("update within deadline")
        .expect("stream open")
}
