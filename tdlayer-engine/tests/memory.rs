use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tdlayer_engine::{Engine, EngineError, MemoryEngine};

#[test]
fn receive_yields_pushed_payloads_in_order() {
    let engine = MemoryEngine::new();
    engine.push(r#"{"@type":"a"}"#);
    engine.push(r#"{"@type":"b"}"#);

    let first  = engine.receive(Duration::from_millis(10)).unwrap();
    let second = engine.receive(Duration::from_millis(10)).unwrap();
    assert_eq!(first.as_deref(), Some(br#"{"@type":"a"}"#.as_slice()));
    assert_eq!(second.as_deref(), Some(br#"{"@type":"b"}"#.as_slice()));
    assert_eq!(engine.pending_inbound(), 0);
}

#[test]
fn empty_receive_is_not_an_error() {
    let engine = MemoryEngine::new();
    let started = Instant::now();
    assert_eq!(engine.receive(Duration::from_millis(20)).unwrap(), None);
    assert!(started.elapsed() >= Duration::from_millis(20), "receive must wait for the timeout");
    assert_eq!(engine.receive_calls(), 1);
}

#[test]
fn receive_wakes_up_on_push_from_another_thread() {
    let engine = Arc::new(MemoryEngine::new());
    let pusher = {
        let engine = engine.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            engine.push("late");
        })
    };
    let got = engine.receive(Duration::from_secs(5)).unwrap();
    assert_eq!(got.as_deref(), Some(b"late".as_slice()));
    pusher.join().unwrap();
}

#[test]
fn sent_requests_are_observable() {
    let engine = MemoryEngine::new();
    engine.send(r#"{"@type":"getMe"}"#).unwrap();
    assert_eq!(engine.next_sent(Duration::from_millis(10)).as_deref(), Some(r#"{"@type":"getMe"}"#));
    assert_eq!(engine.next_sent(Duration::from_millis(10)), None);
}

#[test]
fn execute_uses_installed_handler() {
    let engine = MemoryEngine::new();
    assert_eq!(engine.execute("{}").unwrap(), None, "no handler installed yet");

    engine.on_execute(|req| Some(format!("echo:{req}")));
    assert_eq!(engine.execute("x").unwrap().as_deref(), Some(b"echo:x".as_slice()));
}

#[test]
fn destroy_fails_every_later_call() {
    let engine = MemoryEngine::new();
    engine.push("left over");
    engine.destroy();
    engine.destroy(); // idempotent

    assert!(engine.is_destroyed());
    assert_eq!(engine.send("{}"), Err(EngineError::Destroyed));
    assert_eq!(engine.receive(Duration::from_millis(10)), Err(EngineError::Destroyed));
    assert_eq!(engine.execute("{}"), Err(EngineError::Destroyed));
}

#[test]
fn destroy_interrupts_a_blocked_receive() {
    let engine = Arc::new(MemoryEngine::new());
    let reader = {
        let engine = engine.clone();
        thread::spawn(move || engine.receive(Duration::from_secs(30)))
    };
    thread::sleep(Duration::from_millis(20));
    engine.destroy();
    assert_eq!(reader.join().unwrap(), Err(EngineError::Destroyed));
}
