mod common;

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use serde_json::json;
use tdlayer_client::{AuthorizationState, Client, Config, EngineError, InvocationError, Message};
use tdlayer_engine::{Engine, MemoryEngine};

use common::{WAIT, next_sent, next_update, reply, serve, start};

// ── Correlation ──────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn reply_reaches_its_caller() {
    let (client, engine) = start().await;
    let server = serve(engine.clone(), |req| match req.kind() {
        Some("getAuthorizationState") => Some(json!({"@type": "authorizationStateWaitPhoneNumber"})),
        _ => None,
    });

    let reply = client.send_and_catch(json!({"@type": "getAuthorizationState"})).await.unwrap();
    assert_eq!(reply.kind(), Some("authorizationStateWaitPhoneNumber"));
    assert_eq!(reply.extra().map(str::len), Some(20));

    let state = client.authorization_state().await.unwrap();
    assert_eq!(state, AuthorizationState::WaitPhoneNumber);

    client.destroy().await;
    server.join().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn out_of_order_replies_are_not_cross_wired() {
    let (client, engine) = start().await;

    let first  = client.send_and_catch(r#"{"@type":"echo","n":1}"#);
    let second = client.send_and_catch(r#"{"@type":"echo","n":2}"#);
    let respond = async {
        let a = next_sent(&engine).await;
        let b = next_sent(&engine).await;
        assert_ne!(a.extra(), b.extra(), "every request carries its own token");
        // Answer the later request first.
        for req in [&b, &a] {
            reply(&engine, req, json!({"@type": "echoed", "n": req.get("n").cloned()}));
        }
    };

    let (first, second, ()) = tokio::join!(first, second, respond);
    assert_eq!(first.unwrap().get("n"), Some(&json!(1)));
    assert_eq!(second.unwrap().get("n"), Some(&json!(2)));
    assert_eq!(client.pending_requests(), 0);
    client.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn many_concurrent_requests_each_get_their_own_reply() {
    const N: i64 = 32;
    let (client, engine) = start().await;

    let mut calls = Vec::new();
    for n in 0..N {
        let client = client.clone();
        calls.push(tokio::spawn(async move {
            let reply = client.send_and_catch(json!({"@type": "echo", "n": n})).await.unwrap();
            (n, reply)
        }));
    }

    let mut requests = Vec::new();
    for _ in 0..N {
        requests.push(next_sent(&engine).await);
    }
    for req in requests.iter().rev() {
        reply(&engine, req, json!({"@type": "echoed", "n": req.get("n").cloned()}));
    }

    for call in calls {
        let (n, reply) = call.await.unwrap();
        assert_eq!(reply.get("n"), Some(&json!(n)));
    }
    assert_eq!(client.pending_requests(), 0);
    client.destroy().await;
}

// ── Timeouts ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn timeout_leaves_no_registry_entry() {
    let (client, _engine) = start().await;
    assert_eq!(client.pending_requests(), 0);

    for _ in 0..3 {
        let err = client
            .send_and_catch_within(json!({"@type": "getMe"}), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::Timeout(d) if d == Duration::from_millis(30)));
    }
    assert_eq!(client.pending_requests(), 0);
    client.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn late_reply_is_discarded_and_the_loop_keeps_going() {
    let (client, engine) = start().await;
    let mut updates = client.updates().unwrap();

    let err = client
        .send_and_catch_within(json!({"@type": "getMe"}), Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let request = next_sent(&engine).await;
    reply(&engine, &request, json!({"@type": "user", "id": 1}));
    engine.push(r#"{"@type":"updateOption","name":"version"}"#);

    let update = next_update(&mut updates).await;
    assert_eq!(update.kind(), Some("updateOption"), "late reply must not surface as an update");
    assert_eq!(client.pending_requests(), 0);
    client.destroy().await;
}

// ── Update stream ────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn uncorrelated_messages_only_reach_the_stream_in_order() {
    let (client, engine) = start().await;
    let mut updates = client.updates().unwrap();
    assert!(client.updates().is_none(), "stream is handed out once");

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move {
            client.send_and_catch_within(json!({"@type": "getMe"}), Duration::from_millis(200)).await
        })
    };
    let _ = next_sent(&engine).await;

    for seq in 0..10 {
        engine.push(json!({"@type": "updateNewMessage", "seq": seq}).to_string());
    }
    for seq in 0..10 {
        let update = next_update(&mut updates).await;
        assert_eq!(update.message.get("seq"), Some(&json!(seq)));
    }

    assert!(waiter.await.unwrap().unwrap_err().is_timeout(), "updates never resolve a waiter");
    client.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_polls_change_nothing() {
    let (client, engine) = start().await;
    let mut updates = client.updates().unwrap();

    let baseline = engine.receive_calls();
    tokio::time::timeout(WAIT, async {
        while engine.receive_calls() < baseline + 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("loop keeps polling");

    assert_eq!(client.pending_requests(), 0);
    assert!(updates.try_next().is_none());
    assert!(updates.is_empty());
    client.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_frames_are_dropped() {
    let (client, engine) = start().await;
    let mut updates = client.updates().unwrap();

    engine.push("{not json");
    engine.push("[1,2,3]");
    engine.push(r#"{"no_type":true}"#);
    engine.push(r#"{"@type":"updateConnectionState"}"#);

    let update = next_update(&mut updates).await;
    assert_eq!(update.kind(), Some("updateConnectionState"));
    assert!(updates.try_next().is_none());
    client.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn full_stream_holds_back_replies_until_drained() {
    let config = tdlayer_client::Config { update_buffer: 1, ..common::config() };
    let (client, engine) = common::start_with(config).await;
    let mut updates = client.updates().unwrap();

    engine.push(r#"{"@type":"updateA"}"#);
    engine.push(r#"{"@type":"updateB"}"#);

    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.send_and_catch(json!({"@type": "getMe"})).await })
    };
    let request = next_sent(&engine).await;
    reply(&engine, &request, json!({"@type": "user"}));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!call.is_finished(), "reply queued behind a blocked update");

    assert_eq!(next_update(&mut updates).await.kind(), Some("updateA"));
    assert_eq!(next_update(&mut updates).await.kind(), Some("updateB"));
    assert_eq!(call.await.unwrap().unwrap().kind(), Some("user"));
    client.destroy().await;
}

// ── Facade ───────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn send_is_fire_and_forget() {
    let (client, engine) = start().await;
    client.send(r#"{"@type":"setOption","name":"online","value":{"@type":"optionValueBoolean","value":true}}"#).unwrap();

    let sent = next_sent(&engine).await;
    assert_eq!(sent.kind(), Some("setOption"));
    assert_eq!(sent.extra(), None);
    assert_eq!(client.pending_requests(), 0);
    client.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn raw_reply_is_returned_byte_for_byte() {
    let (client, engine) = start().await;
    let call = client.send_and_catch_raw(Message::new("getOption").with("name", "version"));
    let respond = async {
        let req = next_sent(&engine).await;
        let raw = format!(r#"{{ "@type" : "optionValueString", "value": "1.8.0", "@extra": "{}" }}"#, req.extra().unwrap());
        engine.push(raw.clone());
        raw
    };

    let (got, expected) = tokio::join!(call, respond);
    assert_eq!(got.unwrap(), expected.into_bytes());
    client.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn execute_bypasses_the_loop() {
    let (client, engine) = start().await;
    engine.on_execute(|req| {
        req.contains("getTextEntities")
            .then(|| r#"{"@type":"textEntities","entities":[]}"#.to_string())
    });

    let reply = client.execute(json!({"@type": "getTextEntities", "text": "@tdlib"})).unwrap();
    assert_eq!(reply.kind(), Some("textEntities"));
    assert!(matches!(client.execute(json!({"@type": "getMe"})), Err(InvocationError::Decode(_))));
    assert_eq!(engine.next_sent(Duration::from_millis(20)), None, "execute never goes through send");
    client.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn error_replies_surface_as_td_errors() {
    let (client, engine) = start().await;
    let server = serve(engine.clone(), |_| {
        Some(json!({"@type": "error", "code": 400, "message": "PHONE_NUMBER_INVALID"}))
    });

    let err = client.send_phone_number("+0").await.unwrap_err();
    assert!(err.is("PHONE_NUMBER_*"), "{err}");

    // The untyped path hands the error object back as-is.
    let reply = client.send_and_catch(json!({"@type": "getMe"})).await.unwrap();
    assert_eq!(reply.kind(), Some("error"));

    client.destroy().await;
    server.join().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_requests_fail_before_sending() {
    let (client, engine) = start().await;
    assert!(matches!(client.send("{not json"), Err(InvocationError::Decode(_))));
    assert!(matches!(client.send_and_catch(json!([1])).await, Err(InvocationError::Decode(_))));
    assert_eq!(engine.next_sent(Duration::from_millis(20)), None);
    assert_eq!(client.pending_requests(), 0);
    client.destroy().await;
}

// ── Shutdown ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn destroy_fails_pending_requests_and_closes_the_stream() {
    let (client, engine) = start().await;
    let mut updates = client.updates().unwrap();

    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.send_and_catch(json!({"@type": "getMe"})).await })
    };
    let _ = next_sent(&engine).await;
    assert_eq!(client.pending_requests(), 1);

    client.destroy().await;

    assert!(matches!(call.await.unwrap(), Err(InvocationError::Dropped)));
    assert!(engine.is_destroyed());
    assert_eq!(client.pending_requests(), 0);
    assert!(updates.next().await.is_none());
    assert!(matches!(
        client.send(json!({"@type": "getMe"})),
        Err(InvocationError::Engine(EngineError::Destroyed))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn dead_transport_stops_the_loop() {
    let (client, engine) = start().await;
    let mut updates = client.updates().unwrap();

    engine.destroy();
    assert!(tokio::time::timeout(WAIT, updates.next()).await.unwrap().is_none());

    let err = client.send_and_catch(json!({"@type": "getMe"})).await.unwrap_err();
    assert!(matches!(err, InvocationError::Engine(EngineError::Destroyed)));
    assert_eq!(client.pending_requests(), 0);
    client.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_the_last_clone_stops_the_loop() {
    let (client, engine) = start().await;
    let mut updates = client.updates().unwrap();
    let other = client.clone();

    drop(client);
    let baseline = engine.receive_calls();
    tokio::time::timeout(WAIT, async {
        while engine.receive_calls() < baseline + 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("a live clone keeps the loop polling");

    drop(other);
    assert!(tokio::time::timeout(WAIT, updates.next()).await.unwrap().is_none(), "loop exits");

    let settled = engine.receive_calls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.receive_calls(), settled);
}

// ── Startup ──────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn log_verbosity_is_set_through_execute_before_the_loop_starts() {
    let engine = Arc::new(MemoryEngine::new());
    let executed = Arc::new(Mutex::new(Vec::new()));
    {
        let executed = executed.clone();
        engine.on_execute(move |req| {
            executed.lock().unwrap().push(req.to_string());
            Some(r#"{"@type":"ok"}"#.to_string())
        });
    }

    let config = Config { log_verbosity: Some(2), ..common::config() };
    let client = Client::start_shared(engine.clone(), config).await.unwrap();

    let executed = executed.lock().unwrap().clone();
    assert_eq!(executed.len(), 1);
    let request = common::parse(&executed[0]);
    assert_eq!(request.kind(), Some("setLogVerbosityLevel"));
    assert_eq!(request.get("new_verbosity_level"), Some(&json!(2)));
    assert_eq!(request.extra(), None, "execute is never correlated");

    assert_eq!(next_sent(&engine).await.kind(), Some("setTdlibParameters"));
    client.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_log_verbosity_fails_start() {
    let config = || Config { log_verbosity: Some(99), ..common::config() };

    let engine = Arc::new(MemoryEngine::new());
    engine.on_execute(|_| {
        Some(r#"{"@type":"error","code":400,"message":"Wrong new verbosity level specified"}"#.to_string())
    });
    let err = Client::start_shared(engine.clone(), config()).await.err().unwrap();
    assert!(matches!(err, InvocationError::Td(ref e) if e.code == 400), "{err}");
    assert_eq!(engine.receive_calls(), 0, "loop never started");
    assert_eq!(engine.next_sent(Duration::from_millis(20)), None, "parameters never sent");

    // No execute handler: the engine has no synchronous answer at all.
    let silent = Arc::new(MemoryEngine::new());
    let err = Client::start_shared(silent.clone(), config()).await.err().unwrap();
    assert!(matches!(err, InvocationError::Decode(_)), "{err}");
    assert_eq!(silent.receive_calls(), 0);
}

#[test]
fn start_outside_a_runtime_is_an_error() {
    let engine = Arc::new(MemoryEngine::new());
    let mut start = std::pin::pin!(Client::start_shared(engine.clone(), common::config()));
    let mut cx = Context::from_waker(Waker::noop());

    match start.as_mut().poll(&mut cx) {
        Poll::Ready(Err(InvocationError::NoRuntime)) => {}
        Poll::Ready(Err(e)) => panic!("unexpected error: {e}"),
        Poll::Ready(Ok(_))  => panic!("started without a runtime"),
        Poll::Pending       => panic!("expected an immediate error"),
    }
    assert_eq!(engine.next_sent(Duration::ZERO), None);
    assert_eq!(engine.receive_calls(), 0);
}
