use bytes::Bytes;
use parking_lot::Mutex;
use peerlink_core::{Event, EventKind, IdAllocator};
use peerlink_server::{
    EventHandler, HandlerResult, IdleStrategy, Logger, SendError, Server, ServerBuilder,
    ServerError, ServerHandle, ServerState,
};
use peerlink_transport::{ScriptHandle, ScriptedEngine};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

type Trace = Arc<Mutex<Vec<String>>>;

fn scripted(builder: ServerBuilder) -> (Server, ScriptHandle) {
    let (engine, script) = ScriptedEngine::new();
    let server = builder
        .engine(engine)
        .logger(Logger::with_writer(std::io::sink()).unwrap())
        .build()
        .unwrap();
    (server, script)
}

async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

fn record_all(server: &ServerHandle) -> Trace {
    let trace = Trace::default();
    for kind in EventKind::ALL {
        let t = Arc::clone(&trace);
        server.on(kind, move |_, event| {
            let line = match event {
                Event::Connect(id) => format!("connect {id}"),
                Event::Data {
                    session_id,
                    payload,
                    ..
                } => format!("data {session_id} {}", String::from_utf8_lossy(payload)),
                Event::Disconnect(id) => format!("disconnect {id}"),
            };
            t.lock().push(line);
            Ok(())
        });
    }
    trace
}

#[tokio::test]
async fn test_events_keep_engine_order() {
    let (server, script) = scripted(ServerBuilder::new());
    let trace = record_all(&server);

    script.connect(0);
    script.connect(1);
    script.receive(0, 0, "a");
    script.receive(1, 0, "b");
    script.receive(0, 0, "c");
    script.disconnect(1);
    script.disconnect(0);

    server.listen().unwrap();
    eventually(|| trace.lock().len() == 7).await;

    assert_eq!(
        *trace.lock(),
        [
            "connect 0",
            "connect 1",
            "data 0 a",
            "data 1 b",
            "data 0 c",
            "disconnect 1",
            "disconnect 0",
        ]
    );
    server.shutdown().await;
}

#[tokio::test]
async fn test_listen_seeds_engine() {
    let (server, script) = scripted(ServerBuilder::new().port(4100).base_session_id(20));
    server.listen().unwrap();

    assert_eq!(script.initialized_on(), Some(4100));
    assert_eq!(script.base_session_id(), Some(20));
    assert_eq!(server.state(), ServerState::Listening);

    assert!(matches!(server.listen(), Err(ServerError::AlreadyListening)));
    server.shutdown().await;
}

#[tokio::test]
async fn test_session_is_live_until_disconnect_returns() {
    let (server, script) = scripted(ServerBuilder::new());
    let seen_live = Arc::new(Mutex::new(None));
    let s = Arc::clone(&seen_live);
    server.on_disconnect(move |server, id| {
        *s.lock() = Some(server.is_live(id));
        Ok(())
    });

    script.connect(3);
    script.disconnect(3);
    server.listen().unwrap();
    eventually(|| seen_live.lock().is_some()).await;

    assert_eq!(*seen_live.lock(), Some(true));
    assert!(!server.is_live(3));
    assert!(matches!(
        server.send(3, 0, "late"),
        Err(SendError::NotLive(3))
    ));
    server.shutdown().await;
}

#[tokio::test]
async fn test_send_reaches_engine() {
    let (server, script) = scripted(ServerBuilder::new());
    server.on_data(|server, id, payload| {
        server.send(id, 1, payload.clone())?;
        Ok(())
    });

    script.connect(0);
    script.receive(0, 0, "ping");
    server.listen().unwrap();
    eventually(|| !script.sent_to(0).is_empty()).await;

    let sent = script.sent_to(0);
    assert_eq!(sent[0].channel, 1);
    assert_eq!(sent[0].payloads, [Bytes::from_static(b"ping")]);

    server
        .send_packets(0, 2, vec![Bytes::from_static(b"x"), Bytes::from_static(b"y")])
        .unwrap();
    assert_eq!(script.sent_to(0)[1].payloads.len(), 2);
    assert!(matches!(
        server.send_packets(0, 2, Vec::new()),
        Err(SendError::EmptyPacket)
    ));
    assert!(matches!(server.send(99, 0, "x"), Err(SendError::NotLive(99))));
    server.shutdown().await;
}

#[tokio::test]
async fn test_broadcast_survives_failing_session() {
    let (server, script) = scripted(ServerBuilder::new());
    for id in 0..4 {
        script.connect(id);
    }
    script.fail_sends_to(1);
    server.listen().unwrap();
    eventually(|| server.session_count() == 4).await;

    let report = server.broadcast(0, "hello", Some(3));
    assert_eq!(report.delivered, [0, 2]);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0],
        (1, SendError::Engine { session_id: 1, .. })
    ));
    assert!(!report.is_complete());
    assert!(script.sent_to(3).is_empty());
    server.shutdown().await;
}

#[tokio::test]
async fn test_reused_id_sees_cached_state() {
    let (server, script) = scripted(ServerBuilder::new());
    let trace = Trace::default();

    let t = Arc::clone(&trace);
    server.on_connect(move |server, id| {
        let visits = server.cache().get_as::<AtomicUsize>(id);
        match visits {
            Some(visits) => {
                let n = visits.fetch_add(1, Ordering::SeqCst) + 1;
                t.lock().push(format!("connect {id} visit {n}"));
            }
            None => {
                server.cache().insert(id, AtomicUsize::new(1));
                t.lock().push(format!("connect {id} first"));
            }
        }
        Ok(())
    });
    let t = Arc::clone(&trace);
    server.on_data(move |_, id, _| {
        t.lock().push(format!("data {id}"));
        Ok(())
    });
    let t = Arc::clone(&trace);
    server.on_disconnect(move |_, id| {
        t.lock().push(format!("disconnect {id}"));
        Ok(())
    });

    script.connect(5);
    script.receive(5, 0, "x");
    script.disconnect(5);
    script.connect(5);
    server.listen().unwrap();
    eventually(|| trace.lock().len() == 4).await;

    assert_eq!(
        *trace.lock(),
        ["connect 5 first", "data 5", "disconnect 5", "connect 5 visit 2"]
    );
    assert!(server.is_live(5));
    server.shutdown().await;
}

#[tokio::test]
async fn test_thousand_connects_get_distinct_ids_above_base() {
    let (server, script) = scripted(ServerBuilder::new().base_session_id(500));
    let mut ids = IdAllocator::new(500);
    for _ in 0..1000 {
        script.connect(ids.allocate().unwrap());
    }

    server.listen().unwrap();
    eventually(|| server.session_count() == 1000).await;

    let live = server.session_ids();
    assert_eq!(live.len(), 1000);
    assert_eq!(live.first(), Some(&500));
    assert_eq!(live.last(), Some(&1499));
    assert!(live.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(server.stats().anomalies, 0);
    server.shutdown().await;
}

#[tokio::test]
async fn test_idle_loop_lets_other_tasks_run() {
    let (server, script) = scripted(ServerBuilder::new());
    server.listen().unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    let worker = tokio::spawn(async move {
        for _ in 0..1000 {
            c.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
        }
    });

    tokio::time::timeout(WAIT, worker).await.unwrap().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1000);
    assert!(script.polls() > 0);
    server.shutdown().await;
}

#[tokio::test]
async fn test_busy_loop_lets_other_tasks_run() {
    const BACKLOG: u64 = 5000;
    let (server, script) = scripted(ServerBuilder::new());
    script.connect(0);
    for i in 0..BACKLOG {
        script.receive(0, 0, format!("m{i}"));
    }
    server.listen().unwrap();

    // Single-threaded runtime: this task only runs if the loop gives way mid-backlog.
    let handle = server.handle();
    let observer = tokio::spawn(async move { handle.stats().events_dispatched });
    let seen = tokio::time::timeout(WAIT, observer).await.unwrap().unwrap();
    assert!(seen < BACKLOG + 1, "loop dispatched {seen} events without yielding");

    eventually(|| server.stats().events_dispatched == BACKLOG + 1).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_sleep_idle_strategy_keeps_polling() {
    let (server, script) = scripted(ServerBuilder::new().idle(IdleStrategy::SleepMs(1)));
    let trace = record_all(&server);
    server.listen().unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    script.connect(1);
    eventually(|| trace.lock().len() == 1).await;

    // Shutdown must not wait out a long sleep either.
    server.shutdown().await;
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn test_panicking_handler_is_isolated() {
    let (server, script) = scripted(ServerBuilder::new());
    server.on_data(|_, _, payload| {
        if payload.as_ref() == b"boom" {
            panic!("handler bug");
        }
        Ok(())
    });
    server.on_data(|_, _, _| Err("always fails".into()));
    let trace = record_all(&server);

    script.connect(0);
    script.receive(0, 0, "boom");
    script.receive(0, 0, "fine");
    server.listen().unwrap();
    eventually(|| trace.lock().len() == 3).await;

    assert_eq!(*trace.lock(), ["connect 0", "data 0 boom", "data 0 fine"]);
    assert_eq!(server.stats().handler_failures, 3);
    assert_eq!(server.state(), ServerState::Listening);
    server.shutdown().await;
}

#[tokio::test]
async fn test_poll_errors_are_skipped() {
    let (server, script) = scripted(ServerBuilder::new());
    let trace = record_all(&server);

    script.push_error("garbled datagram");
    script.connect(2);
    server.listen().unwrap();
    eventually(|| trace.lock().len() == 1).await;

    assert_eq!(*trace.lock(), ["connect 2"]);
    assert_eq!(server.stats().poll_errors, 1);
    server.shutdown().await;
}

#[tokio::test]
async fn test_capacity_refusal_keeps_existing_sessions() {
    let (server, script) = scripted(ServerBuilder::new().max_sessions(2));
    let trace = record_all(&server);

    script.connect(0);
    script.connect(1);
    script.connect(2);
    script.receive(0, 0, "still here");
    server.listen().unwrap();
    eventually(|| trace.lock().len() == 3).await;

    assert_eq!(*trace.lock(), ["connect 0", "connect 1", "data 0 still here"]);
    assert_eq!(script.dropped(), [2]);
    assert_eq!(server.stats().refused_connections, 1);
    assert!(!server.is_live(2));
    server.shutdown().await;
}

#[tokio::test]
async fn test_engine_failure_fails_listen() {
    let (server, script) = scripted(ServerBuilder::new());
    script.fail_initialize("address in use");

    let result = server.listen();
    assert!(matches!(result, Err(ServerError::Engine(_))));
    assert_eq!(server.state(), ServerState::Idle);
    assert_eq!(script.polls(), 0);
}

#[tokio::test]
async fn test_shutdown_discards_pending_and_skips_disconnects() {
    let (server, script) = scripted(ServerBuilder::new());
    let trace = record_all(&server);
    server.on_connect(|server, id| {
        if id == 1 {
            server.shutdown();
        }
        Ok(())
    });

    script.connect(0);
    script.connect(1);
    script.receive(0, 0, "never");
    script.disconnect(0);
    server.run().await.unwrap();

    assert_eq!(*trace.lock(), ["connect 0", "connect 1"]);
    assert_eq!(script.pending(), 2);
    assert!(script.is_shut_down());
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.session_count(), 0);
    assert!(matches!(server.send(0, 0, "x"), Err(SendError::Shutdown)));
    assert!(server.broadcast(0, "x", None).delivered.is_empty());
    assert!(matches!(server.listen(), Err(ServerError::Shutdown)));
}

#[tokio::test]
async fn test_handlers_added_while_listening() {
    let (server, script) = scripted(ServerBuilder::new());
    server.listen().unwrap();

    script.connect(0);
    eventually(|| server.session_count() == 1).await;

    let trace = record_all(&server);
    script.receive(0, 0, "later");
    eventually(|| trace.lock().len() == 1).await;
    assert_eq!(*trace.lock(), ["data 0 later"]);
    server.shutdown().await;
}

#[tokio::test]
async fn test_off_and_attach() {
    struct Counter(Arc<AtomicUsize>);

    impl EventHandler for Counter {
        fn on_data(
            &self,
            _server: &ServerHandle,
            _session_id: u32,
            channel: u8,
            _payload: &Bytes,
        ) -> HandlerResult {
            self.0.fetch_add(usize::from(channel), Ordering::SeqCst);
            Ok(())
        }
    }

    let (server, script) = scripted(ServerBuilder::new());
    let total = Arc::new(AtomicUsize::new(0));
    let ids = server.attach(Counter(Arc::clone(&total)));
    let trace = record_all(&server);

    script.connect(0);
    script.receive(0, 7, "a");
    server.listen().unwrap();
    eventually(|| trace.lock().len() == 2).await;
    assert_eq!(total.load(Ordering::SeqCst), 7);

    assert!(server.off(ids[1]));
    script.receive(0, 7, "b");
    eventually(|| trace.lock().len() == 3).await;
    assert_eq!(total.load(Ordering::SeqCst), 7);
    server.shutdown().await;
}
