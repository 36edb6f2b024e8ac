//! Poll loop bridging the engine to the dispatcher.
//!
//! One task polls the engine, normalizes each raw event against the session
//! registry and dispatches it before polling again, so events reach handlers
//! in engine order and never concurrently.

use crate::error::RegistryError;
use crate::handle::{Counters, ServerHandle, ServerState};
use peerlink_core::{Event, RawEvent, SessionId};

/// Events dispatched back to back before the loop yields to the runtime.
const EVENTS_PER_YIELD: u32 = 32;

/// Runs until shutdown is requested, then stops the server.
pub(crate) async fn run(server: ServerHandle) {
    let shared = &server.shared;
    let token = shared.shutdown.clone();
    let idle = shared.config.idle.delay();
    let mut burst = 0u32;

    while !token.is_cancelled() {
        let polled = shared.engine.lock().poll();
        let produced = match polled {
            Ok(RawEvent::None) => false,
            Ok(raw) => {
                process(&server, raw);
                true
            }
            Err(e) => {
                Counters::bump(&shared.counters.poll_errors, 1);
                tracing::warn!("Engine poll failed, skipping tick: {}", e);
                false
            }
        };

        if produced {
            burst += 1;
            if burst >= EVENTS_PER_YIELD {
                burst = 0;
                tokio::task::yield_now().await;
            }
        } else {
            burst = 0;
            match idle {
                None => tokio::task::yield_now().await,
                Some(delay) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = token.cancelled() => {}
                    }
                }
            }
        }
    }

    stop(&server);
}

/// Normalizes one raw event and dispatches it.
pub(crate) fn process(server: &ServerHandle, raw: RawEvent) {
    let shared = &server.shared;
    match raw {
        RawEvent::Connect { session_id, peer } => {
            let assigned = shared.registry.write().assign(session_id, peer);
            match assigned {
                Ok(id) => {
                    tracing::debug!("Session {} connected from {:?}", id, peer);
                    deliver(server, &Event::Connect(id));
                }
                Err(RegistryError::Exhausted { capacity }) => {
                    Counters::bump(&shared.counters.refused, 1);
                    shared.engine.lock().disconnect(session_id);
                    tracing::error!(
                        "Refusing session {}: all {} session slots are live",
                        session_id,
                        capacity
                    );
                    shared.logger.log(format_args!(
                        "Refused connection {session_id}: session capacity {capacity} reached"
                    ));
                }
                Err(e) => anomaly(server, session_id, &e),
            }
        }
        RawEvent::Receive {
            session_id,
            channel,
            payload,
        } => {
            let live = shared.registry.write().touch(session_id, payload.len());
            if !live {
                anomaly(server, session_id, &"data for a session that is not live");
                return;
            }
            deliver(
                server,
                &Event::Data {
                    session_id,
                    channel,
                    payload,
                },
            );
        }
        RawEvent::Disconnect { session_id } => {
            if !shared.registry.read().is_live(session_id) {
                anomaly(server, session_id, &"disconnect for a session that is not live");
                return;
            }
            // Handlers still see the session as live; the ID is reusable only after.
            deliver(server, &Event::Disconnect(session_id));
            shared.registry.write().release(session_id);
            tracing::debug!("Session {} released", session_id);
        }
        RawEvent::None => {}
    }
}

fn deliver(server: &ServerHandle, event: &Event) {
    let counters = &server.shared.counters;
    let outcome = server.shared.dispatcher.dispatch(server, event);
    Counters::bump(&counters.dispatched, 1);
    Counters::bump(&counters.handler_failures, outcome.failed as u64);
}

fn anomaly(server: &ServerHandle, session_id: SessionId, reason: &dyn std::fmt::Display) {
    Counters::bump(&server.shared.counters.anomalies, 1);
    tracing::warn!("Dropping engine event for session {}: {}", session_id, reason);
}

fn stop(server: &ServerHandle) {
    let shared = &server.shared;
    shared.dispatcher.close();
    shared.engine.lock().shutdown();
    let dropped = shared.registry.write().clear();
    shared.set_state(ServerState::Stopped);

    tracing::info!("Server stopped, {} live sessions dropped", dropped);
    shared
        .logger
        .log(format_args!("Server stopped ({dropped} live sessions dropped)"));
}
