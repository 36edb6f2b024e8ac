//! Example server that echoes every payload back to its sender and greets
//! the other sessions when someone joins.
//!
//! Run with: `cargo run --example echo_server [config.toml]`

use peerlink::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

/// Echo handler counting the payloads it bounced.
struct EchoHandler {
    message_count: AtomicU64,
}

impl EchoHandler {
    fn new() -> Self {
        Self {
            message_count: AtomicU64::new(0),
        }
    }
}

impl EventHandler for EchoHandler {
    fn on_connect(&self, server: &ServerHandle, session_id: SessionId) -> HandlerResult {
        server.log(format_args!("Session {session_id} connected"));
        let report = server.broadcast(0, format!("session {session_id} joined"), Some(session_id));
        if !report.is_complete() {
            server.log(format_args!(
                "Join notice missed {} sessions",
                report.failed.len()
            ));
        }
        Ok(())
    }

    fn on_data(
        &self,
        server: &ServerHandle,
        session_id: SessionId,
        channel: u8,
        payload: &Bytes,
    ) -> HandlerResult {
        let count = self.message_count.fetch_add(1, Ordering::Relaxed) + 1;
        server.log(format_args!(
            "Message #{count} from session {session_id}: {} bytes on channel {channel}",
            payload.len()
        ));
        server.send(session_id, channel, payload.clone())?;
        Ok(())
    }

    fn on_disconnect(&self, server: &ServerHandle, session_id: SessionId) -> HandlerResult {
        server.log(format_args!("Session {session_id} disconnected"));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    println!("Starting peerlink echo server on UDP port {}", config.port);
    println!("Press Ctrl+C to stop");

    let server = ServerBuilder::new()
        .config(config)
        .engine(UdpEngine::default())
        .build()?;
    server.attach(EchoHandler::new());

    // Spawn a task to handle shutdown
    let shutdown_handle = server.handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        println!("\nShutting down server...");
        shutdown_handle.shutdown();
    });

    server.run().await?;
    server.logger().flush();

    println!("Server stopped");
    Ok(())
}
