//! Ordered, timestamped application log stream.
//!
//! Lines are formatted and timestamped by the caller, then handed to a
//! writer thread through an unbounded channel, so logging never waits on the
//! output. Lines come out in call order.

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::fmt;
use std::io::{self, Write};
use std::thread;

enum Command {
    Line(String),
    Flush(Sender<()>),
}

/// Handle to the log writer thread.
///
/// Cloning is cheap; the thread exits once every clone is dropped.
#[derive(Clone)]
pub struct Logger {
    tx: Sender<Command>,
}

impl Logger {
    /// Creates a logger writing to standard error.
    ///
    /// # Errors
    /// Returns an error if the writer thread cannot be spawned.
    pub fn stderr() -> io::Result<Self> {
        Self::with_writer(io::stderr())
    }

    /// Creates a logger writing to `writer`.
    ///
    /// # Errors
    /// Returns an error if the writer thread cannot be spawned.
    pub fn with_writer<W: Write + Send + 'static>(writer: W) -> io::Result<Self> {
        let (tx, rx) = unbounded();
        thread::Builder::new()
            .name("peerlink-log".into())
            .spawn(move || write_lines(rx, writer))?;
        Ok(Self { tx })
    }

    /// Queues one line stamped with the current local time.
    pub fn log(&self, message: impl fmt::Display) {
        let line = format_line(&Local::now(), &message);
        if self.tx.send(Command::Line(line)).is_err() {
            tracing::warn!("log writer is gone, dropping line");
        }
    }

    /// Blocks until every line queued before this call is written.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("queued", &self.tx.len())
            .finish()
    }
}

/// Formats `[<Www Mmm dd yyyy> <HH:MM:SS>] | <message>`.
#[must_use]
pub fn format_line(at: &DateTime<Local>, message: &dyn fmt::Display) -> String {
    format!(
        "[{} {}] | {}",
        at.format("%a %b %d %Y"),
        at.format("%H:%M:%S"),
        message
    )
}

fn write_lines<W: Write>(rx: Receiver<Command>, mut writer: W) {
    for command in rx {
        match command {
            Command::Line(line) => {
                // Nowhere left to report a failed diagnostic write.
                let _ = writeln!(writer, "{line}");
            }
            Command::Flush(ack) => {
                let _ = writer.flush();
                let _ = ack.send(());
            }
        }
    }
    let _ = writer.flush();
}
