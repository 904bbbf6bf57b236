//! Server-sent event helpers.
//!
//! A channel pair carries event payloads from producer coroutines to the
//! streaming side of a response. Pair with manual connection management:
//! the handler writes a `text/event-stream` header frame, then a
//! forwarding coroutine drains the receiver into the connection's
//! streamed-write queue.
//!
//! ```no_run
//! use gantry::{sse, HttpServer, ResponseHead};
//! use http::Method;
//!
//! let server = HttpServer::new();
//! server.add_route_fn(Method::GET, "/events", |task| {
//!     task.set_manual_connection_management(true);
//!     task.write_header(
//!         ResponseHead::new()
//!             .set_header("Content-Type", "text/event-stream")
//!             .set_header("Cache-Control", "no-cache"),
//!     );
//!
//!     let (tx, rx) = sse::channel();
//!     let writer = task.streamer();
//!     task.post(move || {
//!         rx.forward(&writer);
//!         writer.close();
//!     });
//!
//!     tx.send("started");
//! });
//! ```

use may::sync::mpsc;

use crate::server::StreamWriter;

/// Format one payload as a `data:` frame.
pub fn frame(data: &str) -> String {
    let mut out = String::with_capacity(data.len() + 8);
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Producer half of an event channel. Clone freely.
#[derive(Clone)]
pub struct SseSender {
    tx: mpsc::Sender<String>,
}

impl SseSender {
    /// Queue one event; dropped silently once the receiver is gone.
    pub fn send(&self, data: impl Into<String>) {
        let _ = self.tx.send(data.into());
    }
}

/// Consumer half: turns queued events into `text/event-stream` frames.
pub struct SseReceiver {
    rx: mpsc::Receiver<String>,
}

impl SseReceiver {
    /// Drain every queued event into a single frame string. Returns when
    /// all senders are dropped.
    pub fn collect(self) -> String {
        let mut out = String::new();
        for event in self.rx.iter() {
            out.push_str(&frame(&event));
        }
        out
    }

    /// Stream events into a connection as they arrive, one frame per
    /// write. Returns when all senders are dropped or the connection
    /// closes.
    pub fn forward(self, writer: &StreamWriter) {
        for event in self.rx.iter() {
            if !writer.is_open() {
                break;
            }
            writer.write_body(frame(&event));
        }
    }
}

/// Create an event channel pair.
pub fn channel() -> (SseSender, SseReceiver) {
    let (tx, rx) = mpsc::channel();
    (SseSender { tx }, SseReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_single_line() {
        assert_eq!(frame("hello"), "data: hello\n\n");
    }

    #[test]
    fn frames_multiline_payload() {
        assert_eq!(frame("a\nb"), "data: a\ndata: b\n\n");
    }

    #[test]
    fn collect_concatenates_frames() {
        let (tx, rx) = channel();
        tx.send("one");
        tx.send("two");
        drop(tx);
        assert_eq!(rx.collect(), "data: one\n\ndata: two\n\n");
    }
}
