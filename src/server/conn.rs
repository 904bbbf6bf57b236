//! Connection state machine.
//!
//! Every accepted socket gets one coroutine running [`Connection::run`].
//! The coroutine body executes header read, route, body read, dispatch,
//! write and recycle strictly in sequence, which gives the per-connection
//! ordering guarantee without any locking: the coroutine is the strand.
//!
//! Writes are funneled through a FIFO event channel consumed only by this
//! coroutine, so streamed frames, the final response and lifecycle
//! commands are serialized in submission order. The pipeline itself runs
//! on a separate coroutine and communicates exclusively through that
//! channel.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use may::net::TcpStream;
use may::sync::mpsc::{Receiver, Sender};
use rustls::{ServerConnection, StreamOwned};
use tracing::{debug, trace, warn};

use super::core::HttpServer;
use super::request::{Request, RequestReader};
use super::response::{Response, ResponseHead};
use crate::task::Task;

/// Items carried on the connection's serialized event queue.
pub(crate) enum ConnEvent {
    /// Full response hand-off from a finalizing task.
    Respond { response: Response, keep_alive: bool },
    /// Streamed header-only frame.
    WriteHeader(ResponseHead),
    /// Streamed body chunk.
    WriteBody(Vec<u8>),
    /// Finish the current exchange and read the next request.
    Recycle,
    /// Close the connection.
    Close,
}

/// Shared handle to a live connection, held by tasks.
#[derive(Clone)]
pub(crate) struct ConnHandle {
    events: Sender<ConnEvent>,
    closed: Arc<AtomicBool>,
    server: Arc<HttpServer>,
}

impl ConnHandle {
    pub(crate) fn send(&self, event: ConnEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn server(&self) -> &Arc<HttpServer> {
        &self.server
    }

    pub(crate) fn streamer(&self) -> StreamWriter {
        StreamWriter {
            events: self.events.clone(),
            closed: self.closed.clone(),
        }
    }
}

/// Cloneable writer feeding a connection's streamed-write queue.
///
/// Obtained from [`crate::Task::streamer`]; stays usable after the task
/// is gone, which is the basis for manually managed streaming responses
/// such as server-sent events. Writes are delivered in order; the
/// connection issues one at a time.
#[derive(Clone)]
pub struct StreamWriter {
    events: Sender<ConnEvent>,
    closed: Arc<AtomicBool>,
}

impl StreamWriter {
    /// Enqueue a header-only frame.
    pub fn write_header(&self, head: ResponseHead) {
        let _ = self.events.send(ConnEvent::WriteHeader(head));
    }

    /// Enqueue a body chunk.
    pub fn write_body(&self, chunk: impl Into<Vec<u8>>) {
        let _ = self.events.send(ConnEvent::WriteBody(chunk.into()));
    }

    /// Finish streaming and let the connection read the next request.
    pub fn recycle(&self) {
        let _ = self.events.send(ConnEvent::Recycle);
    }

    /// Finish streaming and close the connection.
    pub fn close(&self) {
        let _ = self.events.send(ConnEvent::Close);
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

/// Accepted socket, optionally TLS-wrapped.
pub(crate) enum ServerStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}

impl ServerStream {
    fn socket(&self) -> &TcpStream {
        match self {
            ServerStream::Plain(s) => s,
            ServerStream::Tls(s) => &s.sock,
        }
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket().set_read_timeout(timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket().set_write_timeout(timeout)
    }
}

impl Read for ServerStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ServerStream::Plain(s) => s.read(buf),
            ServerStream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for ServerStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ServerStream::Plain(s) => s.write(buf),
            ServerStream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ServerStream::Plain(s) => s.flush(),
            ServerStream::Tls(s) => s.flush(),
        }
    }
}

pub(crate) struct Connection {
    stream: ServerStream,
    peer: SocketAddr,
    reader: RequestReader,
    server: Arc<HttpServer>,
    handle: ConnHandle,
    events: Receiver<ConnEvent>,
    header_read_expiry_ms: u64,
    keep_alive_timeout_ms: u64,
}

impl Connection {
    pub(crate) fn new(
        stream: ServerStream,
        peer: SocketAddr,
        server: Arc<HttpServer>,
        header_read_expiry_ms: u64,
        keep_alive_timeout_ms: u64,
    ) -> Self {
        let (events_tx, events_rx) = may::sync::mpsc::channel();
        let handle = ConnHandle {
            events: events_tx,
            closed: Arc::new(AtomicBool::new(false)),
            server: server.clone(),
        };
        Self {
            stream,
            peer,
            reader: RequestReader::new(),
            server,
            handle,
            events: events_rx,
            header_read_expiry_ms,
            keep_alive_timeout_ms,
        }
    }

    /// Drive the connection until it closes.
    pub(crate) fn run(mut self) {
        let mut first = true;

        loop {
            // The idle window between requests is the header budget plus
            // the advertised keep-alive timeout.
            let header_budget = if first {
                self.header_read_expiry_ms
            } else {
                self.header_read_expiry_ms + self.keep_alive_timeout_ms
            };
            first = false;

            if self.stream.set_read_timeout(phase_timeout(header_budget)).is_err() {
                return self.close();
            }

            let head = match self.reader.read_head(&mut self.stream) {
                Ok(head) => head,
                Err(e) => {
                    trace!(peer = %self.peer, error = %e, "header read ended");
                    return self.close();
                }
            };

            if !self.server.is_running() || self.handle.is_closed() {
                return self.close();
            }

            let route = self.server.route(&head.method, &head.target);

            if self
                .stream
                .set_read_timeout(phase_timeout(route.read_expiry_ms))
                .is_err()
            {
                return self.close();
            }

            let body = match self.reader.read_body(&mut self.stream, &head, route.max_body_size) {
                Ok(body) => body,
                Err(e) => {
                    debug!(peer = %self.peer, error = %e, "body read failed");
                    return self.close();
                }
            };

            if !self.server.is_running() {
                return self.close();
            }

            let request = head.into_request(body);
            let peer_keep_alive = request.keep_alive_requested();
            let head_only = request.method == http::Method::HEAD;
            let write_expiry_ms = route.write_expiry_ms;

            if self
                .stream
                .set_write_timeout(phase_timeout(write_expiry_ms))
                .is_err()
            {
                return self.close();
            }

            self.dispatch(request, route);

            match self.drive_writes(peer_keep_alive, head_only) {
                Exchange::Recycle => continue,
                Exchange::Close => return self.close(),
            }
        }
    }

    /// Hand the request off to a fresh task on its own pipeline
    /// coroutine.
    fn dispatch(&self, request: Request, route: crate::router::RouteResult) {
        let task = Task::new(request, route, self.handle.clone());
        let stack_size = self.server.pipeline_stack_size();

        // Safety: coroutine spawning is unsafe in the `may` runtime; the
        // closure owns the task outright and the scheduler is live while
        // the server runs. If the spawn fails the task drops here and its
        // finalizer still delivers the response through the event queue.
        let spawned = unsafe {
            may::coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || task.run())
        };
        if let Err(e) = spawned {
            warn!(peer = %self.peer, error = %e, "pipeline spawn failed");
        }
    }

    /// Consume queue events until the exchange finishes.
    ///
    /// Streamed frames are written as they arrive, one at a time, in
    /// FIFO order. A `Respond` writes the full response and settles
    /// keep-alive; `Recycle`/`Close` finish a manually managed exchange.
    fn drive_writes(&mut self, peer_keep_alive: bool, head_only: bool) -> Exchange {
        loop {
            match self.events.recv() {
                Ok(ConnEvent::Respond {
                    response,
                    keep_alive,
                }) => {
                    let keep_alive = keep_alive && peer_keep_alive;
                    let wire =
                        response.serialize(keep_alive, self.server.keep_alive_secs(), head_only);
                    if self.write_all(&wire).is_err() {
                        return Exchange::Close;
                    }
                    if keep_alive && self.server.is_running() {
                        return self.finish_recycle();
                    }
                    return Exchange::Close;
                }
                Ok(ConnEvent::WriteHeader(head)) => {
                    if self.write_all(&head.serialize()).is_err() {
                        return Exchange::Close;
                    }
                }
                Ok(ConnEvent::WriteBody(chunk)) => {
                    if self.write_all(&chunk).is_err() {
                        return Exchange::Close;
                    }
                }
                Ok(ConnEvent::Recycle) => {
                    if !self.server.is_running() {
                        return Exchange::Close;
                    }
                    return self.finish_recycle();
                }
                Ok(ConnEvent::Close) | Err(_) => return Exchange::Close,
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).and_then(|()| self.stream.flush()).map_err(|e| {
            debug!(peer = %self.peer, error = %e, "write failed");
            e
        })
    }

    /// Clear the event queue of leftovers before the next request so a
    /// late writer cannot interleave into the following exchange.
    fn finish_recycle(&mut self) -> Exchange {
        loop {
            match self.events.try_recv() {
                Ok(ConnEvent::Close) => return Exchange::Close,
                Ok(_) => {
                    debug!(peer = %self.peer, "discarding stale write after recycle");
                }
                Err(_) => return Exchange::Recycle,
            }
        }
    }

    /// Idempotent graceful shutdown. TLS connections send `close_notify`
    /// before the socket goes down.
    fn close(mut self) {
        if self.handle.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!(peer = %self.peer, "closing connection");

        match &mut self.stream {
            ServerStream::Plain(s) => {
                let _ = s.shutdown(Shutdown::Both);
            }
            ServerStream::Tls(s) => {
                s.conn.send_close_notify();
                let _ = s.flush();
                let _ = s.sock.shutdown(Shutdown::Both);
            }
        }
    }
}

enum Exchange {
    Recycle,
    Close,
}

/// Zero disarms the phase timer.
fn phase_timeout(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}
