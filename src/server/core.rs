//! Server: acceptors, worker pool, route table, sessions, configuration.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use http::Method;
use may::coroutine::JoinHandle;
use may::go;
use may::net::TcpListener;
use tracing::{error, info, trace, warn};

use super::conn::{Connection, ServerStream};
use super::tls::TlsContext;
use crate::aspect::Aspect;
use crate::context::Context;
use crate::handler::{FnHandler, Handler};
use crate::logger::{LogLevel, Logger, TracingLogger};
use crate::router::{RouteResult, RouteTable};
use crate::runtime_config::RuntimeConfig;
use crate::session::SessionMap;
use crate::task::Task;

const DEFAULT_HEADER_READ_EXPIRY_MS: u64 = 3000;
const DEFAULT_KEEP_ALIVE_TIMEOUT_MS: u64 = 4000;

/// Everything configurable before start, guarded by one lock so
/// configuration and the start/stop transitions serialize.
struct ServerInner {
    route_table: RouteTable,
    header_read_expiry_ms: u64,
    keep_alive_timeout_ms: u64,
    logger: Arc<dyn Logger>,
    tls: Option<TlsContext>,
    listen_addrs: Vec<SocketAddr>,
}

/// Multithreaded HTTP/1.1 server with a programmable request pipeline.
///
/// Configuration is fluent and only effective before [`start`]; while the
/// server runs every mutator is a silent no-op that still returns `self`,
/// so chains never break. Observation and runtime operations (routing,
/// sessions, posting work, logging) are available at any time.
///
/// ```no_run
/// use gantry::HttpServer;
/// use http::Method;
///
/// let server = HttpServer::new();
/// server
///     .add_listen("127.0.0.1:8080".parse().unwrap())
///     .add_route_fn(Method::GET, "/ping", |task| {
///         task.set_body("pong");
///     });
/// assert!(server.start(4));
/// # server.stop();
/// ```
///
/// [`start`]: HttpServer::start
pub struct HttpServer {
    inner: RwLock<ServerInner>,
    running: AtomicBool,
    sessions: SessionMap,
    context: Arc<Context>,
    weak_self: Weak<HttpServer>,
    pipeline_stack_size: AtomicUsize,
    accept_handles: Mutex<Vec<JoinHandle<()>>>,
    cleaner_handle: Mutex<Option<JoinHandle<()>>>,
    bound_addrs: Mutex<Vec<SocketAddr>>,
}

impl HttpServer {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            inner: RwLock::new(ServerInner {
                route_table: RouteTable::new(),
                header_read_expiry_ms: DEFAULT_HEADER_READ_EXPIRY_MS,
                keep_alive_timeout_ms: DEFAULT_KEEP_ALIVE_TIMEOUT_MS,
                logger: Arc::new(TracingLogger),
                tls: None,
                listen_addrs: Vec::new(),
            }),
            running: AtomicBool::new(false),
            sessions: SessionMap::new(),
            context: Arc::new(Context::new()),
            weak_self: weak.clone(),
            pipeline_stack_size: AtomicUsize::new(RuntimeConfig::default().stack_size),
            accept_handles: Mutex::new(Vec::new()),
            cleaner_handle: Mutex::new(None),
            bound_addrs: Mutex::new(Vec::new()),
        })
    }

    // ----- configuration (pre-start only) -----

    /// Register a handler for `(method, target)`.
    pub fn add_route(&self, method: Method, target: &str, handler: Arc<dyn Handler>) -> &Self {
        self.configure(|inner| {
            if !inner.route_table.add_route(&method, target, handler) {
                warn!(%method, target, "route registration rejected");
            }
        })
    }

    /// Register a closure handler for `(method, target)`.
    pub fn add_route_fn<F>(&self, method: Method, target: &str, f: F) -> &Self
    where
        F: Fn(&mut Task) + Send + Sync + 'static,
    {
        self.add_route(method, target, Arc::new(FnHandler::new(f)))
    }

    /// Register a handler that also swallows all longer paths under
    /// `target` (prefix-style route).
    pub fn add_exclusive_route(
        &self,
        method: Method,
        target: &str,
        handler: Arc<dyn Handler>,
    ) -> &Self {
        self.configure(|inner| {
            if !inner.route_table.add_exclusive_route(&method, target, handler) {
                warn!(%method, target, "exclusive route registration rejected");
            }
        })
    }

    /// Closure form of [`add_exclusive_route`](Self::add_exclusive_route).
    pub fn add_exclusive_route_fn<F>(&self, method: Method, target: &str, f: F) -> &Self
    where
        F: Fn(&mut Task) + Send + Sync + 'static,
    {
        self.add_exclusive_route(method, target, Arc::new(FnHandler::new(f)))
    }

    /// Attach an aspect to one route layer.
    pub fn add_aspect(&self, method: Method, target: &str, aspect: Arc<dyn Aspect>) -> &Self {
        self.configure(|inner| {
            if !inner.route_table.add_aspect(&method, target, aspect) {
                warn!(%method, target, "aspect registration rejected");
            }
        })
    }

    /// Attach an aspect to every matched route of every method.
    pub fn add_global_aspect(&self, aspect: Arc<dyn Aspect>) -> &Self {
        self.configure(|inner| inner.route_table.add_global_aspect(aspect))
    }

    /// Attach an aspect to every matched route of one method.
    pub fn add_method_aspect(&self, method: Method, aspect: Arc<dyn Aspect>) -> &Self {
        self.configure(|inner| inner.route_table.add_method_aspect(&method, aspect))
    }

    /// Replace the fallback handler used when no route matches.
    pub fn set_default_handler(&self, handler: Arc<dyn Handler>) -> &Self {
        self.configure(|inner| inner.route_table.set_default_handler(handler))
    }

    /// Closure form of [`set_default_handler`](Self::set_default_handler).
    pub fn set_default_handler_fn<F>(&self, f: F) -> &Self
    where
        F: Fn(&mut Task) + Send + Sync + 'static,
    {
        self.set_default_handler(Arc::new(FnHandler::new(f)))
    }

    /// Add a listening endpoint; bound when the server starts.
    pub fn add_listen(&self, addr: SocketAddr) -> &Self {
        self.configure(|inner| inner.listen_addrs.push(addr))
    }

    pub fn set_read_expiry(&self, method: Method, target: &str, expiry_ms: u64) -> &Self {
        self.configure(|inner| {
            inner.route_table.set_read_expiry(&method, target, expiry_ms);
        })
    }

    pub fn set_write_expiry(&self, method: Method, target: &str, expiry_ms: u64) -> &Self {
        self.configure(|inner| {
            inner.route_table.set_write_expiry(&method, target, expiry_ms);
        })
    }

    pub fn set_max_body_size(&self, method: Method, target: &str, size: usize) -> &Self {
        self.configure(|inner| {
            inner.route_table.set_max_body_size(&method, target, size);
        })
    }

    pub fn set_default_read_expiry(&self, expiry_ms: u64) -> &Self {
        self.configure(|inner| inner.route_table.set_default_read_expiry(expiry_ms))
    }

    pub fn set_default_write_expiry(&self, expiry_ms: u64) -> &Self {
        self.configure(|inner| inner.route_table.set_default_write_expiry(expiry_ms))
    }

    pub fn set_default_max_body_size(&self, size: usize) -> &Self {
        self.configure(|inner| inner.route_table.set_default_max_body_size(size))
    }

    /// Budget for reading a request head, also the base of the idle
    /// window between keep-alive requests.
    pub fn set_header_read_expiry(&self, expiry_ms: u64) -> &Self {
        self.configure(|inner| inner.header_read_expiry_ms = expiry_ms)
    }

    /// Idle window advertised in `Keep-Alive: timeout=…`.
    pub fn set_keep_alive_timeout(&self, timeout_ms: u64) -> &Self {
        self.configure(|inner| inner.keep_alive_timeout_ms = timeout_ms)
    }

    pub fn set_default_session_timeout(&self, timeout_ms: u64) -> &Self {
        self.configure(|_| self.sessions.set_default_timeout(timeout_ms))
    }

    pub fn set_session_cleaner_interval(&self, interval_ms: u64) -> &Self {
        self.configure(|_| self.sessions.set_cleaner_interval(interval_ms))
    }

    /// Enable or disable the background session cleaner; it starts with
    /// the server.
    pub fn set_background_session_cleaner(&self, enabled: bool) -> &Self {
        self.configure(|_| self.sessions.set_cleaner_enabled(enabled))
    }

    pub fn set_logger(&self, logger: Arc<dyn Logger>) -> &Self {
        self.configure(|inner| inner.logger = logger)
    }

    pub fn set_tls_context(&self, tls: TlsContext) -> &Self {
        self.configure(|inner| inner.tls = Some(tls))
    }

    pub fn unset_tls_context(&self) -> &Self {
        self.configure(|inner| inner.tls = None)
    }

    /// Run `f` against the configuration unless the server is running.
    fn configure(&self, f: impl FnOnce(&mut ServerInner)) -> &Self {
        let mut inner = self.inner.write().unwrap();
        if !self.running.load(Ordering::Acquire) {
            f(&mut inner);
        }
        self
    }

    // ----- lifecycle -----

    /// Start accepting connections with `thread_count` scheduler workers.
    ///
    /// Returns false for a zero thread count, when already running, or
    /// when a listener fails to bind. Configuration freezes until
    /// [`stop`](Self::stop).
    pub fn start(&self, thread_count: usize) -> bool {
        if thread_count == 0 {
            return false;
        }

        let inner = self.inner.write().unwrap();
        if self.running.load(Ordering::Acquire) {
            return false;
        }

        let mut listeners = Vec::with_capacity(inner.listen_addrs.len());
        let mut bound = Vec::with_capacity(inner.listen_addrs.len());
        for addr in &inner.listen_addrs {
            match TcpListener::bind(addr) {
                Ok(listener) => {
                    match listener.local_addr() {
                        Ok(local) => bound.push(local),
                        Err(e) => {
                            error!(%addr, error = %e, "listener has no local address");
                            return false;
                        }
                    }
                    listeners.push(listener);
                }
                Err(e) => {
                    error!(%addr, error = %e, "listener bind failed");
                    return false;
                }
            }
        }

        may::config().set_workers(thread_count);
        self.pipeline_stack_size
            .store(RuntimeConfig::from_env().stack_size, Ordering::Relaxed);
        self.running.store(true, Ordering::Release);
        *self.bound_addrs.lock().unwrap() = bound.clone();

        let header_read_expiry_ms = inner.header_read_expiry_ms;
        let keep_alive_timeout_ms = inner.keep_alive_timeout_ms;
        let tls = inner.tls.clone();

        let mut handles = self.accept_handles.lock().unwrap();
        for listener in listeners {
            let weak = self.weak_self.clone();
            let tls = tls.clone();
            handles.push(go!(move || {
                accept_loop(weak, listener, tls, header_read_expiry_ms, keep_alive_timeout_ms)
            }));
        }

        if self.sessions.cleaner_enabled() {
            let weak = self.weak_self.clone();
            *self.cleaner_handle.lock().unwrap() = Some(go!(move || cleaner_loop(weak)));
        }

        info!(threads = thread_count, addrs = ?bound, "server started");
        true
    }

    /// Stop accepting and unfreeze configuration.
    ///
    /// Acceptors and the session cleaner are canceled and joined;
    /// connections in flight observe the stopped state and close. Listen
    /// addresses are kept so a later [`start`](Self::start) rebinds them.
    pub fn stop(&self) {
        let _inner = self.inner.write().unwrap();
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        let handles: Vec<JoinHandle<()>> =
            self.accept_handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            // Safety: cancellation is the `may` runtime's sanctioned way
            // to interrupt a coroutine parked in accept; the loop owns no
            // state that outlives it.
            unsafe { handle.coroutine().cancel() };
            let _ = handle.join();
        }

        if let Some(handle) = self.cleaner_handle.lock().unwrap().take() {
            unsafe { handle.coroutine().cancel() };
            let _ = handle.join();
        }

        self.bound_addrs.lock().unwrap().clear();
        info!("server stopped");
    }

    // ----- observation & runtime operations -----

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Advertised keep-alive window in milliseconds.
    pub fn keep_alive_timeout(&self) -> u64 {
        self.inner.read().unwrap().keep_alive_timeout_ms
    }

    /// Keep-alive window in whole seconds, floored at one.
    pub(crate) fn keep_alive_secs(&self) -> u64 {
        let secs = self.keep_alive_timeout() / 1000;
        if secs == 0 {
            1
        } else {
            secs
        }
    }

    /// Addresses actually bound; empty unless running.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.bound_addrs.lock().unwrap().clone()
    }

    /// The server-wide shared context.
    pub fn context(&self) -> Arc<Context> {
        self.context.clone()
    }

    /// Resolve `(method, target)` against the route table.
    pub fn route(&self, method: &Method, target: &str) -> RouteResult {
        self.inner.read().unwrap().route_table.route(method, target)
    }

    /// Fetch (or create) the session context for `id`.
    pub fn session(&self, id: &str) -> Arc<Context> {
        self.sessions.get_session(id)
    }

    /// Extend (or create) the session `id` to live `timeout_ms` from now.
    pub fn set_session_timeout(&self, id: &str, timeout_ms: u64) -> bool {
        self.sessions.set_session_timeout(id, timeout_ms);
        true
    }

    pub fn remove_session(&self, id: &str) -> bool {
        self.sessions.remove_session(id)
    }

    /// Number of live sessions in the store.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Post a callable onto the scheduler; `None` when not running. The
    /// handle joins to the invocation result.
    pub fn post<F, T>(&self, f: F) -> Option<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if !self.is_running() {
            return None;
        }
        Some(go!(f))
    }

    /// Run a callable after `timeout_ms`; `None` when not running.
    pub fn set_timer<F, T>(&self, timeout_ms: u64, f: F) -> Option<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if !self.is_running() {
            return None;
        }
        Some(go!(move || {
            may::coroutine::sleep(Duration::from_millis(timeout_ms));
            f()
        }))
    }

    /// Forward a message to the configured logger.
    pub fn log(&self, level: LogLevel, message: &str) {
        let logger = self.inner.read().unwrap().logger.clone();
        logger.log(level, message);
    }

    pub(crate) fn pipeline_stack_size(&self) -> usize {
        self.pipeline_stack_size.load(Ordering::Relaxed)
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accept connections until the server stops or is dropped.
fn accept_loop(
    server: Weak<HttpServer>,
    listener: TcpListener,
    tls: Option<TlsContext>,
    header_read_expiry_ms: u64,
    keep_alive_timeout_ms: u64,
) {
    loop {
        match listener.accept() {
            Ok((socket, peer)) => {
                let Some(server) = server.upgrade() else { break };
                if !server.is_running() {
                    break;
                }

                let stream = match &tls {
                    Some(ctx) => match ctx.wrap(socket) {
                        Ok(stream) => stream,
                        Err(e) => {
                            warn!(%peer, error = %e, "tls wrap failed");
                            continue;
                        }
                    },
                    None => ServerStream::Plain(socket),
                };

                trace!(%peer, "connection accepted");
                let conn = Connection::new(
                    stream,
                    peer,
                    server,
                    header_read_expiry_ms,
                    keep_alive_timeout_ms,
                );
                go!(move || conn.run());
            }
            Err(e) => {
                let Some(server) = server.upgrade() else { break };
                if !server.is_running() {
                    break;
                }
                warn!(error = %e, "accept failed");
            }
        }
    }
}

/// Periodic session sweep; exits when the server stops, is dropped, or
/// the cleaner is disabled.
fn cleaner_loop(server: Weak<HttpServer>) {
    loop {
        let interval = match server.upgrade() {
            Some(server) => server.sessions.cleaner_interval(),
            None => break,
        };

        may::coroutine::sleep(interval);

        let Some(server) = server.upgrade() else { break };
        if !server.is_running() || !server.sessions.cleaner_enabled() {
            break;
        }
        server.sessions.clean_pass();
    }
}
