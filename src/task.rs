//! Per-request task: one object owning a request/response cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use may::coroutine::JoinHandle;
use tracing::debug;

use crate::context::Context;
use crate::cookie::{parse_cookie_header, SetCookie};
use crate::ids::RequestId;
use crate::logger::LogLevel;
use crate::router::{ParamValues, RouteResult};
use crate::server::conn::{ConnEvent, ConnHandle};
use crate::server::{Request, Response, ResponseHead, StreamWriter};

/// One request-response cycle.
///
/// A task owns the parsed request, the routed metadata and the response
/// builder, and carries a strong handle to the connection that produced
/// it. The pipeline mutates the task from exactly one coroutine at a
/// time. When the task is dropped, unless manual connection management
/// was requested, pending cookies are flushed into the response and the
/// response is handed to the connection together with the keep-alive
/// decision.
pub struct Task {
    request: Request,
    response: Response,
    route: RouteResult,
    conn: ConnHandle,
    request_id: RequestId,
    started_at: Instant,
    keep_alive: bool,
    manual_connection_management: bool,
    cookies: Option<HashMap<String, String>>,
    session_id: Option<String>,
    set_cookies: Vec<SetCookie>,
}

impl Task {
    pub(crate) fn new(request: Request, route: RouteResult, conn: ConnHandle) -> Self {
        Self {
            request,
            response: Response::new(),
            route,
            conn,
            request_id: RequestId::new(),
            started_at: Instant::now(),
            keep_alive: true,
            manual_connection_management: false,
            cookies: None,
            session_id: None,
            set_cookies: Vec::new(),
        }
    }

    /// Execute the pipeline: pre-service steps in registration order, the
    /// handler, then post-service steps in reverse order. Runs at most
    /// once; dropping the task at the end finalizes the response.
    pub(crate) fn run(mut self) {
        let aspects = self.route.aspects.clone();
        let handler = self.route.handler.clone();
        let request_id = self.request_id;

        debug!(%request_id, location = %self.route.current_location, "pipeline start");

        for aspect in aspects.iter() {
            aspect.pre_service(&mut self);
        }

        handler.service(&mut self);

        for aspect in aspects.iter().rev() {
            aspect.post_service(&mut self);
        }

        debug!(%request_id, status = self.response.status(), "pipeline done");
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Time since this task was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// The matched portion of the request path.
    pub fn current_location(&self) -> &str {
        &self.route.current_location
    }

    /// Captured `{param}` segment values, in path order.
    pub fn path_parameters(&self) -> &ParamValues {
        &self.route.parameters
    }

    /// Request cookie by exact name; the `Cookie` header is parsed once
    /// on first access.
    pub fn cookie(&mut self, name: &str) -> Option<String> {
        self.parsed_cookies().get(name).cloned()
    }

    /// The session id for this request.
    ///
    /// Resolved once: an inbound cookie named `sessionid` (any case) is
    /// used when present; otherwise a fresh UUID v4 is minted and a
    /// `sessionId` cookie is queued on the response.
    pub fn session_id(&mut self) -> String {
        if let Some(id) = &self.session_id {
            return id.clone();
        }

        let inbound = self
            .parsed_cookies()
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("sessionid"))
            .map(|(_, value)| value.clone());

        let id = match inbound {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                self.add_cookie(SetCookie::new().name("sessionId").value(id.clone()));
                id
            }
        };

        self.session_id = Some(id.clone());
        id
    }

    /// The session context for this request, created on first use.
    pub fn session(&mut self) -> Arc<Context> {
        let id = self.session_id();
        self.conn.server().session(&id)
    }

    /// Extend the session lifetime to at least `timeout_ms` from now.
    pub fn set_session_expiry(&mut self, timeout_ms: u64) {
        let id = self.session_id();
        self.conn.server().set_session_timeout(&id, timeout_ms);
    }

    /// The server-wide shared context.
    pub fn server_context(&self) -> Arc<Context> {
        self.conn.server().context()
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.response.set_body(body);
    }

    pub fn append_body(&mut self, chunk: impl AsRef<[u8]>) {
        self.response.append_body(chunk);
    }

    pub fn set_status(&mut self, status: u16) {
        self.response.set_status(status);
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.response.set_header(name, value);
    }

    /// Typed-name form of [`set_header`](Self::set_header).
    pub fn set_field(&mut self, name: http::header::HeaderName, value: impl Into<String>) {
        self.response.set_header(name.as_str(), value);
    }

    /// Queue a `Set-Cookie`; flushed into the response when the task
    /// finalizes. Cookies that render empty are skipped.
    pub fn add_cookie(&mut self, cookie: SetCookie) {
        self.set_cookies.push(cookie);
    }

    /// Whether the server should offer keep-alive for this exchange. The
    /// final decision also requires the peer to have asked for it.
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    /// Hand connection lifetime over to the application. Once set it
    /// cannot be unset: the task finalizer will neither write a response
    /// nor recycle, and the application must finish the connection
    /// through [`Task::streamer`], [`Task::recycle_connection`] or
    /// [`Task::close_connection`].
    pub fn set_manual_connection_management(&mut self, value: bool) {
        if !self.manual_connection_management {
            self.manual_connection_management = value;
        }
    }

    /// Enqueue a header-only frame on the connection's write queue.
    pub fn write_header(&self, head: ResponseHead) {
        self.conn.send(ConnEvent::WriteHeader(head));
    }

    /// Enqueue a body chunk on the connection's write queue.
    pub fn write_body(&self, chunk: impl Into<Vec<u8>>) {
        self.conn.send(ConnEvent::WriteBody(chunk.into()));
    }

    /// A cloneable writer for driving the streamed response after this
    /// task is gone; pair with manual connection management.
    pub fn streamer(&self) -> StreamWriter {
        self.conn.streamer()
    }

    /// Ask the connection to recycle for the next request now.
    pub fn recycle_connection(&self) {
        self.conn.send(ConnEvent::Recycle);
    }

    /// Ask the connection to close now.
    pub fn close_connection(&self) {
        self.conn.send(ConnEvent::Close);
    }

    /// Post a callable onto the server executor; `None` when the server
    /// is not running. The handle joins to the invocation result.
    pub fn post<F, T>(&self, f: F) -> Option<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.conn.server().post(f)
    }

    /// Schedule a callable after `timeout_ms`; `None` when the server is
    /// not running.
    pub fn set_timer<F, T>(&self, timeout_ms: u64, f: F) -> Option<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.conn.server().set_timer(timeout_ms, f)
    }

    /// Forward a message to the server's logger.
    pub fn log(&self, level: LogLevel, message: &str) {
        self.conn.server().log(level, message);
    }

    /// True while the server runs and the connection stream is open.
    pub fn is_available(&self) -> bool {
        self.conn.server().is_running() && !self.conn.is_closed()
    }

    fn parsed_cookies(&mut self) -> &HashMap<String, String> {
        if self.cookies.is_none() {
            let parsed = self
                .request
                .header("cookie")
                .map(parse_cookie_header)
                .unwrap_or_default();
            self.cookies = Some(parsed);
        }
        self.cookies.as_ref().unwrap()
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        // In manual mode the application owns the connection's fate.
        if self.manual_connection_management {
            return;
        }

        for cookie in &self.set_cookies {
            let value = cookie.to_header_value();
            if !value.is_empty() {
                self.response.add_header("Set-Cookie", value);
            }
        }

        let response = std::mem::take(&mut self.response);
        self.conn.send(ConnEvent::Respond {
            response,
            keep_alive: self.keep_alive,
        });
    }
}
