//! # gantry
//!
//! A multithreaded HTTP/1.1 server framework built around a programmable
//! request pipeline:
//!
//! - **Hierarchical routing**: per-method tries with `{param}` captures,
//!   literal-over-parameter precedence and exclusive (prefix) routes.
//! - **Aspects**: pre/post interception pairs wrapped around handlers,
//!   registered globally, per method or per route.
//! - **Tasks**: one object per request-response cycle, splicing the
//!   parsed request, routed metadata, session cookies and the response
//!   writers, including a streamed-write queue for manually driven
//!   responses such as server-sent events.
//! - **Sessions**: an in-process store with expiry-ordered eviction and
//!   an optional background cleaner.
//!
//! Connections are cleartext or TLS, keep-alive with configurable idle
//! windows, and bounded by per-route body size and phase timeouts. Each
//! connection runs on its own coroutine, so its processing steps are
//! strictly ordered without locks; handlers run on separate pipeline
//! coroutines and never stall connection I/O.
//!
//! ```no_run
//! use gantry::HttpServer;
//! use http::Method;
//!
//! let server = HttpServer::new();
//! server
//!     .add_listen("127.0.0.1:8080".parse().unwrap())
//!     .add_route_fn(Method::GET, "/users/{id}", |task| {
//!         let id = task.path_parameters()[0].clone();
//!         task.set_header("Content-Type", "text/plain");
//!         task.set_body(format!("user {id}"));
//!     });
//! server.start(4);
//! ```

pub mod aspect;
pub mod context;
pub mod cookie;
pub mod handler;
pub mod ids;
pub mod logger;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod session;
pub mod sse;
pub mod task;

pub use aspect::{Aspect, FnAspect, MetricsAspect};
pub use context::{Attribute, Context};
pub use cookie::{SameSite, SetCookie};
pub use handler::{FnHandler, Handler};
pub use http::Method;
pub use ids::RequestId;
pub use logger::{LogLevel, Logger, NullLogger, TracingLogger};
pub use router::{ParamValues, RouteResult, RouteTable};
pub use server::{HttpServer, Request, Response, ResponseHead, StreamWriter, TlsContext};
pub use session::SessionMap;
pub use task::Task;
