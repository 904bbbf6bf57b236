//! Server assembly: acceptors, connections, requests and responses.

pub(crate) mod conn;
mod core;
mod request;
mod response;
mod tls;

pub use conn::StreamWriter;
pub use core::HttpServer;
pub use request::Request;
pub use response::{Response, ResponseHead};
pub use tls::TlsContext;
