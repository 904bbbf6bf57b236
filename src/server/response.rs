//! Response construction and wire serialization.

/// Response under construction for one request.
///
/// Headers keep insertion order and may repeat (`Set-Cookie`); the
/// framing headers (`Content-Length`, `Connection`, `Keep-Alive`) are
/// emitted by the serializer, not stored here.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Replace the header `name`, or append it when absent.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        for (existing, slot) in self.headers.iter_mut() {
            if existing.eq_ignore_ascii_case(&name) {
                *slot = value;
                return;
            }
        }
        self.headers.push((name, value));
    }

    /// Append a header without replacing earlier occurrences.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    pub fn append_body(&mut self, chunk: impl AsRef<[u8]>) {
        self.body.extend_from_slice(chunk.as_ref());
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serialize the full response.
    ///
    /// `Connection` reflects the negotiated `keep_alive`; when kept open a
    /// `Keep-Alive: timeout=<seconds>` advertises the server's idle
    /// window. HEAD responses carry the `Content-Length` but no payload.
    pub(crate) fn serialize(&self, keep_alive: bool, keep_alive_secs: u64, head_only: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        write_status_line(&mut out, self.status);

        for (name, value) in &self.headers {
            write_header(&mut out, name, value);
        }

        write_header(&mut out, "Content-Length", &self.body.len().to_string());
        if keep_alive {
            write_header(&mut out, "Connection", "keep-alive");
            write_header(
                &mut out,
                "Keep-Alive",
                &format!("timeout={keep_alive_secs}"),
            );
        } else {
            write_header(&mut out, "Connection", "close");
        }

        out.extend_from_slice(b"\r\n");
        if !head_only {
            out.extend_from_slice(&self.body);
        }
        out
    }
}

/// Header-only frame for manually driven streaming responses.
///
/// Serialized without `Content-Length`; the application then owns framing
/// through subsequent body writes (e.g. `text/event-stream`).
#[derive(Debug, Clone)]
pub struct ResponseHead {
    status: u16,
    headers: Vec<(String, String)>,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseHead {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
        }
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn set_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub(crate) fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        write_status_line(&mut out, self.status);
        for (name, value) in &self.headers {
            write_header(&mut out, name, value);
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

fn write_status_line(out: &mut Vec<u8>, status: u16) {
    out.extend_from_slice(b"HTTP/1.1 ");
    out.extend_from_slice(status.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(status_reason(status).as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn write_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn status_reason(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "OK",
    }
}
