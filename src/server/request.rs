//! Request representation and streaming ingress parsing.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{self, Read};

use http::Method;

/// Upper bound on the header section, including the request line.
const MAX_HEAD_BYTES: usize = 16 * 1024;
/// Cap on header count accepted from one request.
const MAX_HEADERS: usize = 64;

const READ_CHUNK: usize = 8 * 1024;

/// One parsed HTTP/1.x request.
///
/// Header names are lowercased at parse time; bodies are memory-resident
/// bytes bounded by the route's resolved cap.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    /// Raw request target, query included.
    pub target: String,
    /// Target with query and fragment stripped.
    pub path: String,
    /// Minor HTTP version: 0 or 1.
    pub version_minor: u8,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    /// Case-insensitive header lookup (names are stored lowercased).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Decoded query-string pairs; later duplicates win.
    pub fn query_params(&self) -> HashMap<String, String> {
        match self.target.split_once('?') {
            Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            None => HashMap::new(),
        }
    }

    /// Whether the peer asked to keep the connection open.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close`;
    /// HTTP/1.0 requires an explicit `keep-alive` token.
    pub fn keep_alive_requested(&self) -> bool {
        let connection = self
            .headers
            .get("connection")
            .map(|v| v.to_ascii_lowercase());
        match self.version_minor {
            0 => connection.is_some_and(|v| v.contains("keep-alive")),
            _ => !connection.is_some_and(|v| v.contains("close")),
        }
    }
}

/// Parsed head of a request, before the body is read.
#[derive(Debug)]
pub(crate) struct RequestHead {
    pub method: Method,
    pub target: String,
    pub version_minor: u8,
    pub headers: HashMap<String, String>,
}

impl RequestHead {
    pub(crate) fn into_request(self, body: Vec<u8>) -> Request {
        let path = self
            .target
            .split(['?', '#'])
            .next()
            .unwrap_or("/")
            .to_string();
        Request {
            method: self.method,
            target: self.target,
            path,
            version_minor: self.version_minor,
            headers: self.headers,
            body,
        }
    }

    fn content_length(&self) -> io::Result<usize> {
        match self.headers.get("content-length") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| malformed("invalid Content-Length")),
            None => Ok(0),
        }
    }

    fn is_chunked(&self) -> bool {
        self.headers
            .get("transfer-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }
}

/// Incremental request reader bound to one connection.
///
/// The byte buffer persists across keep-alive requests so pipelined bytes
/// that arrive with one request are consumed by the next parse; the parse
/// state itself is fresh for every request.
pub(crate) struct RequestReader {
    buf: Vec<u8>,
}

impl RequestReader {
    pub(crate) fn new() -> Self {
        Self {
            buf: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Read and parse one request head.
    ///
    /// Fails with `InvalidData` on malformed input or a head larger than
    /// [`MAX_HEAD_BYTES`], and with the stream's own error on timeout or
    /// disconnect.
    pub(crate) fn read_head(&mut self, stream: &mut impl Read) -> io::Result<RequestHead> {
        loop {
            if let Some(head) = self.try_parse_head()? {
                return Ok(head);
            }
            if self.buf.len() > MAX_HEAD_BYTES {
                return Err(malformed("request head too large"));
            }
            self.fill(stream)?;
        }
    }

    /// Read the request body described by `head`, enforcing `cap` bytes
    /// (zero means unlimited).
    pub(crate) fn read_body(
        &mut self,
        stream: &mut impl Read,
        head: &RequestHead,
        cap: usize,
    ) -> io::Result<Vec<u8>> {
        if head.is_chunked() {
            return self.read_chunked_body(stream, cap);
        }

        let len = head.content_length()?;
        if len == 0 {
            return Ok(Vec::new());
        }
        if cap != 0 && len > cap {
            return Err(malformed("request body exceeds limit"));
        }

        while self.buf.len() < len {
            self.fill(stream)?;
        }
        Ok(self.take(len))
    }

    fn try_parse_head(&mut self) -> io::Result<Option<RequestHead>> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut headers);

        let status = parsed
            .parse(&self.buf)
            .map_err(|e| malformed(&format!("header parse failed: {e}")))?;

        let consumed = match status {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => return Ok(None),
        };

        let method = match parsed.method {
            // Unknown methods are treated as GET on ingress.
            Some("GET") => Method::GET,
            Some("POST") => Method::POST,
            Some("PUT") => Method::PUT,
            Some("DELETE") => Method::DELETE,
            Some("PATCH") => Method::PATCH,
            Some("HEAD") => Method::HEAD,
            Some(_) => Method::GET,
            None => return Err(malformed("missing method")),
        };
        let target = parsed
            .path
            .ok_or_else(|| malformed("missing target"))?
            .to_string();
        let version_minor = parsed.version.unwrap_or(1);

        let mut header_map = HashMap::with_capacity(parsed.headers.len());
        for header in parsed.headers.iter() {
            header_map.insert(
                header.name.to_ascii_lowercase(),
                String::from_utf8_lossy(header.value).into_owned(),
            );
        }

        self.buf.drain(..consumed);

        Ok(Some(RequestHead {
            method,
            target,
            version_minor,
            headers: header_map,
        }))
    }

    fn read_chunked_body(&mut self, stream: &mut impl Read, cap: usize) -> io::Result<Vec<u8>> {
        let mut body = Vec::new();

        loop {
            let line = self.read_line(stream)?;
            let size_str = line.split(';').next().unwrap_or("").trim();
            let size = usize::from_str_radix(size_str, 16)
                .map_err(|_| malformed("invalid chunk size"))?;

            if size == 0 {
                // Discard trailers up to the blank line.
                loop {
                    let trailer = self.read_line(stream)?;
                    if trailer.is_empty() {
                        return Ok(body);
                    }
                }
            }

            if cap != 0 && body.len() + size > cap {
                return Err(malformed("request body exceeds limit"));
            }

            while self.buf.len() < size + 2 {
                self.fill(stream)?;
            }
            body.extend_from_slice(&self.buf[..size]);
            if &self.buf[size..size + 2] != b"\r\n" {
                return Err(malformed("missing chunk terminator"));
            }
            self.buf.drain(..size + 2);
        }
    }

    /// Read one CRLF-terminated line, returning it without the CRLF.
    fn read_line(&mut self, stream: &mut impl Read) -> io::Result<String> {
        loop {
            if let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") {
                let line = String::from_utf8_lossy(&self.buf[..pos]).into_owned();
                self.buf.drain(..pos + 2);
                return Ok(line);
            }
            if self.buf.len() > MAX_HEAD_BYTES {
                return Err(malformed("chunk line too long"));
            }
            self.fill(stream)?;
        }
    }

    fn fill(&mut self, stream: &mut impl Read) -> io::Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            ));
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    fn take(&mut self, len: usize) -> Vec<u8> {
        let rest = self.buf.split_off(len);
        std::mem::replace(&mut self.buf, rest)
    }
}

fn malformed(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}
