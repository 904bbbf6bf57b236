//! Per-method route tries and lookup.

use std::sync::Arc;

use http::Method;
use smallvec::SmallVec;

use super::layer::RouteLayer;
use super::path::is_valid_target;
use crate::aspect::Aspect;
use crate::handler::{FallbackHandler, Handler};

/// Methods the table indexes: GET, POST, PUT, DELETE, PATCH, HEAD.
/// Anything else is treated as GET on ingress.
const METHOD_COUNT: usize = 6;

/// Captured path parameters stay inline below this count.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Ordered captured parameter values for one matched request.
pub type ParamValues = SmallVec<[String; MAX_INLINE_PARAMS]>;

const DEFAULT_MAX_BODY_SIZE: usize = 16384;
const DEFAULT_READ_EXPIRY_MS: u64 = 4000;
const DEFAULT_WRITE_EXPIRY_MS: u64 = 4000;

pub(crate) fn method_index(method: &Method) -> usize {
    match method.as_str() {
        "POST" => 1,
        "PUT" => 2,
        "DELETE" => 3,
        "PATCH" => 4,
        "HEAD" => 5,
        _ => 0,
    }
}

/// Outcome of routing one `(method, target)` pair.
///
/// Handler and aspect handles are shared pointers into the table; the
/// table is immutable while the server runs, so they stay valid for the
/// whole request.
#[derive(Clone)]
pub struct RouteResult {
    /// The matched portion of the path.
    pub current_location: String,
    /// Captured `{param}` segment values, in path order.
    pub parameters: ParamValues,
    /// Flattened interception chain: global, then method-specific, then
    /// the terminal layer's own aspects.
    pub aspects: Vec<Arc<dyn Aspect>>,
    pub handler: Arc<dyn Handler>,
    /// Resolved request-body cap in bytes; zero means unlimited.
    pub max_body_size: usize,
    /// Resolved body-read phase timeout; zero disarms the timer.
    pub read_expiry_ms: u64,
    /// Resolved write phase timeout; zero disarms the timer.
    pub write_expiry_ms: u64,
}

/// Route table: one trie per method plus global interception and
/// defaults. Owned by the server; mutation is rejected there once the
/// server runs.
pub struct RouteTable {
    entrances: [RouteLayer; METHOD_COUNT],
    global_aspects: Vec<Arc<dyn Aspect>>,
    method_aspects: [Vec<Arc<dyn Aspect>>; METHOD_COUNT],
    default_handler: Arc<dyn Handler>,
    default_max_body_size: usize,
    default_read_expiry_ms: u64,
    default_write_expiry_ms: u64,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            entrances: Default::default(),
            global_aspects: Vec::new(),
            method_aspects: Default::default(),
            default_handler: Arc::new(FallbackHandler),
            default_max_body_size: DEFAULT_MAX_BODY_SIZE,
            default_read_expiry_ms: DEFAULT_READ_EXPIRY_MS,
            default_write_expiry_ms: DEFAULT_WRITE_EXPIRY_MS,
        }
    }

    /// Register a handler for `target`. Returns false when the target
    /// violates the path grammar.
    pub fn add_route(
        &mut self,
        method: &Method,
        target: &str,
        handler: Arc<dyn Handler>,
    ) -> bool {
        if !is_valid_target(target) {
            return false;
        }
        let layer = self.get_or_create_layer(method_index(method), target);
        layer.handler = Some(handler);
        true
    }

    /// Register a handler that also terminates matching at its layer, so
    /// any longer request path sharing the prefix dispatches to it.
    pub fn add_exclusive_route(
        &mut self,
        method: &Method,
        target: &str,
        handler: Arc<dyn Handler>,
    ) -> bool {
        if !is_valid_target(target) {
            return false;
        }
        let layer = self.get_or_create_layer(method_index(method), target);
        layer.handler = Some(handler);
        layer.ignore_default_route = true;
        true
    }

    /// Attach an aspect to the layer for `target`, creating it if needed.
    pub fn add_aspect(&mut self, method: &Method, target: &str, aspect: Arc<dyn Aspect>) -> bool {
        if !is_valid_target(target) {
            return false;
        }
        let layer = self.get_or_create_layer(method_index(method), target);
        layer.aspects.push(aspect);
        true
    }

    /// Attach an aspect to every matched route regardless of method.
    pub fn add_global_aspect(&mut self, aspect: Arc<dyn Aspect>) {
        self.global_aspects.push(aspect);
    }

    /// Attach an aspect to every matched route of one method.
    pub fn add_method_aspect(&mut self, method: &Method, aspect: Arc<dyn Aspect>) {
        self.method_aspects[method_index(method)].push(aspect);
    }

    pub fn set_read_expiry(&mut self, method: &Method, target: &str, expiry_ms: u64) -> bool {
        if !is_valid_target(target) {
            return false;
        }
        self.get_or_create_layer(method_index(method), target)
            .read_expiry_ms = expiry_ms;
        true
    }

    pub fn set_write_expiry(&mut self, method: &Method, target: &str, expiry_ms: u64) -> bool {
        if !is_valid_target(target) {
            return false;
        }
        self.get_or_create_layer(method_index(method), target)
            .write_expiry_ms = expiry_ms;
        true
    }

    pub fn set_max_body_size(&mut self, method: &Method, target: &str, size: usize) -> bool {
        if !is_valid_target(target) {
            return false;
        }
        self.get_or_create_layer(method_index(method), target)
            .max_body_size = size;
        true
    }

    pub fn set_default_read_expiry(&mut self, expiry_ms: u64) {
        self.default_read_expiry_ms = expiry_ms;
    }

    pub fn set_default_write_expiry(&mut self, expiry_ms: u64) {
        self.default_write_expiry_ms = expiry_ms;
    }

    pub fn set_default_max_body_size(&mut self, size: usize) {
        self.default_max_body_size = size;
    }

    pub fn set_default_handler(&mut self, handler: Arc<dyn Handler>) {
        self.default_handler = handler;
    }

    /// Route a request target.
    ///
    /// The query (and fragment) part is ignored. Unroutable targets fall
    /// back to the default handler with an empty aspect chain; a
    /// non-null handler is returned in every case.
    pub fn route(&self, method: &Method, target: &str) -> RouteResult {
        let idx = method_index(method);

        let path = target
            .split(['?', '#'])
            .next()
            .unwrap_or("");
        if !path.starts_with('/') {
            return self.default_result();
        }

        let Some((layer, current_location, parameters)) = self.match_segments(idx, path) else {
            return self.default_result();
        };

        let Some(handler) = layer.handler.clone() else {
            return self.default_result();
        };

        let mut aspects = Vec::with_capacity(
            self.global_aspects.len() + self.method_aspects[idx].len() + layer.aspects.len(),
        );
        aspects.extend(self.global_aspects.iter().cloned());
        aspects.extend(self.method_aspects[idx].iter().cloned());
        aspects.extend(layer.aspects.iter().cloned());

        RouteResult {
            current_location,
            parameters,
            aspects,
            handler,
            max_body_size: if layer.max_body_size != 0 {
                layer.max_body_size
            } else {
                self.default_max_body_size
            },
            read_expiry_ms: if layer.read_expiry_ms != 0 {
                layer.read_expiry_ms
            } else {
                self.default_read_expiry_ms
            },
            write_expiry_ms: if layer.write_expiry_ms != 0 {
                layer.write_expiry_ms
            } else {
                self.default_write_expiry_ms
            },
        }
    }

    /// Walk the trie for `path`, returning the terminal layer, the
    /// location string and the captured parameters.
    ///
    /// Literal children win over the parameter child; an exclusive layer
    /// stops the walk and matches even with segments left over; empty
    /// segments extend the location without consuming a child.
    fn match_segments(&self, idx: usize, path: &str) -> Option<(&RouteLayer, String, ParamValues)> {
        let mut layer = &self.entrances[idx];
        let mut location = String::new();
        let mut parameters = ParamValues::new();

        let stripped = path.strip_prefix('/').unwrap_or(path);
        if !stripped.is_empty() {
            for segment in stripped.split('/') {
                location.push('/');
                if segment.is_empty() {
                    continue;
                }

                if let Some(next) = layer.children.get(segment) {
                    layer = next;
                    location.push_str(segment);
                } else if layer.ignore_default_route {
                    break;
                } else if let Some(next) = layer.param_child.as_deref() {
                    parameters.push(segment.to_string());
                    layer = next;
                    location.push_str(segment);
                } else {
                    return None;
                }
            }
        }

        Some((layer, location, parameters))
    }

    /// Result for the unmatched path: default handler, no aspects, table
    /// defaults for every limit.
    fn default_result(&self) -> RouteResult {
        RouteResult {
            current_location: "/".to_string(),
            parameters: ParamValues::new(),
            aspects: Vec::new(),
            handler: self.default_handler.clone(),
            max_body_size: self.default_max_body_size,
            read_expiry_ms: self.default_read_expiry_ms,
            write_expiry_ms: self.default_write_expiry_ms,
        }
    }

    fn get_or_create_layer(&mut self, idx: usize, target: &str) -> &mut RouteLayer {
        let path = target.split('?').next().unwrap_or("");
        let mut layer = &mut self.entrances[idx];

        for segment in path.split('/') {
            if segment.is_empty() {
                continue;
            }
            if segment.starts_with('{') {
                layer = layer
                    .param_child
                    .get_or_insert_with(|| Box::new(RouteLayer::new()))
                    .as_mut();
            } else {
                layer = layer
                    .children
                    .entry(segment.to_string())
                    .or_insert_with(RouteLayer::new);
            }
        }

        layer
    }
}
