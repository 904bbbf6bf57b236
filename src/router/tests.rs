use std::sync::Arc;

use http::Method;

use super::path::is_valid_target;
use super::*;
use crate::handler::Handler;
use crate::task::Task;

struct TagHandler;

impl Handler for TagHandler {
    fn service(&self, _task: &mut Task) {}
}

struct TagAspect;

impl crate::aspect::Aspect for TagAspect {}

fn handler() -> Arc<dyn Handler> {
    Arc::new(TagHandler)
}

fn aspect() -> Arc<dyn crate::aspect::Aspect> {
    Arc::new(TagAspect)
}

#[test]
fn accepts_plain_and_parametric_targets() {
    assert!(is_valid_target("/"));
    assert!(is_valid_target("/users"));
    assert!(is_valid_target("/users/{id}"));
    assert!(is_valid_target("/users/{}/posts"));
    assert!(is_valid_target("/a-b_c.d~e/{x_1-2}"));
}

#[test]
fn rejects_malformed_targets() {
    assert!(!is_valid_target(""));
    assert!(!is_valid_target("users"));
    assert!(!is_valid_target("/a/../b"));
    assert!(!is_valid_target("/a/{unclosed"));
    assert!(!is_valid_target("/a/un{opened}}"));
    assert!(!is_valid_target("/a/{{nested}}"));
    assert!(!is_valid_target("/white space"));
    assert!(!is_valid_target(&format!("/{}", "x".repeat(2048))));
}

#[test]
fn parameter_stripping_guards_dotdot() {
    // `{..}` never assembles a traversal because brace contents are
    // excluded from the literal check, but bare dots are caught.
    assert!(!is_valid_target("/files/.."));
    assert!(is_valid_target("/files/."));
}

#[test]
fn registration_rejects_invalid_target() {
    let mut table = RouteTable::new();
    assert!(!table.add_route(&Method::GET, "no-slash", handler()));
    assert!(!table.add_aspect(&Method::GET, "/bad/{", aspect()));
    assert!(!table.set_read_expiry(&Method::GET, "/../x", 1000));
}

#[test]
fn literal_child_wins_over_parameter() {
    let mut table = RouteTable::new();
    let literal = handler();
    let param = handler();
    assert!(table.add_route(&Method::GET, "/users/me", literal.clone()));
    assert!(table.add_route(&Method::GET, "/users/{id}", param.clone()));

    let result = table.route(&Method::GET, "/users/me");
    assert!(Arc::ptr_eq(&result.handler, &literal));
    assert!(result.parameters.is_empty());

    let result = table.route(&Method::GET, "/users/42");
    assert!(Arc::ptr_eq(&result.handler, &param));
    assert_eq!(result.parameters.as_slice(), ["42".to_string()]);
}

#[test]
fn captures_parameters_in_order() {
    let mut table = RouteTable::new();
    table.add_route(&Method::GET, "/users/{user}/posts/{post}", handler());

    let result = table.route(&Method::GET, "/users/alice/posts/7");
    assert_eq!(
        result.parameters.as_slice(),
        ["alice".to_string(), "7".to_string()]
    );
    assert_eq!(result.current_location, "/users/alice/posts/7");
}

#[test]
fn exclusive_route_stops_descent() {
    let mut table = RouteTable::new();
    let exclusive = handler();
    let param = handler();
    assert!(table.add_exclusive_route(&Method::GET, "/static", exclusive.clone()));
    assert!(table.add_route(&Method::GET, "/static/{file}", param));

    // The explicit literal child still matches underneath the exclusive
    // layer; anything else short-circuits to the exclusive handler.
    let result = table.route(&Method::GET, "/static/abc");
    assert!(Arc::ptr_eq(&result.handler, &exclusive));

    let result = table.route(&Method::GET, "/static/a/b/c");
    assert!(Arc::ptr_eq(&result.handler, &exclusive));
    assert!(result.parameters.is_empty());
}

#[test]
fn unmatched_path_uses_default_handler() {
    let mut table = RouteTable::new();
    table.add_route(&Method::GET, "/known", handler());
    table.add_global_aspect(aspect());

    let result = table.route(&Method::GET, "/unknown/path");
    assert_eq!(result.current_location, "/");
    assert!(result.parameters.is_empty());
    // The fallback path carries no aspects.
    assert!(result.aspects.is_empty());
}

#[test]
fn custom_default_handler_replaces_fallback() {
    let mut table = RouteTable::new();
    let custom = handler();
    table.set_default_handler(custom.clone());

    let result = table.route(&Method::GET, "/nowhere");
    assert!(Arc::ptr_eq(&result.handler, &custom));
}

#[test]
fn methods_route_independently() {
    let mut table = RouteTable::new();
    let get = handler();
    let post = handler();
    table.add_route(&Method::GET, "/echo", get.clone());
    table.add_route(&Method::POST, "/echo", post.clone());

    assert!(Arc::ptr_eq(&table.route(&Method::GET, "/echo").handler, &get));
    assert!(Arc::ptr_eq(&table.route(&Method::POST, "/echo").handler, &post));
    // DELETE never registered: falls back.
    assert!(!Arc::ptr_eq(
        &table.route(&Method::DELETE, "/echo").handler,
        &get
    ));
}

#[test]
fn unknown_method_maps_to_get() {
    let mut table = RouteTable::new();
    let get = handler();
    table.add_route(&Method::GET, "/thing", get.clone());

    let result = table.route(&Method::OPTIONS, "/thing");
    assert!(Arc::ptr_eq(&result.handler, &get));
}

#[test]
fn query_and_fragment_ignored_when_routing() {
    let mut table = RouteTable::new();
    let h = handler();
    table.add_route(&Method::GET, "/search", h.clone());

    let result = table.route(&Method::GET, "/search?q=x&page=2");
    assert!(Arc::ptr_eq(&result.handler, &h));
    assert_eq!(result.current_location, "/search");
}

#[test]
fn empty_segments_extend_location_only() {
    let mut table = RouteTable::new();
    table.add_route(&Method::GET, "/a/b", handler());

    let result = table.route(&Method::GET, "/a//b/");
    assert_eq!(result.current_location, "/a//b/");
}

#[test]
fn limits_resolve_layer_over_default() {
    let mut table = RouteTable::new();
    table.set_default_max_body_size(1000);
    table.set_default_read_expiry(2000);
    table.set_default_write_expiry(3000);
    table.add_route(&Method::POST, "/upload", handler());
    table.set_max_body_size(&Method::POST, "/upload", 5000);

    let result = table.route(&Method::POST, "/upload");
    assert_eq!(result.max_body_size, 5000);
    // Unset layer values inherit the defaults.
    assert_eq!(result.read_expiry_ms, 2000);
    assert_eq!(result.write_expiry_ms, 3000);
}

#[test]
fn aspects_flatten_global_method_layer() {
    let mut table = RouteTable::new();
    let global = aspect();
    let for_get = aspect();
    let local = aspect();
    table.add_global_aspect(global.clone());
    table.add_method_aspect(&Method::GET, for_get.clone());
    table.add_route(&Method::GET, "/order", handler());
    table.add_aspect(&Method::GET, "/order", local.clone());

    let result = table.route(&Method::GET, "/order");
    assert_eq!(result.aspects.len(), 3);
    assert!(Arc::ptr_eq(&result.aspects[0], &global));
    assert!(Arc::ptr_eq(&result.aspects[1], &for_get));
    assert!(Arc::ptr_eq(&result.aspects[2], &local));
}

#[test]
fn replacing_a_handler_keeps_the_layer() {
    let mut table = RouteTable::new();
    let first = handler();
    let second = handler();
    table.add_route(&Method::GET, "/swap", first);
    table.add_route(&Method::GET, "/swap", second.clone());

    assert!(Arc::ptr_eq(&table.route(&Method::GET, "/swap").handler, &second));
}

#[test]
fn root_route_matches_slash() {
    let mut table = RouteTable::new();
    let root = handler();
    table.add_route(&Method::GET, "/", root.clone());

    let result = table.route(&Method::GET, "/");
    assert!(Arc::ptr_eq(&result.handler, &root));
    assert_eq!(result.current_location, "");
}
