//! Configuration gating and lifecycle transitions.

mod common;

use std::sync::{Arc, Mutex};

use common::*;
use gantry::{HttpServer, LogLevel, Logger};
use http::Method;

#[test]
fn start_refuses_zero_threads_and_double_start() {
    let server = HttpServer::new();
    server.add_route_fn(Method::GET, "/", |task| task.set_body("ok"));

    assert!(!server.start(0));
    assert!(!server.is_running());

    server.add_listen("127.0.0.1:0".parse().unwrap());
    assert!(server.start(2));
    assert!(server.is_running());
    assert!(!server.start(2));

    server.stop();
    assert!(!server.is_running());
}

#[test]
fn configuration_is_locked_while_running() {
    let server = HttpServer::new();
    server.add_route_fn(Method::GET, "/early", |task| task.set_body("early"));
    let addr = start_server(&server, 2);

    let before = server.route(&Method::GET, "/late");

    // Mutators while running are silent no-ops that keep the chain alive.
    server
        .add_route_fn(Method::GET, "/late", |task| task.set_body("late"))
        .set_keep_alive_timeout(99_000)
        .set_header_read_expiry(1);

    let after = server.route(&Method::GET, "/late");
    assert!(Arc::ptr_eq(&before.handler, &after.handler));
    assert_eq!(server.keep_alive_timeout(), 4000);

    let resp = send_request(addr, &raw_request("GET", "/late", &[], b""));
    assert_eq!(resp.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body["code"], 404);

    server.stop();

    // After stop the same registration takes effect.
    server.add_route_fn(Method::GET, "/late", |task| task.set_body("late"));
    assert!(server.start(2));
    let addr = server.local_addrs()[0];
    wait_ready(addr);
    let resp = send_request(addr, &raw_request("GET", "/late", &[], b""));
    assert_eq!(resp.body_str(), "late");

    server.stop();
}

#[test]
fn local_addrs_follow_lifecycle() {
    let server = HttpServer::new();
    assert!(server.local_addrs().is_empty());

    let addr = start_server(&server, 1);
    assert_eq!(server.local_addrs(), vec![addr]);

    server.stop();
    assert!(server.local_addrs().is_empty());
}

#[test]
fn post_and_timer_require_a_running_server() {
    let server = HttpServer::new();
    assert!(server.post(|| 42).is_none());
    assert!(server.set_timer(1, || 42).is_none());

    server.add_listen("127.0.0.1:0".parse().unwrap());
    assert!(server.start(1));

    let posted = server.post(|| 40 + 2).expect("post while running");
    assert_eq!(posted.join().unwrap(), 42);

    let timed = server.set_timer(10, || "later").expect("timer while running");
    assert_eq!(timed.join().unwrap(), "later");

    server.stop();
}

struct CollectingLogger {
    messages: Mutex<Vec<(LogLevel, String)>>,
}

impl Logger for CollectingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        self.messages.lock().unwrap().push((level, message.to_string()));
    }
}

#[test]
fn log_messages_reach_the_configured_sink() {
    let logger = Arc::new(CollectingLogger {
        messages: Mutex::new(Vec::new()),
    });

    let server = HttpServer::new();
    server.set_logger(logger.clone()).add_route_fn(Method::GET, "/log", |task| {
        task.log(LogLevel::Info, "from handler");
        task.set_body("ok");
    });
    let addr = start_server(&server, 2);

    server.log(LogLevel::Warn, "from app");
    send_request(addr, &raw_request("GET", "/log", &[], b""));

    let messages = logger.messages.lock().unwrap();
    assert!(messages.contains(&(LogLevel::Warn, "from app".to_string())));
    assert!(messages.contains(&(LogLevel::Info, "from handler".to_string())));

    server.stop();
}

#[test]
fn background_cleaner_sweeps_expired_sessions() {
    let server = HttpServer::new();
    server
        .set_default_session_timeout(1000)
        .set_session_cleaner_interval(1000)
        .set_background_session_cleaner(true)
        .add_route_fn(Method::GET, "/", |task| task.set_body("ok"));
    let _addr = start_server(&server, 1);

    // Touch one session repeatedly so the heap accumulates superseded
    // entries and the cleaner's thorough pass has something to do.
    for _ in 0..20 {
        server.session("short-lived");
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(server.session_count(), 1);

    // The session expires after the 1 s floor; the next cleaner tick
    // sweeps it from the primary map.
    std::thread::sleep(std::time::Duration::from_millis(3000));
    assert_eq!(server.session_count(), 0);

    server.stop();
}
