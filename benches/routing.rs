use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gantry::{Handler, Method, RouteTable, Task};

struct NoopHandler;

impl Handler for NoopHandler {
    fn service(&self, _task: &mut Task) {}
}

fn build_table(route_count: usize) -> RouteTable {
    let mut table = RouteTable::new();
    let handler: Arc<dyn Handler> = Arc::new(NoopHandler);

    table.add_route(&Method::GET, "/", handler.clone());
    table.add_route(&Method::GET, "/users/{id}", handler.clone());
    table.add_route(&Method::GET, "/users/{id}/posts/{post}", handler.clone());
    table.add_exclusive_route(&Method::GET, "/static", handler.clone());

    for i in 0..route_count {
        table.add_route(&Method::GET, &format!("/api/v1/resource{i}"), handler.clone());
        table.add_route(
            &Method::POST,
            &format!("/api/v1/resource{i}/{{id}}"),
            handler.clone(),
        );
    }

    table
}

fn bench_static_lookup(c: &mut Criterion) {
    let table = build_table(100);
    c.bench_function("route_static_100", |b| {
        b.iter(|| black_box(table.route(&Method::GET, black_box("/api/v1/resource57"))))
    });
}

fn bench_param_lookup(c: &mut Criterion) {
    let table = build_table(100);
    c.bench_function("route_param_100", |b| {
        b.iter(|| black_box(table.route(&Method::POST, black_box("/api/v1/resource57/12345"))))
    });
}

fn bench_deep_param_lookup(c: &mut Criterion) {
    let table = build_table(10);
    c.bench_function("route_nested_params", |b| {
        b.iter(|| black_box(table.route(&Method::GET, black_box("/users/alice/posts/42"))))
    });
}

fn bench_fallback_lookup(c: &mut Criterion) {
    let table = build_table(100);
    c.bench_function("route_fallback", |b| {
        b.iter(|| black_box(table.route(&Method::GET, black_box("/no/such/route"))))
    });
}

criterion_group!(
    benches,
    bench_static_lookup,
    bench_param_lookup,
    bench_deep_param_lookup,
    bench_fallback_lookup
);
criterion_main!(benches);
