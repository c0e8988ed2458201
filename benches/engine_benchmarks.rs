use criterion::{Criterion, criterion_group, criterion_main};
use kiln::compression::ReusableGzip;
use kiln::{Handler, Method, Request, RequestParser, RoutePattern, Router};
use std::hint::black_box;

fn router_with_routes(count: usize) -> Router {
    let router = Router::new();
    for i in 0..count {
        router
            .register(Handler::builder(format!("/api/v1/resource{}/{{id}}", i)).build().unwrap())
            .unwrap();
    }
    router
}

fn bench_route_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("router");

    let router = router_with_routes(50);
    group.bench_function("first_of_50", |b| {
        b.iter(|| router.route(black_box(&mut Request::new(Method::Get, "/api/v1/resource0/42"))))
    });
    group.bench_function("last_of_50", |b| {
        b.iter(|| router.route(black_box(&mut Request::new(Method::Get, "/api/v1/resource49/42"))))
    });
    group.bench_function("fallback", |b| {
        b.iter(|| router.route(black_box(&mut Request::new(Method::Get, "/nowhere"))))
    });

    // After a sort the busiest route is checked first
    let sorted = router_with_routes(50);
    sorted.route(&mut Request::new(Method::Get, "/api/v1/resource49/1"));
    sorted.sort_now();
    group.bench_function("last_of_50_sorted", |b| {
        b.iter(|| sorted.route(black_box(&mut Request::new(Method::Get, "/api/v1/resource49/42"))))
    });

    group.finish();
}

fn bench_pattern_captures(c: &mut Criterion) {
    let pattern = RoutePattern::parse("/blog/{year}/{slug}/[page=1]").unwrap();
    c.bench_function("pattern_captures", |b| {
        b.iter(|| pattern.captures(black_box("/blog/2024/hello-world/3")))
    });
}

fn bench_request_parsing(c: &mut Criterion) {
    let parser = &RequestParser::default();
    let raw: &[u8] = b"GET /search?q=kiln+server&page=2 HTTP/1.1\r\nHost: localhost\r\nAccept: text/html\r\nAccept-Encoding: gzip, deflate\r\nCookie: a=1; b=2\r\n\r\n";
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

    c.bench_function("parse_request", |b| {
        b.to_async(&runtime).iter(|| async move {
            let mut reader = raw;
            parser.parse(black_box(&mut reader), None).await.unwrap()
        })
    });
}

fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("gzip");
    let page = "<li class=\"item\">kiln</li>\n".repeat(400);

    let mut reused = ReusableGzip::new();
    group.bench_function("reused_writer", |b| {
        b.iter(|| reused.compress(black_box(page.as_bytes())).unwrap())
    });
    group.bench_function("fresh_writer", |b| {
        b.iter(|| ReusableGzip::new().compress(black_box(page.as_bytes())).unwrap())
    });

    group.finish();
}

criterion_group!(
    engine_benches,
    bench_route_matching,
    bench_pattern_captures,
    bench_request_parsing,
    bench_compression,
);
criterion_main!(engine_benches);
