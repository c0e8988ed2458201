//! The facade crate exposes everything an application needs.

use kiln::prelude::*;
use kiln::{Outcome, Worker};
use std::sync::Arc;

struct Greeting;

#[async_trait]
impl Middleware for Greeting {
    async fn handle(&self, request: &mut Request) -> Flow {
        request.postpone_cookie(SetCookie::new("greeted", "yes"));
        Flow::Continue
    }

    fn name(&self) -> &str {
        "greeting"
    }
}

#[tokio::test]
async fn test_engine_from_default_config() {
    let mut config = ServerConfig::default();
    config.server.gzip = false;

    let engine = Engine::from_config(&config).unwrap().with_middleware(Greeting);
    engine
        .router()
        .register(
            Handler::builder("/hi/{name}")
                .method(Method::Get)
                .respond(|request| Response::text(format!("hi {}", request.variable("name").unwrap_or("?"))))
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut request = Request::new(Method::Get, "/hi/kiln");
    let mut out = Vec::new();
    let outcome = Worker::new(0).handle(&engine, &mut request, &mut out).await.unwrap();
    assert_eq!(outcome, Outcome::Responded(200));

    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Set-Cookie: greeted=yes"));
    assert!(text.ends_with("hi kiln"));
}

#[test]
fn test_subcrates_are_reachable() {
    let metrics = kiln::metrics::ServerMetrics::new().unwrap();
    metrics.record_request(Status::Ok.code(), std::time::Duration::from_millis(1));
    assert_eq!(metrics.requests_with_status(200), 1);

    let cache = Arc::new(kiln::cache::CacheManager::disabled());
    assert!(!cache.is_enabled());

    assert!(kiln::compression::accepts_gzip("br, gzip;q=0.8"));
}
