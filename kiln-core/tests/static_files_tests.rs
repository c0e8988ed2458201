use kiln_cache::{CacheConfig, CacheManager, CacheManagerConfig};
use kiln_core::{ExtensionPolicy, FileKind, Handler, Response, StaticFiles, StaticFilesConfig};
use std::sync::Arc;
use std::time::Duration;

mod common;

use common::{engine, get};

fn site() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("public/css")).unwrap();
    std::fs::write(dir.path().join("public/index.html"), "<h1>home</h1>").unwrap();
    std::fs::write(dir.path().join("public/css/site.css"), "body { margin: 0 }").unwrap();
    std::fs::write(dir.path().join("public/logo.png"), [0x89u8, b'P', b'N', b'G', 0, 1, 2]).unwrap();
    std::fs::write(dir.path().join("private.txt"), "keep out").unwrap();
    dir
}

fn cached_engine() -> kiln_core::Engine {
    let config = CacheConfig::new(Duration::from_secs(60), 32);
    let cache = CacheManager::new(CacheManagerConfig {
        responses: config,
        files: config,
        fragments: config,
    })
    .unwrap();
    engine().with_cache(Arc::new(cache))
}

#[tokio::test]
async fn test_serves_text_and_binary() {
    let dir = site();
    let engine = engine();
    let files = StaticFiles::new(StaticFilesConfig::new(dir.path().join("public"))).unwrap();
    engine
        .router()
        .register(files.handler(Arc::clone(engine.cache())).unwrap())
        .unwrap();

    let page = get(&engine, "/index.html").await;
    assert_eq!(page.status, 200);
    assert_eq!(page.header("content-type"), Some("text/html; charset=utf-8"));
    assert_eq!(page.text(), "<h1>home</h1>");

    let css = get(&engine, "/css/site.css").await;
    assert_eq!(css.header("content-type"), Some("text/css; charset=utf-8"));

    let logo = get(&engine, "/logo.png").await;
    assert_eq!(logo.header("content-type"), Some("image/png"));
    assert_eq!(logo.body, [0x89u8, b'P', b'N', b'G', 0, 1, 2]);
}

#[tokio::test]
async fn test_refuses_traversal_and_unknown_types() {
    let dir = site();
    let engine = engine();
    let files = StaticFiles::new(StaticFilesConfig::new(dir.path().join("public"))).unwrap();
    engine
        .router()
        .register(files.handler(Arc::clone(engine.cache())).unwrap())
        .unwrap();

    assert_eq!(get(&engine, "/../private.txt").await.status, 404);
    assert_eq!(get(&engine, "/%2e%2e/private.txt").await.status, 404);
    assert_eq!(get(&engine, "/missing.html").await.status, 404);

    std::fs::write(dir.path().join("public/tool.exe"), "MZ").unwrap();
    assert_eq!(get(&engine, "/tool.exe").await.status, 404);
}

#[tokio::test]
async fn test_mount_point_and_custom_policy() {
    let dir = site();
    let engine = engine();
    let policy = ExtensionPolicy::empty().allow(FileKind::text(&["css"], "text/css"));
    let files = StaticFiles::new(
        StaticFilesConfig::new(dir.path().join("public"))
            .mount("/assets/")
            .policy(policy),
    )
    .unwrap();
    engine
        .router()
        .register(files.handler(Arc::clone(engine.cache())).unwrap())
        .unwrap();

    let css = get(&engine, "/assets/css/site.css").await;
    assert_eq!(css.status, 200);
    assert_eq!(css.header("content-type"), Some("text/css"));

    assert_eq!(get(&engine, "/css/site.css").await.status, 404);
    assert_eq!(get(&engine, "/assets/index.html").await.status, 404);
}

#[tokio::test]
async fn test_text_files_come_from_the_file_cache() {
    let dir = site();
    let engine = cached_engine();
    let files = StaticFiles::new(StaticFilesConfig::new(dir.path().join("public"))).unwrap();
    engine
        .router()
        .register(files.handler(Arc::clone(engine.cache())).unwrap())
        .unwrap();

    assert_eq!(get(&engine, "/index.html").await.text(), "<h1>home</h1>");

    std::fs::write(dir.path().join("public/index.html"), "<h1>changed</h1>").unwrap();
    assert_eq!(get(&engine, "/index.html").await.text(), "<h1>home</h1>");
}

#[tokio::test]
async fn test_missing_file_falls_through_to_later_routes() {
    let dir = site();
    let engine = engine();
    let files = StaticFiles::new(StaticFilesConfig::new(dir.path().join("public"))).unwrap();
    let router = engine.router();
    router
        .register(files.handler(Arc::clone(engine.cache())).unwrap())
        .unwrap();
    router
        .register(
            Handler::builder("/{page}.{ext}")
                .respond(|request| Response::text(format!("page {}", request.variable("page").unwrap_or("?"))))
                .build()
                .unwrap(),
        )
        .unwrap();

    assert_eq!(get(&engine, "/index.html").await.text(), "<h1>home</h1>");

    let generated = get(&engine, "/about.html").await;
    assert_eq!(generated.status, 200);
    assert_eq!(generated.text(), "page about");
}
