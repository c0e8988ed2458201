use kiln_core::{Error, Handler, Method, Request, Response, Router};

fn route(pattern: &str, method: Method, body: &'static str) -> Handler {
    Handler::builder(pattern)
        .method(method)
        .respond(move |_| Response::text(body))
        .build()
        .unwrap()
}

fn hit(router: &Router, path: &str) -> String {
    router.route(&mut Request::new(Method::Get, path)).name().to_string()
}

#[test]
fn test_duplicate_registration_keeps_original() {
    let router = Router::new();
    let original = router.register(route("/Users/{id}", Method::Get, "a")).unwrap();

    let err = router.register(route("users/<id>/", Method::Get, "b")).unwrap_err();
    assert!(matches!(err, Error::DuplicateRoute { .. }));
    assert_eq!(router.len(), 1);

    let mut request = Request::new(Method::Get, "/users/1");
    assert_eq!(router.route(&mut request).id(), original.id());
}

#[test]
fn test_same_pattern_different_method_is_allowed() {
    let router = Router::new();
    router.register(route("/items", Method::Get, "list")).unwrap();
    router.register(route("/items", Method::Post, "create")).unwrap();
    assert_eq!(router.len(), 2);

    let mut post = Request::new(Method::Post, "/items");
    assert_eq!(router.route(&mut post).method(), kiln_core::MethodFilter::Only(Method::Post));
}

#[test]
fn test_head_uses_get_route() {
    let router = Router::new();
    let get = router.register(route("/page", Method::Get, "page")).unwrap();

    let mut head = Request::new(Method::Head, "/page");
    assert_eq!(router.route(&mut head).id(), get.id());
}

#[test]
fn test_routing_is_deterministic() {
    let router = Router::new();
    for (pattern, name) in [("/a/{x}", "first"), ("/a/{y}/[z]", "second")] {
        router
            .register(Handler::builder(pattern).name(name).build().unwrap())
            .unwrap();
    }

    for _ in 0..10 {
        assert_eq!(hit(&router, "/a/1"), "first");
    }
}

#[test]
fn test_sort_moves_busiest_route_first() {
    let router = Router::new();
    for name in ["a", "b", "c"] {
        router
            .register(
                Handler::builder(format!("/{}", name))
                    .name(name)
                    .build()
                    .unwrap(),
            )
            .unwrap();
    }

    hit(&router, "/a");
    for _ in 0..3 {
        hit(&router, "/c");
    }
    for _ in 0..2 {
        hit(&router, "/b");
    }
    assert!(router.sort_now());

    let order: Vec<_> = router.routes().iter().map(|h| h.name().to_string()).collect();
    assert_eq!(order, ["c", "b", "a"]);
    assert_eq!(router.head().unwrap().name(), "c");
}

#[test]
fn test_sort_keeps_ties_in_registration_order() {
    let router = Router::new();
    for name in ["a", "b", "c", "d"] {
        router
            .register(Handler::builder(format!("/{}", name)).name(name).build().unwrap())
            .unwrap();
    }

    hit(&router, "/d");
    hit(&router, "/d");
    hit(&router, "/b");
    hit(&router, "/c");
    assert!(router.sort_now());

    let order: Vec<_> = router.routes().iter().map(|h| h.name().to_string()).collect();
    assert_eq!(order, ["d", "b", "c", "a"]);
}

#[test]
fn test_variables_are_attached() {
    let router = Router::new();
    router
        .register(route("/blog/{year}/[slug]", Method::Get, "post"))
        .unwrap();

    let mut request = Request::new(Method::Get, "/blog/2024/hello-world");
    router.route(&mut request);
    assert_eq!(request.variable("year"), Some("2024"));
    assert_eq!(request.variable("slug"), Some("hello-world"));
}

#[test]
fn test_guard_rejection_falls_through() {
    let router = Router::new();
    router
        .register(
            Handler::builder("/files/{name}")
                .name("guarded")
                .guard(|request| request.variable("name") != Some("secret"))
                .build()
                .unwrap(),
        )
        .unwrap();
    router
        .register(Handler::builder("/files/secret").name("literal").build().unwrap())
        .unwrap();

    assert_eq!(hit(&router, "/files/public"), "guarded");
    let mut request = Request::new(Method::Get, "/files/secret");
    assert_eq!(router.route(&mut request).name(), "literal");
    assert_eq!(request.variable("name"), None);
}
