use std::sync::Arc;

use http::Method;

use super::{clean_path, MatchError, Params, Route, Router};
use crate::error::RouterError;
use crate::handler::{handler, Handler};
use crate::server::Request;

fn noop() -> Handler {
    handler(|_| Ok(()))
}

fn request(method: Method, uri: &str) -> Request {
    Request::new(method, uri).unwrap()
}

#[test]
fn test_literal_lookup_returns_registered_handler() {
    let mut router = Router::new();
    let root = noop();
    let hello = noop();
    router.add(Method::GET, "/", Arc::clone(&root)).unwrap();
    router.add(Method::GET, "/hello", Arc::clone(&hello)).unwrap();

    let mut params = Params::new();
    let found = router.lookup(&Method::GET, "/", &mut params).unwrap();
    assert!(Arc::ptr_eq(found, &root));
    let found = router.lookup(&Method::GET, "/hello", &mut params).unwrap();
    assert!(Arc::ptr_eq(found, &hello));
    assert!(params.is_empty());
}

#[test]
fn test_last_registration_wins() {
    let mut router = Router::new();
    let first = noop();
    let second = noop();
    router.add(Method::GET, "/dup", Arc::clone(&first)).unwrap();
    router.add(Method::GET, "/dup", Arc::clone(&second)).unwrap();

    let mut params = Params::new();
    let found = router.lookup(&Method::GET, "/dup", &mut params).unwrap();
    assert!(Arc::ptr_eq(found, &second));
}

#[test]
fn test_methods_have_separate_trees() {
    let mut router = Router::new();
    router.post("/items", |_| Ok(())).unwrap();

    let mut params = Params::new();
    assert!(router.lookup(&Method::POST, "/items", &mut params).is_some());
    assert!(router.lookup(&Method::GET, "/items", &mut params).is_none());
}

#[test]
fn test_every_method_helper_registers() {
    let mut router = Router::new();
    router.get("/m", |_| Ok(())).unwrap();
    router.post("/m", |_| Ok(())).unwrap();
    router.put("/m", |_| Ok(())).unwrap();
    router.patch("/m", |_| Ok(())).unwrap();
    router.delete("/m", |_| Ok(())).unwrap();
    router.head("/m", |_| Ok(())).unwrap();
    router.options("/m", |_| Ok(())).unwrap();
    router.connect("/m", |_| Ok(())).unwrap();
    router.trace("/m", |_| Ok(())).unwrap();

    assert_eq!(router.allowed_methods("/m").len(), 9);
    assert_eq!(router.registered_routes().len(), 9);
}

#[test]
fn test_unknown_method_rejected_at_registration() {
    let mut router = Router::new();
    let method = Method::from_bytes(b"PURGE").unwrap();
    let err = router.add(method, "/cache", noop()).unwrap_err();
    assert!(matches!(err, RouterError::UnknownMethod(m) if m == "PURGE"));
}

#[test]
fn test_unknown_method_at_lookup_is_not_found_or_mismatch() {
    let mut router = Router::new();
    router.get("/cache", |_| Ok(())).unwrap();
    let purge = Method::from_bytes(b"PURGE").unwrap();

    let mut params = Params::new();
    assert!(router.lookup(&purge, "/cache", &mut params).is_none());

    let m = router.resolve(&request(purge.clone(), "/cache"), &mut params);
    assert_eq!(m.error, Some(MatchError::MethodMismatch));

    let m = router.resolve(&request(purge, "/elsewhere"), &mut params);
    assert_eq!(m.error, Some(MatchError::NotFound));
}

#[test]
fn test_parameters_are_captured() {
    let mut router = Router::new();
    router.get("/user/:id", |_| Ok(())).unwrap();
    router.get("/files/*rest", |_| Ok(())).unwrap();

    let mut params = Params::new();
    assert!(router.lookup(&Method::GET, "/user/42", &mut params).is_some());
    assert_eq!(params.get("id"), Some("42"));

    params.clear();
    assert!(router
        .lookup(&Method::GET, "/files/a/b/c", &mut params)
        .is_some());
    assert_eq!(params.get("rest"), Some("a/b/c"));
}

#[test]
fn test_failed_lookup_rolls_back_captures() {
    let mut router = Router::new();
    router.get("/user/:id/profile", |_| Ok(())).unwrap();

    let mut params = Params::new();
    assert!(router
        .lookup(&Method::GET, "/user/42/settings", &mut params)
        .is_none());
    assert!(params.is_empty());
}

#[test]
fn test_trailing_slash_resolves_to_same_handler() {
    let mut router = Router::new();
    let blog = noop();
    router.add(Method::GET, "/blog", Arc::clone(&blog)).unwrap();

    let mut params = Params::new();
    let found = router.lookup(&Method::GET, "/blog/", &mut params).unwrap();
    assert!(Arc::ptr_eq(found, &blog));
}

#[test]
fn test_brace_pattern_becomes_variable_route() {
    let mut router = Router::new();
    router.get("/articles/{id:[0-9]+}", |_| Ok(())).unwrap();

    assert_eq!(router.routes().len(), 1);
    let mut params = Params::new();
    assert!(router
        .lookup(&Method::GET, "/articles/7", &mut params)
        .is_none());

    let m = router.resolve(&request(Method::GET, "/articles/7"), &mut params);
    assert!(m.error.is_none());
    assert!(m.handler.is_some());
    assert_eq!(m.vars.unwrap()["id"], "7");

    let m = router.resolve(&request(Method::GET, "/articles/x"), &mut params);
    assert_eq!(m.error, Some(MatchError::NotFound));
}

#[test]
fn test_variable_routes_take_precedence() {
    let mut router = Router::new();
    let tree = noop();
    let variable = noop();
    router.add(Method::GET, "/docs", Arc::clone(&tree)).unwrap();
    router.add_route(
        Route::builder()
            .method(Method::GET)
            .path("/docs")
            .handler(Arc::clone(&variable))
            .unwrap(),
    );

    let mut params = Params::new();
    let m = router.resolve(&request(Method::GET, "/docs"), &mut params);
    assert!(Arc::ptr_eq(m.handler.as_ref().unwrap(), &variable));
}

#[test]
fn test_method_mismatch_from_other_tree() {
    let mut router = Router::new();
    router.post("/submit", |_| Ok(())).unwrap();

    let mut params = Params::new();
    let m = router.resolve(&request(Method::GET, "/submit"), &mut params);
    assert!(m.handler.is_none());
    assert_eq!(m.error, Some(MatchError::MethodMismatch));
    assert!(params.is_empty());
}

#[test]
fn test_method_mismatch_from_variable_route() {
    let mut router = Router::new();
    router.post("/orders/{id}", |_| Ok(())).unwrap();

    let mut params = Params::new();
    let m = router.resolve(&request(Method::GET, "/orders/9"), &mut params);
    assert_eq!(m.error, Some(MatchError::MethodMismatch));
}

#[test]
fn test_not_found_when_no_method_knows_path() {
    let mut router = Router::new();
    router.get("/known", |_| Ok(())).unwrap();

    let mut params = Params::new();
    let m = router.resolve(&request(Method::GET, "/unknown"), &mut params);
    assert_eq!(m.error, Some(MatchError::NotFound));
}

#[test]
fn test_route_builder_inherits_router_flags() {
    let mut router = Router::new();
    router.set_strict_slash(true);
    let route = router.route().path("/dir/").handler(noop()).unwrap();
    router.add_route(route);

    let mut params = Params::new();
    let m = router.resolve(&request(Method::GET, "/dir"), &mut params);
    // Strict slash swaps in a redirect handler for the mismatched form
    assert!(m.error.is_none());
    assert!(m.handler.is_some());
    assert!(m.route.is_some());
}

#[test]
fn test_named_route_lookup() {
    let mut router = Router::new();
    let route = router
        .route()
        .name("article")
        .path("/articles/{category}/{id:[0-9]+}")
        .handler(noop())
        .unwrap();
    router.add_route(route);

    let route = router.named("article").unwrap();
    assert_eq!(
        route
            .url(&[("category", "tech"), ("id", "42")])
            .unwrap(),
        "/articles/tech/42"
    );
    assert!(router.named("missing").is_none());
}

#[test]
fn test_invalid_patterns_rejected() {
    let mut router = Router::new();
    assert!(matches!(
        router.get("no-slash", |_| Ok(())),
        Err(RouterError::InvalidPattern { .. })
    ));
    assert!(matches!(
        router.get("/files/*rest/more", |_| Ok(())),
        Err(RouterError::InvalidPattern { .. })
    ));
    assert!(router.get("/bad/{id", |_| Ok(())).is_err());
    assert!(router.registered_routes().is_empty());
}

#[test]
fn test_clean_path() {
    assert_eq!(clean_path("/a/b"), None);
    assert_eq!(clean_path("/a/b/"), None);
    assert_eq!(clean_path("/"), None);
    assert_eq!(clean_path("/a//b").as_deref(), Some("/a/b"));
    assert_eq!(clean_path("/a/./b").as_deref(), Some("/a/b"));
    assert_eq!(clean_path("/a/../b").as_deref(), Some("/b"));
    assert_eq!(clean_path("/a/b/..").as_deref(), Some("/a"));
    assert_eq!(clean_path("/../x").as_deref(), Some("/x"));
    assert_eq!(clean_path("/a//b/").as_deref(), Some("/a/b/"));
    assert_eq!(clean_path("/a/..").as_deref(), Some("/"));
    assert_eq!(clean_path("").as_deref(), Some("/"));
    assert_eq!(clean_path("a/b").as_deref(), Some("/a/b"));
}

#[test]
fn test_skip_clean_flag() {
    let mut router = Router::new();
    assert!(!router.skips_clean());
    router.set_skip_clean(true);
    assert!(router.skips_clean());
}
