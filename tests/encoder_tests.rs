use std::sync::Arc;

use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use parking_lot::Mutex;
use triemux::server::encoder::{etag, GZIP_THRESHOLD};
use triemux::server::CancellationSignal;
use triemux::{AppService, Router, RouterError, RuntimeConfig};

mod common;
use common::{body_text, get, gunzip, large_text, request, send, service};

fn gzip() -> [(header::HeaderName, &'static str); 1] {
    [(header::ACCEPT_ENCODING, "gzip, deflate, br")]
}

fn content_service() -> AppService {
    let mut router = Router::new();
    router.get("/small", |ctx| Ok(ctx.text("tiny")?)).unwrap();
    router
        .get("/large", |ctx| Ok(ctx.text(common::large_text())?))
        .unwrap();
    router
        .get("/exact/:n", |ctx| {
            let n = ctx.get_int("n")? as usize;
            Ok(ctx.text("x".repeat(n))?)
        })
        .unwrap();
    router
        .get("/image", |ctx| {
            ctx.set_header(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
            Ok(ctx.bytes(vec![0x89; 4096])?)
        })
        .unwrap();
    router
        .get("/logo.svg", |ctx| {
            ctx.set_header(header::CONTENT_TYPE, HeaderValue::from_static("image/svg+xml"));
            Ok(ctx.bytes(common::large_text().into_bytes())?)
        })
        .unwrap();
    router
        .get("/video", |ctx| {
            ctx.set_header(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
            Ok(ctx.bytes(vec![7; 4096])?)
        })
        .unwrap();
    router
        .get("/json", |ctx| {
            let items: Vec<u32> = (0..1000).collect();
            Ok(ctx.json(&serde_json::json!({ "items": items }))?)
        })
        .unwrap();
    service(router)
}

#[test]
fn test_small_body_is_written_raw() {
    let service = content_service();
    let res = send(&service, Method::GET, "/small", &gzip());

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(&res), "tiny");
    assert_eq!(res.header(header::CONTENT_ENCODING), None);
    assert_eq!(res.header(header::ETAG), None);
    assert_eq!(res.header(header::CACHE_CONTROL), None);
    assert_eq!(res.header(header::CONTENT_TYPE), Some("text/plain; charset=utf-8"));
}

#[test]
fn test_threshold_boundary() {
    let service = content_service();

    let below = send(&service, Method::GET, &format!("/exact/{}", GZIP_THRESHOLD - 1), &gzip());
    assert_eq!(below.header(header::CONTENT_ENCODING), None);
    assert_eq!(below.body().len(), GZIP_THRESHOLD - 1);

    let at = send(&service, Method::GET, &format!("/exact/{GZIP_THRESHOLD}"), &gzip());
    assert_eq!(at.header(header::CONTENT_ENCODING), Some("gzip"));
    assert_eq!(gunzip(at.body()), vec![b'x'; GZIP_THRESHOLD]);
}

#[test]
fn test_large_body_is_gzipped_with_etag() {
    let service = content_service();
    let res = send(&service, Method::GET, "/large", &gzip());

    let expected = large_text();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.header(header::CONTENT_ENCODING), Some("gzip"));
    assert_eq!(res.header(header::CACHE_CONTROL), Some("must-revalidate"));
    let tag = format!("\"{}\"", etag(expected.as_bytes()));
    assert_eq!(res.header(header::ETAG), Some(tag.as_str()));
    assert!(res.body().len() < expected.len());
    assert_eq!(gunzip(res.body()), expected.into_bytes());
}

#[test]
fn test_without_accept_encoding_sends_length() {
    let service = content_service();
    let res = get(&service, "/large");

    let expected = large_text();
    assert_eq!(res.header(header::CONTENT_ENCODING), None);
    let length = expected.len().to_string();
    assert_eq!(res.header(header::CONTENT_LENGTH), Some(length.as_str()));
    assert!(res.header(header::ETAG).is_some());
    assert_eq!(body_text(&res), expected);
}

#[test]
fn test_matching_etag_yields_not_modified() {
    let service = content_service();
    let first = send(&service, Method::GET, "/large", &gzip());
    let tag = first.header(header::ETAG).unwrap().to_string();

    for candidate in [tag.clone(), format!("W/{tag}"), tag.trim_matches('"').to_string()] {
        let req = request(Method::GET, "/large")
            .with_header(header::IF_NONE_MATCH, HeaderValue::try_from(candidate).unwrap());
        let res = service.handle(req);
        assert_eq!(res.status(), StatusCode::NOT_MODIFIED);
        assert!(res.body().is_empty());
    }

    let res = send(
        &service,
        Method::GET,
        "/large",
        &[(header::IF_NONE_MATCH, "\"0000000000000000\"")],
    );
    assert_eq!(res.status(), StatusCode::OK);
}

#[test]
fn test_media_cache_policy_and_no_gzip() {
    let service = content_service();

    for path in ["/image", "/video"] {
        let res = send(&service, Method::GET, path, &gzip());
        assert_eq!(
            res.header(header::CACHE_CONTROL),
            Some("public, max-age=864000, immutable"),
            "{path}"
        );
        assert_eq!(res.header(header::CONTENT_ENCODING), None, "{path}");
        assert_eq!(res.header(header::CONTENT_LENGTH), Some("4096"), "{path}");
    }
}

#[test]
fn test_svg_is_compressed() {
    let service = content_service();
    let res = send(&service, Method::GET, "/logo.svg", &gzip());

    assert_eq!(res.header(header::CONTENT_ENCODING), Some("gzip"));
    assert_eq!(
        res.header(header::CACHE_CONTROL),
        Some("public, max-age=864000, immutable")
    );
    assert_eq!(gunzip(res.body()), large_text().into_bytes());
}

#[test]
fn test_json_body_is_compressed() {
    let service = content_service();
    let res = send(&service, Method::GET, "/json", &gzip());

    assert_eq!(res.header(header::CONTENT_TYPE), Some("application/json"));
    assert_eq!(res.header(header::CONTENT_ENCODING), Some("gzip"));
    let value: serde_json::Value = serde_json::from_slice(&gunzip(res.body())).unwrap();
    assert_eq!(value["items"].as_array().unwrap().len(), 1000);
}

#[test]
fn test_gzip_disabled_by_config() {
    let mut router = Router::new();
    router
        .get("/large", |ctx| Ok(ctx.text(common::large_text())?))
        .unwrap();
    let config = RuntimeConfig {
        gzip: false,
        ..RuntimeConfig::default()
    };
    let service = AppService::new(router, config);

    let res = send(&service, Method::GET, "/large", &gzip());
    assert_eq!(res.header(header::CONTENT_ENCODING), None);
    assert!(res.header(header::ETAG).is_some());
    assert_eq!(body_text(&res), large_text());
}

#[test]
fn test_compressors_are_pooled() {
    let service = content_service();
    for _ in 0..5 {
        let res = send(&service, Method::GET, "/large", &gzip());
        assert_eq!(gunzip(res.body()), large_text().into_bytes());
    }
    let debug = format!("{:?}", service.encoder());
    assert!(debug.contains("created: 1"), "{debug}");
}

#[test]
fn test_modifiers_run_before_encoding() {
    let mut router = Router::new();
    router
        .get("/shout", |ctx| {
            ctx.add_modifier(|body| body.to_ascii_uppercase())?;
            ctx.add_modifier(|mut body| {
                body.extend_from_slice(b"!");
                body
            })?;
            Ok(ctx.text("hello")?)
        })
        .unwrap();
    router
        .get("/inflate", |ctx| {
            ctx.add_modifier(|body| body.repeat(1000))?;
            Ok(ctx.text("ab")?)
        })
        .unwrap();
    let service = service(router);

    assert_eq!(body_text(&get(&service, "/shout")), "HELLO!");

    let res = send(&service, Method::GET, "/inflate", &gzip());
    assert_eq!(res.header(header::CONTENT_ENCODING), Some("gzip"));
    assert_eq!(gunzip(res.body()), b"ab".repeat(1000));
}

#[test]
fn test_fifth_modifier_is_rejected() {
    let errors: Arc<Mutex<Vec<String>>> = Arc::default();
    let mut router = Router::new();
    router
        .get("/mods", |ctx| {
            for _ in 0..5 {
                ctx.add_modifier(|body| body)?;
            }
            Ok(ctx.text("unreachable")?)
        })
        .unwrap();
    let mut service = service(router);
    let seen = Arc::clone(&errors);
    service.on_error(move |_ctx, err| {
        if let Some(RouterError::TooManyModifiers(max)) = err.downcast_ref::<RouterError>() {
            seen.lock().push(format!("too many modifiers: {max}"));
        }
    });

    let res = get(&service, "/mods");
    assert!(res.body().is_empty());
    assert_eq!(*errors.lock(), vec!["too many modifiers: 4".to_string()]);
}

#[test]
fn test_cancelled_request_writes_nothing() {
    let cancelled: Arc<Mutex<bool>> = Arc::default();
    let mut router = Router::new();
    router.get("/slow", |ctx| Ok(ctx.text("late")?)).unwrap();
    let mut service = service(router);
    let flag = Arc::clone(&cancelled);
    service.on_error(move |_ctx, err| {
        if matches!(err.downcast_ref::<RouterError>(), Some(RouterError::RequestCancelled)) {
            *flag.lock() = true;
        }
    });

    let signal = CancellationSignal::new();
    signal.cancel();
    let res = service.handle(request(Method::GET, "/slow").with_cancellation(signal));

    assert!(res.body().is_empty());
    assert!(*cancelled.lock());
}

fn split_service() -> AppService {
    let mut router = Router::new();
    router
        .get("/small-then-large", |ctx| {
            ctx.text("head")?;
            Ok(ctx.text(large_text())?)
        })
        .unwrap();
    router
        .get("/large-then-small", |ctx| {
            ctx.text(large_text())?;
            Ok(ctx.text("tail")?)
        })
        .unwrap();
    service(router)
}

#[test]
fn test_later_write_keeps_raw_encoding_of_first() {
    let res = send(&split_service(), Method::GET, "/small-then-large", &gzip());
    assert_eq!(res.header(header::CONTENT_ENCODING), None);
    assert_eq!(res.header(header::ETAG), None);
    assert_eq!(body_text(&res), format!("head{}", large_text()));
}

#[test]
fn test_later_write_updates_content_length() {
    let res = get(&split_service(), "/large-then-small");
    let expected = format!("{}tail", large_text());
    assert_eq!(body_text(&res), expected);
    assert_eq!(
        res.header(header::CONTENT_LENGTH),
        Some(expected.len().to_string().as_str())
    );
    assert_eq!(res.header(header::ETAG), None);
}

#[test]
fn test_later_write_to_gzipped_body_adds_gzip_member() {
    use std::io::Read;

    let res = send(&split_service(), Method::GET, "/large-then-small", &gzip());
    assert_eq!(res.header(header::CONTENT_ENCODING), Some("gzip"));

    let mut decoded = String::new();
    flate2::read::MultiGzDecoder::new(res.body())
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, format!("{}tail", large_text()));
}
