#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use fedgate_gateway::{app_state::AppState, config, router};

const REGISTERED: &str = "{ me { name } }";

async fn app(dir: &tempfile::TempDir) -> Router {
    let manifest = dir.path().join("manifest.json");
    let body = serde_json::json!({
        "format": "apollo-persisted-query-manifest",
        "version": 1,
        "operations": [ { "name": "Me", "type": "query", "body": REGISTERED } ]
    });
    std::fs::write(&manifest, body.to_string()).expect("manifest");

    let stats = dir.path().join("stats.json");
    std::fs::write(&stats, r#"{ "baselines": { "Query.products": 50.0 } }"#).expect("stats");

    let yaml = format!(
        r#"
version: 1
gateway:
  max_body_bytes: 2048
admission:
  max_cost: 90
  environment: production
cost_rules:
  Query.products: {{ kind: paginated, argument: first, default_count: 10 }}
safelist:
  manifest: "{}"
history:
  source: "{}"
"#,
        manifest.display(),
        stats.display()
    );
    let cfg = config::load_from_str(&yaml).expect("config");
    router::build_router(AppState::new(cfg).await.expect("state"))
}

fn admit_request(query: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut b = Request::builder()
        .method("POST")
        .uri("/v1/admit")
        .header("content-type", "application/json");
    for (k, v) in headers {
        b = b.header(*k, *v);
    }
    let body = serde_json::json!({ "query": query }).to_string();
    b.body(Body::from(body)).expect("request")
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let resp = app.oneshot(req).await.expect("response");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}

#[tokio::test]
async fn registered_operation_admitted_with_identity_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, headers, body) =
        send(app(&dir).await, admit_request(REGISTERED, &[("userid", "u-1")])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["admitted"], true);
    assert_eq!(body["context"]["caller"], "u-1");
    assert_eq!(headers.get("userid").and_then(|v| v.to_str().ok()), Some("u-1"));
}

#[tokio::test]
async fn unregistered_operation_denied_unless_override() {
    let dir = tempfile::tempdir().expect("tempdir");
    let query = "{ products { name } }";

    let (status, _, body) = send(app(&dir).await, admit_request(query, &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["errors"][0]["extensions"]["code"], "NOT_SAFELISTED");

    let (_, _, body) = send(app(&dir).await, admit_request(query, &[("override", "true")])).await;
    assert_eq!(body["admitted"], true);
    assert_eq!(body["context"]["caller"], "anonymous");
}

#[tokio::test]
async fn cost_denial_carries_measurement() {
    let dir = tempfile::tempdir().expect("tempdir");
    let req = admit_request("{ products(first: 20) { name } }", &[("override", "1")]);
    let (status, _, body) = send(app(&dir).await, req).await;

    assert_eq!(status, StatusCode::OK);
    let ext = &body["errors"][0]["extensions"];
    assert_eq!(ext["code"], "COST_EXCEEDED");
    assert_eq!(ext["measurement"]["cost"], 100.0);
    assert_eq!(ext["measurement"]["max_cost"], 90.0);
}

#[tokio::test]
async fn malformed_input_is_400() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, _, body) = send(app(&dir).await, admit_request("{ products(", &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["extensions"]["code"], "QUERY_INVALID");

    let req = Request::builder()
        .method("POST")
        .uri("/v1/admit")
        .body(Body::from("not json"))
        .expect("request");
    let (status, _, body) = send(app(&dir).await, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["extensions"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let big = format!("{{ {} }}", "products ".repeat(1000));
    let (status, _, _) = send(app(&dir).await, admit_request(&big, &[])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn ops_endpoints() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(&dir).await;

    let (status, _, _) = send(app.clone(), admit_request("{ products { name } }", &[])).await;
    assert_eq!(status, StatusCode::OK);

    let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).expect("request");
    let resp = app.clone().oneshot(get("/healthz")).await.expect("healthz");
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app.clone().oneshot(get("/readyz")).await.expect("readyz");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(get("/metrics")).await.expect("metrics");
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(to_bytes(resp.into_body(), usize::MAX).await.expect("body").to_vec())
        .expect("utf8");
    assert!(text.contains("fedgate_decisions_total{outcome=\"deny\",reason=\"NOT_SAFELISTED\"} 1"));
    assert!(text.contains("fedgate_snapshot_entries{snapshot=\"safelist\"} 1"));
    assert!(text.contains("fedgate_snapshot_entries{snapshot=\"history\"} 1"));
    assert!(text.contains("fedgate_uptime_seconds"));
}

#[tokio::test]
async fn queued_rejections_are_flushed_on_shutdown() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("rejections.jsonl");
    let yaml = format!(
        r#"
version: 1
admission:
  max_depth: 2
reporter:
  sink: {{ kind: json_lines, path: "{}" }}
  buffer: 16
  flush_timeout: 2s
"#,
        log.display()
    );
    let cfg = config::load_from_str(&yaml).expect("config");
    assert_eq!(cfg.reporter.flush_timeout, std::time::Duration::from_secs(2));
    let state = AppState::new(cfg).await.expect("state");
    let app = router::build_router(state.clone());

    for _ in 0..3 {
        let (_, _, body) = send(app.clone(), admit_request("{ me { reviews { body } } }", &[])).await;
        assert_eq!(body["errors"][0]["extensions"]["code"], "DEPTH_EXCEEDED");
    }

    assert!(state.flush_rejections(state.cfg().reporter.flush_timeout).await);
    let text = std::fs::read_to_string(&log).expect("rejection log");
    assert_eq!(text.lines().count(), 3);
    assert!(text.lines().all(|l| l.contains("\"reason\":\"DEPTH_EXCEEDED\"")));

    // a second flush has nothing left to do
    assert!(state.flush_rejections(std::time::Duration::from_millis(10)).await);
    let (_, _, body) = send(app, admit_request("{ me { reviews { body } } }", &[])).await;
    assert_eq!(body["errors"][0]["extensions"]["code"], "DEPTH_EXCEEDED");
    assert_eq!(state.metrics().reporter_dropped.get(&[("cause", "closed")]), 1);
}
