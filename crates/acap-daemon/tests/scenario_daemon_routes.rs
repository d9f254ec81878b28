//! In-process scenario tests for acap-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket,
//! driven via `tower::ServiceExt::oneshot`. Status queries real aggregate
//! counts from Postgres, so they are gated on `ACAP_DATABASE_URL` like
//! every other scenario test in this workspace.

mod common;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp.into_body().collect().await.expect("body collect failed").to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

#[tokio::test]
async fn health_returns_200_ok_true() -> anyhow::Result<()> {
    let url = match std::env::var(acap_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ACAP_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = common::make_pool(&url).await?;
    let router = acap_daemon::routes::build_router(common::make_state(pool));

    let req = Request::builder()
        .method("GET")
        .uri("/v1/health")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "acap-daemon");
    Ok(())
}

#[tokio::test]
async fn status_reports_zero_running_work_against_a_fresh_database() -> anyhow::Result<()> {
    let url = match std::env::var(acap_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ACAP_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = common::make_pool(&url).await?;
    let router = acap_daemon::routes::build_router(common::make_state(pool));

    let req = Request::builder()
        .method("GET")
        .uri("/v1/status")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["config_hash"], "testhash");
    assert_eq!(json["max_concurrent_builds"], 5);
    assert_eq!(json["queue_concurrency"], 3);
    Ok(())
}

#[tokio::test]
async fn unknown_route_returns_404() -> anyhow::Result<()> {
    let url = match std::env::var(acap_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ACAP_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = common::make_pool(&url).await?;
    let router = acap_daemon::routes::build_router(common::make_state(pool));

    let req = Request::builder()
        .method("GET")
        .uri("/v1/does_not_exist")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = call(router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
