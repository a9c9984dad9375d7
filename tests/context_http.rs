//! Context HTTP semantics against a live local server and a closed port.

mod support;

use std::sync::Arc;

use serde_json::json;

use loadsmith::{Configuration, Context};

fn context_for(base_url: &str) -> Result<Context, String> {
    let config = Configuration::with_base_url(base_url).map_err(|err| err.to_string())?;
    Ok(Context::new(1, Arc::new(config)))
}

#[tokio::test]
async fn successful_request_records_an_ok_metric() -> Result<(), String> {
    let (url, _server) = support::spawn_http_server().await?;
    let mut ctx = context_for(&url)?;

    let reply = ctx.get("/api/items").query("page", "1").send().await;
    assert!(reply.is_ok());
    assert_eq!(reply.status(), Some(200));
    assert!(reply.get("items").is_some());

    let metrics = ctx.metrics();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].path, "/api/items");
    assert_eq!(metrics[0].status, Some(200));
    assert!(metrics[0].error.is_none());
    assert!(metrics[0].latency_ms.is_some());
    Ok(())
}

#[tokio::test]
async fn metric_name_overrides_the_path() -> Result<(), String> {
    let (url, _server) = support::spawn_http_server().await?;
    let mut ctx = context_for(&url)?;

    ctx.get("/api/items/7").name("/api/items/:id").send().await;
    assert_eq!(ctx.metrics()[0].path, "/api/items/:id");
    Ok(())
}

#[tokio::test]
async fn json_body_posts_and_parses() -> Result<(), String> {
    let (url, _server) = support::spawn_http_server().await?;
    let mut ctx = context_for(&url)?;

    let reply = ctx
        .post("/api/login")
        .json(json!({"username": "user1", "password": "secret"}))
        .send()
        .await;
    assert!(reply.is_ok());
    assert_eq!(reply.get("token"), Some(&json!("test-token")));
    Ok(())
}

#[tokio::test]
async fn non_success_status_is_a_metric_not_a_scenario_error() -> Result<(), String> {
    let (url, _server) = support::spawn_http_server().await?;
    let mut ctx = context_for(&url)?;

    let reply = ctx.get("/missing").send().await;
    assert!(!reply.is_ok());
    assert_eq!(reply.status(), Some(404));

    assert_eq!(ctx.metrics()[0].status, Some(404));
    assert!(ctx.scenario_errors().is_empty());
    Ok(())
}

#[tokio::test]
async fn transport_failure_is_total_and_recoverable() -> Result<(), String> {
    let closed = support::closed_port_url().await?;
    let mut ctx = context_for(&closed)?;

    let reply = ctx.get("/anything").send().await;
    assert!(!reply.is_ok());
    assert!(!reply.is_success());
    assert_eq!(reply.status(), None);
    assert!(reply.error().is_some());
    assert_eq!(reply.json(), &json!({}));

    {
        let metrics = ctx.metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].status, None);
        assert!(metrics[0].error.is_some());
    }

    // The same context stays usable: the lazy client is re-created on the
    // next call.
    let second = ctx.get("/again").send().await;
    assert!(second.error().is_some());
    assert_eq!(ctx.metrics().len(), 2);
    Ok(())
}

#[tokio::test]
async fn per_call_headers_win_over_defaults() -> Result<(), String> {
    let (url, _server) = support::spawn_http_server().await?;
    let mut ctx = context_for(&url)?;
    ctx.set_default_header("X-Trace", "default");

    // The server ignores headers; this exercises the merge path without
    // panicking and still records exactly one metric.
    ctx.get("/")
        .header("X-Trace", "override")
        .header("Accept", "application/json")
        .send()
        .await;
    assert_eq!(ctx.metrics().len(), 1);
    Ok(())
}

#[tokio::test]
async fn raw_body_is_sent_when_no_json_given() -> Result<(), String> {
    let (url, _server) = support::spawn_http_server().await?;
    let mut ctx = context_for(&url)?;

    let reply = ctx.put("/api/items/7").body("quantity=3").send().await;
    assert!(reply.is_ok());
    assert_eq!(ctx.metrics()[0].method.as_str(), "PUT");
    Ok(())
}
