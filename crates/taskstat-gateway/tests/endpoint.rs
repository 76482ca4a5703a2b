//! Exposition endpoint lifecycle against a real listener.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use taskstat_core::TaskTracker;
use taskstat_gateway::{EndpointState, MetricsEndpoint, MetricsRegistry, TaskStats};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

const DEADLINE: Duration = Duration::from_secs(5);

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn spawn_endpoint(
    endpoint: &Arc<MetricsEndpoint>,
    pattern: &'static str,
) -> JoinHandle<taskstat_core::Result<()>> {
    let endpoint = Arc::clone(endpoint);
    tokio::spawn(async move { endpoint.run(pattern, "127.0.0.1:0").await })
}

/// `metric{labels} value` lines -> (label block, value).
fn samples(body: &str, metric: &str) -> HashMap<String, i64> {
    body.lines()
        .filter(|l| !l.starts_with('#'))
        .filter_map(|l| l.strip_prefix(metric))
        .filter_map(|rest| {
            let (labels, value) = rest.rsplit_once(' ')?;
            Some((labels.to_string(), value.parse().ok()?))
        })
        .collect()
}

#[tokio::test]
async fn scrape_returns_synced_gauges() {
    let registry = Arc::new(MetricsRegistry::new());
    let tracker = Arc::new(TaskTracker::new("billing"));
    let stats = TaskStats::new(Arc::clone(&tracker), &registry).unwrap();

    tracker.add("fetch");
    tracker.add("fetch");
    tracker.add("flush");
    stats.sync_to_gauge();
    // Not synced yet, must not show up.
    tracker.add("late");

    let endpoint = Arc::new(MetricsEndpoint::new(Arc::clone(&registry)));
    let server = spawn_endpoint(&endpoint, "/metrics");
    let addr: SocketAddr = endpoint.listening().await.unwrap();
    assert_eq!(endpoint.state(), EndpointState::Listening(addr));

    let resp = client()
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let ctype = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(ctype.starts_with("text/plain; version=0.0.4"));

    let body = resp.text().await.unwrap();
    let got = samples(&body, "task_count");
    assert_eq!(got.len(), 2, "{body}");
    assert_eq!(got[r#"{name="fetch",service="billing"}"#], 2);
    assert_eq!(got[r#"{name="flush",service="billing"}"#], 1);

    let missing = client()
        .get(format!("http://{addr}/other"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    endpoint.stop(DEADLINE).await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn stop_closes_listener() {
    let registry = Arc::new(MetricsRegistry::new());
    let endpoint = Arc::new(MetricsEndpoint::new(registry));
    let server = spawn_endpoint(&endpoint, "/m");
    let addr = endpoint.listening().await.unwrap();

    let ok = client().get(format!("http://{addr}/m")).send().await.unwrap();
    assert!(ok.status().is_success());

    endpoint.stop(DEADLINE).await.unwrap();
    assert_eq!(endpoint.state(), EndpointState::Stopped);
    server.await.unwrap().unwrap();

    let err = client().get(format!("http://{addr}/m")).send().await;
    assert!(err.is_err(), "listener must be closed after stop");

    // Second stop is a no-op.
    endpoint.stop(DEADLINE).await.unwrap();
}

#[tokio::test]
async fn stop_before_run_is_an_error() {
    let endpoint = MetricsEndpoint::new(Arc::new(MetricsRegistry::new()));
    let err = endpoint.stop(DEADLINE).await.unwrap_err();
    assert_eq!(err.code().as_str(), "NOT_STARTED");
    assert_eq!(endpoint.state(), EndpointState::Idle);
}

#[tokio::test]
async fn run_is_single_shot() {
    let endpoint = Arc::new(MetricsEndpoint::new(Arc::new(MetricsRegistry::new())));
    let server = spawn_endpoint(&endpoint, "/metrics");
    endpoint.listening().await.unwrap();

    let err = endpoint.run("/metrics", "127.0.0.1:0").await.unwrap_err();
    assert_eq!(err.code().as_str(), "ALREADY_STARTED");

    endpoint.stop(DEADLINE).await.unwrap();
    server.await.unwrap().unwrap();

    let err = endpoint.run("/metrics", "127.0.0.1:0").await.unwrap_err();
    assert_eq!(err.code().as_str(), "ALREADY_STARTED");
}

#[tokio::test]
async fn bind_failure_is_returned() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let endpoint = MetricsEndpoint::new(Arc::new(MetricsRegistry::new()));
    let err = endpoint.run("/metrics", &addr).await.unwrap_err();
    assert_eq!(err.code().as_str(), "BIND");
    assert_eq!(endpoint.state(), EndpointState::Stopped);
    assert!(endpoint.listening().await.is_err());
}

#[tokio::test]
async fn invalid_pattern_is_rejected() {
    let endpoint = MetricsEndpoint::new(Arc::new(MetricsRegistry::new()));
    let err = endpoint.run("metrics", "127.0.0.1:0").await.unwrap_err();
    assert_eq!(err.code().as_str(), "BAD_REQUEST");
}

#[tokio::test]
async fn stop_times_out_while_a_scrape_is_in_flight() {
    let endpoint = Arc::new(MetricsEndpoint::new(Arc::new(MetricsRegistry::new())));
    let server = spawn_endpoint(&endpoint, "/m");
    let addr = endpoint.listening().await.unwrap();

    let mut conn = TcpStream::connect(addr).await.unwrap();
    conn.write_all(b"GET /m HTTP/1.1\r\nHost: x\r\n").await.unwrap();
    // Let the server accept the connection and start reading the head.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = endpoint.stop(Duration::from_millis(300)).await.unwrap_err();
    assert_eq!(err.code().as_str(), "SHUTDOWN_TIMEOUT");
    assert!(matches!(endpoint.state(), EndpointState::Listening(_)));

    conn.write_all(b"\r\n").await.unwrap();
    let mut head = vec![0u8; 64];
    let n = conn.read(&mut head).await.unwrap();
    let head = String::from_utf8_lossy(&head[..n]);
    assert!(head.starts_with("HTTP/1.1 200 OK"), "{head}");
    drop(conn);

    endpoint.stop(DEADLINE).await.unwrap();
    assert_eq!(endpoint.state(), EndpointState::Stopped);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn stop_and_join_handles_a_server_task_not_yet_polled() {
    let endpoint = Arc::new(MetricsEndpoint::new(Arc::new(MetricsRegistry::new())));
    let server = spawn_endpoint(&endpoint, "/metrics");

    // Single-threaded test runtime: the spawned task has not run yet.
    assert_eq!(endpoint.state(), EndpointState::Idle);
    let err = endpoint.stop(DEADLINE).await.unwrap_err();
    assert_eq!(err.code().as_str(), "NOT_STARTED");

    tokio::time::timeout(DEADLINE, endpoint.stop_and_join(server, DEADLINE))
        .await
        .expect("must not hang")
        .unwrap();
    assert_eq!(endpoint.state(), EndpointState::Stopped);
}

#[tokio::test]
async fn stop_and_join_returns_the_bind_error() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let endpoint = Arc::new(MetricsEndpoint::new(Arc::new(MetricsRegistry::new())));
    let server = {
        let endpoint = Arc::clone(&endpoint);
        tokio::spawn(async move { endpoint.run("/metrics", &addr).await })
    };

    let err = endpoint.stop_and_join(server, DEADLINE).await.unwrap_err();
    assert_eq!(err.code().as_str(), "BIND");
}
