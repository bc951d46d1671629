use std::{net::SocketAddr, sync::Arc};

use bytes::Bytes;
use cortex_tenant_server::{ProxyConfig, serve};
use cortex_tenant_shutdown::Lifecycle;
use cortex_tenant_wire::{Codec, Label, Sample, TimeSeries, WriteRequest};
use hyper::{StatusCode, server::conn::AddrIncoming};
use mockito::{Matcher, Server};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const PUSH_PATH: &str = "/api/v1/push";

/// A proxy serving on an ephemeral local port.
struct TestProxy {
    addr: SocketAddr,
    shutdown: CancellationToken,
    server: JoinHandle<Result<(), hyper::Error>>,
}

impl TestProxy {
    fn start(config: ProxyConfig) -> Self {
        let shutdown = CancellationToken::new();
        let lifecycle = Arc::new(Lifecycle::new(Default::default(), shutdown.clone()));
        let delegate = Arc::new(config.build(lifecycle).expect("valid proxy config"));

        let incoming = AddrIncoming::bind(&"127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = incoming.local_addr();
        let server = tokio::spawn(serve(incoming, delegate, shutdown.clone()));

        Self {
            addr,
            shutdown,
            server,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn push(&self, body: impl Into<reqwest::Body>) -> (StatusCode, Bytes) {
        let response = reqwest::Client::new()
            .post(self.url("/push"))
            .body(body)
            .send()
            .await
            .expect("proxy reachable");
        let status = response.status();
        (status, response.bytes().await.unwrap())
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.server.await.unwrap().unwrap();
    }
}

fn config(target: &str) -> ProxyConfig {
    ProxyConfig::new(format!("{target}{PUSH_PATH}").parse().unwrap())
}

fn series(name: &str, tenant: Option<&str>) -> TimeSeries {
    let mut labels = vec![Label::new("__name__", name)];
    if let Some(t) = tenant {
        labels.push(Label::new("__tenant__", t));
    }
    TimeSeries {
        labels,
        samples: vec![Sample {
            value: 42.0,
            timestamp: 1_700_000_000_000,
        }],
        exemplars: vec![],
    }
}

fn encode(timeseries: Vec<TimeSeries>) -> Bytes {
    Codec::default()
        .encode(&WriteRequest {
            timeseries,
            metadata: vec![],
        })
        .unwrap()
}

#[test_log::test(tokio::test)]
async fn test_push_split_by_tenant() {
    let mut downstream = Server::new_async().await;
    let mut mocks = Vec::new();
    for tenant in ["a", "default"] {
        let mock = downstream
            .mock("POST", PUSH_PATH)
            .match_header("X-Scope-OrgID", tenant)
            .match_header("Content-Encoding", "snappy")
            .match_header("Content-Type", "application/x-protobuf")
            .match_header("X-Prometheus-Remote-Write-Version", "0.1.0")
            .match_header(
                "X-Cortex-Tenant-Src",
                Matcher::Regex(r"^127\.0\.0\.1:\d+$".to_string()),
            )
            .match_header(
                "X-Cortex-Tenant-ReqID",
                Matcher::Regex(r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-".to_string()),
            )
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        mocks.push(mock);
    }

    let proxy = TestProxy::start(config(&downstream.url()));

    let (status, body) = proxy
        .push(encode(vec![
            series("up", Some("a")),
            series("up", None),
            series("down", Some("a")),
        ]))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    for mock in mocks {
        mock.assert_async().await;
    }

    proxy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_partial_failure_passed_through() {
    let mut downstream = Server::new_async().await;
    let ok = downstream
        .mock("POST", PUSH_PATH)
        .match_header("X-Scope-OrgID", "a")
        .with_status(200)
        .create_async()
        .await;
    let rejected = downstream
        .mock("POST", PUSH_PATH)
        .match_header("X-Scope-OrgID", "b")
        .with_status(503)
        .with_body("no ingesters")
        .create_async()
        .await;

    let proxy = TestProxy::start(config(&downstream.url()));

    let (status, body) = proxy
        .push(encode(vec![series("up", Some("a")), series("up", Some("b"))]))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "no ingesters");
    ok.assert_async().await;
    rejected.assert_async().await;

    proxy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_custom_tenant_header() {
    let mut downstream = Server::new_async().await;
    let mock = downstream
        .mock("POST", PUSH_PATH)
        .match_header("X-Org", "acme")
        .match_header("X-Scope-OrgID", Matcher::Missing)
        .with_status(204)
        .create_async()
        .await;

    let mut config = config(&downstream.url());
    config.tenant.header = "X-Org".to_string();
    config.tenant.default = "acme".to_string();
    let proxy = TestProxy::start(config);

    let (status, _) = proxy.push(encode(vec![series("up", None)])).await;

    assert_eq!(status, StatusCode::OK);
    mock.assert_async().await;

    proxy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_bad_payload_not_forwarded() {
    let mut downstream = Server::new_async().await;
    let mock = downstream
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let proxy = TestProxy::start(config(&downstream.url()));

    let (status, body) = proxy.push("definitely not snappy").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        String::from_utf8_lossy(&body).contains("unable to unpack snappy"),
        "{body:?}"
    );
    mock.assert_async().await;

    proxy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_unreachable_downstream() {
    // Bind and release a port so nothing is listening on it.
    let target = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };

    let proxy = TestProxy::start(config(&target));

    let (status, body) = proxy.push(encode(vec![series("up", Some("a"))])).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.is_empty());

    proxy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_routing() {
    let downstream = Server::new_async().await;
    let proxy = TestProxy::start(config(&downstream.url()));
    let client = reqwest::Client::new();

    let alive = client.get(proxy.url("/alive")).send().await.unwrap();
    assert_eq!(alive.status(), StatusCode::OK);

    let get_push = client.get(proxy.url("/push")).send().await.unwrap();
    assert_eq!(get_push.status(), StatusCode::BAD_REQUEST);
    assert_eq!(get_push.text().await.unwrap(), "Expecting POST");

    let unknown = client.post(proxy.url("/write")).send().await.unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    assert_eq!(unknown.text().await.unwrap(), "Unknown URL");

    proxy.stop().await;
}
