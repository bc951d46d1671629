//! A remote-write proxy that splits each pushed batch by tenant
//!
//! Every series of an inbound Prometheus remote-write request is assigned a tenant from one of
//! its labels. The series of each tenant are re-encoded as a request of their own and written to
//! the downstream target concurrently, with the tenant carried in a header. The client receives a
//! single response summarising all downstream writes.
//!
//! The pieces, in request order:
//!
//! * [`http::HttpDelegate`] reads and decodes the body, and answers liveness probes.
//! * [`partitioner::Partitioner`] splits the decoded request per tenant.
//! * [`dispatcher::Dispatcher`] fans the partitions out through a [`forwarder::Forwarder`].
//! * [`aggregator::aggregate`] picks the response returned to the client.
use std::{convert::Infallible, net::SocketAddr, num::NonZeroUsize, sync::Arc, time::Duration};

use cortex_tenant_clap_blocks::tenant::TenantConfig;
use cortex_tenant_shutdown::Lifecycle;
use cortex_tenant_wire::{Codec, codec::DEFAULT_MAX_REQUEST_BYTES};
use hyper::{
    header::{HeaderName, InvalidHeaderName},
    server::conn::{AddrIncoming, AddrStream},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

pub mod aggregator;
pub mod dispatcher;
pub mod forwarder;
pub mod http;
pub mod partitioner;

use dispatcher::Dispatcher;
use forwarder::{Forwarder, HttpWriteClient, WriteClient};
use http::HttpDelegate;
use partitioner::Partitioner;

/// Errors assembling the proxy.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid tenant header name {name:?}: {source}")]
    InvalidTenantHeader {
        name: String,
        source: InvalidHeaderName,
    },

    #[error("failed to build downstream HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Everything needed to assemble an [`HttpDelegate`] writing to a real downstream.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub target: Url,
    pub tenant: TenantConfig,
    /// Bounds each downstream write, and the time allowed to receive an inbound body.
    pub timeout: Duration,
    pub max_request_bytes: usize,
    pub max_idle_conns_per_host: usize,
    pub max_tenant_concurrency: Option<NonZeroUsize>,
}

impl ProxyConfig {
    /// A config writing to `target` with default settings.
    pub fn new(target: Url) -> Self {
        Self {
            target,
            tenant: TenantConfig::default(),
            timeout: Duration::from_secs(10),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_idle_conns_per_host: 64,
            max_tenant_concurrency: None,
        }
    }

    /// Build the request handler described by this config.
    pub fn build(
        &self,
        lifecycle: Arc<Lifecycle>,
    ) -> Result<HttpDelegate<HttpWriteClient>, Error> {
        let tenant_header = HeaderName::from_bytes(self.tenant.header.as_bytes()).map_err(|source| {
            Error::InvalidTenantHeader {
                name: self.tenant.header.clone(),
                source,
            }
        })?;

        let client = HttpWriteClient::new(
            self.target.clone(),
            tenant_header,
            self.timeout,
            self.max_idle_conns_per_host,
        )
        .map_err(Error::HttpClient)?;

        let codec = Arc::new(Codec::new(self.max_request_bytes));
        let forwarder = Arc::new(Forwarder::new(Arc::clone(&codec), client));

        Ok(HttpDelegate::new(
            self.max_request_bytes,
            self.timeout,
            codec,
            Partitioner::new(&self.tenant),
            Dispatcher::new(forwarder, self.max_tenant_concurrency),
            lifecycle,
        ))
    }
}

/// Serve `delegate` on `addr` until `shutdown` is cancelled.
///
/// Once cancelled, no new connections are accepted, and the future resolves after requests in
/// flight have been answered.
pub async fn serve<C>(
    addr: AddrIncoming,
    delegate: Arc<HttpDelegate<C>>,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error>
where
    C: WriteClient + 'static,
{
    info!(addr = %addr.local_addr(), "HTTP server listening");

    hyper::Server::builder(addr)
        .serve(hyper::service::make_service_fn(|conn: &AddrStream| {
            let delegate = Arc::clone(&delegate);
            let remote_addr: SocketAddr = conn.remote_addr();
            let service = hyper::service::service_fn(move |request| {
                let delegate = Arc::clone(&delegate);
                async move { Ok::<_, Infallible>(delegate.handle(request, remote_addr).await) }
            });

            futures::future::ready(Ok::<_, Infallible>(service))
        }))
        .with_graceful_shutdown(shutdown.cancelled())
        .await
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use cortex_tenant_wire::{Label, TimeSeries, WriteRequest};
    use hyper::StatusCode;

    use super::*;
    use crate::forwarder::client::mock::MockWriteClient;

    #[test]
    fn test_invalid_tenant_header() {
        let mut config = ProxyConfig::new("http://127.0.0.1:9009/push".parse().unwrap());
        config.tenant.header = "not a header".to_string();

        let got = config.build(Arc::new(Lifecycle::new_testing()));
        assert_matches!(got, Err(Error::InvalidTenantHeader { name, .. }) => {
            assert_eq!(name, "not a header");
        });
    }

    #[test_log::test(tokio::test)]
    async fn test_drain_keeps_in_flight_push() {
        let client = Arc::new(MockWriteClient::default().with_delay(Duration::from_millis(500)));
        let frontend = CancellationToken::new();
        let lifecycle = Arc::new(Lifecycle::new(Duration::from_millis(200), frontend.clone()));

        let codec = Arc::new(Codec::default());
        let forwarder = Arc::new(Forwarder::new(Arc::clone(&codec), Arc::clone(&client)));
        let delegate = Arc::new(HttpDelegate::new(
            DEFAULT_MAX_REQUEST_BYTES,
            Duration::from_secs(10),
            Arc::clone(&codec),
            Partitioner::new(&TenantConfig::default()),
            Dispatcher::new(forwarder, None),
            Arc::clone(&lifecycle),
        ));

        let incoming = AddrIncoming::bind(&"127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = incoming.local_addr();
        let server = tokio::spawn(serve(incoming, delegate, frontend.clone()));

        let body = codec
            .encode(&WriteRequest {
                timeseries: vec![TimeSeries {
                    labels: vec![Label::new("__tenant__", "a")],
                    ..Default::default()
                }],
                metadata: vec![],
            })
            .unwrap();

        let http = reqwest::Client::new();
        let push = tokio::spawn({
            let http = http.clone();
            async move {
                http.post(format!("http://{addr}/push"))
                    .body(body)
                    .send()
                    .await
                    .unwrap()
                    .status()
            }
        });

        // Wait for the push to reach the downstream before draining.
        while client.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let drain = tokio::spawn({
            let lifecycle = Arc::clone(&lifecycle);
            async move { lifecycle.begin_drain().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let alive = http
            .get(format!("http://{addr}/alive"))
            .send()
            .await
            .unwrap();
        assert_eq!(alive.status(), StatusCode::SERVICE_UNAVAILABLE);

        drain.await.unwrap();
        assert!(frontend.is_cancelled());

        // The push outlives the grace interval and still completes.
        assert_eq!(push.await.unwrap(), StatusCode::OK);
        server.await.unwrap().unwrap();
    }
}
