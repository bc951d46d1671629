use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderName, USER_AGENT};
use url::Url;

use super::{ForwardError, RequestContext, UpstreamResponse};

/// Header carrying the remote address of the client the write originates from.
pub const SOURCE_HEADER: &str = "X-Cortex-Tenant-Src";

/// Header carrying the id of the inbound request the write is part of.
pub const REQUEST_ID_HEADER: &str = "X-Cortex-Tenant-ReqID";

const REMOTE_WRITE_VERSION_HEADER: &str = "X-Prometheus-Remote-Write-Version";
const REMOTE_WRITE_VERSION: &str = "0.1.0";

/// An abstract HTTP client that pushes an encoded remote-write `body` to an opaque receiver on
/// behalf of `tenant`.
#[async_trait]
pub trait WriteClient: Send + Sync + std::fmt::Debug {
    /// Write `body` and wait for the response.
    async fn write(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        body: Bytes,
    ) -> Result<UpstreamResponse, ForwardError>;
}

/// A [`WriteClient`] posting to a single remote-write endpoint over a pooled connection set.
#[derive(Debug, Clone)]
pub struct HttpWriteClient {
    client: reqwest::Client,
    target: Url,
    tenant_header: HeaderName,
}

impl HttpWriteClient {
    /// Create a client for `target`.
    ///
    /// `timeout` bounds each write as a whole, from connecting until the response body is read.
    pub fn new(
        target: Url,
        tenant_header: HeaderName,
        timeout: Duration,
        max_idle_per_host: usize,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(max_idle_per_host)
            .build()?;

        Ok(Self {
            client,
            target,
            tenant_header,
        })
    }
}

#[async_trait]
impl WriteClient for HttpWriteClient {
    async fn write(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        body: Bytes,
    ) -> Result<UpstreamResponse, ForwardError> {
        let response = self
            .client
            .post(self.target.clone())
            .header(CONTENT_ENCODING, "snappy")
            .header(CONTENT_TYPE, "application/x-protobuf")
            .header(USER_AGENT, concat!("cortex-tenant/", env!("CARGO_PKG_VERSION")))
            .header(REMOTE_WRITE_VERSION_HEADER, REMOTE_WRITE_VERSION)
            .header(SOURCE_HEADER, ctx.source.to_string())
            .header(REQUEST_ID_HEADER, ctx.request_id.to_string())
            .header(&self.tenant_header, tenant)
            .body(body)
            .send()
            .await
            .map_err(|e| ForwardError::Transport(Box::new(e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ForwardError::Transport(Box::new(e)))?;

        Ok(UpstreamResponse { status, body })
    }
}
