//! Encoding and sending one tenant's partition downstream.
pub mod client;

use std::{net::SocketAddr, sync::Arc};

use bytes::Bytes;
use cortex_tenant_wire::{Codec, EncodeError, WriteRequest};
use hyper::StatusCode;
use thiserror::Error;
use uuid::Uuid;

pub use client::{HttpWriteClient, WriteClient};

/// Errors that prevent a downstream response from being obtained.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The partition could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Connecting, sending or reading the response failed, or timed out.
    #[error("{0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The task driving the downstream write panicked.
    #[error("downstream write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Identifies the inbound request a downstream write originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    /// Remote address of the client that pushed the request.
    pub source: SocketAddr,
    /// Random id shared by every downstream write of one inbound request.
    pub request_id: Uuid,
}

impl RequestContext {
    pub fn new(source: SocketAddr) -> Self {
        Self {
            source,
            request_id: Uuid::new_v4(),
        }
    }
}

/// Status and body of a completed downstream write, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Re-encodes a tenant's partition and hands it to a [`WriteClient`].
#[derive(Debug)]
pub struct Forwarder<C> {
    codec: Arc<Codec>,
    client: C,
}

impl<C> Forwarder<C>
where
    C: WriteClient,
{
    pub fn new(codec: Arc<Codec>, client: C) -> Self {
        Self { codec, client }
    }

    /// Write `partition` downstream on behalf of `tenant`.
    ///
    /// A non-2xx response is returned as `Ok`. Only failures to obtain a response at all are
    /// errors.
    pub async fn forward(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        partition: &WriteRequest,
    ) -> Result<UpstreamResponse, ForwardError> {
        let body = self.codec.encode(partition)?;
        self.client.write(ctx, tenant, body).await
    }
}
