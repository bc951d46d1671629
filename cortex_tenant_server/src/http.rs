//! HTTP request handling for the push and liveness endpoints.
use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use cortex_tenant_shutdown::Lifecycle;
use cortex_tenant_wire::{Codec, DecodeError};
use futures::StreamExt;
use hyper::{Body, Method, Request, Response, StatusCode, header::CONTENT_TYPE};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    aggregator::aggregate,
    dispatcher::Dispatcher,
    forwarder::{RequestContext, WriteClient},
    partitioner::Partitioner,
};

/// Errors returned by the HTTP request handler.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested path has no registered handler.
    #[error("Unknown URL")]
    NoHandler,

    /// Only liveness probes may use a method other than POST.
    #[error("Expecting POST")]
    MethodNotAllowed,

    /// An error reading the request body from the client.
    #[error("failed to read request body: {0}")]
    ClientHangup(#[source] hyper::Error),

    /// The client took longer than the configured timeout to send the body.
    #[error("timed out reading request body")]
    BodyReadTimeout,

    /// The request body exceeds the configured size limit.
    #[error("max request size ({0} bytes) exceeded")]
    RequestSizeExceeded(usize),

    /// The body is not a valid snappy-compressed remote-write payload.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl Error {
    /// Convert the error into an appropriate [`StatusCode`] to be returned to the end user.
    pub fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NoHandler => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::BAD_REQUEST,
            Self::ClientHangup(_) => StatusCode::BAD_REQUEST,
            Self::BodyReadTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::RequestSizeExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Decode(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Drives a remote-write push through partitioning, fan-out and aggregation, and answers
/// liveness probes.
#[derive(Debug)]
pub struct HttpDelegate<C> {
    max_request_bytes: usize,
    read_timeout: Duration,
    codec: Arc<Codec>,
    partitioner: Partitioner,
    dispatcher: Dispatcher<C>,
    lifecycle: Arc<Lifecycle>,
}

impl<C> HttpDelegate<C>
where
    C: WriteClient + 'static,
{
    /// Create a new delegate.
    ///
    /// Bodies larger than `max_request_bytes`, or taking longer than `read_timeout` to receive,
    /// are rejected before any decoding.
    pub fn new(
        max_request_bytes: usize,
        read_timeout: Duration,
        codec: Arc<Codec>,
        partitioner: Partitioner,
        dispatcher: Dispatcher<C>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            max_request_bytes,
            read_timeout,
            codec,
            partitioner,
            dispatcher,
            lifecycle,
        }
    }

    /// Handle `req`, rendering any [`Error`] as a plain-text response.
    pub async fn handle(&self, req: Request<Body>, remote_addr: SocketAddr) -> Response<Body> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match self.route(req, remote_addr).await {
            Ok(response) => response,
            Err(e) => {
                warn!(src = %remote_addr, %method, %path, error = %e, "rejected request");
                let mut response = Response::new(Body::from(e.to_string()));
                *response.status_mut() = e.as_status_code();
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    hyper::header::HeaderValue::from_static("text/plain; charset=utf-8"),
                );
                response
            }
        }
    }

    /// Produce a response for `req`.
    pub async fn route(
        &self,
        req: Request<Body>,
        remote_addr: SocketAddr,
    ) -> Result<Response<Body>, Error> {
        // Probes are answered regardless of method.
        if req.uri().path() == "/alive" {
            return Ok(self.alive());
        }

        if req.method() != Method::POST {
            return Err(Error::MethodNotAllowed);
        }

        match req.uri().path() {
            "/push" => self.push(req, remote_addr).await,
            _ => Err(Error::NoHandler),
        }
    }

    fn alive(&self) -> Response<Body> {
        let mut response = Response::new(Body::empty());
        if self.lifecycle.is_draining() {
            *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        }
        response
    }

    async fn push(
        &self,
        req: Request<Body>,
        remote_addr: SocketAddr,
    ) -> Result<Response<Body>, Error> {
        let body = self.read_body(req).await?;
        let write = self.codec.decode(&body)?;

        let ctx = RequestContext::new(remote_addr);
        let series = write.timeseries.len();
        let samples = write.sample_count();

        let partitions = self.partitioner.partition(write);
        let tenants = partitions.len();

        let results = self.dispatcher.dispatch(ctx, partitions).await;
        let outcome = aggregate(&ctx, results);

        debug!(
            src = %remote_addr,
            req_id = %ctx.request_id,
            timeseries = series,
            samples,
            tenants,
            status = outcome.status.as_u16(),
            "push handled"
        );

        let mut response = Response::new(Body::from(outcome.body));
        *response.status_mut() = outcome.status;
        Ok(response)
    }

    /// Read the request's body into raw bytes, applying the configured size and time limits.
    async fn read_body(&self, req: Request<Body>) -> Result<Bytes, Error> {
        tokio::time::timeout(self.read_timeout, self.collect_body(req.into_body()))
            .await
            .map_err(|_| Error::BodyReadTimeout)?
    }

    async fn collect_body(&self, mut payload: Body) -> Result<Bytes, Error> {
        let mut body = BytesMut::new();
        while let Some(chunk) = payload.next().await {
            let chunk = chunk.map_err(Error::ClientHangup)?;
            // limit max size of in-memory payload
            if (body.len() + chunk.len()) > self.max_request_bytes {
                return Err(Error::RequestSizeExceeded(self.max_request_bytes));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}
