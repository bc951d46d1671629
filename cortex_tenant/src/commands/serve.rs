//! Entrypoint for the proxy server.
use std::{net::SocketAddr, sync::Arc};

use cortex_tenant_clap_blocks::{
    logging::LoggingConfig, tenant::TenantConfig, upstream::UpstreamConfig,
};
use cortex_tenant_server::{ProxyConfig, serve};
use cortex_tenant_shutdown::{Lifecycle, wait_for_signal};
use cortex_tenant_wire::codec::DEFAULT_MAX_REQUEST_BYTES;
use hyper::server::conn::AddrIncoming;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The default bind address for the HTTP frontend.
pub(crate) const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("invalid proxy configuration: {0}")]
    Proxy(#[from] cortex_tenant_server::Error),

    #[error("unable to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: hyper::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] hyper::Error),
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    /// logging options
    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,

    /// The address on which the proxy accepts remote-write pushes and liveness probes.
    #[clap(
        long = "listen",
        env = "CORTEX_TENANT_LISTEN",
        default_value = DEFAULT_LISTEN,
        action
    )]
    pub(crate) listen: SocketAddr,

    #[clap(flatten)]
    pub(crate) tenant: TenantConfig,

    #[clap(flatten)]
    pub(crate) upstream: UpstreamConfig,

    /// How long the liveness probe reports unavailable before the server stops accepting
    /// connections on shutdown.
    #[clap(
        long = "timeout-shutdown",
        env = "CORTEX_TENANT_TIMEOUT_SHUTDOWN",
        default_value = "10s",
        action
    )]
    pub(crate) timeout_shutdown: humantime::Duration,

    /// The largest request body accepted, compressed or decompressed, in bytes.
    #[clap(
        long = "max-request-size",
        env = "CORTEX_TENANT_MAX_REQUEST_SIZE",
        default_value_t = DEFAULT_MAX_REQUEST_BYTES,
        action
    )]
    pub(crate) max_request_size: usize,
}

impl Config {
    fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            target: self.upstream.target.clone(),
            tenant: self.tenant.clone(),
            timeout: *self.upstream.timeout,
            max_request_bytes: self.max_request_size,
            max_idle_conns_per_host: self.upstream.max_idle_conns_per_host,
            max_tenant_concurrency: self.upstream.max_tenant_concurrency,
        }
    }
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let frontend_shutdown = CancellationToken::new();
    let lifecycle = Arc::new(Lifecycle::new(
        *config.timeout_shutdown,
        frontend_shutdown.clone(),
    ));

    let delegate = Arc::new(config.proxy_config().build(Arc::clone(&lifecycle))?);

    let incoming = AddrIncoming::bind(&config.listen).map_err(|source| Error::Bind {
        addr: config.listen,
        source,
    })?;

    info!(
        target_url = %config.upstream.target,
        tenant_label = %config.tenant.label,
        tenant_header = %config.tenant.header,
        tenant_default = %config.tenant.default,
        tenant_label_remove = config.tenant.label_remove,
        "starting cortex-tenant"
    );

    tokio::spawn({
        let lifecycle = Arc::clone(&lifecycle);
        async move {
            wait_for_signal().await;
            lifecycle.begin_drain().await;
        }
    });

    serve(incoming, delegate, frontend_shutdown)
        .await
        .map_err(Error::Serve)?;

    info!("server shutdown complete");
    Ok(())
}
