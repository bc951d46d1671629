//! Config for the downstream write target.
use std::num::NonZeroUsize;

use url::Url;

/// CLI config for forwarding writes downstream.
#[derive(Debug, Clone, clap::Parser)]
pub struct UpstreamConfig {
    /// Remote-write endpoint every per-tenant write is sent to, for example
    /// `http://cortex:9009/api/v1/push`.
    #[clap(long = "target", env = "CORTEX_TENANT_TARGET", action)]
    pub target: Url,

    /// Bound on each downstream write, from connecting to reading the response body.
    ///
    /// Also bounds reads of inbound request bodies.
    #[clap(
        long = "timeout",
        env = "CORTEX_TENANT_TIMEOUT",
        default_value = "10s",
        action
    )]
    pub timeout: humantime::Duration,

    /// Maximum number of idle connections kept open to the target.
    ///
    /// Connections in use are not capped. Writes beyond this many at once open new connections,
    /// which are closed rather than pooled once idle.
    #[clap(
        long = "max-idle-conns-per-host",
        env = "CORTEX_TENANT_MAX_IDLE_CONNS_PER_HOST",
        default_value = "64",
        action
    )]
    pub max_idle_conns_per_host: usize,

    /// Maximum number of tenants of a single inbound request written concurrently.
    ///
    /// Unbounded when not set.
    #[clap(
        long = "max-tenant-concurrency",
        env = "CORTEX_TENANT_MAX_TENANT_CONCURRENCY",
        action
    )]
    pub max_tenant_concurrency: Option<NonZeroUsize>,
}
