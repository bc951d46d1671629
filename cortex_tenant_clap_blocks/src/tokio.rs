//! Config for the tokio runtime driving the HTTP frontend and the downstream writes.
use std::num::NonZeroUsize;

/// Tokio runtime type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TokioRuntimeType {
    /// Current-thread runtime.
    CurrentThread,

    /// Multi-thread runtime.
    #[default]
    MultiThread,
}

/// CLI config for the tokio IO runtime.
#[derive(Debug, Clone, Copy, clap::Parser)]
pub struct TokioIoConfig {
    /// Set the maximum number of IO runtime threads to use.
    ///
    /// Defaults to the number of logical cores on the system.
    #[clap(long = "num-threads", env = "CORTEX_TENANT_NUM_THREADS", action)]
    pub num_threads: Option<NonZeroUsize>,

    /// IO tokio runtime type.
    #[clap(
        long = "io-runtime-type",
        env = "CORTEX_TENANT_IO_RUNTIME_TYPE",
        default_value_t = TokioRuntimeType::default(),
        value_enum,
        action
    )]
    pub runtime_type: TokioRuntimeType,
}

impl TokioIoConfig {
    /// Creates the tokio runtime builder.
    pub fn builder(&self) -> tokio::runtime::Builder {
        let mut builder = match self.runtime_type {
            TokioRuntimeType::CurrentThread => tokio::runtime::Builder::new_current_thread(),
            TokioRuntimeType::MultiThread => {
                let mut builder = tokio::runtime::Builder::new_multi_thread();
                if let Some(num_threads) = self.num_threads {
                    builder.worker_threads(num_threads.get());
                }
                builder
            }
        };

        builder.enable_all().thread_name("cortex-tenant-io");
        builder
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_runtime_builds() {
        let cfg = TokioIoConfig::try_parse_from(["server", "--num-threads", "2"]).unwrap();
        assert_eq!(cfg.runtime_type, TokioRuntimeType::MultiThread);

        let rt = cfg.builder().build().unwrap();
        assert_eq!(rt.block_on(async { 40 + 2 }), 42);
    }

    #[test]
    fn test_current_thread() {
        let cfg =
            TokioIoConfig::try_parse_from(["server", "--io-runtime-type", "current-thread"]).unwrap();
        let rt = cfg.builder().build().unwrap();
        assert_eq!(
            rt.block_on(async { tokio::runtime::Handle::current().runtime_flavor() }),
            tokio::runtime::RuntimeFlavor::CurrentThread
        );
    }
}
