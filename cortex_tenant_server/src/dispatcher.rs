//! Concurrent fan-out of per-tenant partitions.
use std::{num::NonZeroUsize, sync::Arc};

use tokio::sync::Semaphore;
use tracing::trace;

use crate::{
    forwarder::{ForwardError, Forwarder, RequestContext, UpstreamResponse, WriteClient},
    partitioner::PartitionMap,
};

/// The outcome of writing one tenant's partition.
pub type DispatchResult = Result<UpstreamResponse, ForwardError>;

/// Sends every partition of a request downstream at the same time, optionally bounded.
#[derive(Debug)]
pub struct Dispatcher<C> {
    forwarder: Arc<Forwarder<C>>,
    max_concurrency: Option<NonZeroUsize>,
}

impl<C> Dispatcher<C>
where
    C: WriteClient + 'static,
{
    /// Create a [`Dispatcher`] writing at most `max_concurrency` partitions of a single request at
    /// once, or all of them when `None`.
    pub fn new(forwarder: Arc<Forwarder<C>>, max_concurrency: Option<NonZeroUsize>) -> Self {
        Self {
            forwarder,
            max_concurrency,
        }
    }

    /// Write all `partitions` and wait for every one of them to complete.
    ///
    /// Returns exactly one result per partition, in partition order. Each write runs in its own
    /// task, so dropping the returned future does not abort writes already started.
    pub async fn dispatch(
        &self,
        ctx: RequestContext,
        partitions: PartitionMap,
    ) -> Vec<(String, DispatchResult)> {
        let limit = self
            .max_concurrency
            .map(|n| Arc::new(Semaphore::new(n.get())));

        let handles = partitions
            .into_iter()
            .map(|(tenant, partition)| {
                let forwarder = Arc::clone(&self.forwarder);
                let limit = limit.as_ref().map(Arc::clone);
                let task_tenant = tenant.clone();

                let handle = tokio::spawn(async move {
                    // The semaphore is never closed.
                    let _permit = match limit {
                        Some(s) => s.acquire_owned().await.ok(),
                        None => None,
                    };
                    trace!(tenant = %task_tenant, series = partition.timeseries.len(), "writing partition");
                    forwarder.forward(&ctx, &task_tenant, &partition).await
                });

                (tenant, handle)
            })
            .collect::<Vec<_>>();

        let mut results = Vec::with_capacity(handles.len());
        for (tenant, handle) in handles {
            let result = match handle.await {
                Ok(v) => v,
                Err(e) => Err(ForwardError::Task(e)),
            };
            results.push((tenant, result));
        }

        results
    }
}
