//! Splitting a [`WriteRequest`] into one request per tenant.
use std::collections::BTreeMap;

use cortex_tenant_clap_blocks::tenant::TenantConfig;
use cortex_tenant_wire::{TimeSeries, WriteRequest};

/// Per-tenant partitions of one inbound request, keyed by tenant.
///
/// Iteration follows tenant order, which makes the first failure reported for a request
/// deterministic.
pub type PartitionMap = BTreeMap<String, WriteRequest>;

/// Derives the tenant of each series from a label.
#[derive(Debug, Clone)]
pub struct Partitioner {
    label: String,
    default: String,
    remove_label: bool,
}

impl Partitioner {
    pub fn new(config: &TenantConfig) -> Self {
        Self {
            label: config.label.clone(),
            default: config.default.clone(),
            remove_label: config.label_remove,
        }
    }

    /// Move every series of `req` into the partition of its tenant.
    ///
    /// Every series lands in exactly one partition, and series keep their relative order within
    /// a partition. Request metadata is not associated with any tenant and is dropped.
    pub fn partition(&self, req: WriteRequest) -> PartitionMap {
        let mut partitions = PartitionMap::new();

        for mut series in req.timeseries {
            let tenant = self.tenant_of(&mut series);
            partitions
                .entry(tenant)
                .or_default()
                .timeseries
                .push(series);
        }

        partitions
    }

    /// The tenant of `series`, removing the tenant label when configured to.
    ///
    /// The first occurrence of the label decides. An empty value counts as absent, in which
    /// case the label is left in place.
    fn tenant_of(&self, series: &mut TimeSeries) -> String {
        let idx = match series.labels.iter().position(|l| l.name == self.label) {
            Some(idx) if !series.labels[idx].value.is_empty() => idx,
            _ => return self.default.clone(),
        };

        if self.remove_label {
            // Label order is not significant.
            series.labels.swap_remove(idx).value
        } else {
            series.labels[idx].value.clone()
        }
    }
}
