//! Prometheus remote-write wire types and codec
//!
//! The message types in this crate are hand-written [`prost`] definitions of the subset of
//! `prometheus/prompb/remote.proto` and `types.proto` that a tenant-splitting proxy needs to
//! read and re-emit. Field tags match the upstream definitions so payloads produced by
//! Prometheus, Grafana Agent, etc. decode unchanged.
//!
//! The [`codec`] module wraps these types with the snappy block compression used on the wire,
//! and the [`pool`] module provides the reusable byte buffers that encoding and decoding work in.

pub mod codec;
pub mod pool;

pub use codec::{Codec, DecodeError, EncodeError};
pub use pool::{BufferPool, LeasedBuffer};

/// A batch of series pushed in one remote-write call.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WriteRequest {
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
    #[prost(message, repeated, tag = "3")]
    pub metadata: Vec<MetricMetadata>,
}

/// A single labelled series and its samples.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TimeSeries {
    /// Label set of the series. Order carries no meaning.
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
    #[prost(message, repeated, tag = "3")]
    pub exemplars: Vec<Exemplar>,
}

#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Sample {
    #[prost(double, tag = "1")]
    pub value: f64,
    /// Milliseconds since the epoch.
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Exemplar {
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,
    #[prost(double, tag = "2")]
    pub value: f64,
    #[prost(int64, tag = "3")]
    pub timestamp: i64,
}

/// Metric family metadata. It is not associated with any series, so it carries no tenant.
#[derive(Clone, PartialEq, prost::Message)]
pub struct MetricMetadata {
    /// The upstream `MetricType` enum, kept as its raw value.
    #[prost(int32, tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub metric_family_name: String,
    #[prost(string, tag = "4")]
    pub help: String,
    #[prost(string, tag = "5")]
    pub unit: String,
}

impl WriteRequest {
    /// Total number of samples across all series.
    pub fn sample_count(&self) -> usize {
        self.timeseries.iter().map(|ts| ts.samples.len()).sum()
    }
}
