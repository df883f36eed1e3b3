//! # Telemetry: measurement records, codec, sampler and periodic publisher.
//!
//! - [`Measurement`], [`MeasurementBatch`] the `{t, n, u, v}` record shape
//! - [`Codec`], [`JsonCodec`] payload (de)serialization
//! - [`Sample`], [`SampleFn`] service hook producing a batch per tick
//! - [`TelemetryPublisher`] periodic publisher on `events.<topic>`

mod codec;
mod publisher;
mod record;
mod sampler;

pub use codec::{Codec, CodecError, CodecRef, JsonCodec};
pub use publisher::{DEFAULT_TELEMETRY_INTERVAL, PublisherParams, TelemetryPublisher};
pub use record::{Measurement, MeasurementBatch, epoch_seconds};
pub use sampler::{Sample, SampleFn, SamplerRef};
