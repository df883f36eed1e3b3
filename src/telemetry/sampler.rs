//! # Sampling abstraction and function-backed sampler.
//!
//! The [`Sample`] trait is the service implementer's hook: it reads sensors and
//! returns a fresh [`MeasurementBatch`] on every telemetry tick. [`SampleFn`] wraps a
//! closure `Fn() -> Fut`, producing a fresh future per tick.
//!
//! ## Example
//! ```rust
//! use edgevisor::{MeasurementBatch, SampleFn, SamplerRef, ServiceError};
//!
//! let s: SamplerRef = SampleFn::arc("battery", || async {
//!     Ok::<_, ServiceError>(MeasurementBatch::new().with("urn:cpt:diagnostic:battery-charge", "%EL", 87.0))
//! });
//! assert_eq!(s.name(), "battery");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::record::MeasurementBatch;
use crate::error::ServiceError;

/// Shared handle to a sampler.
pub type SamplerRef = Arc<dyn Sample>;

/// # Source of telemetry batches.
///
/// Errors are contained: the publisher reports them and skips the tick.
#[async_trait]
pub trait Sample: Send + Sync + 'static {
    /// Stable, human-readable name (for logs).
    fn name(&self) -> &str;

    /// Reads the current values.
    async fn sample(&self) -> Result<MeasurementBatch, ServiceError>;
}

/// Function-backed sampler.
pub struct SampleFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> SampleFn<F> {
    /// Creates a new function-backed sampler.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the sampler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Sample for SampleFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<MeasurementBatch, ServiceError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn sample(&self) -> Result<MeasurementBatch, ServiceError> {
        (self.f)().await
    }
}
