//! # SenML-like measurement records.
//!
//! A [`Measurement`] is the tuple `{t, n, u, v}` (timestamp, name, unit, value).
//! A [`MeasurementBatch`] is an ordered sequence of records sampled together and
//! published as one message:
//!
//! ```json
//! [
//!   {"t": 1718000000.25, "n": "urn:cpt:diagnostic:battery-charge", "u": "%EL", "v": 87.0},
//!   {"t": 1718000000.25, "n": "urn:cpt:diagnostic:fuel-level",     "u": "%FL", "v": 41.0}
//! ]
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch, with sub-second precision.
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// One immutable reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    t: f64,
    n: String,
    u: String,
    v: f64,
}

impl Measurement {
    /// Builds a record with an explicit timestamp.
    pub fn new(t: f64, name: impl Into<String>, unit: impl Into<String>, value: f64) -> Self {
        Self {
            t,
            n: name.into(),
            u: unit.into(),
            v: value,
        }
    }

    /// Builds a record stamped with the current time.
    pub fn now(name: impl Into<String>, unit: impl Into<String>, value: f64) -> Self {
        Self::new(epoch_seconds(), name, unit, value)
    }

    /// Timestamp in epoch seconds.
    pub fn time(&self) -> f64 {
        self.t
    }

    /// URN-shaped name, `<namespace>:<service>:<quantity>`.
    pub fn name(&self) -> &str {
        &self.n
    }

    /// Unit code (`%EL`, `C`, `Hz`, ...).
    pub fn unit(&self) -> &str {
        &self.u
    }

    /// Numeric value.
    pub fn value(&self) -> f64 {
        self.v
    }
}

/// Ordered records sharing (approximately) one timestamp.
///
/// Equality compares the records only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementBatch {
    records: Vec<Measurement>,
    #[serde(skip)]
    stamp: Option<f64>,
}

impl MeasurementBatch {
    /// Empty batch; records added with [`with`](Self::with) are stamped "now".
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty batch whose records added with [`with`](Self::with) share `t`.
    pub fn at(t: f64) -> Self {
        Self {
            records: Vec::new(),
            stamp: Some(t),
        }
    }

    /// Appends a record built from `name`, `unit`, `value`.
    pub fn with(mut self, name: impl Into<String>, unit: impl Into<String>, value: f64) -> Self {
        let t = *self.stamp.get_or_insert_with(epoch_seconds);
        self.records.push(Measurement::new(t, name, unit, value));
        self
    }

    /// Appends an already built record.
    pub fn push(&mut self, record: Measurement) {
        self.records.push(record);
    }

    /// Records in order.
    pub fn records(&self) -> &[Measurement] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PartialEq for MeasurementBatch {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl From<Vec<Measurement>> for MeasurementBatch {
    fn from(records: Vec<Measurement>) -> Self {
        Self {
            records,
            stamp: None,
        }
    }
}

impl FromIterator<Measurement> for MeasurementBatch {
    fn from_iter<I: IntoIterator<Item = Measurement>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

impl IntoIterator for MeasurementBatch {
    type Item = Measurement;
    type IntoIter = std::vec::IntoIter<Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
