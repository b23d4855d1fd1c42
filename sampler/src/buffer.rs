//! In-memory time-series buffer for polled samples

use smitrace_shared::Sample;

/// Expected sample count for a typical run; pre-sized to avoid reallocation
/// while the polling loop is in steady state.
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Append-only, insertion-ordered sample buffer.
///
/// Only the polling thread writes to it. Once polling stops it is handed
/// back to the sampler and treated as read-only.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
}

impl SampleBuffer {
    /// Create a buffer pre-sized for `capacity` samples. Grows past it if needed.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Append a sample
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Samples in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Whether timestamps are non-decreasing in insertion order
    pub fn is_time_ordered(&self) -> bool {
        self.samples
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp)
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}
