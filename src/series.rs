//! Bounded, insertion-ordered history for a single metric.
//!
//! A [`RingSeries`] holds at most `capacity` samples. Appending to a full
//! series evicts the oldest sample first, so the contents are always the most
//! recent `capacity` appends in the order they were made. The series itself
//! has no synchronisation; the registry publishes it to readers.

use chrono::{DateTime, Local};
use std::collections::VecDeque;

/// Format used for capture-time labels.
pub const LABEL_FORMAT: &str = "%H:%M:%S";

/// One recorded value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub value: f64,
    /// Wall-clock capture time, for display only. Ordering comes from the
    /// position in the series, never from this field.
    pub captured_at: Option<DateTime<Local>>,
    /// `false` for sentinel and prefill samples.
    pub measured: bool,
}

impl Sample {
    /// A measured value captured now.
    pub fn measured(value: f64) -> Self {
        Self {
            value,
            captured_at: Some(Local::now()),
            measured: true,
        }
    }

    /// The placeholder stored when a reading could not be obtained.
    pub fn sentinel() -> Self {
        Self {
            value: 0.0,
            captured_at: Some(Local::now()),
            measured: false,
        }
    }

    /// A zero sample with no capture time, used to prefill history.
    pub fn zero() -> Self {
        Self {
            value: 0.0,
            captured_at: None,
            measured: false,
        }
    }

    /// Capture time formatted as `HH:MM:SS`, or an empty string.
    pub fn label(&self) -> String {
        self.captured_at
            .map(|t| t.format(LABEL_FORMAT).to_string())
            .unwrap_or_default()
    }
}

impl From<f64> for Sample {
    fn from(value: f64) -> Self {
        Self {
            value,
            captured_at: None,
            measured: true,
        }
    }
}

/// A fixed-capacity FIFO of samples.
#[derive(Debug, Clone)]
pub struct RingSeries {
    data: VecDeque<Sample>,
    capacity: usize,
}

impl RingSeries {
    /// Creates an empty series.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0. Configuration validation rejects that
    /// value before any series is built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "series capacity must be greater than 0");
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Creates a series holding `count` zero samples (clamped to capacity).
    pub fn prefilled(capacity: usize, count: usize) -> Self {
        let mut series = Self::new(capacity);
        series
            .data
            .extend(std::iter::repeat_with(Sample::zero).take(count.min(capacity)));
        series
    }

    /// Appends a sample, evicting the oldest one first when full.
    pub fn append(&mut self, sample: impl Into<Sample>) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(sample.into());
    }

    /// Returns an independent copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.data.iter().cloned().collect()
    }

    /// Returns only the values, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.data.iter().map(|s| s.value).collect()
    }

    /// The most recent sample, or `None` when the series is empty.
    pub fn latest(&self) -> Option<&Sample> {
        self.data.back()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_evicts_oldest_when_full() {
        let mut series = RingSeries::new(3);
        for v in [10.0, 20.0, 30.0, 40.0, 50.0] {
            series.append(v);
        }
        assert_eq!(series.values(), vec![30.0, 40.0, 50.0]);
        assert_eq!(series.len(), 3);
        assert!(series.is_full());
    }

    #[test]
    fn test_length_is_min_of_appends_and_capacity() {
        for capacity in 1..8 {
            for appends in 0..20 {
                let mut series = RingSeries::new(capacity);
                for i in 0..appends {
                    series.append(i as f64);
                }
                assert_eq!(series.len(), appends.min(capacity));
                let expected: Vec<f64> = (appends.saturating_sub(capacity)..appends)
                    .map(|i| i as f64)
                    .collect();
                assert_eq!(series.values(), expected);
            }
        }
    }

    #[test]
    fn test_latest_on_empty_is_none() {
        let mut series = RingSeries::new(2);
        assert!(series.latest().is_none());
        series.append(7.0);
        assert_eq!(series.latest().map(|s| s.value), Some(7.0));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut series = RingSeries::new(2);
        series.append(1.0);
        let snap = series.snapshot();
        series.append(2.0);
        series.append(3.0);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].value, 1.0);
    }

    #[test]
    fn test_prefill_is_clamped_and_unmeasured() {
        let series = RingSeries::prefilled(4, 10);
        assert_eq!(series.len(), 4);
        assert!(series.iter().all(|s| !s.measured && s.value == 0.0));
        assert_eq!(series.latest().map(Sample::label), Some(String::new()));
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn test_zero_capacity_panics() {
        let _ = RingSeries::new(0);
    }

    #[test]
    fn test_sentinel_sample() {
        let sample = Sample::sentinel();
        assert_eq!(sample.value, 0.0);
        assert!(!sample.measured);
        assert_eq!(sample.label().len(), 8);
    }
}
