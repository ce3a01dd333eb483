//! Frame-interval smoothing for stream diagnostics.
//!
//! Nothing here feeds back into the protocol or pacing; the numbers only end
//! up in log lines.

use std::fmt;

/// Fixed-window integer moving average.
#[derive(Clone, Debug)]
pub struct MovingAverageFilter {
    /// Empty when the window could not be allocated; the filter then passes
    /// samples through unchanged.
    values: Vec<u32>,
    index: usize,
    count: usize,
    sum: u64,
}

impl MovingAverageFilter {
    /// Create a filter averaging over the last `capacity` samples.
    ///
    /// A zero capacity, or a window that cannot be allocated, yields a filter
    /// that returns every sample unchanged.
    pub fn new(capacity: usize) -> Self {
        let mut values = Vec::new();
        if capacity > 0 {
            if values.try_reserve_exact(capacity).is_ok() {
                values.resize(capacity, 0);
            } else {
                log::warn!(
                    "moving average window of {} samples could not be allocated; averaging disabled",
                    capacity
                );
            }
        }
        Self {
            values,
            index: 0,
            count: 0,
            sum: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Number of samples currently in the window.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Add a sample and return the floor of the window average.
    pub fn push(&mut self, value: u32) -> u32 {
        if self.values.is_empty() {
            return value;
        }
        self.sum -= u64::from(self.values[self.index]);
        self.values[self.index] = value;
        self.sum += u64::from(value);
        self.index = (self.index + 1) % self.values.len();
        if self.count < self.values.len() {
            self.count += 1;
        }
        (self.sum / self.count as u64) as u32
    }
}

/// Diagnostic record for one delivered stream frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTiming {
    pub bytes: usize,
    pub interval_ms: u32,
    pub avg_interval_ms: u32,
}

impl FrameTiming {
    /// Record a delivery `interval_ms` after the previous one.
    pub fn observe(filter: &mut MovingAverageFilter, bytes: usize, interval_ms: u32) -> Self {
        let avg_interval_ms = filter.push(interval_ms);
        Self {
            bytes,
            interval_ms,
            avg_interval_ms,
        }
    }

    /// Instantaneous rate; `None` when the interval is below timer resolution.
    pub fn fps(&self) -> Option<f64> {
        rate(self.interval_ms)
    }

    pub fn avg_fps(&self) -> Option<f64> {
        rate(self.avg_interval_ms)
    }
}

fn rate(interval_ms: u32) -> Option<f64> {
    if interval_ms == 0 {
        None
    } else {
        Some(1000.0 / f64::from(interval_ms))
    }
}

struct Fps(Option<f64>);

impl fmt::Display for Fps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(fps) => write!(f, "{:.1}fps", fps),
            None => f.write_str("n/a fps"),
        }
    }
}

impl fmt::Display for FrameTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MJPG: {}B {}ms ({}), AVG: {}ms ({})",
            self.bytes,
            self.interval_ms,
            Fps(self.fps()),
            self.avg_interval_ms,
            Fps(self.avg_fps())
        )
    }
}
