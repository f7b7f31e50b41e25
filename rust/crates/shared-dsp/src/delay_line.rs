//! Fixed-capacity circular delay line.
//!
//! Integer-sample push/read primitive used by the SDN propagation lines
//! and the FDN feedback loop.

use thiserror::Error;

/// A read asked for a delay the buffer cannot hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("delay of {delay} samples exceeds delay line capacity {capacity}")]
pub struct BufferOverrun {
    pub delay: usize,
    pub capacity: usize,
}

/// A delay line was asked to hold no samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("delay line capacity must be at least one sample")]
pub struct ZeroCapacity;

/// Circular buffer storing the most recent `capacity` samples.
#[derive(Debug, Clone)]
pub struct DelayLine {
    data: Vec<f64>,
    index: usize,
}

impl DelayLine {
    /// Create a delay line holding `capacity` samples.
    pub fn new(capacity: usize) -> Result<Self, ZeroCapacity> {
        if capacity == 0 {
            return Err(ZeroCapacity);
        }
        Ok(Self {
            data: vec![0.0; capacity],
            index: 0,
        })
    }

    /// Write one sample into the current slot and advance.
    #[inline]
    pub fn push(&mut self, value: f64) {
        self.data[self.index] = value;
        self.index += 1;
        if self.index >= self.data.len() {
            self.index = 0;
        }
    }

    /// Read the sample pushed `delay + 1` pushes ago.
    ///
    /// `read(0)` returns the most recent push.
    #[inline]
    pub fn read(&self, delay: usize) -> Result<f64, BufferOverrun> {
        let capacity = self.data.len();
        if delay >= capacity {
            return Err(BufferOverrun { delay, capacity });
        }
        let idx = (self.index + capacity - delay - 1) % capacity;
        Ok(self.data[idx])
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Sum of squares of the `len` most recent samples (clamped to capacity).
    pub fn energy(&self, len: usize) -> f64 {
        let capacity = self.data.len();
        (0..len.min(capacity))
            .map(|d| {
                let v = self.data[(self.index + capacity - d - 1) % capacity];
                v * v
            })
            .sum()
    }

    /// Zero the contents for a new render job.
    pub fn reset(&mut self) {
        self.data.fill(0.0);
        self.index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_zero_is_last_push() {
        let mut dl = DelayLine::new(4).unwrap();
        dl.push(1.0);
        dl.push(2.0);
        assert_eq!(dl.read(0).unwrap(), 2.0);
        assert_eq!(dl.read(1).unwrap(), 1.0);
    }

    #[test]
    fn read_returns_value_pushed_d_plus_one_calls_earlier() {
        let capacity = 16;
        for d in 0..capacity {
            let mut dl = DelayLine::new(capacity).unwrap();
            // some history so wraparound is exercised
            for i in 0..(3 * capacity + d) {
                dl.push(-(i as f64));
            }
            dl.push(42.0);
            for i in 0..d {
                dl.push(i as f64 + 100.0);
            }
            assert_eq!(dl.read(d).unwrap(), 42.0, "delay {d}");
        }
    }

    #[test]
    fn overrun_is_rejected() {
        let dl = DelayLine::new(8).unwrap();
        let err = dl.read(8).unwrap_err();
        assert_eq!(err, BufferOverrun { delay: 8, capacity: 8 });
        assert!(dl.read(7).is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(DelayLine::new(0).unwrap_err(), ZeroCapacity);
        assert_eq!(DelayLine::new(1).unwrap().capacity(), 1);
    }

    #[test]
    fn energy_of_recent_window() {
        let mut dl = DelayLine::new(4).unwrap();
        for v in [5.0, 1.0, 2.0, 3.0] {
            dl.push(v);
        }
        assert!((dl.energy(3) - 14.0).abs() < 1e-12);
        assert!((dl.energy(10) - 39.0).abs() < 1e-12);
    }

    #[test]
    fn reset_clears() {
        let mut dl = DelayLine::new(4).unwrap();
        dl.push(1.0);
        dl.push(2.0);
        dl.reset();
        assert_eq!(dl.read(0).unwrap(), 0.0);
        assert_eq!(dl.energy(4), 0.0);
    }
}
