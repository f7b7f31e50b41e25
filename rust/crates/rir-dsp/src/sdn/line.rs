//! Directed waveguide between two network nodes.

use crate::error::{config_err, Result};
use shared_dsp::DelayLine;

/// Index of a line in the network's line arena.
pub type LineId = usize;

#[derive(Debug, Clone)]
pub struct PropagationLine {
    delay: usize,
    gain: f64,
    buffer: DelayLine,
}

impl PropagationLine {
    /// Integer delay of `round(length / c * fs)` samples. A line shorter
    /// than half a sample still takes one sample: the network advances one
    /// step per sample, so nothing can arrive in the same step it left.
    pub fn new(length: f64, speed_of_sound: f64, fs: f64, gain: f64) -> Result<Self> {
        if !(length.is_finite() && length >= 0.0) {
            return config_err(format!("line length must be finite and non-negative, got {length}"));
        }
        if !gain.is_finite() {
            return config_err(format!("line gain must be finite, got {gain}"));
        }
        let delay = ((length / speed_of_sound * fs).round() as usize).max(1);
        Self::with_delay(delay, gain)
    }

    pub fn with_delay(delay: usize, gain: f64) -> Result<Self> {
        if delay == 0 {
            return config_err("propagation line delay must be at least one sample");
        }
        Ok(Self {
            delay,
            gain,
            buffer: DelayLine::new(delay + 1)?,
        })
    }

    pub fn delay(&self) -> usize {
        self.delay
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// The sample pushed `delay` steps ago, scaled by the line gain.
    #[inline]
    pub fn output(&self) -> Result<f64> {
        Ok(self.gain * self.buffer.read(self.delay - 1)?)
    }

    #[inline]
    pub fn push(&mut self, value: f64) {
        self.buffer.push(value);
    }

    pub fn reset(&mut self) {
        self.buffer.reset();
    }
}
