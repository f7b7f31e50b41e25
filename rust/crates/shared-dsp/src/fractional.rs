//! Windowed-sinc fractional delay.
//!
//! A Hann-windowed sinc kernel of odd length N shifts a signal by a
//! sub-sample amount. Convolving with it adds a group delay of
//! `(N - 1) / 2` samples; callers choose explicitly whether that latency
//! is removed (`Centered`) or kept (`Causal`).

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

/// Default kernel length.
pub const DEFAULT_TAPS: usize = 81;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("fractional delay kernel needs an odd tap count, got {0}")]
pub struct EvenTapCount(pub usize);

/// A delay that is negative or not a number.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("fractional delay of {0} samples must be finite and non-negative")]
pub struct InvalidDelay(pub f64);

/// How the kernel's group delay is treated when producing a delayed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayAlignment {
    /// 'same'-mode convolution: the output is delayed by exactly the
    /// requested time.
    #[default]
    Centered,
    /// Plain causal convolution: the output carries an extra
    /// `(N - 1) / 2` samples of latency.
    Causal,
}

/// Fractional delay filter of fixed odd length.
#[derive(Debug, Clone)]
pub struct FractionalDelay {
    window: Vec<f64>,
}

impl Default for FractionalDelay {
    fn default() -> Self {
        Self {
            window: hann(DEFAULT_TAPS),
        }
    }
}

impl FractionalDelay {
    pub fn new(taps: usize) -> Result<Self, EvenTapCount> {
        if taps % 2 == 0 {
            return Err(EvenTapCount(taps));
        }
        Ok(Self { window: hann(taps) })
    }

    pub fn taps(&self) -> usize {
        self.window.len()
    }

    /// Latency of the kernel in samples when used causally.
    pub fn group_delay(&self) -> usize {
        (self.window.len() - 1) / 2
    }

    /// Kernel for a sub-sample delay `frac`; peaks at index `(N - 1) / 2 + frac`.
    pub fn kernel(&self, frac: f64) -> Vec<f64> {
        let center = self.group_delay() as f64 + frac;
        self.window
            .iter()
            .enumerate()
            .map(|(k, w)| w * sinc(k as f64 - center))
            .collect()
    }

    /// Delay `x` by `delay_secs` at `fs`, returning an array of the same length.
    ///
    /// The integer part is applied by zero padding, the remainder by the
    /// windowed-sinc kernel.
    pub fn delay(&self, x: &[f64], delay_secs: f64, fs: f64, alignment: DelayAlignment) -> Result<Vec<f64>, InvalidDelay> {
        let exact = delay_secs * fs;
        if !(exact.is_finite() && exact >= 0.0) {
            return Err(InvalidDelay(exact));
        }
        let delay_int = exact.floor() as usize;
        let frac = exact - delay_int as f64;
        let h = self.kernel(frac);

        let len = x.len();
        let offset = match alignment {
            DelayAlignment::Centered => self.group_delay(),
            DelayAlignment::Causal => 0,
        };

        let mut out = vec![0.0; len];
        for (j, &xj) in x.iter().enumerate() {
            if xj == 0.0 {
                continue;
            }
            // full-convolution index j + delay_int + k lands on output index
            // j + delay_int + k - offset
            let base = j + delay_int;
            for (k, &hk) in h.iter().enumerate() {
                let pos = base + k;
                if pos < offset {
                    continue;
                }
                let i = pos - offset;
                if i >= len {
                    break;
                }
                out[i] += hk * xj;
            }
        }
        Ok(out)
    }
}

/// Delay `x` with the default 81-tap kernel.
pub fn delay_array(x: &[f64], delay_secs: f64, fs: f64, alignment: DelayAlignment) -> Result<Vec<f64>, InvalidDelay> {
    FractionalDelay::default().delay(x, delay_secs, fs, alignment)
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Symmetric Hann window (endpoints zero).
fn hann(size: usize) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (size - 1) as f64).cos())
        .collect()
}
