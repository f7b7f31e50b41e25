//! Test stimuli.

use clap::ValueEnum;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stimulus {
    /// Single unit sample at t = 0; the output is the impulse response.
    Unit,
    /// Short decaying white-noise burst.
    Noise,
}

impl Stimulus {
    pub fn name(self) -> &'static str {
        match self {
            Stimulus::Unit => "unit",
            Stimulus::Noise => "noise",
        }
    }

    pub fn generate(self, fs: f64, seconds: f64, seed: u64) -> Vec<f64> {
        let n = (fs * seconds).round().max(1.0) as usize;
        match self {
            Stimulus::Unit => unit_impulse(n),
            Stimulus::Noise => noise_burst(n, fs, 0.05, seed),
        }
    }
}

pub fn unit_impulse(n: usize) -> Vec<f64> {
    let mut signal = vec![0.0; n];
    if let Some(first) = signal.first_mut() {
        *first = 1.0;
    }
    signal
}

/// Uniform noise under an exponential envelope with time constant `tau`
/// seconds, cut after `6 * tau` and peak-normalised to 0.9.
pub fn noise_burst(n: usize, fs: f64, tau: f64, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let burst = ((6.0 * tau * fs) as usize).min(n);
    let mut signal = vec![0.0; n];
    for (i, s) in signal.iter_mut().take(burst).enumerate() {
        let t = i as f64 / fs;
        *s = rng.random_range(-1.0..1.0) * (-t / tau).exp();
    }

    let peak = signal.iter().fold(0.0f64, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        let scale = 0.9 / peak;
        signal.iter_mut().for_each(|s| *s *= scale);
    }
    signal
}
