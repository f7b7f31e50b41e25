//! Feedback delay network for the late reverberant tail.
//!
//! Per sample: read every line at its length, attenuate each read by the
//! decay model, mix through the orthogonal feedback matrix, write
//! `mixed + b * input` back, and output `Σ c_i * read_i`.

use crate::chain::LateReverberationEngine;
use crate::error::{config_err, Result, RirError};
use crate::filter_bank::{design, magnitude_at, FirType};
use crate::matrix::{mat_vec, MatrixKind};
use crate::primes::{closest_primes, is_mutually_prime, log_mutual_primes, select_order};
use serde::{Deserialize, Serialize};
use shared_dsp::{DelayLine, FirFilter};
use std::f64::consts::LN_10;
use tracing::{debug, warn};

pub const DEFAULT_DELAYS: [usize; 8] = [809, 877, 937, 1049, 1151, 1249, 1373, 1499];

/// Length of the per-line loss filters of [`Decay::Bands`].
pub const LOSS_FILTER_TAPS: usize = 127;

// grid for the loss filter passivity check
const PASSIVITY_POINTS: usize = 512;

/// How energy leaves the recirculating loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decay {
    /// No attenuation. Diagnostic only.
    Lossless,
    /// Frequency-independent decay to -60 dB in `rt60` seconds.
    Broadband { rt60: f64 },
    /// One-pole per-line filter (Jot) interpolating between the DC and
    /// Nyquist reverberation times.
    OnePole { rt60_dc: f64, rt60_nyquist: f64 },
    /// FIR loss filter per line whose magnitude follows the reverberation
    /// time at every band centre.
    Bands { center_freqs: Vec<f64>, rt60: Vec<f64> },
}

impl Decay {
    /// Decay following an RT60 value per band centre.
    pub fn from_bands(center_freqs: &[f64], rt60: &[f64]) -> Result<Decay> {
        if rt60.is_empty() {
            return config_err("empty RT60 profile");
        }
        if center_freqs.len() != rt60.len() {
            return config_err(format!(
                "{} band centres for {} RT60 values",
                center_freqs.len(),
                rt60.len()
            ));
        }
        for &t in rt60 {
            check_rt60(t)?;
        }
        Ok(Decay::Bands {
            center_freqs: center_freqs.to_vec(),
            rt60: rt60.to_vec(),
        })
    }

    /// One-pole approximation of a band profile: lowest band at DC, highest at Nyquist.
    pub fn one_pole(rt60: &[f64]) -> Result<Decay> {
        match (rt60.first(), rt60.last()) {
            (Some(&rt60_dc), Some(&rt60_nyquist)) => Ok(Decay::OnePole { rt60_dc, rt60_nyquist }),
            _ => config_err("empty RT60 profile"),
        }
    }
}

/// Per-sample attenuation for a decay of 60 dB over `rt60` seconds.
pub fn per_sample_gain(rt60: f64, fs: f64) -> f64 {
    10f64.powf(-60.0 / (fs * rt60) / 20.0)
}

fn check_rt60(rt60: f64) -> Result<()> {
    if !(rt60.is_finite() && rt60 > 0.0) {
        return config_err(format!("RT60 must be positive and finite, got {rt60}"));
    }
    Ok(())
}

/// Minimum-phase loss filter for an `m`-sample line: gain
/// `10^(-3 m / (fs * RT60(f)))` at every band centre, held flat beyond
/// the outer bands. Rejected when the designed response reaches unity.
fn loss_filter(center_freqs: &[f64], rt60: &[f64], fs: f64, m: usize) -> Result<FirFilter> {
    let gains: Vec<f64> = rt60.iter().map(|&t| per_sample_gain(t, fs).powi(m as i32)).collect();
    let filter = design(center_freqs, &gains, fs / 2.0, FirType::TypeI, LOSS_FILTER_TAPS)?;
    let peak = (0..=PASSIVITY_POINTS)
        .map(|k| magnitude_at(&filter.minimum, k as f64 / PASSIVITY_POINTS as f64))
        .fold(0.0f64, f64::max);
    if !(peak < 1.0) {
        return config_err(format!(
            "loss filter on a {m}-sample line peaks at {peak:.4}; reverberation time too long for this line"
        ));
    }
    Ok(FirFilter::new(filter.minimum))
}

#[derive(Debug, Clone)]
pub struct FeedbackDelayNetwork {
    lines: Vec<DelayLine>,
    delays: Vec<usize>,
    matrix: Vec<f64>,
    householder: bool,
    b: Vec<f64>,
    c: Vec<f64>,
    // one-pole loss per line: y = gain * (1 - pole) * x + pole * y1
    gains: Vec<f64>,
    poles: Vec<f64>,
    y1: Vec<f64>,
    // replaces the one-pole when present
    loss_filters: Vec<FirFilter>,
    reads: Vec<f64>,
    mixed: Vec<f64>,
}

impl FeedbackDelayNetwork {
    /// Unit input and output gains on every line.
    pub fn new(fs: f64, delays: Vec<usize>, decay: Decay, matrix: MatrixKind, seed: u64) -> Result<Self> {
        let n = delays.len();
        if n == 0 {
            return config_err("FDN needs at least one delay line");
        }
        if !(fs > 0.0) {
            return config_err(format!("sample rate must be positive, got {fs}"));
        }
        if delays.contains(&0) {
            return config_err("FDN delay lengths must be at least one sample");
        }
        if !is_mutually_prime(&delays) {
            return config_err(format!("FDN delays {delays:?} are not pairwise coprime"));
        }

        let mut loss_filters = Vec::new();
        let (gains, poles): (Vec<f64>, Vec<f64>) = match decay {
            Decay::Lossless => {
                warn!("lossless FDN: energy never decays and rounding error accumulates over long renders");
                (vec![1.0; n], vec![0.0; n])
            }
            Decay::Broadband { rt60 } => {
                check_rt60(rt60)?;
                let g = per_sample_gain(rt60, fs);
                (delays.iter().map(|&m| g.powi(m as i32)).collect(), vec![0.0; n])
            }
            Decay::OnePole { rt60_dc, rt60_nyquist } => {
                check_rt60(rt60_dc)?;
                check_rt60(rt60_nyquist)?;
                let alpha = rt60_nyquist / rt60_dc;
                let mut gains = Vec::with_capacity(n);
                let mut poles = Vec::with_capacity(n);
                for &m in &delays {
                    let g = per_sample_gain(rt60_dc, fs).powi(m as i32);
                    let p = LN_10 / 4.0 * g.log10() * (1.0 - 1.0 / (alpha * alpha));
                    if !(p.abs() < 1.0) {
                        return config_err(format!(
                            "RT60 ratio {alpha} gives an unstable loss filter on a {m}-sample line"
                        ));
                    }
                    gains.push(g);
                    poles.push(p);
                }
                (gains, poles)
            }
            Decay::Bands { center_freqs, rt60 } => {
                for &t in &rt60 {
                    check_rt60(t)?;
                }
                for &m in &delays {
                    loss_filters.push(loss_filter(&center_freqs, &rt60, fs, m)?);
                }
                debug!(bands = rt60.len(), taps = LOSS_FILTER_TAPS, "designed per-band loss filters");
                (vec![1.0; n], vec![0.0; n])
            }
        };

        let kind = matrix.resolve(n);
        let matrix = kind.build(n, seed)?;
        debug!(order = n, ?kind, ?delays, "built feedback delay network");

        Ok(Self {
            lines: delays.iter().map(|&m| DelayLine::new(m)).collect::<std::result::Result<_, _>>()?,
            delays,
            matrix,
            householder: kind == MatrixKind::Householder,
            b: vec![1.0; n],
            c: vec![1.0; n],
            gains,
            poles,
            y1: vec![0.0; n],
            loss_filters,
            reads: vec![0.0; n],
            mixed: vec![0.0; n],
        })
    }

    pub fn with_gains(mut self, b: Vec<f64>, c: Vec<f64>) -> Result<Self> {
        let n = self.order();
        if b.len() != n || c.len() != n {
            return config_err(format!(
                "FDN of order {n} got {} input and {} output gains",
                b.len(),
                c.len()
            ));
        }
        self.b = b;
        self.c = c;
        Ok(self)
    }

    pub fn order(&self) -> usize {
        self.delays.len()
    }

    pub fn delays(&self) -> &[usize] {
        &self.delays
    }

    pub fn matrix(&self) -> &[f64] {
        &self.matrix
    }

    /// Per-line loss gain at DC; unity on every line under a band decay,
    /// where the loss filters carry the attenuation.
    pub fn line_gains(&self) -> &[f64] {
        &self.gains
    }

    /// One output sample.
    #[inline]
    pub fn process(&mut self, x: f64) -> Result<f64> {
        let n = self.order();
        let mut y = 0.0;
        for i in 0..n {
            let r = self.lines[i].read(self.delays[i] - 1)?;
            y += self.c[i] * r;
            self.reads[i] = match self.loss_filters.get_mut(i) {
                Some(filter) => filter.process(r),
                None => {
                    let p = self.poles[i];
                    self.y1[i] = self.gains[i] * (1.0 - p) * r + p * self.y1[i];
                    self.y1[i]
                }
            };
        }

        if self.householder {
            let s = self.reads.iter().sum::<f64>() * 2.0 / n as f64;
            for (m, r) in self.mixed.iter_mut().zip(&self.reads) {
                *m = r - s;
            }
        } else {
            mat_vec(&self.matrix, &self.reads, &mut self.mixed);
        }

        for i in 0..n {
            self.lines[i].push(self.mixed[i] + self.b[i] * x);
        }
        Ok(y)
    }

    /// Sum of squares of everything currently stored in the delay lines.
    pub fn stored_energy(&self) -> f64 {
        self.lines
            .iter()
            .zip(&self.delays)
            .map(|(line, &m)| line.energy(m))
            .sum()
    }

    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
        self.y1.fill(0.0);
        for filter in &mut self.loss_filters {
            filter.reset();
        }
    }

    /// Reset, then run `input` through sample by sample.
    pub fn render(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.reset();
        let mut out = Vec::with_capacity(input.len());
        for (index, &x) in input.iter().enumerate() {
            let y = self.process(x)?;
            if !y.is_finite() {
                return Err(RirError::NonFinite { stage: "fdn", index });
            }
            out.push(y);
        }
        Ok(out)
    }
}

impl LateReverberationEngine for FeedbackDelayNetwork {
    fn render_late(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.render(input)
    }

    /// `1 / sqrt(N)` keeps the injected energy independent of the order.
    fn input_scale(&self) -> f64 {
        1.0 / (self.order() as f64).sqrt()
    }
}

/// Delay lengths from early-reflection arrival times: the closest primes to
/// the distinct arrival samples, then `order` of them by k-th element sampling.
pub fn delays_from_reflections(delay_times: &[f64], fs: f64, order: usize) -> Result<Vec<usize>> {
    let mut targets: Vec<usize> = delay_times.iter().map(|d| (d * fs) as usize).collect();
    targets.sort_unstable();
    targets.dedup();
    let primes = closest_primes(&targets);
    let delays = select_order(&primes, order)?;
    if !is_mutually_prime(&delays) {
        return config_err(format!("selected delays {delays:?} are not pairwise coprime"));
    }
    Ok(delays)
}

/// Log-spaced coprime delays around the mean-free-path travel time.
pub fn delays_from_mean_free_path(mean_free_path: f64, speed_of_sound: f64, fs: f64, order: usize, percent: u32) -> Result<Vec<usize>> {
    let center = (mean_free_path / speed_of_sound * fs) as usize;
    log_mutual_primes(center, order, percent)
}
