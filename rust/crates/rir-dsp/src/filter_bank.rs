//! Absorptive FIR design from octave-band gains.
//!
//! A linear-phase FIR is fitted to the band gains by frequency sampling
//! (piecewise-linear target, inverse real FFT, Hamming window) and then
//! converted to minimum phase so reflections are not smeared ahead of
//! their arrival time.
//!
//! Type I  -- odd length, DC/Nyquist gains copied from the outermost bands,
//!            minimum phase by homomorphic (cepstral) factorisation.
//! Type II -- even length, gain 1 at DC and 0 at Nyquist (tone correction),
//!            minimum phase from the zero-phase amplitude response via the
//!            discrete Hilbert transform.

use crate::absorption::AbsorptionProfile;
use crate::error::{config_err, Result};
use crate::geometry::Wall;
use num_complex::Complex;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use shared_dsp::fir::{fft_convolve, next_pow2};
use std::f64::consts::PI;

pub const TYPE_I_TAPS: usize = 201;
pub const TYPE_II_TAPS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FirType {
    #[default]
    #[serde(rename = "I")]
    TypeI,
    #[serde(rename = "II")]
    TypeII,
}

impl FirType {
    pub fn default_taps(self) -> usize {
        match self {
            FirType::TypeI => TYPE_I_TAPS,
            FirType::TypeII => TYPE_II_TAPS,
        }
    }
}

/// Which reflection magnitude a wall filter targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reflectance {
    /// `1 - alpha`, matching the flat tapped-delay-line gain.
    Energy,
    /// `sqrt(1 - alpha)`, the pressure reflection coefficient.
    Pressure,
}

impl Reflectance {
    pub fn from_absorption(self, alpha: f64) -> f64 {
        match self {
            Reflectance::Energy => 1.0 - alpha,
            Reflectance::Pressure => (1.0 - alpha).sqrt(),
        }
    }
}

/// Linear-phase design and its minimum-phase counterpart (same length).
#[derive(Debug, Clone, PartialEq)]
pub struct AbsorptiveFilter {
    pub kind: FirType,
    pub linear: Vec<f64>,
    pub minimum: Vec<f64>,
}

/// Design a filter whose magnitude follows `gains` at `freqs` (Hz).
pub fn design(freqs: &[f64], gains: &[f64], nyquist: f64, kind: FirType, taps: usize) -> Result<AbsorptiveFilter> {
    if freqs.len() != gains.len() {
        return config_err(format!(
            "filter design needs one gain per frequency, got {} frequencies and {} gains",
            freqs.len(),
            gains.len()
        ));
    }
    let (Some(&first), Some(&last)) = (freqs.first(), freqs.last()) else {
        return config_err("filter design needs at least one band");
    };
    if first <= 0.0 || freqs.windows(2).any(|w| w[1] <= w[0]) {
        return config_err("filter design frequencies must be positive and strictly increasing");
    }
    if last >= nyquist {
        return config_err(format!("highest band {last} Hz must lie below Nyquist {nyquist} Hz"));
    }
    if gains.iter().any(|g| !g.is_finite() || *g < 0.0) {
        return config_err("filter design gains must be finite and non-negative");
    }
    if taps < 3 {
        return config_err(format!("filter needs at least 3 taps, got {taps}"));
    }
    match kind {
        FirType::TypeI if taps % 2 == 0 => {
            return config_err(format!("type I filter needs an odd tap count, got {taps}"))
        }
        FirType::TypeII if taps % 2 == 1 => {
            return config_err(format!("type II filter needs an even tap count, got {taps}"))
        }
        _ => {}
    }

    let mut bp_freqs = Vec::with_capacity(freqs.len() + 2);
    let mut bp_gains = Vec::with_capacity(gains.len() + 2);
    bp_freqs.push(0.0);
    bp_freqs.extend(freqs.iter().map(|f| f / nyquist));
    bp_freqs.push(1.0);
    match kind {
        FirType::TypeI => {
            bp_gains.push(gains[0]);
            bp_gains.extend_from_slice(gains);
            bp_gains.push(gains[gains.len() - 1]);
        }
        FirType::TypeII => {
            bp_gains.push(1.0);
            bp_gains.extend_from_slice(gains);
            bp_gains.push(0.0);
        }
    }

    let linear = frequency_sampling(taps, &bp_freqs, &bp_gains)?;
    let minimum = match kind {
        FirType::TypeI => minimum_phase(&linear, MinPhaseMethod::Homomorphic)?,
        FirType::TypeII => minimum_phase(&linear, MinPhaseMethod::Hilbert)?,
    };
    Ok(AbsorptiveFilter { kind, linear, minimum })
}

/// Frequency-sampling FIR design on a normalised (0..1 = DC..Nyquist) grid.
fn frequency_sampling(taps: usize, freqs: &[f64], gains: &[f64]) -> Result<Vec<f64>> {
    let nfreqs = 1 + next_pow2(taps);
    let n = 2 * (nfreqs - 1);
    let half_delay = (taps - 1) as f64 / 2.0;

    let mut spectrum: Vec<Complex<f64>> = (0..nfreqs)
        .map(|k| {
            let x = k as f64 / (nfreqs - 1) as f64;
            let g = interp(x, freqs, gains);
            Complex::from_polar(g, -half_delay * PI * x)
        })
        .collect();
    spectrum[0].im = 0.0;
    spectrum[nfreqs - 1].im = 0.0;

    let mut planner = RealFftPlanner::<f64>::new();
    let ifft = planner.plan_fft_inverse(n);
    let mut full = ifft.make_output_vec();
    ifft.process(&mut spectrum, &mut full)?;

    let norm = 1.0 / n as f64;
    let window = hamming(taps);
    Ok(full
        .iter()
        .take(taps)
        .zip(window.iter())
        .map(|(h, w)| h * norm * w)
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MinPhaseMethod {
    Homomorphic,
    Hilbert,
}

/// Minimum-phase filter with the magnitude response of `h`, same length.
fn minimum_phase(h: &[f64], method: MinPhaseMethod) -> Result<Vec<f64>> {
    let len = h.len();
    let n_fft = next_pow2((2.0 * (len - 1) as f64 / 0.01).ceil() as usize);
    let bins = n_fft / 2 + 1;

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let ifft = planner.plan_fft_inverse(n_fft);

    let mut buf = vec![0.0; n_fft];
    buf[..len].copy_from_slice(h);
    let mut spectrum = fft.make_output_vec();
    fft.process(&mut buf, &mut spectrum)?;

    let log_mag: Vec<f64> = match method {
        MinPhaseMethod::Homomorphic => {
            let mags: Vec<f64> = spectrum.iter().map(|c| c.norm()).collect();
            let min_pos = mags
                .iter()
                .copied()
                .filter(|m| *m > 0.0)
                .fold(f64::INFINITY, f64::min);
            let floor = if min_pos.is_finite() { 1e-7 * min_pos } else { 1e-12 };
            mags.iter().map(|m| (m + floor).ln()).collect()
        }
        MinPhaseMethod::Hilbert => {
            // zero-phase amplitude of the linear-phase design
            let half_delay = (len - 1) as f64 / 2.0;
            spectrum
                .iter()
                .enumerate()
                .map(|(k, c)| {
                    let w = 2.0 * PI * k as f64 / n_fft as f64;
                    let amplitude = (c * Complex::from_polar(1.0, w * half_delay)).re;
                    (amplitude.max(0.0) + 1e-10).ln()
                })
                .collect()
        }
    };

    // real cepstrum
    let mut log_spec: Vec<Complex<f64>> = log_mag.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let mut cepstrum = ifft.make_output_vec();
    ifft.process(&mut log_spec, &mut cepstrum)?;
    let norm = 1.0 / n_fft as f64;

    // fold onto positive quefrencies
    for (i, c) in cepstrum.iter_mut().enumerate() {
        let w = if i == 0 || i == n_fft / 2 {
            1.0
        } else if i < n_fft / 2 {
            2.0
        } else {
            0.0
        };
        *c *= w * norm;
    }

    let mut folded = fft.make_output_vec();
    fft.process(&mut cepstrum, &mut folded)?;
    let mut min_spec: Vec<Complex<f64>> = folded.iter().map(|c| c.exp()).collect();
    min_spec[0].im = 0.0;
    min_spec[bins - 1].im = 0.0;

    let mut out = ifft.make_output_vec();
    ifft.process(&mut min_spec, &mut out)?;
    Ok(out.iter().take(len).map(|v| v * norm).collect())
}

/// Linear interpolation of `(xs, ys)` at `x`, clamped at the ends.
fn interp(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    if x <= xs[0] {
        return ys[0];
    }
    for i in 1..xs.len() {
        if x <= xs[i] {
            let t = (x - xs[i - 1]) / (xs[i] - xs[i - 1]);
            return ys[i - 1] + t * (ys[i] - ys[i - 1]);
        }
    }
    ys[ys.len() - 1]
}

/// Symmetric Hamming window.
fn hamming(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (size - 1) as f64).cos())
        .collect()
}

/// Magnitude of the response of `h` at normalised frequency `x`
/// (0 = DC, 1 = Nyquist).
pub fn magnitude_at(h: &[f64], x: f64) -> f64 {
    let w = PI * x;
    h.iter()
        .enumerate()
        .fold(Complex::new(0.0, 0.0), |acc, (n, &v)| acc + Complex::from_polar(v, -w * n as f64))
        .norm()
}

/// One designed filter per wall.
#[derive(Debug, Clone)]
pub struct AbsorptiveFilterBank {
    filters: Vec<AbsorptiveFilter>,
}

impl AbsorptiveFilterBank {
    /// Design a filter for every wall from its material plus air absorption.
    pub fn for_walls(
        profile: &AbsorptionProfile,
        fs: f64,
        kind: FirType,
        taps: usize,
        reflectance: Reflectance,
    ) -> Result<Self> {
        let nyquist = fs / 2.0;
        let freqs = profile.center_freqs();
        let filters = Wall::ALL
            .iter()
            .map(|&wall| {
                let gains: Vec<f64> = profile
                    .with_air(wall)
                    .iter()
                    .map(|&a| reflectance.from_absorption(a))
                    .collect();
                design(freqs, &gains, nyquist, kind, taps)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { filters })
    }

    pub fn filter(&self, wall: Wall) -> &AbsorptiveFilter {
        &self.filters[wall.index()]
    }
}

/// Colour a late-reverb tail by the room's mean absorption: Type II filter
/// with gains `1 - mean_alpha(band)`, applied by FFT convolution.
pub fn tone_correction(signal: &[f64], mean_absorption: &[f64], center_freqs: &[f64], fs: f64, taps: usize) -> Result<Vec<f64>> {
    let gains: Vec<f64> = mean_absorption.iter().map(|a| 1.0 - a).collect();
    let filter = design(center_freqs, &gains, fs / 2.0, FirType::TypeII, taps)?;
    Ok(fft_convolve(signal, &filter.minimum)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::absorption::CENTER_FREQS;

    const FS: f64 = 44100.0;

    fn smooth_gains() -> Vec<f64> {
        vec![0.9, 0.88, 0.85, 0.8, 0.75, 0.7, 0.65]
    }

    #[test]
    fn type_i_is_odd_with_band_edge_gains() {
        let gains = smooth_gains();
        let f = design(&CENTER_FREQS, &gains, FS / 2.0, FirType::TypeI, 201).unwrap();
        assert_eq!(f.linear.len() % 2, 1);
        assert_eq!(f.minimum.len(), f.linear.len());
        let dc = magnitude_at(&f.linear, 0.0);
        let nyq = magnitude_at(&f.linear, 1.0);
        assert!((dc - gains[0]).abs() < 0.03, "dc {dc}");
        assert!((nyq - gains[6]).abs() < 0.03, "nyquist {nyq}");
    }

    #[test]
    fn type_ii_is_even_with_unit_dc_and_zero_nyquist() {
        let gains = vec![0.98, 0.95, 0.9, 0.85, 0.8, 0.6, 0.4];
        let f = design(&CENTER_FREQS, &gains, FS / 2.0, FirType::TypeII, 200).unwrap();
        assert_eq!(f.linear.len() % 2, 0);
        assert_eq!(f.minimum.len(), f.linear.len());
        let dc = magnitude_at(&f.linear, 0.0);
        let nyq = magnitude_at(&f.linear, 1.0);
        assert!((dc - 1.0).abs() < 0.05, "dc {dc}");
        assert!(nyq < 1e-9, "nyquist {nyq}");
    }

    #[test]
    fn minimum_phase_keeps_magnitude_and_front_loads_energy() {
        let gains = smooth_gains();
        let f = design(&CENTER_FREQS, &gains, FS / 2.0, FirType::TypeI, 201).unwrap();
        for x in [0.0, 0.05, 0.2, 0.6, 1.0] {
            let a = magnitude_at(&f.linear, x);
            let b = magnitude_at(&f.minimum, x);
            assert!((a - b).abs() < 0.03, "x={x}: linear {a}, minimum {b}");
        }
        let energy = |h: &[f64]| h.iter().map(|v| v * v).sum::<f64>();
        let head = energy(&f.minimum[..20]);
        let linear_head = energy(&f.linear[..20]);
        assert!(head > 0.9 * energy(&f.minimum));
        assert!(head > linear_head);
    }

    #[test]
    fn hilbert_minimum_phase_tracks_type_ii() {
        let gains = vec![0.98, 0.95, 0.9, 0.85, 0.8, 0.6, 0.4];
        let f = design(&CENTER_FREQS, &gains, FS / 2.0, FirType::TypeII, 200).unwrap();
        let dc = magnitude_at(&f.minimum, 0.0);
        assert!((dc - 1.0).abs() < 0.05, "dc {dc}");
        assert!(magnitude_at(&f.minimum, 1.0) < 0.1);
    }

    #[test]
    fn validation_failures() {
        let freqs = CENTER_FREQS;
        let gains = smooth_gains();
        // length mismatch
        assert!(design(&freqs, &gains[..6], FS / 2.0, FirType::TypeI, 201).is_err());
        // top band at or above Nyquist
        assert!(design(&freqs, &gains, 8000.0, FirType::TypeI, 201).is_err());
        // parity
        assert!(design(&freqs, &gains, FS / 2.0, FirType::TypeI, 200).is_err());
        assert!(design(&freqs, &gains, FS / 2.0, FirType::TypeII, 201).is_err());
    }

    #[test]
    fn bank_designs_one_filter_per_wall() {
        let profile = AbsorptionProfile::uniform_flat(0.3).unwrap();
        let bank = AbsorptiveFilterBank::for_walls(&profile, FS, FirType::TypeI, 101, Reflectance::Pressure).unwrap();
        let f = bank.filter(Wall::Floor);
        let dc = magnitude_at(&f.minimum, 0.0);
        assert!((dc - 0.7f64.sqrt()).abs() < 0.03, "dc {dc}");
    }

    #[test]
    fn tone_correction_keeps_length() {
        let mut x = vec![0.0; 1000];
        x[0] = 1.0;
        let y = tone_correction(&x, &[0.1; 7], &CENTER_FREQS, FS, 200).unwrap();
        assert_eq!(y.len(), 1000);
        assert!(y.iter().all(|v| v.is_finite()));
    }
}
