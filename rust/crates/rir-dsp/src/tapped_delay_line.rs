//! Early reflections as a bank of fractionally delayed, attenuated taps.
//!
//! Each tap is one image source: delay `r / c`, spherical spreading
//! `min(1/r, 1)`, and the reflection of the wall it last bounced off,
//! either as a flat coefficient or as a minimum-phase absorptive FIR.

use crate::absorption::AbsorptionProfile;
use crate::error::{check_finite, config_err, Result};
use crate::filter_bank::{AbsorptiveFilterBank, FirType, Reflectance};
use crate::geometry::{ImageSource, Room};
use shared_dsp::fractional::DEFAULT_TAPS;
use shared_dsp::{DelayAlignment, FirFilter, FractionalDelay};
use tracing::debug;

/// One early-reflection path.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayTap {
    pub delay_secs: f64,
    pub gain: f64,
    pub flat_reflectance: f64,
    pub filter: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapMode {
    /// Per-tap absorptive FIR, then spreading gain.
    Filtered,
    /// Spreading gain times the flat reflectance.
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TdlOptions {
    pub fs: f64,
    pub speed_of_sound: f64,
    pub frac_taps: usize,
    pub alignment: DelayAlignment,
    pub fir_type: FirType,
    pub filter_taps: usize,
    /// Add an unfiltered source→mic tap.
    pub direct_sound: bool,
}

impl Default for TdlOptions {
    fn default() -> Self {
        Self {
            fs: 44100.0,
            speed_of_sound: 343.0,
            frac_taps: DEFAULT_TAPS,
            alignment: DelayAlignment::Centered,
            fir_type: FirType::TypeI,
            filter_taps: FirType::TypeI.default_taps(),
            direct_sound: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TappedDelayLine {
    taps: Vec<DelayTap>,
    frac: FractionalDelay,
    fs: f64,
    alignment: DelayAlignment,
}

/// Spherical spreading, capped at unity inside one metre.
pub fn spreading_gain(distance: f64) -> f64 {
    (1.0 / distance).min(1.0)
}

impl TappedDelayLine {
    /// Build from parallel arrays, one entry per tap.
    pub fn new(
        delays: &[f64],
        gains: &[f64],
        filters: Vec<Option<Vec<f64>>>,
        flat_reflectances: &[f64],
        options: TdlOptions,
    ) -> Result<Self> {
        let n = delays.len();
        if gains.len() != n || filters.len() != n || flat_reflectances.len() != n {
            return config_err(format!(
                "tap arrays differ in length: {} delays, {} gains, {} filters, {} reflectances",
                n,
                gains.len(),
                filters.len(),
                flat_reflectances.len()
            ));
        }
        if delays.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return config_err("tap delays must be finite and non-negative");
        }
        if gains.iter().chain(flat_reflectances).any(|g| !g.is_finite()) {
            return config_err("tap gains must be finite");
        }
        if !(options.fs > 0.0) {
            return config_err(format!("sample rate must be positive, got {}", options.fs));
        }
        let frac = FractionalDelay::new(options.frac_taps)?;

        let taps = delays
            .iter()
            .zip(gains)
            .zip(filters)
            .zip(flat_reflectances)
            .map(|(((&delay_secs, &gain), filter), &flat_reflectance)| DelayTap {
                delay_secs,
                gain,
                flat_reflectance,
                filter,
            })
            .collect();

        Ok(Self {
            taps,
            frac,
            fs: options.fs,
            alignment: options.alignment,
        })
    }

    /// Build from externally computed image sources.
    pub fn from_image_sources(
        room: &Room,
        image_sources: &[ImageSource],
        profile: &AbsorptionProfile,
        options: TdlOptions,
    ) -> Result<Self> {
        if !(options.speed_of_sound > 0.0) {
            return config_err(format!(
                "speed of sound must be positive, got {}",
                options.speed_of_sound
            ));
        }
        let bank = AbsorptiveFilterBank::for_walls(
            profile,
            options.fs,
            options.fir_type,
            options.filter_taps,
            Reflectance::Energy,
        )?;

        let mic = room.mic();
        let count = image_sources.len() + usize::from(options.direct_sound);
        let mut delays = Vec::with_capacity(count);
        let mut gains = Vec::with_capacity(count);
        let mut filters = Vec::with_capacity(count);
        let mut flats = Vec::with_capacity(count);

        if options.direct_sound {
            let r = room.source().distance(&mic);
            delays.push(r / options.speed_of_sound);
            gains.push(spreading_gain(r));
            filters.push(None);
            flats.push(1.0);
        }
        for image in image_sources {
            let r = mic.distance(&image.position);
            if r <= 0.0 {
                return config_err("image source coincides with the mic");
            }
            delays.push(r / options.speed_of_sound);
            gains.push(spreading_gain(r));
            filters.push(Some(bank.filter(image.wall).minimum.clone()));
            flats.push(1.0 - profile.flat(image.wall));
        }

        debug!(
            taps = count,
            direct = options.direct_sound,
            "built tapped delay line from image sources"
        );
        Self::new(&delays, &gains, filters, &flats, options)
    }

    pub fn taps(&self) -> &[DelayTap] {
        &self.taps
    }

    /// Tap delays in seconds, in tap order.
    pub fn delay_times(&self) -> Vec<f64> {
        self.taps.iter().map(|t| t.delay_secs).collect()
    }

    /// Sum of every tap applied to `input`; same length as `input`.
    pub fn process(&self, input: &[f64], mode: TapMode) -> Result<Vec<f64>> {
        let mut out = vec![0.0; input.len()];
        for tap in &self.taps {
            let mut delayed = self.frac.delay(input, tap.delay_secs, self.fs, self.alignment)?;
            let gain = match (mode, &tap.filter) {
                (TapMode::Filtered, Some(coeffs)) => {
                    FirFilter::new(coeffs.clone()).process_block(&mut delayed);
                    tap.gain
                }
                (TapMode::Filtered, None) => tap.gain,
                (TapMode::Flat, _) => tap.gain * tap.flat_reflectance,
            };
            for (o, d) in out.iter_mut().zip(&delayed) {
                *o += gain * d;
            }
        }
        check_finite("tapped delay line", &out)?;
        Ok(out)
    }

    /// One channel per tap with flat gains.
    pub fn process_channels(&self, input: &[f64]) -> Result<Vec<Vec<f64>>> {
        self.taps
            .iter()
            .map(|tap| -> Result<Vec<f64>> {
                let gain = tap.gain * tap.flat_reflectance;
                let channel: Vec<f64> = self
                    .frac
                    .delay(input, tap.delay_secs, self.fs, self.alignment)?
                    .into_iter()
                    .map(|s| s * gain)
                    .collect();
                check_finite("tapped delay line channel", &channel)?;
                Ok(channel)
            })
            .collect()
    }
}
