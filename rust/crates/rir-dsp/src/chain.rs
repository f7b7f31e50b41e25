//! Entry points for room impulse response rendering.
//!
//! A `RenderMode` selects one renderer built from `RirParams`; every
//! renderer honours the same `render(input) -> output` contract and returns
//! a buffer the length of its input. Independent jobs run in parallel.

use crate::absorption::AbsorptionProfile;
use crate::error::{check_finite, config_err, Result, RirError};
use crate::fdn::{delays_from_mean_free_path, delays_from_reflections, FeedbackDelayNetwork};
use crate::filter_bank::tone_correction;
use crate::geometry::Room;
use crate::params::{FdnDelays, RirParams};
use crate::primes::select_order;
use crate::reverb_time::{rt60_flat, schroeder_frequency, transition_frequency};
use crate::sdn::Network;
use crate::tapped_delay_line::{spreading_gain, TapMode, TappedDelayLine};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shared_dsp::{fft_convolve, DelayAlignment, FractionalDelay};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Direct sound plus absorptive-filtered early reflections.
    EarlyFiltered,
    /// Direct sound plus flat-attenuated early reflections.
    EarlyFlat,
    /// Input convolved with an externally rendered early-reflection RIR.
    EarlyConvolve,
    /// Direct sound plus the mixdown of one channel per reflection.
    EarlyMultiChannel,
    Sdn,
    Fdn,
    /// Direct + early reflections + FDN tail fed with the input.
    HybridParallel,
    /// Direct + early reflections + FDN tail fed with the early reflections.
    HybridSerial,
}

impl RenderMode {
    pub const ALL: [RenderMode; 8] = [
        RenderMode::EarlyFiltered,
        RenderMode::EarlyFlat,
        RenderMode::EarlyConvolve,
        RenderMode::EarlyMultiChannel,
        RenderMode::Sdn,
        RenderMode::Fdn,
        RenderMode::HybridParallel,
        RenderMode::HybridSerial,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RenderMode::EarlyFiltered => "early_filtered",
            RenderMode::EarlyFlat => "early_flat",
            RenderMode::EarlyConvolve => "early_convolve",
            RenderMode::EarlyMultiChannel => "early_multi_channel",
            RenderMode::Sdn => "sdn",
            RenderMode::Fdn => "fdn",
            RenderMode::HybridParallel => "hybrid_parallel",
            RenderMode::HybridSerial => "hybrid_serial",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RenderMode::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = RenderMode::ALL.iter().map(|m| m.name()).collect();
                format!("unknown render mode '{s}', expected one of {}", names.join(", "))
            })
    }
}

/// One way of turning an input signal into a room response.
pub trait Renderer {
    fn render(&mut self, input: &[f64]) -> Result<Vec<f64>>;
}

/// Source of a late reverberant tail.
pub trait LateReverberationEngine {
    fn render_late(&mut self, input: &[f64]) -> Result<Vec<f64>>;

    /// Gain applied to the signal fed into the engine.
    fn input_scale(&self) -> f64 {
        1.0
    }
}

impl Renderer for Network {
    fn render(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        Network::render(self, input)
    }
}

// ---------------------------------------------------------------------------
// Early reflections
// ---------------------------------------------------------------------------

/// Optional direct sound plus tapped-delay-line reflections.
pub struct EarlyReflections {
    direct: Option<TappedDelayLine>,
    reflections: TappedDelayLine,
    mode: TapMode,
}

impl EarlyReflections {
    pub fn new(params: &RirParams, room: &Room, profile: &AbsorptionProfile, mode: TapMode) -> Result<Self> {
        let images = params.image_sources(room);
        let reflections = TappedDelayLine::from_image_sources(room, &images, profile, params.tdl_options(false))?;
        let direct = if params.direct_path {
            let r = room.source().distance(&room.mic());
            Some(TappedDelayLine::new(
                &[r / params.speed_of_sound],
                &[spreading_gain(r)],
                vec![None],
                &[1.0],
                params.tdl_options(false),
            )?)
        } else {
            None
        };
        Ok(Self {
            direct,
            reflections,
            mode,
        })
    }

    pub fn reflections(&self) -> &TappedDelayLine {
        &self.reflections
    }

    /// Arrival time of the earliest reflection in seconds.
    pub fn first_reflection(&self) -> Option<f64> {
        self.reflections
            .delay_times()
            .into_iter()
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d))))
    }

    pub fn direct_sound(&self, input: &[f64]) -> Result<Vec<f64>> {
        match &self.direct {
            Some(tdl) => tdl.process(input, TapMode::Flat),
            None => Ok(vec![0.0; input.len()]),
        }
    }

    pub fn early(&self, input: &[f64]) -> Result<Vec<f64>> {
        self.reflections.process(input, self.mode)
    }
}

impl Renderer for EarlyReflections {
    fn render(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let mut out = self.direct_sound(input)?;
        add_into(&mut out, &self.early(input)?);
        Ok(out)
    }
}

/// Direct sound plus every reflection rendered to its own channel and summed.
pub struct MultiChannelEarly(EarlyReflections);

impl Renderer for MultiChannelEarly {
    fn render(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let mut out = self.0.direct_sound(input)?;
        for channel in self.0.reflections.process_channels(input)? {
            add_into(&mut out, &channel);
        }
        Ok(out)
    }
}

/// FFT convolution with an externally rendered RIR.
pub struct ConvolveEarly {
    rir: Vec<f64>,
}

impl ConvolveEarly {
    pub fn new(rir: Vec<f64>) -> Result<Self> {
        if rir.is_empty() {
            return config_err("convolution mode needs a non-empty RIR");
        }
        check_finite("convolution RIR", &rir)?;
        Ok(Self { rir })
    }
}

impl Renderer for ConvolveEarly {
    fn render(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let out = fft_convolve(input, &self.rir)?;
        check_finite("convolution", &out)?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Late reverberation
// ---------------------------------------------------------------------------

/// A late engine on its own, fed with the scaled input.
pub struct LateOnly {
    late: Box<dyn LateReverberationEngine>,
}

impl Renderer for LateOnly {
    fn render(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let scale = self.late.input_scale();
        let scaled: Vec<f64> = input.iter().map(|x| x * scale).collect();
        self.late.render_late(&scaled)
    }
}

/// Colouring applied to the late tail.
struct ToneCorrection {
    mean_absorption: Vec<f64>,
    center_freqs: Vec<f64>,
    fs: f64,
    taps: usize,
}

impl ToneCorrection {
    fn apply(&self, tail: &[f64]) -> Result<Vec<f64>> {
        tone_correction(tail, &self.mean_absorption, &self.center_freqs, self.fs, self.taps)
    }
}

/// Direct sound, early reflections and a late tail from an injected engine.
pub struct Hybrid {
    early: EarlyReflections,
    late: Box<dyn LateReverberationEngine>,
    serial: bool,
    align: FractionalDelay,
    fs: f64,
    alignment: DelayAlignment,
    tone: Option<ToneCorrection>,
}

impl Hybrid {
    pub fn new(
        early: EarlyReflections,
        late: Box<dyn LateReverberationEngine>,
        serial: bool,
        params: &RirParams,
        profile: &AbsorptionProfile,
    ) -> Result<Self> {
        let tone = params.tone_correction.then(|| ToneCorrection {
            mean_absorption: profile.mean_with_air(),
            center_freqs: profile.center_freqs().to_vec(),
            fs: params.fs,
            taps: params.tone_correction_taps,
        });
        Ok(Self {
            early,
            late,
            serial,
            align: FractionalDelay::new(params.frac_taps)?,
            fs: params.fs,
            alignment: params.alignment,
            tone,
        })
    }
}

impl Renderer for Hybrid {
    fn render(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let scale = self.late.input_scale();
        let early = self.early.early(input)?;

        let mut late = if self.serial {
            let fed: Vec<f64> = early.iter().map(|x| x * scale).collect();
            self.late.render_late(&fed)?
        } else {
            let fed: Vec<f64> = input.iter().map(|x| x * scale).collect();
            let tail = self.late.render_late(&fed)?;
            // line the tail up with the first reflection
            let onset = self.early.first_reflection().unwrap_or(0.0);
            self.align.delay(&tail, onset, self.fs, self.alignment)?
        };
        if let Some(tone) = &self.tone {
            late = tone.apply(&late)?;
        }

        let mut out = self.early.direct_sound(input)?;
        add_into(&mut out, &early);
        add_into(&mut out, &late);
        check_finite("hybrid", &out)?;
        Ok(out)
    }
}

fn add_into(acc: &mut [f64], other: &[f64]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a += b;
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// FDN delays per the configured selection strategy.
pub fn fdn_delays(params: &RirParams, room: &Room, early: Option<&EarlyReflections>) -> Result<Vec<usize>> {
    match &params.fdn_delays {
        FdnDelays::Fixed { delays } if delays.len() == params.fdn_order => Ok(delays.clone()),
        FdnDelays::Fixed { delays } => select_order(delays, params.fdn_order),
        FdnDelays::EarlyReflections => match early {
            Some(e) => delays_from_reflections(&e.reflections().delay_times(), params.fs, params.fdn_order),
            None => config_err("reflection-derived FDN delays need an early-reflection stage"),
        },
        FdnDelays::MeanFreePath { percent } => delays_from_mean_free_path(
            room.mean_free_path(),
            params.speed_of_sound,
            params.fs,
            params.fdn_order,
            *percent,
        ),
    }
}

fn build_fdn(params: &RirParams, room: &Room, profile: &AbsorptionProfile, early: Option<&EarlyReflections>) -> Result<FeedbackDelayNetwork> {
    let delays = fdn_delays(params, room, early)?;
    let decay = params.fdn_decay(room, profile)?;
    FeedbackDelayNetwork::new(params.fs, delays, decay, params.matrix, params.matrix_seed)
}

/// Build the renderer for one mode.
pub fn build_renderer(params: &RirParams, mode: RenderMode) -> Result<Box<dyn Renderer>> {
    params.validate()?;
    let room = params.room()?;
    let profile = params.absorption_profile()?;

    let renderer: Box<dyn Renderer> = match mode {
        RenderMode::EarlyFiltered => Box::new(EarlyReflections::new(params, &room, &profile, TapMode::Filtered)?),
        RenderMode::EarlyFlat => Box::new(EarlyReflections::new(params, &room, &profile, TapMode::Flat)?),
        RenderMode::EarlyMultiChannel => Box::new(MultiChannelEarly(EarlyReflections::new(
            params,
            &room,
            &profile,
            TapMode::Flat,
        )?)),
        RenderMode::EarlyConvolve => match &params.ism_rir {
            Some(rir) => Box::new(ConvolveEarly::new(rir.clone())?),
            None => return config_err("early_convolve mode needs `ism_rir` in the parameters"),
        },
        RenderMode::Sdn => Box::new(Network::new(&room, &params.sdn_absorption(&profile), params.sdn_options())?),
        RenderMode::Fdn => {
            let early = match params.fdn_delays {
                FdnDelays::EarlyReflections => Some(EarlyReflections::new(params, &room, &profile, TapMode::Flat)?),
                _ => None,
            };
            Box::new(LateOnly {
                late: Box::new(build_fdn(params, &room, &profile, early.as_ref())?),
            })
        }
        RenderMode::HybridParallel | RenderMode::HybridSerial => {
            let early = EarlyReflections::new(params, &room, &profile, TapMode::Filtered)?;
            let fdn = build_fdn(params, &room, &profile, Some(&early))?;
            if let Ok(rt60) = rt60_flat(&room, &profile, params.rt_formula.into()) {
                debug!(
                    rt60,
                    schroeder_hz = schroeder_frequency(rt60, room.volume()),
                    transition_hz = transition_frequency(rt60, room.volume(), 4.0),
                    "hybrid crossover region"
                );
            }
            Box::new(Hybrid::new(early, Box::new(fdn), mode == RenderMode::HybridSerial, params, &profile)?)
        }
    };
    debug!(%mode, "renderer ready");
    Ok(renderer)
}

/// Render one mode.
pub fn render_rir(input: &[f64], params: &RirParams, mode: RenderMode) -> Result<Vec<f64>> {
    let out = build_renderer(params, mode)?.render(input)?;
    if out.len() != input.len() {
        return Err(RirError::Configuration(format!(
            "{mode} produced {} samples for {} input samples",
            out.len(),
            input.len()
        )));
    }
    Ok(out)
}

/// Render several modes in parallel, one independent job each.
pub fn render_batch(input: &[f64], params: &RirParams, modes: &[RenderMode]) -> Result<Vec<(RenderMode, Vec<f64>)>> {
    info!(jobs = modes.len(), samples = input.len(), "rendering batch");
    modes
        .par_iter()
        .map(|&mode| render_rir(input, params, mode).map(|out| (mode, out)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fdn::Decay;
    use crate::matrix::MatrixKind;
    use crate::params::DecayModel;

    fn impulse(len: usize) -> Vec<f64> {
        let mut x = vec![0.0; len];
        x[0] = 1.0;
        x
    }

    fn quick_params() -> RirParams {
        RirParams {
            filter_taps: 41,
            tone_correction_taps: 40,
            ..RirParams::default()
        }
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in RenderMode::ALL {
            assert_eq!(mode.name().parse::<RenderMode>().unwrap(), mode);
        }
        assert!("tdl".parse::<RenderMode>().is_err());
    }

    #[test]
    fn every_mode_keeps_input_length() {
        let mut params = quick_params();
        params.ism_rir = Some(vec![0.0, 0.5, 0.25]);
        let input = impulse(6000);
        for mode in RenderMode::ALL {
            let out = render_rir(&input, &params, mode).unwrap();
            assert_eq!(out.len(), input.len(), "{mode}");
            assert!(out.iter().all(|v| v.is_finite()), "{mode}");
        }
    }

    #[test]
    fn convolve_needs_rir() {
        let err = render_rir(&impulse(100), &quick_params(), RenderMode::EarlyConvolve);
        assert!(matches!(err, Err(RirError::Configuration(_))));
    }

    #[test]
    fn flat_early_starts_with_direct_sound() {
        let params = quick_params();
        let room = params.room().unwrap();
        let y = render_rir(&impulse(2000), &params, RenderMode::EarlyFlat).unwrap();
        let d = room.source().distance(&room.mic());
        let direct = (d / params.speed_of_sound * params.fs).round() as usize;
        let peak = y
            .iter()
            .enumerate()
            .fold((0, 0.0), |(bi, bv), (i, v)| if v.abs() > bv { (i, v.abs()) } else { (bi, bv) })
            .0;
        assert!(peak.abs_diff(direct) <= 1, "peak {peak}, direct {direct}");
    }

    #[test]
    fn multi_channel_mixdown_matches_flat() {
        let params = quick_params();
        let a = render_rir(&impulse(3000), &params, RenderMode::EarlyFlat).unwrap();
        let b = render_rir(&impulse(3000), &params, RenderMode::EarlyMultiChannel).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn parallel_hybrid_tail_starts_at_first_reflection() {
        let mut params = quick_params();
        params.direct_path = false;
        params.tone_correction = false;
        params.fdn_decay = DecayModel::Broadband;
        params.fdn_rt60 = Some(0.4);

        let room = params.room().unwrap();
        let profile = params.absorption_profile().unwrap();
        let early = EarlyReflections::new(&params, &room, &profile, TapMode::Filtered).unwrap();
        let onset = early.first_reflection().unwrap();

        let fdn = FeedbackDelayNetwork::new(params.fs, vec![809, 877], Decay::Broadband { rt60: 0.4 }, MatrixKind::Auto, 0).unwrap();
        let mut hybrid = Hybrid::new(early, Box::new(fdn), false, &params, &profile).unwrap();
        let y = hybrid.render(&impulse(8000)).unwrap();
        assert!(y.iter().all(|v| v.is_finite()));

        // the tail's first arrival lands at onset + shortest line
        let tail_start = (onset * params.fs).round() as usize + 809;
        assert!(y[tail_start].abs() > 0.1, "{}", y[tail_start]);
    }

    #[test]
    fn batch_renders_each_mode() {
        let params = quick_params();
        let modes = [RenderMode::EarlyFlat, RenderMode::Fdn, RenderMode::Sdn];
        let out = render_batch(&impulse(3000), &params, &modes).unwrap();
        assert_eq!(out.len(), 3);
        for ((mode, y), expected) in out.iter().zip(modes) {
            assert_eq!(*mode, expected);
            assert_eq!(y.len(), 3000);
        }
    }

    #[test]
    fn reflection_derived_delays() {
        let mut params = quick_params();
        params.fdn_delays = FdnDelays::EarlyReflections;
        params.fdn_order = 4;
        let y = render_rir(&impulse(3000), &params, RenderMode::Fdn).unwrap();
        assert!(y.iter().any(|v| v.abs() > 0.0));

        params.fdn_order = 8;
        assert!(render_rir(&impulse(100), &params, RenderMode::Fdn).is_err());
    }
}
