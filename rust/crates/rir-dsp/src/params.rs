//! Parameter schema for room impulse response rendering.
//!
//! All callers (CLI, tests, batch jobs) use the same `RirParams` struct.
//! Sparse JSON is accepted: missing keys take their defaults.

use crate::absorption::{AbsorptionProfile, AirCondition, CENTER_FREQS};
use crate::error::{config_err, Result};
use crate::fdn::{Decay, DEFAULT_DELAYS};
use crate::filter_bank::FirType;
use crate::geometry::{ImageSource, Point3D, Room, WallMap};
use crate::matrix::MatrixKind;
use crate::reverb_time::{rt60_bands, rt60_flat, Formula};
use crate::sdn::{SdnOptions, WallAbsorption};
use crate::tapped_delay_line::TdlOptions;
use serde::{Deserialize, Deserializer, Serialize};
use shared_dsp::fractional::DEFAULT_TAPS;
use shared_dsp::DelayAlignment;

/// Accept both `41` and `41.0` from JSON.
fn as_usize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<usize, D::Error> {
    let v: serde_json::Value = Deserialize::deserialize(d)?;
    match &v {
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(|i| i as usize)
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as usize))
            .ok_or_else(|| serde::de::Error::custom(format!("cannot convert {n} to a count"))),
        _ => Err(serde::de::Error::custom(format!("expected number, got {v}"))),
    }
}

/// Accept one coefficient for every wall or six in `Wall::ALL` order.
fn as_wall_values<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<WallMap<f64>, D::Error> {
    let v: serde_json::Value = Deserialize::deserialize(d)?;
    match &v {
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(WallMap::uniform)
            .ok_or_else(|| serde::de::Error::custom(format!("cannot convert {n} to f64"))),
        serde_json::Value::Array(_) => {
            let values: [f64; 6] = serde_json::from_value(v.clone()).map_err(serde::de::Error::custom)?;
            Ok(WallMap(values))
        }
        _ => Err(serde::de::Error::custom(format!("expected number or six numbers, got {v}"))),
    }
}

/// Where the FDN delay lengths come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FdnDelays {
    /// Explicit lengths in samples.
    Fixed { delays: Vec<usize> },
    /// Closest primes to the early-reflection arrival times.
    EarlyReflections,
    /// Log-spaced coprime primes around the mean-free-path delay.
    MeanFreePath { percent: u32 },
}

impl Default for FdnDelays {
    fn default() -> Self {
        FdnDelays::Fixed {
            delays: DEFAULT_DELAYS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayModel {
    Lossless,
    Broadband,
    /// Jot one-pole from the lowest and highest band.
    OnePole,
    /// FIR loss filter following every band.
    #[default]
    PerBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RtFormula {
    #[default]
    Sabine,
    Eyring,
}

impl From<RtFormula> for Formula {
    fn from(f: RtFormula) -> Self {
        match f {
            RtFormula::Sabine => Formula::Sabine,
            RtFormula::Eyring => Formula::Eyring,
        }
    }
}

/// All rendering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RirParams {
    // --- Simulation ---
    pub fs: f64,
    pub speed_of_sound: f64,

    // --- Room ---
    pub room_dims: [f64; 3],
    pub source: Point3D,
    pub mic: Point3D,

    // --- Absorption ---
    #[serde(deserialize_with = "as_wall_values")]
    pub flat_absorption: WallMap<f64>,
    /// Material spectra per wall; the flat coefficients are used per band when absent.
    pub wall_absorption: Option<WallMap<Vec<f64>>>,
    pub center_freqs: Vec<f64>,
    pub air: Option<AirCondition>,

    // --- Early reflections ---
    /// Externally computed image sources; first order from the room when empty.
    pub image_sources: Vec<ImageSource>,
    /// Externally rendered early-reflection RIR for convolution mode.
    pub ism_rir: Option<Vec<f64>>,
    #[serde(deserialize_with = "as_usize")]
    pub frac_taps: usize,
    pub alignment: DelayAlignment,
    pub fir_type: FirType,
    #[serde(deserialize_with = "as_usize")]
    pub filter_taps: usize,
    pub direct_path: bool,

    // --- SDN ---
    pub sdn_filtered: bool,

    // --- FDN ---
    #[serde(deserialize_with = "as_usize")]
    pub fdn_order: usize,
    pub fdn_delays: FdnDelays,
    pub fdn_decay: DecayModel,
    pub rt_formula: RtFormula,
    /// Overrides the theoretical broadband RT60.
    pub fdn_rt60: Option<f64>,
    pub matrix: MatrixKind,
    pub matrix_seed: u64,
    pub tone_correction: bool,
    #[serde(deserialize_with = "as_usize")]
    pub tone_correction_taps: usize,

    #[serde(rename = "_meta", default, skip_serializing)]
    pub meta: Option<serde_json::Value>,
}

impl Default for RirParams {
    fn default() -> Self {
        Self {
            fs: 44100.0,
            speed_of_sound: 343.0,

            room_dims: [5.0, 7.0, 5.0],
            source: Point3D::new(2.9, 2.5, 2.5),
            mic: Point3D::new(4.4, 4.8, 4.7),

            flat_absorption: WallMap::uniform(0.25),
            wall_absorption: None,
            center_freqs: CENTER_FREQS.to_vec(),
            air: Some(AirCondition::default()),

            image_sources: Vec::new(),
            ism_rir: None,
            frac_taps: DEFAULT_TAPS,
            alignment: DelayAlignment::Centered,
            fir_type: FirType::TypeI,
            filter_taps: FirType::TypeI.default_taps(),
            direct_path: true,

            sdn_filtered: false,

            fdn_order: DEFAULT_DELAYS.len(),
            fdn_delays: FdnDelays::default(),
            fdn_decay: DecayModel::PerBand,
            rt_formula: RtFormula::Sabine,
            fdn_rt60: None,
            matrix: MatrixKind::Auto,
            matrix_seed: 42,
            tone_correction: true,
            tone_correction_taps: FirType::TypeII.default_taps(),

            meta: None,
        }
    }
}

impl RirParams {
    /// Parse from JSON string. Missing fields get default values.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Run every construction-time check that does not need a render.
    pub fn validate(&self) -> Result<()> {
        if !(self.fs > 0.0) {
            return config_err(format!("sample rate must be positive, got {}", self.fs));
        }
        if !(self.speed_of_sound > 0.0) {
            return config_err(format!("speed of sound must be positive, got {}", self.speed_of_sound));
        }
        if self.frac_taps % 2 == 0 {
            return config_err(format!("fractional delay needs an odd tap count, got {}", self.frac_taps));
        }
        if self.fdn_order == 0 {
            return config_err("FDN order must be at least 1");
        }
        if let Some(rt60) = self.fdn_rt60 {
            if !(rt60 > 0.0 && rt60.is_finite()) {
                return config_err(format!("RT60 must be positive and finite, got {rt60}"));
            }
        }
        self.room()?;
        self.absorption_profile()?;
        Ok(())
    }

    pub fn room(&self) -> Result<Room> {
        Room::new(self.room_dims, self.source, self.mic)
    }

    pub fn absorption_profile(&self) -> Result<AbsorptionProfile> {
        let bands = self.center_freqs.len();
        let spectra = match &self.wall_absorption {
            Some(walls) => walls.clone(),
            None => self.flat_absorption.map(|_, &a| vec![a; bands]),
        };
        AbsorptionProfile::new(self.center_freqs.clone(), &spectra, self.flat_absorption, self.air)
    }

    /// The configured image sources, or first order from the room.
    pub fn image_sources(&self, room: &Room) -> Vec<ImageSource> {
        if self.image_sources.is_empty() {
            room.first_order_image_sources()
        } else {
            self.image_sources.clone()
        }
    }

    pub fn tdl_options(&self, direct_sound: bool) -> TdlOptions {
        TdlOptions {
            fs: self.fs,
            speed_of_sound: self.speed_of_sound,
            frac_taps: self.frac_taps,
            alignment: self.alignment,
            fir_type: self.fir_type,
            filter_taps: self.filter_taps,
            direct_sound,
        }
    }

    pub fn sdn_options(&self) -> SdnOptions {
        SdnOptions {
            fs: self.fs,
            speed_of_sound: self.speed_of_sound,
            direct_path: self.direct_path,
            fir_type: self.fir_type,
            filter_taps: self.filter_taps,
        }
    }

    pub fn sdn_absorption(&self, profile: &AbsorptionProfile) -> WallAbsorption {
        if self.sdn_filtered {
            WallAbsorption::Bands(profile.clone())
        } else {
            WallAbsorption::Flat(self.flat_absorption)
        }
    }

    /// FDN decay from the configured model and the room's theoretical RT60.
    pub fn fdn_decay(&self, room: &Room, profile: &AbsorptionProfile) -> Result<Decay> {
        let formula = self.rt_formula.into();
        match self.fdn_decay {
            DecayModel::Lossless => Ok(Decay::Lossless),
            DecayModel::Broadband => {
                let rt60 = match self.fdn_rt60 {
                    Some(rt60) => rt60,
                    None => rt60_flat(room, profile, formula)?,
                };
                Ok(Decay::Broadband { rt60 })
            }
            DecayModel::OnePole => Decay::one_pole(&rt60_bands(room, profile, formula)?),
            DecayModel::PerBand => Decay::from_bands(profile.center_freqs(), &rt60_bands(room, profile, formula)?),
        }
    }
}
