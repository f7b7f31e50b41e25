//! Octave-band absorption per wall, plus the air-absorption table.
//!
//! Spectra come from an external material lookup; this module only
//! validates them, extends 6-band spectra to the 7-band grid and adds air
//! absorption where a renderer asks for it.

use crate::error::{config_err, Result};
use crate::geometry::{Wall, WallMap};
use serde::{Deserialize, Serialize};

/// Octave-band centre frequencies (Hz) used throughout.
pub const CENTER_FREQS: [f64; 7] = [125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0];

/// Temperature / relative-humidity conditions of the air-absorption table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AirCondition {
    #[serde(rename = "10C_30-50%")]
    Cold30To50,
    #[serde(rename = "10C_50-70%")]
    Cold50To70,
    #[serde(rename = "10C_70-90%")]
    Cold70To90,
    #[serde(rename = "20C_30-50%")]
    Mild30To50,
    #[default]
    #[serde(rename = "20C_50-70%")]
    Mild50To70,
    #[serde(rename = "20C_70-90%")]
    Mild70To90,
}

impl AirCondition {
    /// Air absorption per band on the `CENTER_FREQS` grid.
    pub fn coefficients(self) -> [f64; 7] {
        let table: [f64; 7] = match self {
            AirCondition::Cold30To50 => [0.1, 0.2, 0.5, 1.1, 2.7, 9.4, 29.0],
            AirCondition::Cold50To70 => [0.1, 0.2, 0.5, 0.8, 1.8, 5.9, 21.1],
            AirCondition::Cold70To90 => [0.1, 0.2, 0.5, 0.7, 1.4, 4.4, 15.8],
            AirCondition::Mild30To50 => [0.1, 0.3, 0.6, 1.0, 1.9, 5.8, 20.3],
            AirCondition::Mild50To70 => [0.1, 0.3, 0.6, 1.0, 1.7, 4.1, 13.5],
            AirCondition::Mild70To90 => [0.1, 0.3, 0.6, 1.1, 1.7, 3.5, 10.6],
        };
        table.map(|v| v * 1e-3)
    }
}

/// Check that every coefficient is finite and within [0, 1].
pub fn validate_coefficients(what: &str, alphas: &[f64]) -> Result<()> {
    if let Some(a) = alphas.iter().find(|a| !(0.0..=1.0).contains(*a)) {
        return config_err(format!("{what}: absorption coefficient {a} outside [0, 1]"));
    }
    Ok(())
}

/// Extend a spectrum to `bands` values by repeating its last entry.
pub fn extend_bands(values: &[f64], bands: usize) -> Result<Vec<f64>> {
    match values.last() {
        None => config_err("empty absorption spectrum"),
        Some(_) if values.len() > bands => config_err(format!(
            "absorption spectrum has {} bands, expected at most {bands}",
            values.len()
        )),
        Some(&last) => {
            let mut out = values.to_vec();
            out.resize(bands, last);
            Ok(out)
        }
    }
}

/// Validated per-wall absorption.
#[derive(Debug, Clone, PartialEq)]
pub struct AbsorptionProfile {
    center_freqs: Vec<f64>,
    walls: WallMap<Vec<f64>>,
    flat: WallMap<f64>,
    air: Vec<f64>,
}

impl AbsorptionProfile {
    /// `walls` are material spectra on `center_freqs` (shorter spectra are
    /// extended); `flat` are the broadband coefficients used by flat modes.
    pub fn new(
        center_freqs: Vec<f64>,
        walls: &WallMap<Vec<f64>>,
        flat: WallMap<f64>,
        air: Option<AirCondition>,
    ) -> Result<Self> {
        let bands = center_freqs.len();
        if bands == 0 {
            return config_err("no absorption centre frequencies");
        }
        let mut extended = WallMap::<Vec<f64>>::default();
        for (wall, spectrum) in walls.iter() {
            let spectrum = extend_bands(spectrum, bands)?;
            validate_coefficients(&format!("{wall:?} wall"), &spectrum)?;
            extended[wall] = spectrum;
        }
        validate_coefficients("flat absorption", &flat.0)?;

        let air = match air {
            Some(condition) => {
                let table = condition.coefficients();
                extend_bands(&table[..bands.min(table.len())], bands)?
            }
            None => vec![0.0; bands],
        };

        Ok(Self {
            center_freqs,
            walls: extended,
            flat,
            air,
        })
    }

    /// Every wall the same broadband coefficient, no air absorption.
    pub fn uniform_flat(alpha: f64) -> Result<Self> {
        let bands = WallMap::uniform(vec![alpha; CENTER_FREQS.len()]);
        Self::new(CENTER_FREQS.to_vec(), &bands, WallMap::uniform(alpha), None)
    }

    pub fn center_freqs(&self) -> &[f64] {
        &self.center_freqs
    }

    /// Material spectrum of one wall.
    pub fn material(&self, wall: Wall) -> &[f64] {
        &self.walls[wall]
    }

    /// Material plus air absorption, clamped to 1.
    pub fn with_air(&self, wall: Wall) -> Vec<f64> {
        self.walls[wall]
            .iter()
            .zip(self.air.iter())
            .map(|(m, a)| (m + a).min(1.0))
            .collect()
    }

    pub fn flat(&self, wall: Wall) -> f64 {
        self.flat[wall]
    }

    /// Mean over walls of material plus air absorption, per band.
    pub fn mean_with_air(&self) -> Vec<f64> {
        let mut mean = vec![0.0; self.center_freqs.len()];
        for wall in Wall::ALL {
            for (m, v) in mean.iter_mut().zip(self.with_air(wall)) {
                *m += v / Wall::ALL.len() as f64;
            }
        }
        mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_bands_extend_to_seven() {
        let v = extend_bands(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 7).unwrap();
        assert_eq!(v, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.6]);
        assert!(extend_bands(&[0.1; 8], 7).is_err());
        assert!(extend_bands(&[], 7).is_err());
    }

    #[test]
    fn rejects_out_of_range_absorption() {
        let walls = WallMap::uniform(vec![0.2; 7]);
        let mut bad = walls.clone();
        bad[Wall::Floor][3] = 1.2;
        assert!(AbsorptionProfile::new(CENTER_FREQS.to_vec(), &bad, WallMap::uniform(0.2), None).is_err());
        let mut flat = WallMap::uniform(0.2);
        flat[Wall::North] = -0.1;
        assert!(AbsorptionProfile::new(CENTER_FREQS.to_vec(), &walls, flat, None).is_err());
    }

    #[test]
    fn air_is_added_on_top_of_material() {
        let walls = WallMap::uniform(vec![0.2; 7]);
        let p = AbsorptionProfile::new(
            CENTER_FREQS.to_vec(),
            &walls,
            WallMap::uniform(0.2),
            Some(AirCondition::Mild50To70),
        )
        .unwrap();
        let total = p.with_air(Wall::East);
        assert!((total[6] - (0.2 + 13.5e-3)).abs() < 1e-12);
        assert_eq!(p.material(Wall::East), &[0.2; 7]);
        let mean = p.mean_with_air();
        assert!((mean[0] - (0.2 + 0.1e-3)).abs() < 1e-12);
    }

    #[test]
    fn air_condition_names() {
        let c: AirCondition = serde_json::from_str("\"10C_70-90%\"").unwrap();
        assert_eq!(c, AirCondition::Cold70To90);
    }
}
