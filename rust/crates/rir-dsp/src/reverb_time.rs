//! Statistical reverberation time from room volume and surface absorption.

use crate::absorption::{validate_coefficients, AbsorptionProfile};
use crate::error::{config_err, Result, RirError};
use crate::geometry::{Room, Wall};

const SABINE_CONSTANT: f64 = 0.161;

fn check_inputs(volume: f64, areas: &[f64], alphas: &[f64]) -> Result<()> {
    if !(volume > 0.0) {
        return config_err(format!("room volume must be positive, got {volume}"));
    }
    if areas.len() != alphas.len() || areas.is_empty() {
        return config_err(format!(
            "{} surface areas for {} absorption coefficients",
            areas.len(),
            alphas.len()
        ));
    }
    validate_coefficients("reverberation time", alphas)
}

/// Sabine: `0.161 V / Σ S_i α_i`.
pub fn sabine(volume: f64, areas: &[f64], alphas: &[f64]) -> Result<f64> {
    check_inputs(volume, areas, alphas)?;
    let absorption: f64 = areas.iter().zip(alphas).map(|(s, a)| s * a).sum();
    if absorption <= 0.0 {
        return Err(RirError::NumericDomain(
            "Sabine reverberation time is unbounded without absorption".into(),
        ));
    }
    Ok(SABINE_CONSTANT * volume / absorption)
}

/// Eyring: `0.161 V / (-S ln(1 - Σ S_i α_i / S))`.
pub fn eyring(volume: f64, areas: &[f64], alphas: &[f64]) -> Result<f64> {
    check_inputs(volume, areas, alphas)?;
    let absorption: f64 = areas.iter().zip(alphas).map(|(s, a)| s * a).sum();
    let total: f64 = areas.iter().sum();
    if absorption >= total {
        return Err(RirError::NumericDomain(format!(
            "total absorption {absorption} must be below total area {total}"
        )));
    }
    if absorption <= 0.0 {
        return Err(RirError::NumericDomain(
            "Eyring reverberation time is unbounded without absorption".into(),
        ));
    }
    Ok(SABINE_CONSTANT * volume / (-total * (1.0 - absorption / total).ln()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formula {
    Sabine,
    Eyring,
}

/// RT60 per octave band from the room's wall spectra plus air absorption.
pub fn rt60_bands(room: &Room, profile: &AbsorptionProfile, formula: Formula) -> Result<Vec<f64>> {
    let areas = room.surface_areas();
    let spectra: Vec<Vec<f64>> = Wall::ALL.iter().map(|&w| profile.with_air(w)).collect();
    (0..profile.center_freqs().len())
        .map(|band| {
            let alphas: Vec<f64> = spectra.iter().map(|s| s[band]).collect();
            match formula {
                Formula::Sabine => sabine(room.volume(), &areas.0, &alphas),
                Formula::Eyring => eyring(room.volume(), &areas.0, &alphas),
            }
        })
        .collect()
}

/// Broadband RT60 from the flat per-wall coefficients.
pub fn rt60_flat(room: &Room, profile: &AbsorptionProfile, formula: Formula) -> Result<f64> {
    let areas = room.surface_areas();
    let alphas: Vec<f64> = Wall::ALL.iter().map(|&w| profile.flat(w)).collect();
    match formula {
        Formula::Sabine => sabine(room.volume(), &areas.0, &alphas),
        Formula::Eyring => eyring(room.volume(), &areas.0, &alphas),
    }
}

/// Schroeder frequency `2000 sqrt(RT60 / V)` in Hz.
pub fn schroeder_frequency(rt60: f64, volume: f64) -> f64 {
    2000.0 * (rt60 / volume).sqrt()
}

/// Early/late crossover as a multiple of the Schroeder frequency.
pub fn transition_frequency(rt60: f64, volume: f64, multiple: f64) -> f64 {
    multiple * schroeder_frequency(rt60, volume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3D;

    #[test]
    fn sabine_matches_closed_form() {
        let rt = sabine(175.0, &[35.0, 35.0, 25.0, 25.0, 35.0, 35.0], &[0.25; 6]).unwrap();
        assert!((rt - 0.161 * 175.0 / (190.0 * 0.25)).abs() < 1e-12);
    }

    #[test]
    fn eyring_is_shorter_than_sabine() {
        let areas = [35.0, 35.0, 25.0, 25.0, 35.0, 35.0];
        let s = sabine(175.0, &areas, &[0.3; 6]).unwrap();
        let e = eyring(175.0, &areas, &[0.3; 6]).unwrap();
        assert!(e < s);
    }

    #[test]
    fn eyring_domain() {
        let err = eyring(100.0, &[10.0, 10.0], &[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, RirError::NumericDomain(_)));
    }

    #[test]
    fn rejects_out_of_range_absorption() {
        let err = sabine(100.0, &[10.0, 10.0], &[0.5, 1.5]).unwrap_err();
        assert!(matches!(err, RirError::Configuration(_)));
    }

    #[test]
    fn per_band_profile() {
        let room = Room::new([5.0, 7.0, 5.0], Point3D::new(2.9, 2.5, 2.5), Point3D::new(4.4, 4.8, 4.7)).unwrap();
        let profile = AbsorptionProfile::uniform_flat(0.25).unwrap();
        let bands = rt60_bands(&room, &profile, Formula::Sabine).unwrap();
        assert_eq!(bands.len(), 7);
        let flat = rt60_flat(&room, &profile, Formula::Sabine).unwrap();
        assert!(bands.iter().all(|b| (b - flat).abs() < 1e-12));
    }

    #[test]
    fn schroeder() {
        assert!((schroeder_frequency(1.0, 100.0) - 200.0).abs() < 1e-12);
        assert!((transition_frequency(1.0, 100.0, 4.0) - 800.0).abs() < 1e-12);
    }
}
