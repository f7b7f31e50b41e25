//! Room-level scattering delay network.
//!
//! Topology is built once per room and never changes; rendering only
//! mutates line buffers and loss-filter state. Every sample runs in two
//! phases so no junction sees another junction's output from the same
//! step: all reads borrow the line arena immutably, then all writes borrow
//! it mutably.

use super::junction::{ScatteringJunction, WallLoss};
use super::line::{LineId, PropagationLine};
use crate::absorption::{validate_coefficients, AbsorptionProfile};
use crate::error::{config_err, Result, RirError};
use crate::filter_bank::{AbsorptiveFilterBank, FirType, Reflectance};
use crate::geometry::{Room, Wall, WallMap};
use crate::tapped_delay_line::spreading_gain;
use shared_dsp::FirFilter;
use tracing::debug;

/// Wall absorption for the network.
#[derive(Debug, Clone)]
pub enum WallAbsorption {
    /// Broadband coefficient per wall.
    Flat(WallMap<f64>),
    /// Octave-band spectra, realised as absorptive FIRs.
    Bands(AbsorptionProfile),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SdnOptions {
    pub fs: f64,
    pub speed_of_sound: f64,
    /// Include the source→mic line.
    pub direct_path: bool,
    pub fir_type: FirType,
    pub filter_taps: usize,
}

impl Default for SdnOptions {
    fn default() -> Self {
        Self {
            fs: 44100.0,
            speed_of_sound: 343.0,
            direct_path: true,
            fir_type: FirType::TypeI,
            filter_taps: FirType::TypeI.default_taps(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Network {
    lines: Vec<PropagationLine>,
    junctions: Vec<ScatteringJunction>,
    direct: Option<LineId>,
    excitations: Vec<f64>,
    scattered: Vec<Vec<f64>>,
    mic_samples: Vec<f64>,
}

impl Network {
    pub fn new(room: &Room, absorption: &WallAbsorption, options: SdnOptions) -> Result<Self> {
        let SdnOptions { fs, speed_of_sound: c, .. } = options;
        if !(fs > 0.0) || !(c > 0.0) {
            return config_err(format!(
                "sample rate and speed of sound must be positive, got {fs} and {c}"
            ));
        }

        let bank = match absorption {
            WallAbsorption::Flat(alphas) => {
                validate_coefficients("SDN wall absorption", &alphas.0)?;
                None
            }
            WallAbsorption::Bands(profile) => Some(AbsorptiveFilterBank::for_walls(
                profile,
                fs,
                options.fir_type,
                options.filter_taps,
                Reflectance::Pressure,
            )?),
        };

        let source = room.source();
        let mic = room.mic();
        let points = WallMap::from_fn(|w| room.reflection_point(w));
        let n = Wall::ALL.len();
        let mut lines = Vec::new();

        let mut source_lines = Vec::with_capacity(n);
        let mut mic_lines = Vec::with_capacity(n);
        for wall in Wall::ALL {
            let to_junction = source.distance(&points[wall]);
            let to_mic = points[wall].distance(&mic);
            source_lines.push(lines.len());
            lines.push(PropagationLine::new(to_junction, c, fs, spreading_gain(to_junction))?);
            mic_lines.push(lines.len());
            lines.push(PropagationLine::new(to_mic, c, fs, 1.0 / (1.0 + to_mic / to_junction))?);
        }

        // between[k][l]: line from junction k to junction l
        let mut between = vec![vec![0; n]; n];
        for (k, &from) in Wall::ALL.iter().enumerate() {
            for (l, &to) in Wall::ALL.iter().enumerate() {
                if k != l {
                    between[k][l] = lines.len();
                    lines.push(PropagationLine::new(points[from].distance(&points[to]), c, fs, 1.0)?);
                }
            }
        }

        let mut junctions = Vec::with_capacity(n);
        for (k, &wall) in Wall::ALL.iter().enumerate() {
            let inbound: Vec<LineId> = (0..n).filter(|&l| l != k).map(|l| between[l][k]).collect();
            let outbound: Vec<LineId> = (0..n).filter(|&l| l != k).map(|l| between[k][l]).collect();
            let loss = match (&bank, absorption) {
                (Some(bank), _) => {
                    let coeffs = &bank.filter(wall).minimum;
                    WallLoss::Filtered(vec![FirFilter::new(coeffs.clone()); outbound.len()])
                }
                (None, WallAbsorption::Flat(alphas)) => WallLoss::Scalar((1.0 - alphas[wall]).sqrt()),
                (None, WallAbsorption::Bands(_)) => WallLoss::Scalar(1.0),
            };
            junctions.push(ScatteringJunction::new(
                wall,
                points[wall],
                inbound,
                outbound,
                source_lines[k],
                mic_lines[k],
                loss,
            )?);
        }

        let direct = if options.direct_path {
            let r = source.distance(&mic);
            lines.push(PropagationLine::new(r, c, fs, spreading_gain(r))?);
            Some(lines.len() - 1)
        } else {
            None
        };

        debug!(
            junctions = junctions.len(),
            lines = lines.len(),
            filtered = bank.is_some(),
            "built scattering delay network"
        );

        let valence = n - 1;
        Ok(Self {
            lines,
            junctions,
            direct,
            excitations: vec![0.0; n],
            scattered: vec![vec![0.0; valence]; n],
            mic_samples: vec![0.0; n],
        })
    }

    pub fn junctions(&self) -> &[ScatteringJunction] {
        &self.junctions
    }

    pub fn lines(&self) -> &[PropagationLine] {
        &self.lines
    }

    /// Advance one sample.
    pub fn process(&mut self, x: f64) -> Result<f64> {
        let mut y = 0.0;
        if let Some(d) = self.direct {
            y += self.lines[d].output()?;
        }
        for (k, j) in self.junctions.iter().enumerate() {
            y += self.lines[j.mic_line()].output()?;
            self.excitations[k] = self.lines[j.source_line()].output()?;
        }

        // phase 1: scatter on frozen line state
        for (k, j) in self.junctions.iter_mut().enumerate() {
            self.mic_samples[k] = j.scatter_in(&self.lines, self.excitations[k], &mut self.scattered[k])?;
        }

        // phase 2: write
        for (k, j) in self.junctions.iter().enumerate() {
            j.scatter_out(&mut self.lines, &self.scattered[k]);
            self.lines[j.mic_line()].push(self.mic_samples[k]);
            self.lines[j.source_line()].push(x);
        }
        if let Some(d) = self.direct {
            self.lines[d].push(x);
        }
        Ok(y)
    }

    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
        for j in &mut self.junctions {
            j.reset();
        }
    }

    /// Reset, then run `input` through sample by sample.
    pub fn render(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.reset();
        let mut out = Vec::with_capacity(input.len());
        for (index, &x) in input.iter().enumerate() {
            let y = self.process(x)?;
            if !y.is_finite() {
                return Err(RirError::NonFinite { stage: "sdn", index });
            }
            out.push(y);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3D;

    const FS: f64 = 44100.0;
    const C: f64 = 343.0;

    fn room() -> Room {
        Room::new([5.0, 7.0, 5.0], Point3D::new(2.9, 2.5, 2.5), Point3D::new(4.4, 4.8, 4.7)).unwrap()
    }

    fn impulse(len: usize) -> Vec<f64> {
        let mut x = vec![0.0; len];
        x[0] = 1.0;
        x
    }

    fn samples(distance: f64) -> usize {
        ((distance / C * FS).round() as usize).max(1)
    }

    #[test]
    fn topology_is_fully_connected() {
        let net = Network::new(&room(), &WallAbsorption::Flat(WallMap::uniform(0.2)), SdnOptions::default()).unwrap();
        assert_eq!(net.junctions().len(), 6);
        assert!(net.junctions().iter().all(|j| j.valence() == 5));
        // 6 source + 6 mic + 30 junction pairs + direct
        assert_eq!(net.lines().len(), 43);
    }

    #[test]
    fn fully_absorbing_walls_leave_only_the_direct_path() {
        let r = room();
        let mut net = Network::new(&r, &WallAbsorption::Flat(WallMap::uniform(1.0)), SdnOptions::default()).unwrap();
        let y = net.render(&impulse(4000)).unwrap();
        let d = r.source().distance(&r.mic());
        let direct = samples(d);
        for (i, &v) in y.iter().enumerate() {
            if i == direct {
                assert!((v - 1.0 / d).abs() < 1e-12);
            } else {
                assert!(v.abs() < 1e-15, "sample {i} = {v}");
            }
        }
    }

    #[test]
    fn first_reflection_matches_image_source_amplitude() {
        let r = room();
        let alpha: f64 = 0.36;
        let options = SdnOptions {
            direct_path: false,
            ..SdnOptions::default()
        };
        let mut net = Network::new(&r, &WallAbsorption::Flat(WallMap::uniform(alpha)), options).unwrap();
        let y = net.render(&impulse(2000)).unwrap();

        let arrivals: Vec<(usize, f64)> = Wall::ALL
            .iter()
            .map(|&w| {
                let p = r.reflection_point(w);
                let a = r.source().distance(&p);
                let b = p.distance(&r.mic());
                (samples(a) + samples(b), 1.0 / (a + b))
            })
            .collect();
        let first = arrivals.iter().map(|(t, _)| *t).min().unwrap();
        let expected: f64 = arrivals.iter().filter(|(t, _)| *t == first).map(|(_, g)| g).sum::<f64>() * (1.0 - alpha).sqrt();

        assert!(y[..first].iter().all(|v| *v == 0.0));
        assert!((y[first] - expected).abs() < 1e-12, "{} vs {expected}", y[first]);
    }

    #[test]
    fn absorbing_room_decays() {
        let mut net = Network::new(&room(), &WallAbsorption::Flat(WallMap::uniform(0.3)), SdnOptions::default()).unwrap();
        let y = net.render(&impulse(22050)).unwrap();
        let e = |a: usize, b: usize| y[a..b].iter().map(|s| s * s).sum::<f64>();
        assert!(e(16000, 22050) < 0.01 * e(0, 6000));
    }

    #[test]
    fn render_is_repeatable() {
        let mut net = Network::new(&room(), &WallAbsorption::Flat(WallMap::uniform(0.2)), SdnOptions::default()).unwrap();
        let a = net.render(&impulse(3000)).unwrap();
        let b = net.render(&impulse(3000)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn band_absorption_uses_filters() {
        let profile = AbsorptionProfile::uniform_flat(0.2).unwrap();
        let options = SdnOptions {
            filter_taps: 31,
            ..SdnOptions::default()
        };
        let mut net = Network::new(&room(), &WallAbsorption::Bands(profile), options).unwrap();
        let y = net.render(&impulse(3000)).unwrap();
        assert!(y.iter().all(|v| v.is_finite()));
        assert!(y.iter().skip(600).any(|v| v.abs() > 0.0));
    }

    #[test]
    fn nan_input_reported_on_direct_arrival() {
        let r = room();
        let mut net = Network::new(&r, &WallAbsorption::Flat(WallMap::uniform(0.2)), SdnOptions::default()).unwrap();
        let mut x = vec![0.0; 2000];
        x[10] = f64::NAN;
        // the direct line is shorter than every reflection path
        let index = 10 + samples(r.source().distance(&r.mic()));
        let err = net.render(&x);
        assert!(
            matches!(err, Err(RirError::NonFinite { stage: "sdn", index: i }) if i == index),
            "{err:?}"
        );
    }

    #[test]
    fn rejects_bad_absorption() {
        let err = Network::new(&room(), &WallAbsorption::Flat(WallMap::uniform(1.5)), SdnOptions::default());
        assert!(matches!(err, Err(RirError::Configuration(_))));
    }
}
