//! Scattering junction at a wall's reflection point.
//!
//! Incoming pressures `p_j` (line outputs plus half the source excitation)
//! are scattered isotropically, `out_i = Σ_j a_ij p_j` with
//! `a_ii = 2/M - 1` and `a_ij = 2/M`, then attenuated by the wall.

use super::line::{LineId, PropagationLine};
use crate::error::{config_err, Result};
use crate::geometry::{Point3D, Wall};
use crate::matrix::isotropic_scattering;
use shared_dsp::FirFilter;

/// Full M×M scattering matrix, row-major.
pub fn scattering_matrix(m: usize) -> Vec<f64> {
    isotropic_scattering(m)
}

/// Wall reflection applied to every outgoing wave.
#[derive(Debug, Clone)]
pub enum WallLoss {
    /// Broadband pressure reflection `sqrt(1 - alpha)`.
    Scalar(f64),
    /// One streaming absorptive filter per outbound line.
    Filtered(Vec<FirFilter>),
}

#[derive(Debug, Clone)]
pub struct ScatteringJunction {
    wall: Wall,
    position: Point3D,
    // inbound[i] and outbound[i] connect to the same neighbour
    inbound: Vec<LineId>,
    outbound: Vec<LineId>,
    source_line: LineId,
    mic_line: LineId,
    loss: WallLoss,
    pressures: Vec<f64>,
}

impl ScatteringJunction {
    pub fn new(
        wall: Wall,
        position: Point3D,
        inbound: Vec<LineId>,
        outbound: Vec<LineId>,
        source_line: LineId,
        mic_line: LineId,
        loss: WallLoss,
    ) -> Result<Self> {
        if inbound.len() != outbound.len() {
            return config_err(format!(
                "{wall:?} junction has {} inbound and {} outbound lines",
                inbound.len(),
                outbound.len()
            ));
        }
        match &loss {
            WallLoss::Filtered(filters) if filters.len() != outbound.len() => {
                return config_err(format!(
                    "{wall:?} junction has {} loss filters for {} outbound lines",
                    filters.len(),
                    outbound.len()
                ));
            }
            WallLoss::Scalar(g) if !g.is_finite() => {
                return config_err(format!("{wall:?} junction loss {g} is not finite"));
            }
            _ => {}
        }
        let valence = inbound.len();
        Ok(Self {
            wall,
            position,
            inbound,
            outbound,
            source_line,
            mic_line,
            loss,
            pressures: vec![0.0; valence],
        })
    }

    pub fn wall(&self) -> Wall {
        self.wall
    }

    pub fn position(&self) -> Point3D {
        self.position
    }

    pub fn valence(&self) -> usize {
        self.inbound.len()
    }

    pub fn source_line(&self) -> LineId {
        self.source_line
    }

    pub fn mic_line(&self) -> LineId {
        self.mic_line
    }

    /// Read phase: gather, scatter and attenuate into `out`, returning the
    /// junction's contribution towards the mic, `(2/M) Σ out_i`.
    pub fn scatter_in(&mut self, lines: &[PropagationLine], excitation: f64, out: &mut [f64]) -> Result<f64> {
        let m = self.valence();
        if m == 0 {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for (p, &id) in self.pressures.iter_mut().zip(&self.inbound) {
            *p = lines[id].output()? + 0.5 * excitation;
            total += *p;
        }

        let w = 2.0 / m as f64;
        let mut mic = 0.0;
        for (i, (o, p)) in out.iter_mut().zip(&self.pressures).enumerate() {
            let scattered = w * total - p;
            *o = match &mut self.loss {
                WallLoss::Scalar(g) => *g * scattered,
                WallLoss::Filtered(filters) => filters[i].process(scattered),
            };
            mic += *o;
        }
        Ok(w * mic)
    }

    /// Write phase: push the scattered samples into the outbound lines.
    pub fn scatter_out(&self, lines: &mut [PropagationLine], samples: &[f64]) {
        for (&id, &s) in self.outbound.iter().zip(samples) {
            lines[id].push(s);
        }
    }

    pub fn reset(&mut self) {
        self.pressures.fill(0.0);
        if let WallLoss::Filtered(filters) = &mut self.loss {
            for f in filters {
                f.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::tests::is_orthogonal;

    /// A junction of valence `m` whose inbound lines are 0..m, outbound
    /// m..2m, source 2m, mic 2m+1.
    fn rig(m: usize, loss: WallLoss) -> (ScatteringJunction, Vec<PropagationLine>) {
        let lines: Vec<PropagationLine> = (0..2 * m + 2).map(|_| PropagationLine::with_delay(1, 1.0).unwrap()).collect();
        let j = ScatteringJunction::new(
            Wall::Floor,
            Point3D::new(1.0, 1.0, 0.0),
            (0..m).collect(),
            (m..2 * m).collect(),
            2 * m,
            2 * m + 1,
            loss,
        )
        .unwrap();
        (j, lines)
    }

    #[test]
    fn scattering_matrix_orthogonal() {
        for m in [2, 3, 4, 6] {
            assert!(is_orthogonal(&scattering_matrix(m), m, 1e-12), "m={m}");
        }
    }

    #[test]
    fn lossless_junction_conserves_energy() {
        for m in [2, 3, 4, 5, 6] {
            let (mut j, mut lines) = rig(m, WallLoss::Scalar(1.0));
            let incoming: Vec<f64> = (0..m).map(|i| (i as f64 * 0.7).sin() + 0.3).collect();
            for (i, &v) in incoming.iter().enumerate() {
                lines[i].push(v);
            }
            let mut out = vec![0.0; m];
            j.scatter_in(&lines, 0.0, &mut out).unwrap();
            let e_in: f64 = incoming.iter().map(|v| v * v).sum();
            let e_out: f64 = out.iter().map(|v| v * v).sum();
            assert!((e_in - e_out).abs() < 1e-12, "m={m}: {e_in} vs {e_out}");
        }
    }

    #[test]
    fn matches_full_matrix_product() {
        let m = 5;
        let (mut j, mut lines) = rig(m, WallLoss::Scalar(0.5));
        let incoming = [0.1, -0.4, 0.25, 0.9, -0.3];
        for (i, &v) in incoming.iter().enumerate() {
            lines[i].push(v);
        }
        let mut out = vec![0.0; m];
        let mic = j.scatter_in(&lines, 0.2, &mut out).unwrap();
        let a = scattering_matrix(m);
        let mut expected_mic = 0.0;
        for i in 0..m {
            let e: f64 = (0..m).map(|k| a[i * m + k] * (incoming[k] + 0.1)).sum::<f64>() * 0.5;
            assert!((out[i] - e).abs() < 1e-12);
            expected_mic += e;
        }
        assert!((mic - 0.4 * expected_mic).abs() < 1e-12);
    }

    #[test]
    fn scatter_out_feeds_outbound_lines() {
        let (j, mut lines) = rig(3, WallLoss::Scalar(1.0));
        j.scatter_out(&mut lines, &[1.0, 2.0, 3.0]);
        assert_eq!(lines[3].output().unwrap(), 1.0);
        assert_eq!(lines[5].output().unwrap(), 3.0);
        assert_eq!(lines[0].output().unwrap(), 0.0);
    }

    #[test]
    fn filtered_loss_keeps_state_per_line() {
        let filters = vec![FirFilter::new(vec![0.0, 1.0]); 2];
        let (mut j, mut lines) = rig(2, WallLoss::Filtered(filters));
        lines[0].push(1.0);
        let mut out = vec![0.0; 2];
        j.scatter_in(&lines, 0.0, &mut out).unwrap();
        assert_eq!(out, vec![0.0, 0.0]);
        // one-sample filter delay releases the previous scatter
        lines[0].push(0.0);
        j.scatter_in(&lines, 0.0, &mut out).unwrap();
        assert_eq!(out, vec![0.0, 1.0]);
    }

    #[test]
    fn zero_valence_is_inert() {
        let mut lines = vec![PropagationLine::with_delay(1, 1.0).unwrap(); 2];
        let mut j = ScatteringJunction::new(Wall::North, Point3D::new(0.0, 0.0, 0.0), vec![], vec![], 0, 1, WallLoss::Scalar(1.0)).unwrap();
        assert_eq!(j.scatter_in(&lines, 1.0, &mut []).unwrap(), 0.0);
        j.scatter_out(&mut lines, &[]);
        assert_eq!(lines[0].output().unwrap(), 0.0);
    }

    #[test]
    fn mismatched_filters_rejected() {
        let err = ScatteringJunction::new(
            Wall::East,
            Point3D::new(0.0, 0.0, 0.0),
            vec![0, 1],
            vec![2, 3],
            4,
            5,
            WallLoss::Filtered(vec![FirFilter::new(vec![1.0])]),
        );
        assert!(err.is_err());
    }
}
