//! Orthogonal mixing and scattering matrices.
//!
//! All matrices are flattened row-major N×N and orthogonal
//! (energy-preserving).

use crate::error::{config_err, Result};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Feedback matrix selection for the FDN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixKind {
    /// Hadamard for power-of-two orders, random orthogonal otherwise.
    #[default]
    Auto,
    Hadamard,
    RandomOrthogonal,
    Householder,
}

impl MatrixKind {
    pub fn resolve(self, n: usize) -> MatrixKind {
        match self {
            MatrixKind::Auto if n.is_power_of_two() => MatrixKind::Hadamard,
            MatrixKind::Auto => MatrixKind::RandomOrthogonal,
            other => other,
        }
    }

    pub fn build(self, n: usize, seed: u64) -> Result<Vec<f64>> {
        if n == 0 {
            return config_err("matrix order must be at least 1");
        }
        match self.resolve(n) {
            MatrixKind::Hadamard => hadamard(n),
            MatrixKind::Householder => Ok(householder(n)),
            _ => Ok(random_orthogonal(n, seed)),
        }
    }
}

/// Householder reflection: A = I - (2/N) * ones * ones^T
pub fn householder(n: usize) -> Vec<f64> {
    let mut m = vec![0.0; n * n];
    let scale = 2.0 / n as f64;
    for i in 0..n {
        for j in 0..n {
            m[i * n + j] = if i == j { 1.0 - scale } else { -scale };
        }
    }
    m
}

/// Isotropic scattering matrix of an M-port junction:
/// `a_ii = 2/M - 1`, `a_ij = 2/M`. This is the negated Householder reflection.
pub fn isotropic_scattering(m: usize) -> Vec<f64> {
    householder(m).into_iter().map(|v| -v).collect()
}

/// Hadamard matrix scaled by `1/sqrt(n)`. Requires n = power of 2.
pub fn hadamard(n: usize) -> Result<Vec<f64>> {
    if !n.is_power_of_two() {
        return config_err(format!("Hadamard matrix needs a power-of-two order, got {n}"));
    }
    // the recursion normalizes at each level
    Ok(hadamard_recursive(n))
}

fn hadamard_recursive(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    let half = n / 2;
    let h = hadamard_recursive(half);
    let inv_sqrt2 = 1.0 / 2.0_f64.sqrt();
    let mut m = vec![0.0; n * n];
    for i in 0..half {
        for j in 0..half {
            let v = h[i * half + j] * inv_sqrt2;
            m[i * n + j] = v;
            m[i * n + half + j] = v;
            m[(half + i) * n + j] = v;
            m[(half + i) * n + half + j] = -v;
        }
    }
    m
}

pub fn identity(n: usize) -> Vec<f64> {
    let mut m = vec![0.0; n * n];
    for i in 0..n {
        m[i * n + i] = 1.0;
    }
    m
}

/// Random orthogonal matrix via Householder QR of a Gaussian matrix.
///
/// ChaCha8 seeded deterministically, so the same seed always yields the
/// same matrix. Columns of Q are sign-corrected by `sign(diag(R))`.
pub fn random_orthogonal(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    // Box-Muller normals
    let mut a = vec![0.0f64; n * n];
    for v in a.iter_mut() {
        let u1: f64 = loop {
            let u: f64 = rng.random();
            if u > 0.0 {
                break u;
            }
        };
        let u2: f64 = rng.random();
        *v = (-2.0_f64 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    }

    let (mut q, r) = qr_decomposition(&a, n);
    for j in 0..n {
        if r[j * n + j] < 0.0 {
            for i in 0..n {
                q[i * n + j] = -q[i * n + j];
            }
        }
    }
    q
}

/// Householder QR decomposition. Returns (Q, R) as flat row-major n×n.
fn qr_decomposition(a: &[f64], n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut r = a.to_vec();
    let mut q = identity(n);

    for k in 0..n {
        let mut x: Vec<f64> = (k..n).map(|i| r[i * n + k]).collect();

        let norm_x = x.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm_x < 1e-15 {
            continue;
        }
        let sign = if x[0] >= 0.0 { 1.0 } else { -1.0 };
        x[0] += sign * norm_x;
        let norm_v = x.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm_v < 1e-15 {
            continue;
        }
        for v in x.iter_mut() {
            *v /= norm_v;
        }

        // H = I - 2 v v^T applied to R from the left
        for j in k..n {
            let dot: f64 = (k..n).map(|i| x[i - k] * r[i * n + j]).sum();
            for i in k..n {
                r[i * n + j] -= 2.0 * x[i - k] * dot;
            }
        }

        // and to Q from the right
        for i in 0..n {
            let dot: f64 = (k..n).map(|j| q[i * n + j] * x[j - k]).sum();
            for j in k..n {
                q[i * n + j] -= 2.0 * dot * x[j - k];
            }
        }
    }

    (q, r)
}

/// y = M x for a flattened N×N matrix.
#[inline]
pub fn mat_vec(m: &[f64], x: &[f64], y: &mut [f64]) {
    let n = x.len();
    for (i, yi) in y.iter_mut().enumerate() {
        *yi = m[i * n..(i + 1) * n].iter().zip(x).map(|(a, b)| a * b).sum();
    }
}
