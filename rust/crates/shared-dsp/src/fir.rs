//! FIR filtering: a streaming direct-form filter that carries its state
//! across calls, and one-shot FFT convolution.

use realfft::{FftError, RealFftPlanner};

/// Streaming FIR filter. State persists between `process` calls until `reset`.
#[derive(Debug, Clone)]
pub struct FirFilter {
    coeffs: Vec<f64>,
    history: Vec<f64>,
    pos: usize,
}

impl FirFilter {
    pub fn new(coeffs: Vec<f64>) -> Self {
        let len = coeffs.len().max(1);
        Self {
            coeffs,
            history: vec![0.0; len],
            pos: 0,
        }
    }

    /// Filter one sample.
    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        if self.coeffs.is_empty() {
            return 0.0;
        }
        let n = self.history.len();
        self.history[self.pos] = x;
        let mut acc = 0.0;
        let mut idx = self.pos;
        for &b in &self.coeffs {
            acc += b * self.history[idx];
            idx = if idx == 0 { n - 1 } else { idx - 1 };
        }
        self.pos = (self.pos + 1) % n;
        acc
    }

    /// Filter a block in place, continuing from the current state.
    pub fn process_block(&mut self, block: &mut [f64]) {
        for s in block.iter_mut() {
            *s = self.process(*s);
        }
    }

    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.pos = 0;
    }
}

/// Return the smallest power of 2 >= n.
pub fn next_pow2(n: usize) -> usize {
    let mut p = 1;
    while p < n {
        p <<= 1;
    }
    p
}

/// Convolve x with h using FFT, padded to next power of 2. Returns the
/// first `x.len()` samples.
pub fn fft_convolve(x: &[f64], h: &[f64]) -> Result<Vec<f64>, FftError> {
    if x.is_empty() || h.is_empty() {
        return Ok(vec![0.0; x.len()]);
    }
    let n = x.len() + h.len() - 1;
    let fft_size = next_pow2(n);

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_size);
    let ifft = planner.plan_fft_inverse(fft_size);

    let mut x_buf = vec![0.0; fft_size];
    x_buf[..x.len()].copy_from_slice(x);
    let mut x_spec = fft.make_output_vec();
    let mut scratch = fft.make_scratch_vec();
    fft.process_with_scratch(&mut x_buf, &mut x_spec, &mut scratch)?;

    let mut h_buf = vec![0.0; fft_size];
    h_buf[..h.len()].copy_from_slice(h);
    let mut h_spec = fft.make_output_vec();
    fft.process_with_scratch(&mut h_buf, &mut h_spec, &mut scratch)?;

    for (a, b) in x_spec.iter_mut().zip(h_spec.iter()) {
        *a = *a * *b;
    }
    // the product of two real spectra keeps DC and Nyquist real; clear rounding residue
    x_spec[0].im = 0.0;
    if let Some(last) = x_spec.last_mut() {
        last.im = 0.0;
    }

    let mut out_buf = ifft.make_output_vec();
    let mut iscratch = ifft.make_scratch_vec();
    ifft.process_with_scratch(&mut x_spec, &mut out_buf, &mut iscratch)?;

    // realfft inverse is unnormalized
    let norm = 1.0 / fft_size as f64;
    Ok(out_buf.iter().take(x.len()).map(|&s| s * norm).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_convolve(x: &[f64], h: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; x.len()];
        for i in 0..x.len() {
            for (k, &hk) in h.iter().enumerate() {
                if i >= k {
                    y[i] += hk * x[i - k];
                }
            }
        }
        y
    }

    #[test]
    fn streaming_matches_direct_convolution() {
        let h = vec![0.5, -0.25, 0.125, 0.0625];
        let x: Vec<f64> = (0..32).map(|i| ((i * 7) % 5) as f64 - 2.0).collect();
        let mut f = FirFilter::new(h.clone());
        let y: Vec<f64> = x.iter().map(|&s| f.process(s)).collect();
        let expected = direct_convolve(&x, &h);
        for (a, b) in y.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn state_carries_across_blocks() {
        let h = vec![1.0, 1.0, 1.0];
        let mut f = FirFilter::new(h);
        let mut a = [1.0, 0.0];
        let mut b = [0.0, 0.0];
        f.process_block(&mut a);
        f.process_block(&mut b);
        assert_eq!(a, [1.0, 1.0]);
        assert_eq!(b, [1.0, 0.0]);
        f.reset();
        assert_eq!(f.process(0.0), 0.0);
    }

    #[test]
    fn fft_convolution_matches_direct() {
        let h: Vec<f64> = (0..17).map(|i| 1.0 / (i as f64 + 1.0)).collect();
        let x: Vec<f64> = (0..100).map(|i| (i as f64 * 0.37).sin()).collect();
        let y = fft_convolve(&x, &h).unwrap();
        let expected = direct_convolve(&x, &h);
        assert_eq!(y.len(), x.len());
        for (a, b) in y.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
