//! Error taxonomy for the rendering engine.
//!
//! Everything except `NonFinite` is raised while building a renderer;
//! a render either completes or stops at the first bad sample.

use shared_dsp::{BufferOverrun, EvenTapCount, InvalidDelay, ZeroCapacity};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RirError {
    /// Invalid geometry, absorption, array lengths, tap parity or delay set.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input outside a formula's mathematical domain.
    #[error("numeric domain error: {0}")]
    NumericDomain(String),

    #[error(transparent)]
    BufferOverrun(#[from] BufferOverrun),

    /// A render produced NaN or infinity.
    #[error("non-finite sample at index {index} in {stage}")]
    NonFinite { stage: &'static str, index: usize },

    #[error("invalid parameters: {0}")]
    Params(#[from] serde_json::Error),

    #[error("fft: {0}")]
    Fft(#[from] realfft::FftError),
}

impl From<EvenTapCount> for RirError {
    fn from(e: EvenTapCount) -> Self {
        RirError::Configuration(e.to_string())
    }
}

impl From<ZeroCapacity> for RirError {
    fn from(e: ZeroCapacity) -> Self {
        RirError::Configuration(e.to_string())
    }
}

impl From<InvalidDelay> for RirError {
    fn from(e: InvalidDelay) -> Self {
        RirError::Configuration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RirError>;

/// Shorthand for a configuration failure.
pub(crate) fn config_err<T>(msg: impl Into<String>) -> Result<T> {
    Err(RirError::Configuration(msg.into()))
}

/// Stop at the first non-finite sample of a finished buffer.
pub(crate) fn check_finite(stage: &'static str, samples: &[f64]) -> Result<()> {
    match samples.iter().position(|s| !s.is_finite()) {
        Some(index) => Err(RirError::NonFinite { stage, index }),
        None => Ok(()),
    }
}
