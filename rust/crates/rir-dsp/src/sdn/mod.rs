//! Scattering delay network: one scattering junction per wall at its
//! first-order reflection point, fully interconnected by propagation lines,
//! fed from the source and tapped by the mic.

pub mod junction;
pub mod line;
pub mod network;

pub use junction::{scattering_matrix, ScatteringJunction, WallLoss};
pub use line::{LineId, PropagationLine};
pub use network::{Network, SdnOptions, WallAbsorption};
