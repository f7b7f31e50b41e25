//! Room impulse response synthesis for shoebox rooms.
//!
//! Three engines share one parameter set:
//!
//! - a tapped delay line rendering the direct sound and image-source
//!   reflections, flat or through absorptive wall filters,
//! - a scattering delay network with one junction per wall,
//! - a feedback delay network for the late reverberant tail.
//!
//! Single entry point: `render_rir(input, params, mode) -> output`.

pub mod absorption;
pub mod chain;
pub mod error;
pub mod fdn;
pub mod filter_bank;
pub mod geometry;
pub mod matrix;
pub mod params;
pub mod primes;
pub mod reverb_time;
pub mod sdn;
pub mod tapped_delay_line;

pub use absorption::{AbsorptionProfile, AirCondition};
pub use chain::{build_renderer, render_batch, render_rir, LateReverberationEngine, RenderMode, Renderer};
pub use error::{Result, RirError};
pub use fdn::{Decay, FeedbackDelayNetwork};
pub use filter_bank::{AbsorptiveFilterBank, FirType};
pub use geometry::{Point3D, Room, Wall, WallMap};
pub use matrix::MatrixKind;
pub use params::RirParams;
pub use sdn::{Network, SdnOptions, WallAbsorption};
pub use tapped_delay_line::{TapMode, TappedDelayLine};
