//! DSP primitives shared by the room impulse response engine.

pub mod delay_line;
pub mod fir;
pub mod fractional;

pub use delay_line::{BufferOverrun, DelayLine, ZeroCapacity};
pub use fir::{fft_convolve, FirFilter};
pub use fractional::{delay_array, DelayAlignment, EvenTapCount, FractionalDelay, InvalidDelay};
