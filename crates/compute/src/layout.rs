//! Positional argument layout of the raw to RGB kernel.
//!
//! Argument `i` is bound to `@group(0) @binding(i)`.

pub const INPUT: u32 = 0;
pub const OUTPUT: u32 = 1;
pub const WIDTH: u32 = 2;
pub const HEIGHT: u32 = 3;

pub const ARG_COUNT: usize = 4;

/// Bytes written per output pixel (interleaved R, G, B).
pub const RGB_CHANNELS: usize = 3;

/// Size of a scalar argument's uniform binding.
pub const SCALAR_SIZE: u32 = 4;

const _: () = assert!(HEIGHT as usize == ARG_COUNT - 1);
