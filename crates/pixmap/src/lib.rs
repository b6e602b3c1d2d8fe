//! Host-side image files: headerless 8-bit raw sensor dumps in, binary PPM
//! (P6) out, plus loading of kernel source text.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

use std::io;
use std::path::PathBuf;
use thiserror::Error;

mod dims;
mod ppm;
mod raw;
mod source;

pub use dims::Dimensions;
pub use ppm::{ppm_header, save_ppm, write_ppm, RgbImage};
pub use raw::{load_raw, MissingInput, RawImage};
pub use source::load_kernel_source;

#[derive(Error, Debug)]
pub enum PixmapError {
    #[error("cannot open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("cannot read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("kernel source {} is empty", .path.display())]
    EmptyKernelSource { path: PathBuf },
    #[error("expected {expected} bytes for {what}, got {actual}")]
    Length {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

pub type Result<T> = std::result::Result<T, PixmapError>;
