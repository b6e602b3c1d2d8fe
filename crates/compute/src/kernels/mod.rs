//! Kernels shipped with the crate.
//!
//! Each kernel is a WGSL entry point with the pipeline's
//! `{raw, rgb, width, height}` layout and, under the `cpu` feature, a host
//! implementation that [`crate::CpuBackend::reference`] registers under the
//! same name.

pub mod grey;
pub mod raw_to_rgb;

pub use grey::{GREY_ENTRY, GREY_SOURCE};
pub use raw_to_rgb::{RAW_TO_RGB_ENTRY, RAW_TO_RGB_SOURCE};

#[cfg(feature = "cpu")]
pub use grey::grey;
#[cfg(feature = "cpu")]
pub use raw_to_rgb::raw_to_rgb;
