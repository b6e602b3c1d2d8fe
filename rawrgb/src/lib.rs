//! # rawrgb
//!
//! Converts a headerless 8-bit Bayer sensor dump into a binary PPM by
//! running a WGSL compute kernel over every pixel.
//!
//! The work is split across the workspace:
//!
//! - [`pixmap`] reads the raw frame and kernel source and writes the PPM.
//! - [`compute`] owns the device session, buffers, program and kernel, and
//!   releases them in order.
//! - this crate wires them together ([`pipeline`]), and provides the
//!   configuration layer ([`config`], [`cli`]) and exit codes ([`error`]).

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;

pub use config::{BackendKind, MissingRaw, PipelineConfig};
pub use error::PipelineError;
pub use pipeline::{execute, PipelineReport};
