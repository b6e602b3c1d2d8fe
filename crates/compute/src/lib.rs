//! Device-side half of the raw to RGB pipeline.
//!
//! The crate is a thin layer over compute devices. A [`ComputeBackend`] is an
//! open device session (platform, device, context and in-order queue) that
//! can allocate buffers, build WGSL programs and run kernels over a 2D grid.
//! Two sessions exist:
//!
//! - [`WgpuBackend`] (feature `gpu`) runs kernels on the first accelerator
//!   found through `wgpu`.
//! - [`CpuBackend`] (feature `cpu`, default) is a host reference device that
//!   runs Rust implementations of the same entry points. It backs the tests
//!   and the `--backend cpu` option of the binary.
//!
//! On top of a session, [`dispatch::run`] binds the fixed
//! `{input, output, width, height}` argument list and performs the blocking
//! readback, and [`Resources`] releases everything in dependency order.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub mod backend;
pub mod dispatch;
pub mod kernels;
pub mod layout;
pub mod lifetime;
pub mod program;

#[cfg(feature = "cpu")]
pub mod cpu_backend;
#[cfg(feature = "gpu")]
pub mod wgpu_backend;

pub use backend::{Access, ComputeBackend, DeviceBuffer, DeviceInfo, KernelArg, KernelHandle};
pub use dispatch::DispatchOptions;
pub use lifetime::{BufferId, ResourceKind, Resources};
pub use program::{KernelSignature, Param, ParamKind, ProgramSource};

#[cfg(feature = "cpu")]
pub use cpu_backend::CpuBackend;
#[cfg(feature = "gpu")]
pub use wgpu_backend::WgpuBackend;

/// Status reported by a device when a submitted operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// The device rejected a command (bad binding, bad dispatch size, ...).
    Validation,
    /// The device ran out of memory while executing.
    OutOfMemory,
    /// Mapping the readback buffer failed.
    MapFailed,
    /// The device stopped answering (callback dropped, device lost).
    Lost,
    /// A host reference kernel panicked.
    HostFault,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceStatus::Validation => "validation",
            DeviceStatus::OutOfMemory => "out of memory",
            DeviceStatus::MapFailed => "map failed",
            DeviceStatus::Lost => "device lost",
            DeviceStatus::HostFault => "host fault",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("no compute platform found")]
    NoPlatform,
    #[error("no accelerator device on platform {platform}: {reason}")]
    NoDevice { platform: String, reason: String },
    #[error("cannot allocate {bytes} bytes for buffer `{label}`: {reason}")]
    Allocation {
        label: String,
        bytes: usize,
        reason: String,
    },
    #[error("kernel program failed to build:\n{diagnostics}")]
    Build { diagnostics: String },
    #[error("entry point `{entry}` not found (compute entry points: {})", entry_list(.available))]
    Symbol {
        entry: String,
        available: Vec<String>,
    },
    #[error("kernel `{entry}` argument mismatch: {detail}")]
    ArgumentMismatch { entry: String, detail: String },
    #[error("kernel execution failed ({status}): {message}")]
    KernelExecution {
        status: DeviceStatus,
        message: String,
    },
    #[error("device did not finish within {waited:?}")]
    DeviceTimeout { waited: Duration },
}

impl ComputeError {
    pub(crate) fn mismatch(entry: &str, detail: impl Into<String>) -> Self {
        ComputeError::ArgumentMismatch {
            entry: entry.to_owned(),
            detail: detail.into(),
        }
    }
}

fn entry_list(available: &[String]) -> String {
    if available.is_empty() {
        "none".to_owned()
    } else {
        available.join(", ")
    }
}
