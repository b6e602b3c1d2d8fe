use compute::ComputeError;
use pixmap::PixmapError;
use thiserror::Error;

pub const EXIT_IO_OPEN: u8 = 2;
pub const EXIT_NO_PLATFORM: u8 = 3;
pub const EXIT_NO_DEVICE: u8 = 4;
pub const EXIT_ALLOCATION: u8 = 5;
pub const EXIT_BUILD: u8 = 6;
pub const EXIT_SYMBOL: u8 = 7;
pub const EXIT_KERNEL_EXECUTION: u8 = 8;
pub const EXIT_DEVICE_TIMEOUT: u8 = 9;
pub const EXIT_IO: u8 = 10;
pub const EXIT_CONFIG: u8 = 11;
pub const EXIT_BACKEND_UNAVAILABLE: u8 = 12;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Compute(#[from] ComputeError),
    #[error(transparent)]
    Pixmap(#[from] PixmapError),
    #[error("the {0} backend is not compiled into this build")]
    BackendUnavailable(&'static str),
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Compute(e) => match e {
                ComputeError::NoPlatform => EXIT_NO_PLATFORM,
                ComputeError::NoDevice { .. } => EXIT_NO_DEVICE,
                ComputeError::Allocation { .. } => EXIT_ALLOCATION,
                ComputeError::Build { .. } => EXIT_BUILD,
                // Wrong parameter list for the pipeline layout.
                ComputeError::Symbol { .. } | ComputeError::ArgumentMismatch { .. } => EXIT_SYMBOL,
                ComputeError::KernelExecution { .. } => EXIT_KERNEL_EXECUTION,
                ComputeError::DeviceTimeout { .. } => EXIT_DEVICE_TIMEOUT,
            },
            PipelineError::Pixmap(e) => match e {
                PixmapError::Open { .. } => EXIT_IO_OPEN,
                PixmapError::Read { .. }
                | PixmapError::Write { .. }
                | PixmapError::EmptyKernelSource { .. }
                | PixmapError::Length { .. } => EXIT_IO,
                PixmapError::InvalidDimensions { .. } => EXIT_CONFIG,
            },
            PipelineError::BackendUnavailable(_) => EXIT_BACKEND_UNAVAILABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn every_failure_kind_has_its_own_code() {
        let cases: Vec<(PipelineError, u8)> = vec![
            (ComputeError::NoPlatform.into(), 3),
            (
                ComputeError::NoDevice {
                    platform: "Vulkan".into(),
                    reason: "none".into(),
                }
                .into(),
                4,
            ),
            (
                ComputeError::Build {
                    diagnostics: "error".into(),
                }
                .into(),
                6,
            ),
            (
                ComputeError::DeviceTimeout {
                    waited: Duration::from_secs(1),
                }
                .into(),
                9,
            ),
            (
                PixmapError::EmptyKernelSource {
                    path: "k.wgsl".into(),
                }
                .into(),
                10,
            ),
            (PixmapError::InvalidDimensions { width: 0, height: 1 }.into(), 11),
            (PipelineError::BackendUnavailable("gpu"), 12),
        ];
        for (err, code) in cases {
            assert_eq!(err.exit_code(), code, "{err}");
        }
    }
}
