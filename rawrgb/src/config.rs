//! Run parameters.
//!
//! Defaults reproduce the fixed setup of the converter: a 1920x1080 frame in
//! `image.raw`, the `rawToRgb` kernel from `shaders/raw_to_rgb.wgsl`, and
//! `output_image.ppm` as the result.

use compute::DispatchOptions;
use pixmap::{Dimensions, MissingInput, PixmapError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which device session runs the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// First accelerator found through wgpu.
    #[default]
    Gpu,
    /// Host reference implementation of the shipped kernels.
    Cpu,
}

/// What to do when the raw input cannot be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MissingRaw {
    /// Abort with an error.
    #[default]
    Fail,
    /// Warn and convert an all-zero frame.
    ZeroFill,
}

impl From<MissingRaw> for MissingInput {
    fn from(policy: MissingRaw) -> Self {
        match policy {
            MissingRaw::Fail => MissingInput::Fail,
            MissingRaw::ZeroFill => MissingInput::ZeroFill,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub width: u32,
    pub height: u32,
    pub raw_path: PathBuf,
    pub kernel_path: PathBuf,
    pub output_path: PathBuf,
    pub kernel_entry: String,
    pub missing_raw: MissingRaw,
    /// Upper bound on the blocking readback, in milliseconds.
    pub readback_timeout_ms: Option<u64>,
    pub backend: BackendKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            raw_path: PathBuf::from("image.raw"),
            kernel_path: PathBuf::from("shaders/raw_to_rgb.wgsl"),
            output_path: PathBuf::from("output_image.ppm"),
            kernel_entry: compute::kernels::RAW_TO_RGB_ENTRY.to_owned(),
            missing_raw: MissingRaw::default(),
            readback_timeout_ms: None,
            backend: BackendKind::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses a JSON config; absent fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn dimensions(&self) -> Result<Dimensions, PixmapError> {
        Dimensions::new(self.width, self.height)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            readback_timeout: self.readback_timeout_ms.map(Duration::from_millis),
        }
    }
}
