use crate::config::{BackendKind, MissingRaw, PipelineConfig};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "rawrgb",
    version,
    about = "Convert a raw Bayer sensor image to a binary PPM on a compute device"
)]
pub struct Cli {
    /// Pipeline config file (JSON). Flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Image width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Image height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Raw input file (8-bit samples, no header).
    #[arg(long = "input", short = 'i')]
    pub raw_path: Option<PathBuf>,

    /// WGSL kernel source.
    #[arg(long = "kernel", short = 'k')]
    pub kernel_path: Option<PathBuf>,

    /// Output PPM file.
    #[arg(long = "output", short = 'o')]
    pub output_path: Option<PathBuf>,

    /// Kernel entry point.
    #[arg(long = "entry")]
    pub kernel_entry: Option<String>,

    /// Behaviour when the raw input cannot be opened.
    #[arg(long, value_enum)]
    pub missing_raw: Option<MissingRaw>,

    /// Give up on the device readback after this many milliseconds.
    #[arg(long)]
    pub readback_timeout_ms: Option<u64>,

    /// Device session to run on.
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Overrides `config` with every flag given on the command line.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(path) = &self.raw_path {
            config.raw_path.clone_from(path);
        }
        if let Some(path) = &self.kernel_path {
            config.kernel_path.clone_from(path);
        }
        if let Some(path) = &self.output_path {
            config.output_path.clone_from(path);
        }
        if let Some(entry) = &self.kernel_entry {
            config.kernel_entry.clone_from(entry);
        }
        if let Some(policy) = self.missing_raw {
            config.missing_raw = policy;
        }
        if let Some(ms) = self.readback_timeout_ms {
            config.readback_timeout_ms = Some(ms);
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
    }
}
