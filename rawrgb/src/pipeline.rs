//! The conversion run: load, upload, build, dispatch, save, release.

use crate::config::{BackendKind, PipelineConfig};
use crate::error::PipelineError;
use compute::{ComputeBackend, ComputeError, CpuBackend, DeviceInfo, Resources};
use pixmap::{Dimensions, RawImage, RgbImage};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Last stage a run completed; logged when a later step fails. Resources
/// are released on every exit, whatever the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Uninitialized,
    SessionOpen,
    BuffersAllocated,
    ProgramBuilt,
    Dispatched,
    Released,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub device: DeviceInfo,
    pub dims: Dimensions,
    pub output_path: PathBuf,
    pub elapsed: Duration,
}

/// Runs the pipeline on the session selected by `config.backend`.
pub fn execute(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    match config.backend {
        BackendKind::Cpu => run(config, || Ok(CpuBackend::reference())),
        BackendKind::Gpu => run_gpu(config),
    }
}

#[cfg(feature = "gpu")]
fn run_gpu(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    run(config, compute::WgpuBackend::open)
}

#[cfg(not(feature = "gpu"))]
fn run_gpu(_config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    Err(PipelineError::BackendUnavailable("gpu"))
}

/// Runs the pipeline on the session returned by `open`.
///
/// Host files are read before any device work starts, so a missing input
/// or an empty kernel never opens a session. Once a session is open, every
/// resource acquired from it is released before this returns, on success
/// and on failure alike.
pub fn run<B, F>(config: &PipelineConfig, open: F) -> Result<PipelineReport, PipelineError>
where
    B: ComputeBackend,
    F: FnOnce() -> Result<B, ComputeError>,
{
    let started = Instant::now();
    let dims = config.dimensions()?;
    let raw = pixmap::load_raw(&config.raw_path, dims, config.missing_raw.into())?;
    let source = pixmap::load_kernel_source(&config.kernel_path)?;

    let mut stage = Stage::Uninitialized;
    let device = match convert(config, &raw, &source, open, &mut stage) {
        Ok(device) => device,
        Err(e) => {
            error!(?stage, "conversion failed, device resources released");
            return Err(e);
        }
    };

    let report = PipelineReport {
        device,
        dims,
        output_path: config.output_path.clone(),
        elapsed: started.elapsed(),
    };
    info!(
        device = %report.device,
        %dims,
        elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
        "conversion finished"
    );
    Ok(report)
}

fn convert<B, F>(
    config: &PipelineConfig,
    raw: &RawImage,
    source: &str,
    open: F,
    stage: &mut Stage,
) -> Result<DeviceInfo, PipelineError>
where
    B: ComputeBackend,
    F: FnOnce() -> Result<B, ComputeError>,
{
    let dims = raw.dims();
    let mut res = Resources::new(open()?);
    *stage = Stage::SessionOpen;
    let device = res.session().info().clone();
    info!(%device, "using device");

    let input = res.create_input_buffer("raw image", raw.samples())?;
    let output = res.create_output_buffer("rgb image", dims.rgb_len())?;
    *stage = Stage::BuffersAllocated;

    res.build_kernel(source, &config.kernel_entry)?;
    *stage = Stage::ProgramBuilt;

    let rgb = res.dispatch(
        input,
        output,
        dims.width(),
        dims.height(),
        &config.dispatch_options(),
    )?;
    *stage = Stage::Dispatched;

    pixmap::save_ppm(&config.output_path, &RgbImage::from_vec(dims, rgb)?)?;

    res.release();
    *stage = Stage::Released;
    Ok(device)
}
