//! Argument binding, launch geometry and the enqueue-then-read sequence.

use crate::backend::{Access, ComputeBackend, DeviceBuffer, KernelArg, KernelHandle};
use crate::layout::{ARG_COUNT, RGB_CHANNELS, SCALAR_SIZE};
use crate::program::{KernelSignature, ParamKind};
use crate::ComputeError;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Upper bound on the blocking readback; `None` waits indefinitely.
    pub readback_timeout: Option<Duration>,
}

/// Number of workgroups needed to cover a `width` x `height` grid.
///
/// Rounds up, so the last row and column of workgroups may extend past the
/// image; kernels guard `gid.x < width && gid.y < height`. The z dimension
/// is always one workgroup, and kernels must declare a depth of 1 so each
/// pixel is visited by exactly one invocation.
pub fn launch_grid(signature: &KernelSignature, width: u32, height: u32) -> Result<[u32; 3], ComputeError> {
    let [sx, sy, sz] = signature.workgroup_size;
    if sx == 0 || sy == 0 || sz != 1 {
        return Err(ComputeError::mismatch(
            &signature.entry,
            format!("2D kernels must declare @workgroup_size(x, y, 1), found ({sx}, {sy}, {sz})"),
        ));
    }
    Ok([width.div_ceil(sx), height.div_ceil(sy), 1])
}

/// Checks `args` against the reflected `signature`: count, then per position
/// buffer vs scalar, access mode and scalar size.
pub fn check_arguments<B: DeviceBuffer>(
    signature: &KernelSignature,
    args: &[KernelArg<'_, B>],
) -> Result<(), ComputeError> {
    let entry = signature.entry.as_str();
    if args.len() != signature.params.len() {
        return Err(ComputeError::mismatch(
            entry,
            format!(
                "kernel declares {} parameters, {} arguments supplied",
                signature.params.len(),
                args.len()
            ),
        ));
    }

    for (index, (arg, param)) in args.iter().zip(&signature.params).enumerate() {
        match (arg, param.kind) {
            (KernelArg::Buffer(buffer), ParamKind::StorageRead) if buffer.access() == Access::ReadOnly => {}
            (KernelArg::Buffer(buffer), ParamKind::StorageReadWrite) if buffer.access() == Access::WriteOnly => {}
            (KernelArg::U32(_), ParamKind::Uniform { size }) if size == SCALAR_SIZE => {}
            (arg, kind) => {
                return Err(ComputeError::mismatch(
                    entry,
                    format!("argument {index} is {arg:?}, parameter expects {kind:?}"),
                ))
            }
        }
    }
    Ok(())
}

/// Runs the raw to RGB kernel once and returns the output buffer contents.
///
/// Binds `(input, output, width, height)` in that order, launches one
/// invocation per pixel and blocks until the output has been read back.
/// Because the session queue is in order, the read observes the completed
/// kernel.
pub fn run<B: ComputeBackend>(
    session: &B,
    kernel: &B::Kernel,
    input: &B::Buffer,
    output: &B::Buffer,
    width: u32,
    height: u32,
    options: &DispatchOptions,
) -> Result<Vec<u8>, ComputeError> {
    let signature = kernel.signature();
    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| ComputeError::mismatch(&signature.entry, format!("{width}x{height} overflows")))?;
    if input.len() != pixels {
        return Err(ComputeError::mismatch(
            &signature.entry,
            format!("input buffer holds {} bytes, {width}x{height} needs {pixels}", input.len()),
        ));
    }
    if Some(output.len()) != pixels.checked_mul(RGB_CHANNELS) {
        return Err(ComputeError::mismatch(
            &signature.entry,
            format!(
                "output buffer holds {} bytes, {width}x{height} RGB needs {}",
                output.len(),
                pixels.saturating_mul(RGB_CHANNELS)
            ),
        ));
    }

    let args: [KernelArg<'_, B::Buffer>; ARG_COUNT] = [
        KernelArg::Buffer(input),
        KernelArg::Buffer(output),
        KernelArg::U32(width),
        KernelArg::U32(height),
    ];
    check_arguments(signature, &args)?;
    let workgroups = launch_grid(signature, width, height)?;

    debug!(
        entry = %signature.entry,
        width,
        height,
        ?workgroups,
        workgroup_size = ?signature.workgroup_size,
        "enqueueing kernel"
    );
    let start = Instant::now();
    session.enqueue_kernel(kernel, &args, workgroups)?;
    let bytes = session.read_buffer_blocking(output, options.readback_timeout)?;
    info!(
        entry = %signature.entry,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "kernel finished"
    );
    Ok(bytes)
}
