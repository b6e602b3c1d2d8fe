use crate::{ComputeError, KernelSignature};
use std::fmt;
use std::time::Duration;

/// Access mode a buffer is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Filled from host memory at creation, read by kernels.
    ReadOnly,
    /// Written by kernels, read back by the host.
    WriteOnly,
}

/// Human readable identity of the platform and device behind a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub platform: String,
    pub name: String,
    pub kind: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) on {}", self.name, self.kind, self.platform)
    }
}

pub trait DeviceBuffer {
    fn label(&self) -> &str;
    /// Logical size in bytes, fixed at creation.
    fn len(&self) -> usize;
    fn access(&self) -> Access;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait KernelHandle {
    fn signature(&self) -> &KernelSignature;
}

/// One positional kernel argument.
pub enum KernelArg<'a, B> {
    Buffer(&'a B),
    U32(u32),
}

impl<B> Clone for KernelArg<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for KernelArg<'_, B> {}

impl<B: DeviceBuffer> fmt::Debug for KernelArg<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelArg::Buffer(buffer) => write!(f, "Buffer({}, {} bytes)", buffer.label(), buffer.len()),
            KernelArg::U32(value) => write!(f, "U32({value})"),
        }
    }
}

/// An open device session.
///
/// A session owns the platform, device, context and an in-order command
/// queue. Every operation below is issued on that one queue, so work
/// enqueued in program order executes in program order; the only host-side
/// wait is [`ComputeBackend::read_buffer_blocking`].
///
/// Sessions are opened by backend specific constructors
/// (`WgpuBackend::open`, `CpuBackend::open`) and released by dropping them,
/// after every buffer, program and kernel created through them.
pub trait ComputeBackend {
    type Buffer: DeviceBuffer;
    type Program;
    type Kernel: KernelHandle;

    fn info(&self) -> &DeviceInfo;

    /// Allocates a read-only buffer and copies `bytes` into it in one transfer.
    fn create_input_buffer(&self, label: &str, bytes: &[u8]) -> Result<Self::Buffer, ComputeError>;

    /// Allocates a write-only buffer of `size` bytes.
    fn create_output_buffer(&self, label: &str, size: usize) -> Result<Self::Buffer, ComputeError>;

    /// Compiles WGSL source for this session's device.
    ///
    /// Compiler diagnostics are returned in full in [`ComputeError::Build`].
    fn build_program(&self, source: &str) -> Result<Self::Program, ComputeError>;

    /// Resolves a compute entry point of `program` into an invocable kernel.
    fn resolve_kernel(&self, program: &Self::Program, entry: &str) -> Result<Self::Kernel, ComputeError>;

    /// Enqueues `kernel` over `workgroups` with positional `args`.
    ///
    /// `args` must already match the kernel signature; see
    /// [`crate::dispatch::check_arguments`].
    fn enqueue_kernel(
        &self,
        kernel: &Self::Kernel,
        args: &[KernelArg<'_, Self::Buffer>],
        workgroups: [u32; 3],
    ) -> Result<(), ComputeError>;

    /// Enqueues a read of the whole buffer and blocks until it completes.
    ///
    /// `None` waits indefinitely; `Some(limit)` fails with
    /// [`ComputeError::DeviceTimeout`] once `limit` has passed.
    fn read_buffer_blocking(
        &self,
        buffer: &Self::Buffer,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, ComputeError>;
}
