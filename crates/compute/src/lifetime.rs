//! Ownership of everything acquired from one device session.
//!
//! [`Resources`] holds the session together with the buffers, program and
//! kernel created through it, and releases them in dependency order:
//! kernel, program, buffers in creation order, then the session (command
//! queue before context). The order holds whether the run completed,
//! failed half way, or panicked, because the release happens in `Drop`.

use crate::backend::{ComputeBackend, DeviceBuffer, KernelHandle};
use crate::dispatch::{self, DispatchOptions};
use crate::ComputeError;
use std::fmt;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Kernel,
    Program,
    Buffer,
    Queue,
    Context,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Kernel => "kernel",
            ResourceKind::Program => "program",
            ResourceKind::Buffer => "buffer",
            ResourceKind::Queue => "command queue",
            ResourceKind::Context => "context",
        };
        f.write_str(name)
    }
}

/// Handle to a buffer owned by a [`Resources`]. Only meaningful to the
/// `Resources` that returned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferId(usize);

pub struct Resources<B: ComputeBackend> {
    kernel: Option<B::Kernel>,
    program: Option<B::Program>,
    buffers: Vec<B::Buffer>,
    // Last field: dropped after `Drop::drop` has released everything above.
    session: B,
}

impl<B: ComputeBackend> Resources<B> {
    pub fn new(session: B) -> Self {
        Self {
            kernel: None,
            program: None,
            buffers: Vec::new(),
            session,
        }
    }

    pub fn session(&self) -> &B {
        &self.session
    }

    pub fn create_input_buffer(&mut self, label: &str, bytes: &[u8]) -> Result<BufferId, ComputeError> {
        let buffer = self.session.create_input_buffer(label, bytes)?;
        Ok(self.adopt(buffer))
    }

    pub fn create_output_buffer(&mut self, label: &str, size: usize) -> Result<BufferId, ComputeError> {
        let buffer = self.session.create_output_buffer(label, size)?;
        Ok(self.adopt(buffer))
    }

    fn adopt(&mut self, buffer: B::Buffer) -> BufferId {
        trace!(label = buffer.label(), bytes = buffer.len(), "buffer acquired");
        self.buffers.push(buffer);
        BufferId(self.buffers.len() - 1)
    }

    pub fn buffer(&self, id: BufferId) -> Option<&B::Buffer> {
        self.buffers.get(id.0)
    }

    /// Builds `source` and resolves `entry` from it.
    ///
    /// Replaces any kernel and program held before. If the build succeeds
    /// but the entry cannot be resolved, the program is kept so it is
    /// released with everything else.
    pub fn build_kernel(&mut self, source: &str, entry: &str) -> Result<&B::Kernel, ComputeError> {
        self.release_kernel();
        self.release_program();

        let program = self.session.build_program(source)?;
        let program = self.program.insert(program);
        let kernel = self.session.resolve_kernel(program, entry)?;
        Ok(&*self.kernel.insert(kernel))
    }

    pub fn kernel(&self) -> Option<&B::Kernel> {
        self.kernel.as_ref()
    }

    /// Runs the held kernel with `input` and `output`; see [`dispatch::run`].
    pub fn dispatch(
        &self,
        input: BufferId,
        output: BufferId,
        width: u32,
        height: u32,
        options: &DispatchOptions,
    ) -> Result<Vec<u8>, ComputeError> {
        let kernel = self.kernel.as_ref().ok_or_else(|| {
            ComputeError::mismatch("", "no kernel has been built for this session")
        })?;
        let entry = kernel.signature().entry.as_str();
        let buffer = |id: BufferId| {
            self.buffer(id)
                .ok_or_else(|| ComputeError::mismatch(entry, format!("{id:?} was not allocated by this session")))
        };
        dispatch::run(
            &self.session,
            kernel,
            buffer(input)?,
            buffer(output)?,
            width,
            height,
            options,
        )
    }

    /// Releases everything now. Equivalent to dropping `self`.
    pub fn release(self) {
        drop(self);
    }

    fn release_kernel(&mut self) {
        if let Some(kernel) = self.kernel.take() {
            drop(kernel);
            debug!(resource = %ResourceKind::Kernel, "released");
        }
    }

    fn release_program(&mut self) {
        if let Some(program) = self.program.take() {
            drop(program);
            debug!(resource = %ResourceKind::Program, "released");
        }
    }
}

impl<B: ComputeBackend> Drop for Resources<B> {
    fn drop(&mut self) {
        self.release_kernel();
        self.release_program();
        for buffer in self.buffers.drain(..) {
            let label = buffer.label().to_owned();
            drop(buffer);
            debug!(resource = %ResourceKind::Buffer, %label, "released");
        }
        debug!(device = %self.session.info(), "releasing session");
    }
}
