//! Host reference device.
//!
//! `CpuBackend` compiles and reflects WGSL exactly like the GPU session does,
//! but executes entry points through Rust functions registered together
//! with the WGSL source they implement. A kernel only resolves when the
//! program was built from that exact source; any other text under the same
//! entry name is refused instead of silently running the host function.
//! Every invocation of the launch grid calls the host function once with its
//! global invocation id, so the CPU and GPU sessions can be compared byte
//! for byte.
//!
//! Each acquisition and release is recorded in a [`Journal`], which tests
//! use to check release ordering.

use crate::backend::{Access, ComputeBackend, DeviceBuffer, DeviceInfo, KernelArg, KernelHandle};
use crate::lifetime::ResourceKind;
use crate::program::{KernelSignature, ParamKind, ProgramSource};
use crate::{kernels, ComputeError, DeviceStatus};
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Host implementation of one kernel invocation.
pub type HostKernelFn = fn([u32; 3], &mut HostArgs<'_>);

const DEFAULT_MAX_ALLOCATION: usize = 1 << 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Acquired(ResourceKind, String),
    Released(ResourceKind, String),
}

/// Shared log of acquisitions and releases, in the order they happened.
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<JournalEntry>>>);

impl Journal {
    fn acquired(&self, kind: ResourceKind, label: &str) {
        self.0.borrow_mut().push(JournalEntry::Acquired(kind, label.to_owned()));
    }

    fn released(&self, kind: ResourceKind, label: &str) {
        trace!(resource = %kind, label, "host resource freed");
        self.0.borrow_mut().push(JournalEntry::Released(kind, label.to_owned()));
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.0.borrow().clone()
    }

    pub fn releases(&self) -> Vec<ResourceKind> {
        self.0
            .borrow()
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Released(kind, _) => Some(*kind),
                JournalEntry::Acquired(..) => None,
            })
            .collect()
    }
}

/// Releases a journaled handle when dropped.
#[derive(Debug)]
struct Tracked {
    kind: ResourceKind,
    label: String,
    journal: Journal,
}

impl Tracked {
    fn new(journal: &Journal, kind: ResourceKind, label: &str) -> Self {
        journal.acquired(kind, label);
        Self {
            kind,
            label: label.to_owned(),
            journal: journal.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.journal.released(self.kind, &self.label);
    }
}

#[derive(Debug)]
pub struct CpuBuffer {
    data: RefCell<Vec<u8>>,
    access: Access,
    handle: Tracked,
}

impl DeviceBuffer for CpuBuffer {
    fn label(&self) -> &str {
        &self.handle.label
    }

    fn len(&self) -> usize {
        self.data.borrow().len()
    }

    fn access(&self) -> Access {
        self.access
    }
}

#[derive(Debug)]
pub struct CpuProgram {
    text: String,
    source: ProgramSource,
    _handle: Tracked,
}

pub struct CpuKernel {
    signature: KernelSignature,
    func: HostKernelFn,
    _handle: Tracked,
}

impl fmt::Debug for CpuKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuKernel")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// A host function and the WGSL source it stands in for.
struct HostKernel {
    source: String,
    func: HostKernelFn,
}

impl KernelHandle for CpuKernel {
    fn signature(&self) -> &KernelSignature {
        &self.signature
    }
}

enum HostSlot<'a> {
    Input(Ref<'a, Vec<u8>>),
    Output(RefMut<'a, Vec<u8>>),
    Scalar(u32),
}

/// Arguments of one host kernel launch, by position.
///
/// Accessors panic when the slot at `index` has another kind; the signature
/// has been checked before launch, so that only happens for a host function
/// that disagrees with its WGSL declaration. The panic is reported as a
/// [`DeviceStatus::HostFault`].
pub struct HostArgs<'a> {
    slots: Vec<HostSlot<'a>>,
}

impl HostArgs<'_> {
    pub fn input(&self, index: usize) -> &[u8] {
        match &self.slots[index] {
            HostSlot::Input(data) => data.as_slice(),
            _ => panic!("argument {index} is not an input buffer"),
        }
    }

    pub fn output(&mut self, index: usize) -> &mut [u8] {
        match &mut self.slots[index] {
            HostSlot::Output(data) => data.as_mut_slice(),
            _ => panic!("argument {index} is not an output buffer"),
        }
    }

    pub fn scalar(&self, index: usize) -> u32 {
        match &self.slots[index] {
            HostSlot::Scalar(value) => *value,
            _ => panic!("argument {index} is not a scalar"),
        }
    }
}

// Queue before context: fields drop in declaration order.
pub struct CpuBackend {
    info: DeviceInfo,
    kernels: HashMap<String, HostKernel>,
    max_allocation: usize,
    journal: Journal,
    _queue: Tracked,
    _context: Tracked,
}

impl CpuBackend {
    pub fn open() -> Self {
        let journal = Journal::default();
        let context = Tracked::new(&journal, ResourceKind::Context, "context");
        let queue = Tracked::new(&journal, ResourceKind::Queue, "queue");
        let info = DeviceInfo {
            platform: "host".to_owned(),
            name: "cpu-reference".to_owned(),
            kind: "Cpu".to_owned(),
        };
        debug!(device = %info, "device session open");
        Self {
            info,
            kernels: HashMap::new(),
            max_allocation: DEFAULT_MAX_ALLOCATION,
            journal,
            _queue: queue,
            _context: context,
        }
    }

    /// A session with every kernel shipped in [`crate::kernels`] registered.
    pub fn reference() -> Self {
        Self::open()
            .with_kernel(kernels::RAW_TO_RGB_ENTRY, kernels::RAW_TO_RGB_SOURCE, kernels::raw_to_rgb)
            .with_kernel(kernels::GREY_ENTRY, kernels::GREY_SOURCE, kernels::grey)
    }

    /// Registers `func` as the host implementation of `entry` in `source`.
    #[must_use]
    pub fn with_kernel(mut self, entry: &str, source: &str, func: HostKernelFn) -> Self {
        self.kernels.insert(
            entry.to_owned(),
            HostKernel {
                source: source.to_owned(),
                func,
            },
        );
        self
    }

    /// Largest single buffer this session will allocate.
    #[must_use]
    pub fn with_max_allocation(mut self, bytes: usize) -> Self {
        self.max_allocation = bytes;
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn allocate(&self, label: &str, data: Vec<u8>, access: Access) -> Result<CpuBuffer, ComputeError> {
        if data.is_empty() {
            return Err(ComputeError::Allocation {
                label: label.to_owned(),
                bytes: 0,
                reason: "zero-sized buffer".to_owned(),
            });
        }
        Ok(CpuBuffer {
            data: RefCell::new(data),
            access,
            handle: Tracked::new(&self.journal, ResourceKind::Buffer, label),
        })
    }
}

impl ComputeBackend for CpuBackend {
    type Buffer = CpuBuffer;
    type Program = CpuProgram;
    type Kernel = CpuKernel;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_input_buffer(&self, label: &str, bytes: &[u8]) -> Result<CpuBuffer, ComputeError> {
        if bytes.len() > self.max_allocation {
            return Err(too_large(label, bytes.len(), self.max_allocation));
        }
        self.allocate(label, bytes.to_vec(), Access::ReadOnly)
    }

    fn create_output_buffer(&self, label: &str, size: usize) -> Result<CpuBuffer, ComputeError> {
        if size > self.max_allocation {
            return Err(too_large(label, size, self.max_allocation));
        }
        self.allocate(label, vec![0; size], Access::WriteOnly)
    }

    fn build_program(&self, text: &str) -> Result<CpuProgram, ComputeError> {
        let source = ProgramSource::compile(text)?;
        Ok(CpuProgram {
            text: text.to_owned(),
            source,
            _handle: Tracked::new(&self.journal, ResourceKind::Program, "program"),
        })
    }

    fn resolve_kernel(&self, program: &CpuProgram, entry: &str) -> Result<CpuKernel, ComputeError> {
        let signature = program.source.signature(entry)?;
        let host = self.kernels.get(entry).ok_or_else(|| {
            ComputeError::mismatch(entry, "no host implementation registered for this entry point")
        })?;
        if host.source != program.text {
            return Err(ComputeError::mismatch(
                entry,
                "the host device only runs the built-in source of this entry point, the program text differs",
            ));
        }
        warn!(
            entry,
            device = %self.info,
            "running the host implementation of `{entry}` instead of compiling its WGSL body"
        );
        Ok(CpuKernel {
            signature,
            func: host.func,
            _handle: Tracked::new(&self.journal, ResourceKind::Kernel, entry),
        })
    }

    fn enqueue_kernel(
        &self,
        kernel: &CpuKernel,
        args: &[KernelArg<'_, CpuBuffer>],
        workgroups: [u32; 3],
    ) -> Result<(), ComputeError> {
        let entry = kernel.signature.entry.as_str();
        if args.len() != kernel.signature.params.len() {
            return Err(ComputeError::mismatch(entry, "argument count differs from signature"));
        }

        let mut slots = Vec::with_capacity(args.len());
        for (index, (arg, param)) in args.iter().zip(&kernel.signature.params).enumerate() {
            let slot = match (arg, param.kind) {
                (KernelArg::Buffer(buffer), ParamKind::StorageRead) => buffer
                    .data
                    .try_borrow()
                    .map(HostSlot::Input)
                    .map_err(|_| aliased(entry, index))?,
                (KernelArg::Buffer(buffer), ParamKind::StorageReadWrite) => buffer
                    .data
                    .try_borrow_mut()
                    .map(HostSlot::Output)
                    .map_err(|_| aliased(entry, index))?,
                (KernelArg::U32(value), ParamKind::Uniform { .. }) => HostSlot::Scalar(*value),
                _ => {
                    return Err(ComputeError::mismatch(
                        entry,
                        format!("argument {index} does not match parameter kind {:?}", param.kind),
                    ))
                }
            };
            slots.push(slot);
        }
        let mut host_args = HostArgs { slots };

        let [sx, sy, sz] = kernel.signature.workgroup_size;
        let extent = |count: u32, size: u32| {
            count
                .checked_mul(size)
                .ok_or_else(|| ComputeError::mismatch(entry, "launch grid overflows u32"))
        };
        let (nx, ny, nz) = (
            extent(workgroups[0], sx)?,
            extent(workgroups[1], sy)?,
            extent(workgroups[2], sz)?,
        );

        let func = kernel.func;
        panic::catch_unwind(AssertUnwindSafe(|| {
            for z in 0..nz {
                for y in 0..ny {
                    for x in 0..nx {
                        func([x, y, z], &mut host_args);
                    }
                }
            }
        }))
        .map_err(|payload| ComputeError::KernelExecution {
            status: DeviceStatus::HostFault,
            message: panic_message(payload.as_ref()),
        })
    }

    fn read_buffer_blocking(&self, buffer: &CpuBuffer, _timeout: Option<Duration>) -> Result<Vec<u8>, ComputeError> {
        Ok(buffer.data.borrow().clone())
    }
}

fn too_large(label: &str, bytes: usize, limit: usize) -> ComputeError {
    ComputeError::Allocation {
        label: label.to_owned(),
        bytes,
        reason: format!("exceeds the {limit} byte allocation limit"),
    }
}

fn aliased(entry: &str, index: usize) -> ComputeError {
    ComputeError::mismatch(entry, format!("buffer at argument {index} is bound more than once"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "host kernel panicked".to_owned()
    }
}
