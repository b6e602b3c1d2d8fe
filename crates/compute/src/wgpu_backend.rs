//! GPU implementation of [`ComputeBackend`] built on [`wgpu`].
//!
//! A `WgpuBackend` is one device session: the instance, the chosen adapter,
//! the logical device and its queue. Programs are checked by `naga` before
//! they reach the driver, so build failures come back as full diagnostics
//! rather than an uncaptured device error.
//!
//! wgpu buffers are sized in multiples of four bytes. Buffers keep their
//! logical length; the padding is zero-filled on upload and stripped on
//! readback.

use crate::backend::{Access, ComputeBackend, DeviceBuffer, DeviceInfo, KernelArg, KernelHandle};
use crate::program::{KernelSignature, ParamKind, ProgramSource};
use crate::{ComputeError, DeviceStatus};
use std::borrow::Cow;
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};
use wgpu::util::DeviceExt;

const COPY_ALIGNMENT: usize = wgpu::COPY_BUFFER_ALIGNMENT as usize;
const POLL_INTERVAL: Duration = Duration::from_millis(1);

type MapResult = Result<(), wgpu::BufferAsyncError>;

/// GPU-backed implementation of [`ComputeBackend`] built on `wgpu`.
pub struct WgpuBackend {
    // Queue before device, device before adapter and instance.
    queue: wgpu::Queue,
    device: wgpu::Device,
    _adapter: wgpu::Adapter,
    _instance: wgpu::Instance,
    info: DeviceInfo,
}

impl WgpuBackend {
    /// Opens a session on the first accelerator of the first platform.
    ///
    /// Platforms are the wgpu backends (Vulkan, Metal, DX12, GL) in adapter
    /// enumeration order; `WGPU_BACKEND` narrows the set. Software adapters
    /// do not count as accelerators.
    pub fn open() -> Result<Self, ComputeError> {
        let backends = wgpu::util::backend_bits_from_env().unwrap_or_else(wgpu::Backends::all);
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(backends);
        for adapter in &adapters {
            let info = adapter.get_info();
            debug!(name = %info.name, backend = ?info.backend, device_type = ?info.device_type, "found adapter");
        }
        let platform = adapters
            .first()
            .map(|adapter| adapter.get_info().backend)
            .ok_or(ComputeError::NoPlatform)?;
        let adapter = adapters
            .into_iter()
            .filter(|adapter| adapter.get_info().backend == platform)
            .find(|adapter| adapter.get_info().device_type != wgpu::DeviceType::Cpu)
            .ok_or_else(|| ComputeError::NoDevice {
                platform: format!("{platform:?}"),
                reason: "only software adapters are available".to_owned(),
            })?;

        let adapter_info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("rawrgb"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|e| ComputeError::NoDevice {
            platform: format!("{platform:?}"),
            reason: e.to_string(),
        })?;
        device.on_uncaptured_error(Box::new(|e: wgpu::Error| error!("uncaptured device error: {e}")));

        let info = DeviceInfo {
            platform: format!("{:?}", adapter_info.backend),
            name: adapter_info.name,
            kind: format!("{:?}", adapter_info.device_type),
        };
        info!(device = %info, "device session open");

        Ok(Self {
            queue,
            device,
            _adapter: adapter,
            _instance: instance,
            info,
        })
    }

    /// Runs `f` with validation and out-of-memory errors captured.
    fn captured<T>(&self, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let value = f();
        let oom = pollster::block_on(self.device.pop_error_scope());
        let validation = pollster::block_on(self.device.pop_error_scope());
        (value, oom.or(validation))
    }

    fn padded_size(&self, label: &str, len: usize) -> Result<u64, ComputeError> {
        let reject = |reason: String| ComputeError::Allocation {
            label: label.to_owned(),
            bytes: len,
            reason,
        };
        if len == 0 {
            return Err(reject("zero-sized buffer".to_owned()));
        }
        let padded = u64::try_from(len.next_multiple_of(COPY_ALIGNMENT))
            .map_err(|_| reject("size does not fit in u64".to_owned()))?;
        let limits = self.device.limits();
        let limit = limits
            .max_buffer_size
            .min(u64::from(limits.max_storage_buffer_binding_size));
        if padded > limit {
            return Err(reject(format!("exceeds the device limit of {limit} bytes")));
        }
        Ok(padded)
    }

    fn wait_for_map(
        &self,
        mapped: &mpsc::Receiver<MapResult>,
        submission: wgpu::SubmissionIndex,
        timeout: Option<Duration>,
    ) -> Result<(), ComputeError> {
        let lost = || ComputeError::KernelExecution {
            status: DeviceStatus::Lost,
            message: "readback callback was dropped".to_owned(),
        };

        let outcome = match timeout {
            None => {
                self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(submission));
                mapped.recv().map_err(|_| lost())?
            }
            Some(limit) => {
                // The deadline is checked before each poll, so a zero limit
                // never waits on the device.
                let start = Instant::now();
                loop {
                    match mapped.try_recv() {
                        Ok(outcome) => break outcome,
                        Err(TryRecvError::Empty) if start.elapsed() >= limit => {
                            return Err(ComputeError::DeviceTimeout { waited: limit });
                        }
                        Err(TryRecvError::Empty) => {
                            self.device.poll(wgpu::Maintain::Poll);
                            thread::sleep(POLL_INTERVAL);
                        }
                        Err(TryRecvError::Disconnected) => return Err(lost()),
                    }
                }
            }
        };
        outcome.map_err(|e| ComputeError::KernelExecution {
            status: DeviceStatus::MapFailed,
            message: e.to_string(),
        })
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        debug!(device = %self.info, "closing command queue and context");
    }
}

fn status_of(error: &wgpu::Error) -> DeviceStatus {
    match error {
        wgpu::Error::OutOfMemory { .. } => DeviceStatus::OutOfMemory,
        _ => DeviceStatus::Validation,
    }
}

pub struct WgpuBuffer {
    buffer: wgpu::Buffer,
    label: String,
    len: usize,
    access: Access,
}

impl DeviceBuffer for WgpuBuffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn len(&self) -> usize {
        self.len
    }

    fn access(&self) -> Access {
        self.access
    }
}

impl Drop for WgpuBuffer {
    fn drop(&mut self) {
        self.buffer.destroy();
        trace!(label = %self.label, "device buffer destroyed");
    }
}

pub struct WgpuProgram {
    source: ProgramSource,
    module: wgpu::ShaderModule,
}

pub struct WgpuKernel {
    signature: KernelSignature,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl KernelHandle for WgpuKernel {
    fn signature(&self) -> &KernelSignature {
        &self.signature
    }
}

impl ComputeBackend for WgpuBackend {
    type Buffer = WgpuBuffer;
    type Program = WgpuProgram;
    type Kernel = WgpuKernel;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_input_buffer(&self, label: &str, bytes: &[u8]) -> Result<WgpuBuffer, ComputeError> {
        let size = self.padded_size(label, bytes.len())?;
        let contents: Cow<'_, [u8]> = if size == bytes.len() as u64 {
            Cow::Borrowed(bytes)
        } else {
            let mut padded = bytes.to_vec();
            padded.resize(bytes.len().next_multiple_of(COPY_ALIGNMENT), 0);
            Cow::Owned(padded)
        };

        let (buffer, error) = self.captured(|| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: &contents,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            })
        });
        if let Some(e) = error {
            return Err(ComputeError::Allocation {
                label: label.to_owned(),
                bytes: bytes.len(),
                reason: e.to_string(),
            });
        }
        Ok(WgpuBuffer {
            buffer,
            label: label.to_owned(),
            len: bytes.len(),
            access: Access::ReadOnly,
        })
    }

    fn create_output_buffer(&self, label: &str, size: usize) -> Result<WgpuBuffer, ComputeError> {
        let padded = self.padded_size(label, size)?;
        let (buffer, error) = self.captured(|| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: padded,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        });
        if let Some(e) = error {
            return Err(ComputeError::Allocation {
                label: label.to_owned(),
                bytes: size,
                reason: e.to_string(),
            });
        }
        Ok(WgpuBuffer {
            buffer,
            label: label.to_owned(),
            len: size,
            access: Access::WriteOnly,
        })
    }

    fn build_program(&self, source: &str) -> Result<WgpuProgram, ComputeError> {
        let checked = ProgramSource::compile(source)?;
        let (module, error) = self.captured(|| {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("kernel program"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        if let Some(e) = error {
            return Err(ComputeError::Build {
                diagnostics: e.to_string(),
            });
        }
        Ok(WgpuProgram {
            source: checked,
            module,
        })
    }

    fn resolve_kernel(&self, program: &WgpuProgram, entry: &str) -> Result<WgpuKernel, ComputeError> {
        let signature = program.source.signature(entry)?;
        let entries: Vec<_> = signature
            .params
            .iter()
            .map(|param| wgpu::BindGroupLayoutEntry {
                binding: param.binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: match param.kind {
                        ParamKind::StorageRead => wgpu::BufferBindingType::Storage { read_only: true },
                        ParamKind::StorageReadWrite => wgpu::BufferBindingType::Storage { read_only: false },
                        ParamKind::Uniform { .. } => wgpu::BufferBindingType::Uniform,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        let ((layout, pipeline), error) = self.captured(|| {
            let layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(entry),
                entries: &entries,
            });
            let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(entry),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&pipeline_layout),
                module: &program.module,
                entry_point: entry,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            });
            (layout, pipeline)
        });
        if let Some(e) = error {
            return Err(ComputeError::Build {
                diagnostics: e.to_string(),
            });
        }
        Ok(WgpuKernel {
            signature,
            layout,
            pipeline,
        })
    }

    fn enqueue_kernel(
        &self,
        kernel: &WgpuKernel,
        args: &[KernelArg<'_, WgpuBuffer>],
        workgroups: [u32; 3],
    ) -> Result<(), ComputeError> {
        let entry = kernel.signature.entry.as_str();
        if args.len() != kernel.signature.params.len() {
            return Err(ComputeError::mismatch(entry, "argument count differs from signature"));
        }

        // Scalars travel as four-byte uniform buffers.
        let scalars: Vec<Option<wgpu::Buffer>> = args
            .iter()
            .map(|arg| match arg {
                KernelArg::U32(value) => Some(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("scalar argument"),
                    contents: bytemuck::bytes_of(value),
                    usage: wgpu::BufferUsages::UNIFORM,
                })),
                KernelArg::Buffer(_) => None,
            })
            .collect();

        let mut entries = Vec::with_capacity(args.len());
        for ((arg, scalar), param) in args.iter().zip(&scalars).zip(&kernel.signature.params) {
            let buffer = match (arg, scalar) {
                (KernelArg::Buffer(device_buffer), _) => &device_buffer.buffer,
                (KernelArg::U32(_), Some(uniform)) => uniform,
                (KernelArg::U32(_), None) => {
                    return Err(ComputeError::mismatch(entry, "scalar argument has no uniform buffer"));
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: param.binding,
                resource: buffer.as_entire_binding(),
            });
        }

        let ((), error) = self.captured(|| {
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(entry),
                layout: &kernel.layout,
                entries: &entries,
            });
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(entry) });
            {
                let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(entry),
                    timestamp_writes: None,
                });
                cpass.set_pipeline(&kernel.pipeline);
                cpass.set_bind_group(0, &bind_group, &[]);
                cpass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
            }
            self.queue.submit(Some(encoder.finish()));
        });
        match error {
            Some(e) => Err(ComputeError::KernelExecution {
                status: status_of(&e),
                message: e.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn read_buffer_blocking(
        &self,
        buffer: &WgpuBuffer,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, ComputeError> {
        let size = buffer.buffer.size();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback") });
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, size);
        let submission = self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver is gone only after a timeout.
            let _ = tx.send(result);
        });
        self.wait_for_map(&rx, submission, timeout)?;

        let bytes = slice.get_mapped_range()[..buffer.len].to_vec();
        staging.unmap();
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{RAW_TO_RGB_ENTRY, RAW_TO_RGB_SOURCE};

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn unaligned_buffers_keep_their_logical_length() {
        let session = WgpuBackend::open().unwrap();
        let input = session.create_input_buffer("raw", &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(input.len(), 5);
        assert_eq!(input.buffer.size(), 8);
        assert_eq!(session.read_buffer_blocking(&input, None).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn zero_sized_buffers_are_refused() {
        let session = WgpuBackend::open().unwrap();
        assert!(matches!(
            session.create_output_buffer("rgb", 0),
            Err(ComputeError::Allocation { bytes: 0, .. })
        ));
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn shipped_kernel_builds_and_resolves() {
        let session = WgpuBackend::open().unwrap();
        let program = session.build_program(RAW_TO_RGB_SOURCE).unwrap();
        let kernel = session.resolve_kernel(&program, RAW_TO_RGB_ENTRY).unwrap();
        assert_eq!(kernel.signature().params.len(), crate::layout::ARG_COUNT);
        assert!(matches!(
            session.resolve_kernel(&program, "main"),
            Err(ComputeError::Symbol { .. })
        ));
    }
}
