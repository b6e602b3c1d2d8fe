//! Front end shared by every backend: WGSL parsing, validation and kernel
//! signature reflection through `naga`.

use crate::ComputeError;
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};

/// How a kernel parameter is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// `var<storage, read>`
    StorageRead,
    /// `var<storage, read_write>`
    StorageReadWrite,
    /// `var<uniform>` of `size` bytes.
    Uniform { size: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub binding: u32,
    pub name: Option<String>,
    pub kind: ParamKind,
}

/// Reflected shape of one compute entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSignature {
    pub entry: String,
    pub workgroup_size: [u32; 3],
    /// Parameters ordered by binding; `params[i].binding == i`.
    pub params: Vec<Param>,
}

impl KernelSignature {
    pub fn invocations_per_workgroup(&self) -> u32 {
        self.workgroup_size.iter().product()
    }
}

/// A parsed and validated WGSL module.
#[derive(Debug)]
pub struct ProgramSource {
    module: naga::Module,
    info: ModuleInfo,
}

impl ProgramSource {
    /// Parses and validates `source`.
    ///
    /// Any diagnostic is rendered against the source text and returned
    /// unabridged in [`ComputeError::Build`].
    pub fn compile(source: &str) -> Result<Self, ComputeError> {
        let module = naga::front::wgsl::parse_str(source).map_err(|e| ComputeError::Build {
            diagnostics: non_empty(e.emit_to_string(source), || e.to_string()),
        })?;

        let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
        let info = validator.validate(&module).map_err(|e| ComputeError::Build {
            diagnostics: non_empty(e.emit_to_string(source), || e.to_string()),
        })?;

        Ok(Self { module, info })
    }

    /// Names of the compute entry points, in declaration order.
    pub fn entry_points(&self) -> impl Iterator<Item = &str> + '_ {
        self.module
            .entry_points
            .iter()
            .filter(|ep| ep.stage == naga::ShaderStage::Compute)
            .map(|ep| ep.name.as_str())
    }

    /// Reflects the signature of compute entry point `entry`.
    ///
    /// The parameters are the resource bindings that `entry` uses, directly
    /// or through the functions it calls; bindings used only by other entry
    /// points are not part of its signature. They must live in `@group(0)`
    /// and be numbered `0..n` without gaps, so that argument index and
    /// binding number coincide.
    pub fn signature(&self, entry: &str) -> Result<KernelSignature, ComputeError> {
        let (index, entry_point) = self
            .module
            .entry_points
            .iter()
            .enumerate()
            .find(|(_, ep)| ep.stage == naga::ShaderStage::Compute && ep.name == entry)
            .ok_or_else(|| ComputeError::Symbol {
                entry: entry.to_owned(),
                available: self.entry_points().map(str::to_owned).collect(),
            })?;
        let usage = self.info.get_entry_point(index);

        let mut params = Vec::new();
        for (handle, var) in self.module.global_variables.iter() {
            let Some(binding) = &var.binding else {
                continue;
            };
            if usage[handle].is_empty() {
                continue;
            }
            if binding.group != 0 {
                return Err(ComputeError::mismatch(
                    entry,
                    format!(
                        "binding {} is in group {}; only group 0 is bound",
                        binding.binding, binding.group
                    ),
                ));
            }
            let kind = match var.space {
                naga::AddressSpace::Storage { access } => {
                    if access.contains(naga::StorageAccess::STORE) {
                        ParamKind::StorageReadWrite
                    } else {
                        ParamKind::StorageRead
                    }
                }
                naga::AddressSpace::Uniform => ParamKind::Uniform {
                    size: self.module.types[var.ty].inner.size(self.module.to_ctx()),
                },
                other => {
                    return Err(ComputeError::mismatch(
                        entry,
                        format!("binding {} uses unsupported address space {other:?}", binding.binding),
                    ))
                }
            };
            params.push(Param {
                binding: binding.binding,
                name: var.name.clone(),
                kind,
            });
        }

        params.sort_by_key(|p| p.binding);
        for (position, param) in params.iter().enumerate() {
            if param.binding as usize != position {
                return Err(ComputeError::mismatch(
                    entry,
                    format!(
                        "bindings must be numbered 0..{} without gaps, found binding {} at position {position}",
                        params.len(),
                        param.binding
                    ),
                ));
            }
        }

        Ok(KernelSignature {
            entry: entry.to_owned(),
            workgroup_size: entry_point.workgroup_size,
            params,
        })
    }
}

fn non_empty(diagnostics: String, fallback: impl FnOnce() -> String) -> String {
    if diagnostics.trim().is_empty() {
        fallback()
    } else {
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{GREY_ENTRY, GREY_SOURCE, RAW_TO_RGB_ENTRY, RAW_TO_RGB_SOURCE};

    #[test]
    fn shipped_kernels_reflect_the_pipeline_layout() {
        for (source, entry) in [(RAW_TO_RGB_SOURCE, RAW_TO_RGB_ENTRY), (GREY_SOURCE, GREY_ENTRY)] {
            let program = ProgramSource::compile(source).unwrap();
            let sig = program.signature(entry).unwrap();

            assert_eq!(sig.entry, entry);
            assert_eq!(sig.workgroup_size[2], 1);
            let kinds: Vec<_> = sig.params.iter().map(|p| p.kind).collect();
            assert_eq!(
                kinds,
                vec![
                    ParamKind::StorageRead,
                    ParamKind::StorageReadWrite,
                    ParamKind::Uniform { size: 4 },
                    ParamKind::Uniform { size: 4 },
                ]
            );
        }
    }

    #[test]
    fn syntax_error_is_reported_with_location() {
        let source = "@compute @workgroup_size(1)\nfn main() {\n    let x = 1\n}\n";
        let err = ProgramSource::compile(source).unwrap_err();
        let ComputeError::Build { diagnostics } = err else {
            panic!("expected build error, got {err:?}");
        };
        assert!(diagnostics.contains("error"), "{diagnostics}");
        assert!(diagnostics.contains(":3:") || diagnostics.contains(":4:"), "{diagnostics}");
    }

    #[test]
    fn type_error_fails_validation() {
        let source = r"
@group(0) @binding(0) var<storage, read_write> out: array<u32>;

@compute @workgroup_size(1)
fn main() {
    out[0] = 1.5;
}
";
        assert!(matches!(
            ProgramSource::compile(source),
            Err(ComputeError::Build { .. })
        ));
    }

    #[test]
    fn missing_entry_lists_compute_entries_only() {
        let source = r"
@group(0) @binding(0) var<storage, read_write> out: array<u32>;

@compute @workgroup_size(1)
fn first() { out[0] = 1u; }

@compute @workgroup_size(1)
fn second() { out[0] = 2u; }

@vertex
fn vs() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }
";
        let program = ProgramSource::compile(source).unwrap();
        match program.signature("rawToRgb") {
            Err(ComputeError::Symbol { entry, available }) => {
                assert_eq!(entry, "rawToRgb");
                assert_eq!(available, vec!["first".to_owned(), "second".to_owned()]);
            }
            other => panic!("expected symbol error, got {other:?}"),
        }
        // Vertex entries are not kernels.
        assert!(matches!(program.signature("vs"), Err(ComputeError::Symbol { .. })));
    }

    #[test]
    fn gapped_bindings_are_rejected() {
        let source = r"
@group(0) @binding(0) var<storage, read> src: array<u32>;
@group(0) @binding(2) var<storage, read_write> dst: array<u32>;

@compute @workgroup_size(1)
fn main() { dst[0] = src[0]; }
";
        let program = ProgramSource::compile(source).unwrap();
        assert!(matches!(
            program.signature("main"),
            Err(ComputeError::ArgumentMismatch { .. })
        ));
    }

    #[test]
    fn parameters_belong_to_each_entry_point() {
        let source = r"
@group(0) @binding(0) var<storage, read> raw: array<u32>;
@group(0) @binding(1) var<storage, read_write> rgb: array<atomic<u32>>;
@group(0) @binding(2) var<uniform> width: u32;
@group(0) @binding(3) var<uniform> height: u32;
@group(0) @binding(4) var<storage, read_write> scratch: array<u32>;
@group(1) @binding(0) var<storage, read_write> stats: array<u32>;

fn sample(i: u32) -> u32 {
    return (raw[i / 4u] >> ((i % 4u) * 8u)) & 0xffu;
}

@compute @workgroup_size(8, 8, 1)
fn rawToRgb(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= width || gid.y >= height) {
        return;
    }
    atomicOr(&rgb[0], sample(gid.y * width + gid.x));
}

@compute @workgroup_size(64)
fn clear_scratch(@builtin(global_invocation_id) gid: vec3<u32>) {
    scratch[gid.x] = 0u;
    stats[gid.x] = 0u;
}
";
        let program = ProgramSource::compile(source).unwrap();

        let sig = program.signature("rawToRgb").unwrap();
        let names: Vec<_> = sig.params.iter().map(|p| p.name.as_deref().unwrap()).collect();
        assert_eq!(names, ["raw", "rgb", "width", "height"]);

        // Uses binding 4 alone and a second group.
        assert!(matches!(
            program.signature("clear_scratch"),
            Err(ComputeError::ArgumentMismatch { .. })
        ));
    }

    #[test]
    fn non_zero_group_is_rejected() {
        let source = r"
@group(1) @binding(0) var<storage, read_write> dst: array<u32>;

@compute @workgroup_size(1)
fn main() { dst[0] = 0u; }
";
        let program = ProgramSource::compile(source).unwrap();
        let err = program.signature("main").unwrap_err();
        assert!(err.to_string().contains("group 1"), "{err}");
    }
}
