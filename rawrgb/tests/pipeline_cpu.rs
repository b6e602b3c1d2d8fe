// End to end runs on the host reference device.

use compute::cpu_backend::JournalEntry;
use compute::kernels::{GREY_ENTRY, GREY_SOURCE, RAW_TO_RGB_SOURCE};
use compute::{ComputeError, CpuBackend, ResourceKind};
use rawrgb::pipeline::run;
use rawrgb::{execute, BackendKind, MissingRaw, PipelineConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A private scratch directory per test.
fn workdir() -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("rawrgb-it-{}-{n}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn config_in(dir: &Path, raw: Option<&[u8]>, kernel: &str, entry: &str) -> PipelineConfig {
    let raw_path = dir.join("image.raw");
    if let Some(bytes) = raw {
        std::fs::write(&raw_path, bytes).unwrap();
    }
    let kernel_path = dir.join("kernel.wgsl");
    std::fs::write(&kernel_path, kernel).unwrap();
    PipelineConfig {
        width: 4,
        height: 2,
        raw_path,
        kernel_path,
        output_path: dir.join("output_image.ppm"),
        kernel_entry: entry.to_owned(),
        backend: BackendKind::Cpu,
        ..PipelineConfig::default()
    }
}

fn ppm(width: u32, height: u32, body: &[u8]) -> Vec<u8> {
    let mut bytes = format!("P6\n{width} {height}\n255\n").into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

#[test]
fn grey_kernel_writes_the_expected_file() {
    let dir = workdir();
    let config = config_in(&dir, Some(&[128; 8]), GREY_SOURCE, GREY_ENTRY);

    let report = execute(&config).unwrap();

    assert_eq!(report.output_path, config.output_path);
    assert_eq!(report.device.platform, "host");
    assert_eq!(std::fs::read(&config.output_path).unwrap(), ppm(4, 2, &[128; 24]));
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn default_kernel_demosaics_each_cell() {
    let dir = workdir();
    #[rustfmt::skip]
    let raw = [
        200,  10,  50, 60,
         30, 100,  70, 80,
    ];
    let config = config_in(&dir, Some(&raw), RAW_TO_RGB_SOURCE, "rawToRgb");

    execute(&config).unwrap();

    let left = [200, 20, 100];
    let right = [50, 65, 80];
    let body: Vec<u8> = [left, left, right, right, left, left, right, right].concat();
    assert_eq!(std::fs::read(&config.output_path).unwrap(), ppm(4, 2, &body));
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn missing_raw_fails_before_opening_a_session() {
    let dir = workdir();
    let config = config_in(&dir, None, GREY_SOURCE, GREY_ENTRY);

    let err = run(&config, || -> Result<CpuBackend, ComputeError> {
        panic!("session opened despite missing input")
    })
    .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("image.raw"), "{err}");
    assert!(!config.output_path.exists());
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn missing_raw_can_degrade_to_zeros() {
    let dir = workdir();
    let config = PipelineConfig {
        missing_raw: MissingRaw::ZeroFill,
        ..config_in(&dir, None, GREY_SOURCE, GREY_ENTRY)
    };

    execute(&config).unwrap();

    assert_eq!(std::fs::read(&config.output_path).unwrap(), ppm(4, 2, &[0; 24]));
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn short_raw_is_padded_with_zeros() {
    let dir = workdir();
    let config = config_in(&dir, Some(&[9; 5]), GREY_SOURCE, GREY_ENTRY);

    execute(&config).unwrap();

    let mut body = vec![9; 15];
    body.extend_from_slice(&[0; 9]);
    assert_eq!(std::fs::read(&config.output_path).unwrap(), ppm(4, 2, &body));
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn broken_kernel_is_a_build_error_and_releases_everything() {
    let dir = workdir();
    let config = config_in(&dir, Some(&[1; 8]), "@compute @workgroup_size(8, 8, 1)\nfn grey( {\n", GREY_ENTRY);
    let session = CpuBackend::reference();
    let journal = session.journal();

    let err = run(&config, move || Ok(session)).unwrap_err();

    assert_eq!(err.exit_code(), 6);
    assert!(err.to_string().contains("failed to build"), "{err}");
    assert_eq!(
        journal.releases(),
        vec![
            ResourceKind::Buffer,
            ResourceKind::Buffer,
            ResourceKind::Queue,
            ResourceKind::Context,
        ]
    );
    assert!(!config.output_path.exists());
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn unknown_entry_is_a_symbol_error() {
    let dir = workdir();
    let config = config_in(&dir, Some(&[1; 8]), RAW_TO_RGB_SOURCE, "rawToRGB");
    let session = CpuBackend::reference();
    let journal = session.journal();

    let err = run(&config, move || Ok(session)).unwrap_err();

    assert_eq!(err.exit_code(), 7);
    assert!(err.to_string().contains("rawToRgb"), "available entries listed: {err}");
    let entries = journal.entries();
    let acquired = entries.iter().filter(|e| matches!(e, JournalEntry::Acquired(..))).count();
    let released = entries.iter().filter(|e| matches!(e, JournalEntry::Released(..))).count();
    assert_eq!(acquired, released);
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn host_backend_refuses_an_edited_kernel() {
    let dir = workdir();
    let edited = r"
@group(0) @binding(0) var<storage, read> raw: array<u32>;
@group(0) @binding(1) var<storage, read_write> rgb: array<atomic<u32>>;
@group(0) @binding(2) var<uniform> width: u32;
@group(0) @binding(3) var<uniform> height: u32;

@compute @workgroup_size(8, 8, 1)
fn rawToRgb(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= width || gid.y >= height || raw[0] == 0u) {
        return;
    }
    atomicOr(&rgb[0], 0u);
}
";
    let config = config_in(&dir, Some(&[128; 8]), edited, "rawToRgb");

    let err = execute(&config).unwrap_err();

    assert_eq!(err.exit_code(), 7);
    assert!(err.to_string().contains("built-in source"), "{err}");
    assert!(!config.output_path.exists());
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn empty_kernel_source_is_rejected_up_front() {
    let dir = workdir();
    let config = config_in(&dir, Some(&[1; 8]), "\n   \n", GREY_ENTRY);

    let err = run(&config, || -> Result<CpuBackend, ComputeError> {
        panic!("session opened for an empty kernel")
    })
    .unwrap_err();

    assert_eq!(err.exit_code(), 10);
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn session_failures_map_to_their_exit_codes() {
    let dir = workdir();
    let config = config_in(&dir, Some(&[1; 8]), GREY_SOURCE, GREY_ENTRY);

    let err = run(&config, || Err::<CpuBackend, _>(ComputeError::NoPlatform)).unwrap_err();
    assert_eq!(err.exit_code(), 3);

    let err = run(&config, || {
        Err::<CpuBackend, _>(ComputeError::NoDevice {
            platform: "Vulkan".into(),
            reason: "only software adapters are available".into(),
        })
    })
    .unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("Vulkan"), "{err}");
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn oversized_frame_is_an_allocation_error() {
    let dir = workdir();
    let config = config_in(&dir, Some(&[1; 8]), GREY_SOURCE, GREY_ENTRY);
    let session = CpuBackend::reference().with_max_allocation(16);
    let journal = session.journal();

    let err = run(&config, move || Ok(session)).unwrap_err();

    // The 8 byte input fits, the 24 byte output does not.
    assert_eq!(err.exit_code(), 5);
    assert_eq!(
        journal.releases(),
        vec![ResourceKind::Buffer, ResourceKind::Queue, ResourceKind::Context]
    );
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn unwritable_output_is_reported_after_release() {
    let dir = workdir();
    let config = PipelineConfig {
        output_path: dir.join("missing-dir").join("out.ppm"),
        ..config_in(&dir, Some(&[1; 8]), GREY_SOURCE, GREY_ENTRY)
    };
    let session = CpuBackend::reference();
    let journal = session.journal();

    let err = run(&config, move || Ok(session)).unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert_eq!(journal.releases().last(), Some(&ResourceKind::Context));
    std::fs::remove_dir_all(dir).unwrap();
}
