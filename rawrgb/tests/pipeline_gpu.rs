// Full runs on a real accelerator. Needs a GPU, so ignored by default:
// `cargo test -p rawrgb -- --ignored`.

#[cfg(feature = "gpu")]
mod gpu {
    use compute::kernels::RAW_TO_RGB_SOURCE;
    use rawrgb::{execute, BackendKind, PipelineConfig};

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn gpu_and_cpu_produce_identical_files() {
        let dir = std::env::temp_dir().join(format!("rawrgb-gpu-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let (width, height) = (37u32, 21u32);
        let raw: Vec<u8> = (0..width * height).map(|i| (i * 7 % 256) as u8).collect();
        std::fs::write(dir.join("image.raw"), &raw).unwrap();
        std::fs::write(dir.join("kernel.wgsl"), RAW_TO_RGB_SOURCE).unwrap();

        let base = PipelineConfig {
            width,
            height,
            raw_path: dir.join("image.raw"),
            kernel_path: dir.join("kernel.wgsl"),
            readback_timeout_ms: Some(30_000),
            ..PipelineConfig::default()
        };
        let cpu = PipelineConfig {
            output_path: dir.join("cpu.ppm"),
            backend: BackendKind::Cpu,
            ..base.clone()
        };
        let gpu = PipelineConfig {
            output_path: dir.join("gpu.ppm"),
            backend: BackendKind::Gpu,
            ..base
        };

        execute(&cpu).unwrap();
        execute(&gpu).unwrap();

        assert_eq!(
            std::fs::read(&cpu.output_path).unwrap(),
            std::fs::read(&gpu.output_path).unwrap()
        );
        std::fs::remove_dir_all(dir).unwrap();
    }
}
