use crate::{PixmapError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Reads a kernel source file as UTF-8 text.
///
/// Empty and whitespace-only files are rejected here, before anything tries
/// to compile them.
pub fn load_kernel_source(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|source| PixmapError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut text = String::new();
    file.read_to_string(&mut text).map_err(|source| PixmapError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if text.trim().is_empty() {
        return Err(PixmapError::EmptyKernelSource {
            path: path.to_path_buf(),
        });
    }
    debug!(path = %path.display(), bytes = text.len(), "kernel source loaded");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("pixmap-src-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn text_is_returned_whole() {
        let text = "@compute @workgroup_size(1)\nfn main() {}\n";
        let path = scratch("whole.wgsl", text.as_bytes());
        assert_eq!(load_kernel_source(&path).unwrap(), text);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn blank_source_is_rejected() {
        let path = scratch("blank.wgsl", b" \n\t\n");
        assert!(matches!(
            load_kernel_source(&path),
            Err(PixmapError::EmptyKernelSource { .. })
        ));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn invalid_utf8_is_a_read_error() {
        let path = scratch("binary.wgsl", &[0xff, 0xfe, 0x00]);
        assert!(matches!(load_kernel_source(&path), Err(PixmapError::Read { .. })));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_source_is_an_open_error() {
        let path = std::env::temp_dir().join("pixmap-src-does-not-exist.wgsl");
        let err = load_kernel_source(&path).unwrap_err();
        assert!(err.to_string().starts_with("cannot open"), "{err}");
    }
}
