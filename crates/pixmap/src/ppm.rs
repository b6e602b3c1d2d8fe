use crate::{Dimensions, PixmapError, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Interleaved 8-bit R, G, B samples, row major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    dims: Dimensions,
    samples: Vec<u8>,
}

impl RgbImage {
    pub fn from_vec(dims: Dimensions, samples: Vec<u8>) -> Result<Self> {
        if samples.len() != dims.rgb_len() {
            return Err(PixmapError::Length {
                what: "RGB image",
                expected: dims.rgb_len(),
                actual: samples.len(),
            });
        }
        Ok(Self { dims, samples })
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }
}

/// `P6`, width and height, and a maxval of 255, each line ended by `\n`.
pub fn ppm_header(dims: Dimensions) -> String {
    format!("P6\n{} {}\n255\n", dims.width(), dims.height())
}

pub fn write_ppm<W: Write>(mut writer: W, image: &RgbImage) -> io::Result<()> {
    writer.write_all(ppm_header(image.dims).as_bytes())?;
    writer.write_all(&image.samples)?;
    writer.flush()
}

/// Writes `image` to `path` as a binary PPM, replacing any existing file.
pub fn save_ppm(path: impl AsRef<Path>, image: &RgbImage) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| PixmapError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    write_ppm(BufWriter::new(file), image).map_err(|source| PixmapError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), dims = %image.dims, "image saved as {}", path.display());
    Ok(())
}
