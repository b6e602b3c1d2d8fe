use crate::{Dimensions, PixmapError, Result};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};

/// What [`load_raw`] does when the raw file cannot be opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingInput {
    /// Return [`PixmapError::Open`].
    #[default]
    Fail,
    /// Log a warning and carry on with an all-zero image.
    ZeroFill,
}

/// Headerless 8-bit sensor samples, row major, one byte per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    dims: Dimensions,
    samples: Vec<u8>,
}

impl RawImage {
    pub fn from_vec(dims: Dimensions, samples: Vec<u8>) -> Result<Self> {
        if samples.len() != dims.raw_len() {
            return Err(PixmapError::Length {
                what: "raw image",
                expected: dims.raw_len(),
                actual: samples.len(),
            });
        }
        Ok(Self { dims, samples })
    }

    pub fn zeroed(dims: Dimensions) -> Self {
        Self {
            dims,
            samples: vec![0; dims.raw_len()],
        }
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<u8> {
        self.samples
    }
}

/// Reads a `dims` sized raw image from `path`.
///
/// A short file leaves the remaining samples at zero; bytes past
/// `dims.raw_len()` are ignored. Both cases are logged as warnings. An
/// unopenable file is handled according to `missing`.
pub fn load_raw(path: impl AsRef<Path>, dims: Dimensions, missing: MissingInput) -> Result<RawImage> {
    let path = path.as_ref();
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(source) => {
            return match missing {
                MissingInput::Fail => Err(PixmapError::Open {
                    path: path.to_path_buf(),
                    source,
                }),
                MissingInput::ZeroFill => {
                    warn!(
                        path = %path.display(),
                        error = %source,
                        "failed to open the raw image file, continuing with a zero-filled image"
                    );
                    Ok(RawImage::zeroed(dims))
                }
            };
        }
    };

    let expected = dims.raw_len();
    let read_err = |source: io::Error| PixmapError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut samples = Vec::with_capacity(expected);
    file.by_ref()
        .take(expected as u64)
        .read_to_end(&mut samples)
        .map_err(read_err)?;

    let read = samples.len();
    if read < expected {
        warn!(path = %path.display(), expected, read, "raw image is short, padding with zeros");
        samples.resize(expected, 0);
    } else {
        let mut probe = [0u8; 1];
        if file.read(&mut probe).map_err(read_err)? > 0 {
            warn!(path = %path.display(), expected, "raw image is longer than {dims}, ignoring trailing bytes");
        }
    }
    debug!(path = %path.display(), %dims, "raw image loaded");

    Ok(RawImage { dims, samples })
}
