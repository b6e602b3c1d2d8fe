use crate::{PixmapError, Result};
use std::fmt;

/// Image size in pixels. Both sides are non-zero and `width * height * 3`
/// fits in `usize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    width: u32,
    height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let fits = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(3))
            .is_some();
        if width == 0 || height == 0 || !fits {
            return Err(PixmapError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(self) -> u32 {
        self.width
    }

    pub fn height(self) -> u32 {
        self.height
    }

    /// Bytes in a raw image: one sample per pixel.
    pub fn raw_len(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes in an RGB image: three samples per pixel.
    pub fn rgb_len(self) -> usize {
        self.raw_len() * 3
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
