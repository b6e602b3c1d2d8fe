//! Bayer RGGB demosaic.
//!
//! Each output pixel takes the colours of the 2x2 cell containing it:
//!
//! ```text
//!   R  G      r = R
//!   G  B      g = (G_top + G_left) / 2, rounded down
//!             b = B
//! ```
//!
//! A cell cut by the right or bottom edge reuses the last column or row.

pub const RAW_TO_RGB_ENTRY: &str = "rawToRgb";
pub const RAW_TO_RGB_SOURCE: &str = include_str!("../../../../shaders/raw_to_rgb.wgsl");

#[cfg(feature = "cpu")]
pub fn raw_to_rgb(gid: [u32; 3], args: &mut crate::cpu_backend::HostArgs<'_>) {
    use crate::layout::{HEIGHT, INPUT, OUTPUT, RGB_CHANNELS, WIDTH};

    let (width, height) = (args.scalar(WIDTH as usize), args.scalar(HEIGHT as usize));
    let [x, y, _] = gid;
    if x >= width || y >= height {
        return;
    }

    let raw = args.input(INPUT as usize);
    let at = |x: u32, y: u32| {
        let (x, y) = (x.min(width - 1) as usize, y.min(height - 1) as usize);
        raw[y * width as usize + x]
    };
    let (x0, y0) = (x & !1, y & !1);
    let (g_top, g_left) = (at(x0 + 1, y0), at(x0, y0 + 1));
    let pixel = [
        at(x0, y0),
        (g_top & g_left) + ((g_top ^ g_left) >> 1),
        at(x0 + 1, y0 + 1),
    ];

    let o = (y as usize * width as usize + x as usize) * RGB_CHANNELS;
    args.output(OUTPUT as usize)[o..o + RGB_CHANNELS].copy_from_slice(&pixel);
}
