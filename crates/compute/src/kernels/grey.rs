pub const GREY_ENTRY: &str = "grey";
pub const GREY_SOURCE: &str = include_str!("../../../../shaders/grey.wgsl");

#[cfg(feature = "cpu")]
pub fn grey(gid: [u32; 3], args: &mut crate::cpu_backend::HostArgs<'_>) {
    use crate::layout::{HEIGHT, INPUT, OUTPUT, RGB_CHANNELS, WIDTH};

    let (width, height) = (args.scalar(WIDTH as usize), args.scalar(HEIGHT as usize));
    let [x, y, _] = gid;
    if x >= width || y >= height {
        return;
    }
    let i = y as usize * width as usize + x as usize;
    let s = args.input(INPUT as usize)[i];
    args.output(OUTPUT as usize)[i * RGB_CHANNELS..(i + 1) * RGB_CHANNELS].fill(s);
}
