//! Pixel formats and caller-supplied pixel views
//!
//! Three-channel pixels are never stored on the GPU: sampled RGB images are not
//! guaranteed to be supported, so [`PixelFormat::Rgb888`] is widened to RGBA
//! with an opaque alpha while staging.

use ash::vk;

/// Layout of caller-supplied 8-bit pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Single channel, e.g. glyph coverage
    R8,
    /// Red, green, blue
    Rgb888,
    /// Red, green, blue, alpha
    Rgba8888,
    /// Blue, green, red, alpha
    Bgra8888,
}

impl PixelFormat {
    /// Channels per pixel in the source data
    pub const fn channel_count(self) -> usize {
        match self {
            Self::R8 => 1,
            Self::Rgb888 => 3,
            Self::Rgba8888 | Self::Bgra8888 => 4,
        }
    }

    /// Bytes per pixel in the source data
    pub const fn bytes_per_pixel(self) -> usize {
        self.channel_count()
    }

    /// Format actually stored on the GPU
    pub const fn gpu_format(self) -> vk::Format {
        match self {
            Self::R8 => vk::Format::R8_UNORM,
            Self::Rgb888 | Self::Rgba8888 => vk::Format::R8G8B8A8_UNORM,
            Self::Bgra8888 => vk::Format::B8G8R8A8_UNORM,
        }
    }

    /// Bytes per pixel once normalized for the GPU
    pub const fn gpu_bytes_per_pixel(self) -> usize {
        match self {
            Self::R8 => 1,
            Self::Rgb888 | Self::Rgba8888 | Self::Bgra8888 => 4,
        }
    }
}

/// Borrowed pixel rectangle handed in by a decoder or rasterizer
#[derive(Debug, Clone, Copy)]
pub struct PixelView<'a> {
    bytes: &'a [u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    pitch: usize,
}

impl<'a> PixelView<'a> {
    /// Tightly packed pixels
    pub fn new(bytes: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        let pitch = width as usize * format.bytes_per_pixel();
        Self::with_pitch(bytes, width, height, format, pitch)
    }

    /// Pixels whose rows start `pitch` bytes apart
    pub fn with_pitch(bytes: &'a [u8], width: u32, height: u32, format: PixelFormat, pitch: usize) -> Self {
        let row_bytes = width as usize * format.bytes_per_pixel();
        assert!(
            pitch >= row_bytes,
            "pixel view pitch {pitch} is shorter than a {width}-pixel row ({row_bytes} bytes)"
        );
        assert!(
            bytes.len() >= pitch * height as usize,
            "pixel view holds {} bytes, {width}x{height} with pitch {pitch} needs {}",
            bytes.len(),
            pitch * height as usize
        );
        Self {
            bytes,
            width,
            height,
            format,
            pitch,
        }
    }

    /// Width in pixels
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Source format
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes between row starts
    pub const fn pitch(&self) -> usize {
        self.pitch
    }

    /// Image extent
    pub const fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    /// Size of the tightly packed, normalized GPU copy
    pub const fn gpu_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.gpu_bytes_per_pixel()
    }

    fn rows(&self) -> impl Iterator<Item = &'a [u8]> {
        let (bytes, pitch) = (self.bytes, self.pitch);
        let row_bytes = self.width as usize * self.format.bytes_per_pixel();
        (0..self.height as usize).map(move |y| &bytes[y * pitch..y * pitch + row_bytes])
    }

    /// Write the normalized pixels, tightly packed, into `dst`
    pub fn write_normalized(&self, dst: &mut [u8]) {
        assert!(
            dst.len() >= self.gpu_size(),
            "staging area of {} bytes is too small for {} bytes of pixels",
            dst.len(),
            self.gpu_size()
        );
        let dst_row = self.width as usize * self.format.gpu_bytes_per_pixel();
        if dst_row == 0 {
            return;
        }

        for (row, out) in self.rows().zip(dst.chunks_exact_mut(dst_row)) {
            match self.format {
                PixelFormat::Rgb888 => {
                    for (src, texel) in row.chunks_exact(3).zip(out.chunks_exact_mut(4)) {
                        texel[..3].copy_from_slice(src);
                        texel[3] = 0xFF;
                    }
                }
                PixelFormat::R8 | PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => out.copy_from_slice(row),
            }
        }
    }

    /// Normalized pixels as a new vector
    pub fn to_normalized(&self) -> Vec<u8> {
        let mut out = vec![0; self.gpu_size()];
        self.write_normalized(&mut out);
        out
    }
}
