//! Rendered frame descriptors and pixel readback.

use bytemuck::{Pod, Zeroable};
use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr::NonNull;
use thiserror::Error;

/// Pixel formats a render target can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// 8 bits per channel, RGBA order
    Rgba8,
    /// 16-bit float per channel, RGBA order (extended dynamic range targets)
    Rgba16Float,
    /// 8 bits per channel, BGRA order
    Bgra8,
    /// 10 bits per color channel plus 2 bits alpha
    Rgb10A2,
}

impl TextureFormat {
    /// Returns the number of bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Bgra8 => 4,
            TextureFormat::Rgb10A2 => 4,
        }
    }

    /// Whether [`Texture::read_bgr`] can convert this format.
    pub fn is_readable(&self) -> bool {
        matches!(self, TextureFormat::Rgba8 | TextureFormat::Rgba16Float)
    }
}

/// Reasons a texture could not be read back into packed BGR.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadbackError {
    #[error("texture has no pixels")]
    Empty,

    #[error("texture data too short: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unsupported texture format {0:?}")]
    UnsupportedFormat(TextureFormat),
}

/// A rendered frame mapped into CPU memory.
#[derive(Debug, Clone)]
pub struct Texture {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format of `data`
    pub format: TextureFormat,
    /// Bytes between the starts of two consecutive rows
    pub row_pitch: usize,
    /// Raw pixel data
    pub data: Vec<u8>,
}

impl Texture {
    /// Creates a zeroed texture with tightly packed rows.
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        let row_pitch = width as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            row_pitch,
            data: vec![0; row_pitch * height as usize],
        }
    }

    /// Creates a texture from tightly packed pixel data.
    pub fn from_data(width: u32, height: u32, format: TextureFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            row_pitch: width as usize * format.bytes_per_pixel(),
            data,
        }
    }

    /// Overrides the row pitch, for mappings that pad rows.
    pub fn with_row_pitch(mut self, row_pitch: usize) -> Self {
        self.row_pitch = row_pitch;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Minimum length of `data` needed to read every pixel.
    pub fn required_len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        let row_bytes = self.width as usize * self.format.bytes_per_pixel();
        self.row_pitch * (self.height as usize - 1) + row_bytes
    }

    /// Reads the texture into packed BGR24 rows without padding.
    ///
    /// `out` is cleared and reused so callers can keep one staging buffer
    /// across frames. 16-bit float channels are clamped to `[0, 1]`.
    pub fn read_bgr(&self, out: &mut Vec<u8>) -> Result<(), ReadbackError> {
        if self.is_empty() {
            return Err(ReadbackError::Empty);
        }
        if !self.format.is_readable() {
            return Err(ReadbackError::UnsupportedFormat(self.format));
        }
        let bpp = self.format.bytes_per_pixel();
        if self.row_pitch < self.width as usize * bpp || self.data.len() < self.required_len() {
            return Err(ReadbackError::Truncated {
                expected: self.required_len().max(self.width as usize * bpp * self.height as usize),
                actual: self.data.len(),
            });
        }

        let width = self.width as usize;
        out.clear();
        out.reserve(width * self.height as usize * 3);

        for row in self.data.chunks(self.row_pitch).take(self.height as usize) {
            let row = &row[..width * bpp];
            match self.format {
                TextureFormat::Rgba8 => {
                    for px in row.chunks_exact(4) {
                        out.extend_from_slice(&[px[2], px[1], px[0]]);
                    }
                }
                TextureFormat::Rgba16Float => {
                    for px in row.chunks_exact(8) {
                        let px: Rgba16 = bytemuck::pod_read_unaligned(px);
                        out.extend_from_slice(&[f16_to_unorm8(px.b), f16_to_unorm8(px.g), f16_to_unorm8(px.r)]);
                    }
                }
                other => return Err(ReadbackError::UnsupportedFormat(other)),
            }
        }

        Ok(())
    }

    /// Generates an RGBA gradient with a vertical bar that moves with `frame_index`.
    pub fn test_pattern(width: u32, height: u32, frame_index: u64) -> Self {
        let mut texture = Texture::new(width, height, TextureFormat::Rgba8);
        if texture.is_empty() {
            return texture;
        }
        let bar_x = ((frame_index * 8) % width as u64) as u32;
        let blue = (frame_index % 256) as u8;

        for (y, row) in texture.data.chunks_exact_mut(texture.row_pitch).enumerate() {
            let green = (y as u32 * 255 / height) as u8;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let x = x as u32;
                if x.abs_diff(bar_x) < 4 {
                    px.copy_from_slice(&[255, 255, 255, 255]);
                } else {
                    px.copy_from_slice(&[(x * 255 / width) as u8, green, blue, 255]);
                }
            }
        }
        texture
    }
}

/// One RGBA pixel of a half-float render target.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Rgba16 {
    r: u16,
    g: u16,
    b: u16,
    _alpha: u16,
}

/// Converts an IEEE half float to an 8-bit unorm value, clamping to `[0, 1]`.
fn f16_to_unorm8(bits: u16) -> u8 {
    if bits & 0x8000 != 0 {
        return 0;
    }
    // Rebias the exponent into f32 range; denormals land near zero.
    let value = f32::from_bits(((bits as u32) << 13) + 0x3800_0000);
    if value < 1.0 {
        (value * 255.99) as u8
    } else {
        255
    }
}

/// Flips each packed BGR24 row of `buf` in place.
pub fn mirror_bgr_rows(buf: &mut [u8], width: u32) {
    let pitch = width as usize * 3;
    if pitch == 0 {
        return;
    }
    for row in buf.chunks_exact_mut(pitch) {
        let (mut a, mut b) = (0, pitch - 3);
        while a < b {
            for c in 0..3 {
                row.swap(a + c, b + c);
            }
            a += 3;
            b -= 3;
        }
    }
}

/// Opaque handle to a GPU texture owned by the renderer.
///
/// The lifetime ties the handle to the render callback that produced it, so
/// a sink cannot keep it past the frame.
#[derive(Debug, Clone, Copy)]
pub struct NativeTexture<'a> {
    ptr: NonNull<c_void>,
    _frame: PhantomData<&'a ()>,
}

impl<'a> NativeTexture<'a> {
    /// Wraps a native texture pointer. Returns `None` for null.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a texture of the active graphics device that stays
    /// alive for `'a`.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self {
            ptr,
            _frame: PhantomData,
        })
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }
}

/// The image of the current frame, borrowed for the duration of one submit.
#[derive(Debug, Clone, Copy)]
pub enum FrameImage<'a> {
    /// GPU resource handle, only readable by a native sink
    Native(NativeTexture<'a>),
    /// Pixels already mapped into CPU memory
    Cpu(&'a Texture),
}

impl FrameImage<'_> {
    /// Frame size, if known without touching the GPU.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            FrameImage::Native(_) => None,
            FrameImage::Cpu(texture) => Some((texture.width, texture.height)),
        }
    }
}
