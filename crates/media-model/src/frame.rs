//! Frame and pixel types.
//!
//! A frame is a row-major grid of RGBA pixels. Width and height are fixed
//! at construction; the backing buffer always holds exactly
//! `width * height * 4` bytes.

use std::fmt;

use chromacast_common::error::{ChromacastError, ChromacastResult};
use serde::{Deserialize, Serialize};

/// Bytes per RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Width and height of a frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels in a frame of this size.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Length of the RGBA byte buffer for a frame of this size.
    pub fn byte_len(&self) -> usize {
        self.pixel_count() * BYTES_PER_PIXEL
    }

    /// `(width, height)` tuple, as used in error reports.
    pub fn as_tuple(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One RGBA pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully opaque pixel.
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    fn from_slice(px: &[u8]) -> Self {
        Self::new(px[0], px[1], px[2], px[3])
    }
}

/// A fixed-size RGBA image.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    dims: Dimensions,
    data: Vec<u8>,
}

impl Frame {
    /// All-zero frame (transparent black).
    ///
    /// Sources hand this out before their first decode.
    pub fn blank(dims: Dimensions) -> Self {
        Self {
            dims,
            data: vec![0; dims.byte_len()],
        }
    }

    /// Frame with every pixel set to `color`.
    pub fn filled(dims: Dimensions, color: Rgba) -> Self {
        let mut data = Vec::with_capacity(dims.byte_len());
        for _ in 0..dims.pixel_count() {
            data.extend_from_slice(&[color.r, color.g, color.b, color.a]);
        }
        Self { dims, data }
    }

    /// Wrap an existing RGBA buffer.
    pub fn from_rgba(dims: Dimensions, data: Vec<u8>) -> ChromacastResult<Self> {
        if data.len() != dims.byte_len() {
            return Err(ChromacastError::invalid_frame(format!(
                "{dims} frame needs {} bytes, got {}",
                dims.byte_len(),
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn width(&self) -> u32 {
        self.dims.width
    }

    pub fn height(&self) -> u32 {
        self.dims.height
    }

    /// Raw RGBA bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable RGBA bytes. The length is fixed by the dimensions.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Pixel at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        let offset = self.offset(x, y)?;
        Some(Rgba::from_slice(&self.data[offset..offset + BYTES_PER_PIXEL]))
    }

    /// Overwrite the pixel at `(x, y)`. Returns false when out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgba) -> bool {
        match self.offset(x, y) {
            Some(offset) => {
                self.data[offset..offset + BYTES_PER_PIXEL]
                    .copy_from_slice(&[color.r, color.g, color.b, color.a]);
                true
            }
            None => false,
        }
    }

    /// Fill an axis-aligned rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: Rgba) {
        let x_end = x.saturating_add(width).min(self.dims.width);
        let y_end = y.saturating_add(height).min(self.dims.height);
        for py in y..y_end {
            for px in x..x_end {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Iterate over pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = Rgba> + '_ {
        self.data.chunks_exact(BYTES_PER_PIXEL).map(Rgba::from_slice)
    }

    /// Whether every byte is zero (the not-yet-decoded sentinel).
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|b| *b == 0)
    }

    /// Fail with `DimensionMismatch` unless `other` has the same size.
    pub fn ensure_same_size(&self, other: &Frame) -> ChromacastResult<()> {
        if self.dims != other.dims {
            return Err(ChromacastError::dimension_mismatch(
                self.dims.as_tuple(),
                other.dims.as_tuple(),
            ));
        }
        Ok(())
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.dims.width || y >= self.dims.height {
            return None;
        }
        Some((y as usize * self.dims.width as usize + x as usize) * BYTES_PER_PIXEL)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("dims", &self.dims)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_frame_is_zeroed() {
        let frame = Frame::blank(Dimensions::new(4, 3));
        assert_eq!(frame.as_bytes().len(), 48);
        assert!(frame.is_blank());
        assert_eq!(frame.pixel(3, 2), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn test_from_rgba_rejects_wrong_length() {
        let err = Frame::from_rgba(Dimensions::new(2, 2), vec![0; 15]).unwrap_err();
        assert!(err.to_string().contains("needs 16 bytes"));
    }

    #[test]
    fn test_pixel_addressing_is_row_major() {
        let mut frame = Frame::blank(Dimensions::new(3, 2));
        assert!(frame.set_pixel(1, 1, Rgba::new(1, 2, 3, 4)));
        assert_eq!(&frame.as_bytes()[16..20], &[1, 2, 3, 4]);
        assert!(!frame.set_pixel(3, 0, Rgba::opaque(9, 9, 9)));
        assert_eq!(frame.pixel(0, 2), None);
    }

    #[test]
    fn test_fill_rect_clips_to_frame() {
        let mut frame = Frame::filled(Dimensions::new(4, 4), Rgba::opaque(0, 0, 0));
        frame.fill_rect(3, 3, 5, 5, Rgba::opaque(255, 0, 0));
        let red = frame.pixels().filter(|p| p.r == 255).count();
        assert_eq!(red, 1);
    }

    #[test]
    fn test_ensure_same_size() {
        let a = Frame::blank(Dimensions::new(8, 4));
        let b = Frame::blank(Dimensions::new(4, 8));
        assert!(a.ensure_same_size(&a.clone()).is_ok());
        assert!(matches!(
            a.ensure_same_size(&b),
            Err(ChromacastError::DimensionMismatch {
                expected: (8, 4),
                actual: (4, 8)
            })
        ));
    }
}
