//! 1-bit framebuffer in the panel's native byte order.
//!
//! The device scans in vertical bands: each buffer byte covers 8 rows of a
//! single column, MSB on top, and bands advance every 8 rows. Byte index for
//! a pixel is `x + (y / 8) * width`, bit `0x80 >> (y % 8)`.

/// 1-bit pixel buffer sized for the panel.
#[derive(Clone, Debug)]
pub struct Bitmap {
    width: i32,
    height: i32,
    bytes: Vec<u8>,
}

impl Bitmap {
    /// Create a zeroed bitmap. Dimensions are clamped to at least 1x1.
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let size = (Self::line_bytes(width) as usize).saturating_mul(height as usize);
        Self {
            width,
            height,
            bytes: vec![0; size],
        }
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Bytes per horizontal line (width rounded up to whole bytes).
    #[inline]
    pub fn bytes_per_line(&self) -> i32 {
        Self::line_bytes(self.width)
    }

    #[inline]
    fn line_bytes(width: i32) -> i32 {
        (width + 7) / 8
    }

    /// Byte index of a pixel in device order.
    /// Returns None when the pixel falls outside the panel or the buffer.
    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let n = (x as usize) + (y as usize / 8) * (self.width as usize);
        if x < self.width && y < self.height && n < self.bytes.len() {
            Some(n)
        } else {
            None
        }
    }

    /// Turn on one pixel. Returns false (and writes nothing) when the
    /// coordinates fall outside the buffer.
    #[inline]
    pub fn set_pixel(&mut self, x: i32, y: i32) -> bool {
        match self.index(x, y) {
            Some(n) => {
                self.bytes[n] |= 0x80 >> (y % 8) as u8;
                true
            }
            None => false,
        }
    }

    /// Read one pixel. Out-of-bounds reads are off.
    #[inline]
    pub fn pixel(&self, x: i32, y: i32) -> bool {
        self.index(x, y)
            .map(|n| self.bytes[n] & (0x80 >> (y % 8) as u8) != 0)
            .unwrap_or(false)
    }

    /// Clear every pixel.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Clear and poke one pixel so the next diff against any real frame
    /// sees a change (the forced-first-flush state after open or resume).
    pub fn invalidate(&mut self) {
        self.bytes.fill(0);
        if let Some(b) = self.bytes.first_mut() {
            *b = 0x80;
        }
    }

    /// Copy another bitmap's contents, reallocating only when the
    /// dimensions differ.
    pub fn copy_from(&mut self, other: &Bitmap) {
        if self.width != other.width || self.height != other.height {
            self.width = other.width;
            self.height = other.height;
            self.bytes = other.bytes.clone();
        } else {
            self.bytes.copy_from_slice(&other.bytes);
        }
    }

    /// Raw bytes in device order, for the flush path.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.bytes == other.bytes
    }
}

impl Eq for Bitmap {}
