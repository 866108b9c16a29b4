//! Glyph cache and 1-bit text layout over the fontdue rasterizer.
//!
//! Glyphs are rasterized once per character and kept in an insertion-ordered
//! cache together with their layout metrics and a per-glyph kerning cache.
//! Text is drawn by thresholding the 8-bit coverage bitmaps onto the panel
//! framebuffer, so only pixels whose coverage has the high bit set are lit.

use fontdue::FontSettings;
use smallvec::SmallVec;
use std::path::Path;

use crate::bitmap::Bitmap;
use crate::error::{Error, Result};

const UNKNOWN_GLYPH_INDICATOR: char = '?';

/// Result of one text drawing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Every character was laid out inside the clip and panel width.
    Fit,
    /// Layout stopped early at the clip width or the panel's right edge.
    Truncated,
    /// No usable face is loaded; nothing was drawn.
    NoFont,
}

#[derive(Debug, Clone, Copy)]
struct KerningPair {
    prev: char,
    amount: i32,
}

/// One rasterized character with coverage bitmap and layout metrics.
#[derive(Debug)]
pub struct Glyph {
    ch: char,
    width: i32,
    rows: i32,
    left: i32,
    top: i32,
    advance: i32,
    coverage: Vec<u8>,
    // Kerning amounts seen so far, keyed by the preceding character. An
    // absent pair means "not queried yet", which is distinct from a cached
    // zero.
    kerning: SmallVec<[KerningPair; 4]>,
}

impl Glyph {
    /// The character this glyph renders (after any substitution).
    pub fn character(&self) -> char {
        self.ch
    }

    /// Horizontal advance in pixels.
    pub fn advance(&self) -> i32 {
        self.advance
    }

    fn cached_kerning(&self, prev: char) -> Option<i32> {
        self.kerning
            .iter()
            .find(|k| k.prev == prev)
            .map(|k| k.amount)
    }
}

/// A sized face plus its glyph cache.
pub struct Font {
    face: fontdue::Font,
    px: f32,
    height: i32,
    bottom: i32,
    glyphs: Vec<Glyph>,
}

impl Font {
    /// Load a face from a font file and size it to `height_px` pixels.
    pub fn load(path: &Path, height_px: u32) -> Result<Self> {
        let label = path.display().to_string();
        let data = std::fs::read(path).map_err(|e| Error::FontLoad {
            path: label.clone(),
            reason: e.to_string(),
        })?;
        Self::build(&data, height_px, &label)
    }

    /// Build a face from raw TTF/OTF bytes.
    pub fn from_bytes(data: &[u8], height_px: u32) -> Result<Self> {
        Self::build(data, height_px, "<memory>")
    }

    fn build(data: &[u8], height_px: u32, label: &str) -> Result<Self> {
        let face =
            fontdue::Font::from_bytes(data, FontSettings::default()).map_err(|reason| {
                Error::FontLoad {
                    path: label.to_string(),
                    reason: reason.to_string(),
                }
            })?;
        let px = height_px.max(1) as f32;

        let (height, bottom) = match face.horizontal_line_metrics(px) {
            Some(m) => (
                (m.ascent - m.descent).ceil() as i32,
                (-m.descent).ceil().max(0.0) as i32,
            ),
            None => {
                // No horizontal metrics in this face; probe a basic glyph
                // range for the deepest descender instead.
                let mut bottom = 0;
                for ch in 'A'..'z' {
                    let (m, _) = face.rasterize(ch, px);
                    bottom = bottom.max(-m.ymin);
                }
                (px as i32, bottom)
            }
        };

        Ok(Self {
            face,
            px,
            height,
            bottom,
            glyphs: Vec::new(),
        })
    }

    /// Line height in pixels (0 marks an unusable face).
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Pixels reserved below the baseline.
    pub fn bottom(&self) -> i32 {
        self.bottom
    }

    /// Cached glyph for a character, rasterizing on first use.
    ///
    /// Non-breaking space renders as a plain space and characters missing
    /// from the face substitute `'?'`; None only when even that is missing.
    pub fn glyph(&mut self, ch: char) -> Option<&Glyph> {
        self.glyph_index(ch).map(|i| &self.glyphs[i])
    }

    fn glyph_index(&mut self, ch: char) -> Option<usize> {
        let ch = if ch == '\u{00a0}' { ' ' } else { ch };

        if let Some(i) = self.glyphs.iter().position(|g| g.ch == ch) {
            return Some(i);
        }

        if self.face.lookup_glyph_index(ch) != 0 {
            let (m, coverage) = self.face.rasterize(ch, self.px);
            self.glyphs.push(Glyph {
                ch,
                width: m.width as i32,
                rows: m.height as i32,
                left: m.xmin,
                top: m.ymin + m.height as i32,
                advance: m.advance_width as i32,
                coverage,
                kerning: SmallVec::new(),
            });
            return Some(self.glyphs.len() - 1);
        }

        if ch != UNKNOWN_GLYPH_INDICATOR {
            return self.glyph_index(UNKNOWN_GLYPH_INDICATOR);
        }
        None
    }

    fn kerning_at(&mut self, idx: usize, prev: Option<char>) -> i32 {
        let Some(prev) = prev else {
            return 0;
        };
        if let Some(k) = self.glyphs[idx].cached_kerning(prev) {
            return k;
        }
        let amount = self
            .face
            .horizontal_kern(prev, self.glyphs[idx].ch, self.px)
            .map_or(0, |v| v as i32);
        self.glyphs[idx].kerning.push(KerningPair { prev, amount });
        amount
    }

    /// Measured advance of a string, kerning included.
    pub fn width(&mut self, text: &str) -> i32 {
        let mut w = 0;
        let mut prev = None;
        for ch in text.chars() {
            if let Some(idx) = self.glyph_index(ch) {
                let kerning = self.kerning_at(idx, prev);
                w += self.glyphs[idx].advance + kerning;
            }
            prev = Some(ch);
        }
        w
    }

    /// Lay out `text` with its baseline area anchored at `y`, clipped to
    /// `max_width` (0 disables the clip) and to the bitmap itself.
    ///
    /// A negative `x` starts the string left of the panel; glyphs fully
    /// outside are skipped and partially visible ones are clipped per
    /// pixel, which is what makes marquee scrolling work.
    pub fn draw_text(
        &mut self,
        bitmap: &mut Bitmap,
        x: i32,
        y: i32,
        text: &str,
        max_width: i32,
    ) -> DrawOutcome {
        if self.height <= 0 {
            return DrawOutcome::NoFont;
        }

        let mut x = x;
        let mut prev = None;
        for ch in text.chars() {
            let Some(idx) = self.glyph_index(ch) else {
                continue;
            };
            let kerning = self.kerning_at(idx, prev);
            prev = Some(ch);

            let g = &self.glyphs[idx];
            // We don't draw partial characters at the clip edge.
            if max_width != 0 && x + g.width + g.left + kerning - 1 > max_width {
                return DrawOutcome::Truncated;
            }
            if x + g.width + g.left + kerning > 0 {
                let base_y = y + (self.height - self.bottom - g.top);
                for row in 0..g.rows {
                    for col in 0..g.width {
                        if g.coverage[(row * g.width + col) as usize] & 0x80 != 0 {
                            bitmap.set_pixel(x + col + g.left + kerning, base_y + row);
                        }
                    }
                }
            }
            x += g.advance + kerning;
            if x > bitmap.width() - 1 {
                return DrawOutcome::Truncated;
            }
        }
        DrawOutcome::Fit
    }
}

impl std::fmt::Debug for Font {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Font")
            .field("px", &self.px)
            .field("height", &self.height)
            .field("bottom", &self.bottom)
            .field("cached_glyphs", &self.glyphs.len())
            .finish()
    }
}

/// Locate any TTF/OTF on the machine so rasterization tests can run.
/// Callers skip themselves when this returns None on bare systems.
#[cfg(test)]
pub(crate) fn system_font_path() -> Option<std::path::PathBuf> {
    const CANDIDATES: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
        "/usr/share/fonts/gnu-free/FreeSans.ttf",
        "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
        "/Library/Fonts/Arial Unicode.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
    ];
    for p in CANDIDATES {
        let path = std::path::Path::new(p);
        if path.is_file() {
            return Some(path.to_path_buf());
        }
    }
    // Fall back to scanning the usual font roots.
    let mut stack: Vec<(std::path::PathBuf, usize)> = vec![
        ("/usr/share/fonts".into(), 0),
        ("/usr/local/share/fonts".into(), 0),
    ];
    while let Some((dir, depth)) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if depth < 4 {
                    stack.push((path, depth + 1));
                }
            } else if matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("ttf" | "otf")
            ) {
                return Some(path);
            }
        }
    }
    None
}
