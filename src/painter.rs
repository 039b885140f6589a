//! Glyph rasterization into square cell masks.
//!
//! With a configured font, glyphs are rasterized by fontdue and centered in the
//! cell. Without one (or for codepoints the font has no outline for) a
//! procedural cipher pattern derived from the codepoint is used, so drawing
//! never fails.

use std::collections::HashMap;
use std::fs;

use anyhow::{anyhow, Result};
use fontdue::Font;
use sha2::{Digest, Sha256};

use crate::config::FontSource;
use crate::error_codes::{CodedError, FONT_HASH_MISMATCH, FONT_LOAD_FAILED};

const CIPHER_COLUMNS: u32 = 5;
const CIPHER_ROWS: u32 = 7;

/// Coverage mask covering exactly one `size × size` cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphMask {
    pub size: u32,
    pub coverage: Vec<u8>,
}

impl GlyphMask {
    fn empty(size: u32) -> Self {
        Self {
            size,
            coverage: vec![0; (size as usize) * (size as usize)],
        }
    }

    pub fn coverage_at(&self, x: u32, y: u32) -> u8 {
        if x >= self.size || y >= self.size {
            return 0;
        }
        self.coverage[(y * self.size + x) as usize]
    }

    #[cfg(test)]
    pub fn is_blank(&self) -> bool {
        self.coverage.iter().all(|value| *value == 0)
    }
}

pub struct GlyphPainter {
    font: Option<Font>,
    cell_size: u32,
    cache: HashMap<char, GlyphMask>,
}

impl GlyphPainter {
    /// Painter that only draws procedural cipher glyphs.
    pub fn procedural() -> Self {
        Self {
            font: None,
            cell_size: 0,
            cache: HashMap::new(),
        }
    }

    pub fn from_font_bytes(bytes: Vec<u8>, label: &str) -> Result<Self> {
        let font = Font::from_bytes(bytes, fontdue::FontSettings::default()).map_err(|error| {
            CodedError::font(FONT_LOAD_FAILED, format!("failed to parse font {label}: {error}"))
        })?;
        Ok(Self {
            font: Some(font),
            cell_size: 0,
            cache: HashMap::new(),
        })
    }

    /// Load the configured font, checking its SHA-256 when one is pinned.
    pub fn from_font_source(source: &FontSource) -> Result<Self> {
        let bytes = fs::read(&source.path).map_err(|error| {
            CodedError::font(
                FONT_LOAD_FAILED,
                format!("failed to read font file {}: {error}", source.path.display()),
            )
        })?;

        if let Some(expected) = &source.sha256 {
            let actual = sha256_hex(&bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(anyhow!(CodedError::font(
                    FONT_HASH_MISMATCH,
                    format!(
                        "{} expected sha256={} actual sha256={}",
                        source.path.display(),
                        expected,
                        actual
                    ),
                )));
            }
        }

        Self::from_font_bytes(bytes, &source.path.display().to_string())
    }

    /// Painter for an optional font source; `None` means procedural.
    pub fn for_source(source: Option<&FontSource>) -> Result<Self> {
        match source {
            Some(source) => Self::from_font_source(source),
            None => Ok(Self::procedural()),
        }
    }

    /// Coverage mask for `glyph` in a `cell × cell` box, cached per cell size.
    pub fn mask(&mut self, glyph: char, cell: u32) -> &GlyphMask {
        if cell != self.cell_size {
            self.cell_size = cell;
            self.cache.clear();
        }

        let font = self.font.as_ref();
        self.cache.entry(glyph).or_insert_with(|| match font {
            Some(font) if font.lookup_glyph_index(glyph) != 0 => rasterize_font_glyph(font, glyph, cell),
            _ => cipher_glyph(glyph, cell),
        })
    }
}

fn rasterize_font_glyph(font: &Font, glyph: char, cell: u32) -> GlyphMask {
    let mut mask = GlyphMask::empty(cell);
    if cell == 0 {
        return mask;
    }

    let mut px = cell as f32;
    let (ascent, descent) = match font.horizontal_line_metrics(px) {
        Some(line) => {
            let height = line.ascent - line.descent;
            if height > cell as f32 && height > 0.0 {
                px *= cell as f32 / height;
                (line.ascent * cell as f32 / height, line.descent * cell as f32 / height)
            } else {
                (line.ascent, line.descent)
            }
        }
        None => (px * 0.8, -px * 0.2),
    };

    let (metrics, bitmap) = font.rasterize(glyph, px);
    let baseline = ((cell as f32 - (ascent - descent)) / 2.0 + ascent).round() as i32;
    let left = ((cell as f32 - metrics.advance_width) / 2.0).round() as i32 + metrics.xmin;
    let top = baseline - metrics.ymin - metrics.height as i32;

    for row in 0..metrics.height {
        let y = top + row as i32;
        if y < 0 || y >= cell as i32 {
            continue;
        }
        for col in 0..metrics.width {
            let x = left + col as i32;
            if x < 0 || x >= cell as i32 {
                continue;
            }
            let value = bitmap[row * metrics.width + col];
            let index = (y as u32 * cell + x as u32) as usize;
            mask.coverage[index] = mask.coverage[index].max(value);
        }
    }

    mask
}

/// 5×7 bit pattern derived from the codepoint, scaled into the cell with a margin.
fn cipher_glyph(glyph: char, cell: u32) -> GlyphMask {
    let mut mask = GlyphMask::empty(cell);
    if glyph.is_whitespace() || cell == 0 {
        return mask;
    }

    let pattern = cipher_pattern(glyph);
    let margin = (cell / 8).max(1).min(cell / 2);
    let inner = cell.saturating_sub(margin * 2).max(1);

    for y in 0..cell {
        if y < margin || y >= margin + inner {
            continue;
        }
        let pattern_row = ((y - margin) * CIPHER_ROWS / inner).min(CIPHER_ROWS - 1);
        for x in 0..cell {
            if x < margin || x >= margin + inner {
                continue;
            }
            let pattern_col = ((x - margin) * CIPHER_COLUMNS / inner).min(CIPHER_COLUMNS - 1);
            if pattern & (1 << (pattern_row * CIPHER_COLUMNS + pattern_col)) != 0 {
                mask.coverage[(y * cell + x) as usize] = u8::MAX;
            }
        }
    }

    mask
}

fn cipher_pattern(glyph: char) -> u64 {
    let mut z = u64::from(glyph as u32).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;

    // Keep a vertical stroke so every glyph reads as a character.
    let spine = (0..CIPHER_ROWS).fold(0_u64, |bits, row| bits | 1 << (row * CIPHER_COLUMNS + 2));
    (z & ((1 << (CIPHER_COLUMNS * CIPHER_ROWS)) - 1)) | spine
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{sha256_hex, GlyphPainter};
    use crate::config::FontSource;
    use crate::error_codes::{find_coded_error, FONT_HASH_MISMATCH, FONT_LOAD_FAILED};

    #[test]
    fn cipher_glyphs_are_deterministic_and_distinct() {
        let mut painter = GlyphPainter::procedural();
        let first = painter.mask('ア', 14).clone();
        let mut other = GlyphPainter::procedural();
        assert_eq!(&first, other.mask('ア', 14));
        assert_ne!(&first, other.mask('7', 14));
        assert!(!first.is_blank());
    }

    #[test]
    fn whitespace_glyph_is_blank() {
        let mut painter = GlyphPainter::procedural();
        assert!(painter.mask(' ', 12).is_blank());
    }

    #[test]
    fn mask_covers_exactly_one_cell() {
        let mut painter = GlyphPainter::procedural();
        let mask = painter.mask('0', 9);
        assert_eq!(mask.size, 9);
        assert_eq!(mask.coverage.len(), 81);
        assert_eq!(mask.coverage_at(0, 0), 0, "margin stays empty");
    }

    #[test]
    fn cache_follows_cell_size_changes() {
        let mut painter = GlyphPainter::procedural();
        assert_eq!(painter.mask('1', 8).size, 8);
        assert_eq!(painter.mask('1', 16).size, 16);
    }

    #[test]
    fn garbage_font_bytes_fail_with_font_code() {
        let error = GlyphPainter::from_font_bytes(vec![0, 1, 2, 3], "junk")
            .err()
            .expect("junk should not parse as a font");
        assert_eq!(find_coded_error(&error).map(|coded| coded.code), Some(FONT_LOAD_FAILED));
    }

    #[test]
    fn pinned_digest_mismatch_is_reported_before_parsing() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let path = dir.path().join("fake.ttf");
        fs::write(&path, b"not a font").expect("font should write");

        let source = FontSource {
            path,
            sha256: Some("0".repeat(64)),
        };
        let error = GlyphPainter::from_font_source(&source)
            .err()
            .expect("digest should mismatch");
        assert_eq!(find_coded_error(&error).map(|coded| coded.code), Some(FONT_HASH_MISMATCH));
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
