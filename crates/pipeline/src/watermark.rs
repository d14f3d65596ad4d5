//! Watermarking free-tier outputs.
//!
//! The default [`TextWatermarker`] writes a sample notice in amber along the
//! image diagonal, with fainter parallel copies above and below it, and
//! re-encodes as JPEG. Text is drawn from a built-in 5x7 glyph set so no
//! font file is needed at runtime. It is CPU bound; callers run it on the
//! blocking pool.

use std::f32::consts::FRAC_1_SQRT_2;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

/// Notice written over free outputs.
pub const WATERMARK_TEXT: &str = "AI SAMPLE – UPGRADE FOR CLEAN IMAGE";

/// Text colour (amber).
const TEXT_COLOR: Rgb<u8> = Rgb([255, 215, 0]);

/// Opacity of the centre line.
const MAIN_ALPHA: f32 = 0.9;

/// Opacity of the repeated lines.
const REPEAT_ALPHA: f32 = 0.7;

/// Repeated lines on each side of the centre line.
const REPEAT_LINES: f32 = 2.0;

const GLYPH_WIDTH: i64 = 5;
const GLYPH_HEIGHT: i64 = 7;
/// Glyph width plus one column of spacing.
const GLYPH_ADVANCE: i64 = 6;

/// Default JPEG quality of the re-encoded image.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

#[derive(Debug, thiserror::Error)]
pub enum WatermarkError {
    #[error("Could not decode image: {0}")]
    Decode(image::ImageError),

    #[error("Could not encode image: {0}")]
    Encode(image::ImageError),
}

/// Marks an image as a free sample. Returns the new encoded bytes.
pub trait Watermarker: Send + Sync {
    fn apply(&self, bytes: &[u8]) -> Result<Vec<u8>, WatermarkError>;
}

/// Diagonal sample notice, JPEG output.
pub struct TextWatermarker {
    quality: u8,
    text: String,
}

impl TextWatermarker {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            text: WATERMARK_TEXT.to_string(),
        }
    }
}

impl Default for TextWatermarker {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl Watermarker for TextWatermarker {
    fn apply(&self, bytes: &[u8]) -> Result<Vec<u8>, WatermarkError> {
        let mut img = image::load_from_memory(bytes)
            .map_err(WatermarkError::Decode)?
            .to_rgb8();

        draw_diagonal_text(&mut img, &self.text);

        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(&img)
            .map_err(WatermarkError::Encode)?;
        Ok(out.into_inner())
    }
}

/// Draw `text` centred on the top-left to bottom-right diagonal.
fn draw_diagonal_text(img: &mut RgbImage, text: &str) {
    let glyphs: Vec<[u8; 7]> = text.chars().map(glyph).collect();
    if glyphs.is_empty() {
        return;
    }

    let (width, height) = img.dimensions();
    let longest = width.max(height) as f32;
    let diagonal = (width as f32).hypot(height as f32);
    let columns = (glyphs.len() as i64 * GLYPH_ADVANCE - 1) as f32;

    // Cell size of one glyph pixel: a twentieth of the long side per text
    // line, shrunk so the centre line fits the diagonal.
    let scale = (longest / 20.0 / GLYPH_HEIGHT as f32)
        .min(diagonal * 0.9 / columns)
        .max(1.0);
    let text_width = columns * scale;
    let text_height = GLYPH_HEIGHT as f32 * scale;
    let line_gap = (longest / 4.0).max(text_height * 2.0);
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        let along = (dx + dy) * FRAC_1_SQRT_2;
        let across = (dy - dx) * FRAC_1_SQRT_2;

        let line = (across / line_gap).round();
        if line.abs() > REPEAT_LINES {
            continue;
        }
        let tx = along + text_width / 2.0;
        let ty = across - line * line_gap + text_height / 2.0;
        if tx < 0.0 || ty < 0.0 {
            continue;
        }

        let col = (tx / scale) as i64;
        let row = (ty / scale) as i64;
        if glyph_hit(&glyphs, col, row) {
            let alpha = if line == 0.0 { MAIN_ALPHA } else { REPEAT_ALPHA };
            blend(pixel, TEXT_COLOR, alpha);
        }
    }
}

fn glyph_hit(glyphs: &[[u8; 7]], col: i64, row: i64) -> bool {
    if !(0..GLYPH_HEIGHT).contains(&row) || col < 0 {
        return false;
    }
    let index = (col / GLYPH_ADVANCE) as usize;
    let x = col % GLYPH_ADVANCE;
    if x >= GLYPH_WIDTH {
        return false;
    }
    glyphs
        .get(index)
        .is_some_and(|g| (g[row as usize] >> (GLYPH_WIDTH - 1 - x)) & 1 == 1)
}

/// Rows of a 5x7 glyph, leftmost pixel in bit 4. Unknown characters are blank.
fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'I' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b11111],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        '-' | '–' => [0, 0, 0, 0b11111, 0, 0, 0],
        _ => [0; 7],
    }
}

fn blend(pixel: &mut Rgb<u8>, over: Rgb<u8>, alpha: f32) {
    for (channel, top) in pixel.0.iter_mut().zip(over.0) {
        let mixed = f32::from(*channel) * (1.0 - alpha) + f32::from(top) * alpha;
        *channel = mixed.round().clamp(0.0, 255.0) as u8;
    }
}
