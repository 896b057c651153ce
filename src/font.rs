//! Bitmap fonts
//!
//! A character set is a block of fixed-size glyph cells inside a strip image,
//! starting with the space character and laid out left to right, top to bottom.
//! Text is drawn by copying cells into the back buffer, so characters that fall
//! partly outside the target are clipped like any other copy.

use crate::backend::{DisplayBackend, Drawable};
use crate::error::Result;
use crate::image::{IconPipeline, SourceRect};
use crate::xpm::PixmapDescription;

const FIRST_CHAR: u32 = ' ' as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapFont {
    pub char_width: i32,
    pub char_height: i32,
    /// Size of the whole character set block
    pub charset_width: i32,
    pub charset_height: i32,
    /// Row of the strip image where the character set begins
    pub charset_start: i32,
    /// Added to every target position
    pub x_offset: i32,
    pub y_offset: i32,
}

impl BitmapFont {
    pub fn new(char_width: i32, char_height: i32, charset_width: i32, charset_height: i32) -> Self {
        Self {
            char_width,
            char_height,
            charset_width,
            charset_height,
            charset_start: 0,
            x_offset: 3,
            y_offset: 3,
        }
    }

    /// Font whose character set is a whole pixel map
    pub fn for_image(description: &PixmapDescription, char_width: i32, char_height: i32) -> Self {
        Self::new(
            char_width,
            char_height,
            description.width() as i32,
            description.height() as i32,
        )
    }

    /// Record where the character set was placed in the strip image
    pub fn place(&mut self, charset_start: i32) {
        self.charset_start = charset_start;
    }

    /// Pixels per glyph row of the character set
    fn line_length(&self) -> i32 {
        self.charset_width - self.charset_width % self.char_width
    }

    /// Cell of `ch` in the strip image
    pub fn glyph_rect(&self, ch: char) -> Option<SourceRect> {
        if self.char_width <= 0 || self.char_height <= 0 {
            return None;
        }
        let line_length = self.line_length();
        if line_length <= 0 {
            return None;
        }
        let code = (ch as u32).checked_sub(FIRST_CHAR)?;
        let pos = i32::try_from(code).ok()?.checked_mul(self.char_width)?;
        let row = pos / line_length;
        if (row + 1) * self.char_height > self.charset_height {
            return None;
        }
        Some(SourceRect::new(
            pos % line_length,
            row * self.char_height + self.charset_start,
            self.char_width,
            self.char_height,
        ))
    }

    /// Draw one character from `strip` into `target` at `(x, y)`
    ///
    /// Characters missing from the set are skipped.
    pub fn add_char<B: DisplayBackend>(
        &self,
        pipeline: &IconPipeline<B>,
        strip: Drawable,
        target: Drawable,
        ch: char,
        x: i32,
        y: i32,
    ) -> Result<()> {
        match self.glyph_rect(ch) {
            Some(rect) => pipeline.copy_region(
                strip,
                rect,
                target,
                (x + self.x_offset, y + self.y_offset),
            ),
            None => Ok(()),
        }
    }

    /// Draw a string left to right, returning its width in pixels
    pub fn add_string<B: DisplayBackend>(
        &self,
        pipeline: &IconPipeline<B>,
        strip: Drawable,
        target: Drawable,
        text: &str,
        x: i32,
        y: i32,
    ) -> Result<i32> {
        let mut advance = 0;
        for ch in text.chars() {
            self.add_char(pipeline, strip, target, ch, x + advance, y)?;
            advance += self.char_width;
        }
        Ok(advance)
    }

    /// X start that centres `text` in an area with `offset` margins
    pub fn center_start(&self, text: &str, area_width: i32, offset: i32) -> i32 {
        let width = text.chars().count() as i32 * self.char_width;
        let text_area = area_width - offset * 2 - 1;
        (text_area - width) / 2
    }

    /// Even spacing between `num_lines` text lines in an area of `height`
    /// pixels, leaving `margin` above the first line
    ///
    /// Fewer than two lines have no spacing.
    pub fn vertical_spacing(&self, num_lines: i32, margin: i32, height: i32) -> Option<i32> {
        if num_lines < 2 {
            return None;
        }
        let free = height - (num_lines * self.char_height + 1) - self.y_offset * 2 - margin;
        Some(free / (num_lines - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::PixelDepth;
    use std::sync::Arc;

    #[test]
    fn test_glyph_rect() {
        // 10 glyphs of 6x8 per row (62 pixels wide, 2 wasted), 3 rows
        let mut font = BitmapFont::new(6, 8, 62, 24);
        font.place(64);

        assert_eq!(font.glyph_rect(' '), Some(SourceRect::new(0, 64, 6, 8)));
        assert_eq!(font.glyph_rect('!'), Some(SourceRect::new(6, 64, 6, 8)));
        // '*' is the 11th character: first cell of the second row
        assert_eq!(font.glyph_rect('*'), Some(SourceRect::new(0, 72, 6, 8)));
        assert_eq!(font.glyph_rect('\n'), None);
        // Beyond the third row
        assert_eq!(font.glyph_rect('~'), None);
    }

    #[test]
    fn test_center_start() {
        let font = BitmapFont::new(6, 8, 60, 8);
        assert_eq!(font.center_start("abc", 64, 3), (57 - 18) / 2);
    }

    #[test]
    fn test_vertical_spacing() {
        let font = BitmapFont::new(6, 8, 60, 8);
        // 64 - (4 * 8 + 1) - 2 * 3 - 2 = 23 free pixels over 3 gaps
        assert_eq!(font.vertical_spacing(4, 2, 64), Some(7));
        assert_eq!(font.vertical_spacing(1, 2, 64), None);
        assert_eq!(font.vertical_spacing(0, 0, 64), None);
    }

    #[test]
    fn test_add_string() {
        let backend = Arc::new(MemoryBackend::new());
        let pipeline = IconPipeline::new(backend.clone());

        // Charset: ' ' is pixel 0, '!' is pixel 1, one-pixel glyphs
        let strip = backend.create_pixmap(2, 1, PixelDepth::Color).unwrap();
        backend.fill_rect(strip, 1, 0, 1, 1, 0xff0000).unwrap();
        let target = backend.create_pixmap(8, 4, PixelDepth::Color).unwrap();

        let mut font = BitmapFont::new(1, 1, 2, 1);
        font.x_offset = 0;
        font.y_offset = 1;

        let width = font
            .add_string(&pipeline, strip, target, "!~ !", 2, 0)
            .unwrap();
        assert_eq!(width, 4);

        let out = backend.get_pixels(target).unwrap();
        assert_eq!(out.get(2, 1), Some(0xff0000));
        assert_eq!(out.get(3, 1), Some(0));
        assert_eq!(out.get(4, 1), Some(0));
        assert_eq!(out.get(5, 1), Some(0xff0000));
    }

    #[test]
    fn test_char_clipped_at_edge() {
        let backend = Arc::new(MemoryBackend::new());
        let pipeline = IconPipeline::new(backend.clone());
        let strip = backend.create_pixmap(4, 2, PixelDepth::Color).unwrap();
        backend.fill_rect(strip, 0, 0, 4, 2, 0x0000ff).unwrap();
        let target = backend.create_pixmap(3, 3, PixelDepth::Color).unwrap();

        let mut font = BitmapFont::new(2, 2, 4, 2);
        font.x_offset = 0;
        font.y_offset = 0;
        font.add_char(&pipeline, strip, target, ' ', 2, 2).unwrap();

        let out = backend.get_pixels(target).unwrap();
        assert_eq!(out.get(2, 2), Some(0x0000ff));
        assert_eq!(out.get(1, 1), Some(0));
    }
}
