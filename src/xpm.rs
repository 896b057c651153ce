//! Pixel-map descriptions
//!
//! Parsed XPM images: a header, a symbol to color-name palette and a row-major
//! grid of symbols. Icons are usually compiled in as string arrays, so
//! `from_lines` takes the strings directly; `parse` accepts XPM file text.

use std::collections::HashMap;

use crate::color::is_transparent;
use crate::error::{DockError, Result};

/// Visual keys of an XPM color line, in order of preference
const COLOR_KEYS: &[&str] = &["c", "g", "g4", "m"];
const ALL_KEYS: &[&str] = &["c", "g", "g4", "m", "s"];

/// One palette entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteEntry {
    pub symbol: String,
    pub color: String,
}

impl PaletteEntry {
    pub fn new(symbol: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            color: color.into(),
        }
    }

    pub fn is_transparent(&self) -> bool {
        is_transparent(&self.color)
    }
}

/// Validated pixel-map description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixmapDescription {
    width: u16,
    height: u16,
    chars_per_pixel: usize,
    palette: Vec<PaletteEntry>,
    rows: Vec<String>,
    /// Palette index of every pixel, row-major
    indices: Vec<usize>,
}

fn malformed(message: impl Into<String>) -> DockError {
    DockError::MalformedImage(message.into())
}

impl PixmapDescription {
    /// Build a description from its parts
    ///
    /// Every row must hold exactly `width` symbols of `chars_per_pixel`
    /// characters, and every symbol must appear in the palette.
    pub fn new(
        width: u16,
        height: u16,
        chars_per_pixel: usize,
        palette: Vec<PaletteEntry>,
        rows: Vec<String>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(malformed(format!("empty image {}x{}", width, height)));
        }
        if chars_per_pixel == 0 {
            return Err(malformed("zero characters per pixel"));
        }
        if rows.len() != height as usize {
            return Err(malformed(format!("expected {} rows, found {}", height, rows.len())));
        }

        let indices = Self::index_pixels(width, chars_per_pixel, &palette, &rows)?;

        Ok(Self {
            width,
            height,
            chars_per_pixel,
            palette,
            rows,
            indices,
        })
    }

    /// Map every pixel of `rows` to its palette index
    fn index_pixels(
        width: u16,
        chars_per_pixel: usize,
        palette: &[PaletteEntry],
        rows: &[String],
    ) -> Result<Vec<usize>> {
        let mut lookup: HashMap<&str, usize> = HashMap::with_capacity(palette.len());
        for (index, entry) in palette.iter().enumerate() {
            if entry.symbol.chars().count() != chars_per_pixel {
                return Err(malformed(format!("palette symbol {:?} is not {} characters", entry.symbol, chars_per_pixel)));
            }
            if lookup.insert(entry.symbol.as_str(), index).is_some() {
                return Err(malformed(format!("duplicate palette symbol {:?}", entry.symbol)));
            }
        }

        let mut indices = Vec::with_capacity(width as usize * rows.len());
        for (y, row) in rows.iter().enumerate() {
            let chars: Vec<(usize, char)> = row.char_indices().collect();
            if chars.len() != width as usize * chars_per_pixel {
                return Err(malformed(format!(
                    "row {} has {} characters, expected {}",
                    y,
                    chars.len(),
                    width as usize * chars_per_pixel
                )));
            }
            for x in 0..width as usize {
                let start = chars[x * chars_per_pixel].0;
                let end = chars
                    .get((x + 1) * chars_per_pixel)
                    .map(|&(offset, _)| offset)
                    .unwrap_or(row.len());
                let symbol = &row[start..end];
                let index = lookup
                    .get(symbol)
                    .copied()
                    .ok_or_else(|| malformed(format!("pixel ({}, {}) uses unknown symbol {:?}", x, y, symbol)))?;
                indices.push(index);
            }
        }
        Ok(indices)
    }

    /// Parse the strings of an XPM array (header, colors, rows)
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Result<Self> {
        let header = lines.first().ok_or_else(|| malformed("missing header"))?.as_ref();
        let values: Vec<&str> = header.split_whitespace().collect();
        if values.len() < 4 {
            return Err(malformed(format!("bad header {:?}", header)));
        }
        let number = |i: usize| -> Result<usize> {
            values[i]
                .parse::<usize>()
                .map_err(|_| malformed(format!("bad header value {:?}", values[i])))
        };
        let width = u16::try_from(number(0)?).map_err(|_| malformed("width too large"))?;
        let height = u16::try_from(number(1)?).map_err(|_| malformed("height too large"))?;
        let colors = number(2)?;
        let chars_per_pixel = number(3)?;
        if chars_per_pixel == 0 {
            return Err(malformed("zero characters per pixel"));
        }

        let expected = colors
            .checked_add(1)
            .and_then(|n| n.checked_add(height as usize))
            .ok_or_else(|| malformed(format!("color count {} too large", colors)))?;
        if lines.len() < expected {
            return Err(malformed(format!("expected {} strings, found {}", expected, lines.len())));
        }

        let palette = lines[1..1 + colors]
            .iter()
            .map(|line| parse_color_line(line.as_ref(), chars_per_pixel))
            .collect::<Result<Vec<_>>>()?;
        let rows = lines[1 + colors..expected]
            .iter()
            .map(|row| row.as_ref().to_string())
            .collect();

        Self::new(width, height, chars_per_pixel, palette, rows)
    }

    /// Parse XPM file text (`static char *name[] = { "...", ... };`)
    pub fn parse(text: &str) -> Result<Self> {
        let mut strings = Vec::new();
        let mut rest = text;
        while let Some(start) = rest.find('"') {
            let Some(len) = rest[start + 1..].find('"') else {
                return Err(malformed("unterminated string"));
            };
            strings.push(&rest[start + 1..start + 1 + len]);
            rest = &rest[start + len + 2..];
        }
        Self::from_lines(&strings)
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn chars_per_pixel(&self) -> usize {
        self.chars_per_pixel
    }

    pub fn palette(&self) -> &[PaletteEntry] {
        &self.palette
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Symbol of the transparent palette entry, if any
    pub fn transparent_symbol(&self) -> Option<&str> {
        self.palette
            .iter()
            .find(|entry| entry.is_transparent())
            .map(|entry| entry.symbol.as_str())
    }

    /// Palette entry of the pixel at `(x, y)`
    pub fn pixel(&self, x: u16, y: u16) -> Option<&PaletteEntry> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = self.indices[y as usize * self.width as usize + x as usize];
        self.palette.get(index)
    }

    /// Palette index of every pixel, row-major
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

/// Parse `"<symbol> c <color> [m <mono> ...]"`
fn parse_color_line(line: &str, chars_per_pixel: usize) -> Result<PaletteEntry> {
    let split = line
        .char_indices()
        .nth(chars_per_pixel)
        .map(|(offset, _)| offset)
        .ok_or_else(|| malformed(format!("bad color line {:?}", line)))?;
    let (symbol, spec) = line.split_at(split);

    let mut values: Vec<(&str, String)> = Vec::new();
    for token in spec.split_whitespace() {
        if ALL_KEYS.contains(&token) {
            values.push((token, String::new()));
            continue;
        }
        match values.last_mut() {
            Some((_, value)) if !value.is_empty() => {
                value.push(' ');
                value.push_str(token);
            }
            Some((_, value)) => value.push_str(token),
            None => return Err(malformed(format!("color line {:?} has no visual key", line))),
        }
    }

    COLOR_KEYS
        .iter()
        .find_map(|key| {
            values
                .iter()
                .find(|(k, v)| k == key && !v.is_empty())
                .map(|(_, v)| v.clone())
        })
        .map(|color| PaletteEntry::new(symbol, color))
        .ok_or_else(|| malformed(format!("color line {:?} has no color", line)))
}
