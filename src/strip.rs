//! Strip images
//!
//! A dockapp keeps all of its art in one pixel map: the visible work area in
//! the upper left corner, blanking patterns below it and the character sets of
//! its fonts stacked underneath. `StripBuilder` merges the parts into a single
//! palette and image. Symbols that clash between parts are remapped; parts that
//! share a color share its symbol.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::color::{TRANSPARENT_COLOR, find_rgb_txt, normalize_color};
use crate::error::{DockError, Result};
use crate::font::BitmapFont;
use crate::xpm::{PaletteEntry, PixmapDescription};

/// Candidates for new palette symbols, '(' through '}'
const UNIQUE_SYMBOLS: std::ops::Range<u8> = 40..126;

fn malformed(message: impl Into<String>) -> DockError {
    DockError::MalformedImage(message.into())
}

/// Frame drawn around a generated work area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameStyle {
    /// Bevel color along the right and bottom edges
    #[default]
    Bevel,
    Flat,
}

/// Where color names are normalized from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ColorSource {
    /// First `rgb.txt` found in the standard locations
    #[default]
    Search,
    File(PathBuf),
    /// Keep names as written
    Disabled,
}

impl ColorSource {
    fn path(&self) -> Option<PathBuf> {
        match self {
            Self::Search => find_rgb_txt(),
            Self::File(path) => Some(path.clone()),
            Self::Disabled => None,
        }
    }
}

/// Merged palette of single-character symbols
#[derive(Default)]
struct Palette {
    entries: Vec<PaletteEntry>,
    symbols: HashSet<char>,
    by_color: HashMap<String, char>,
}

impl Palette {
    fn unique_symbol(&self) -> Result<char> {
        UNIQUE_SYMBOLS
            .map(char::from)
            .find(|symbol| !self.symbols.contains(symbol))
            .ok_or_else(|| malformed("no free palette symbol left"))
    }

    /// Symbol for `color`, reusing an entry of the same color
    fn insert(&mut self, preferred: Option<char>, color: String) -> Result<char> {
        let key = color.to_ascii_lowercase();
        if let Some(&symbol) = self.by_color.get(&key) {
            return Ok(symbol);
        }
        let symbol = match preferred {
            Some(symbol) if !self.symbols.contains(&symbol) => symbol,
            _ => self.unique_symbol()?,
        };
        self.entries.push(PaletteEntry::new(symbol.to_string(), color));
        self.symbols.insert(symbol);
        self.by_color.insert(key, symbol);
        Ok(symbol)
    }

    /// Add the palette of `image` and return its rows in merged symbols
    fn merge(&mut self, image: &PixmapDescription, database: Option<&Path>) -> Result<Vec<Vec<char>>> {
        if image.chars_per_pixel() != 1 {
            return Err(malformed(format!(
                "strip parts need one character per pixel, found {}",
                image.chars_per_pixel()
            )));
        }

        let mut remap = HashMap::with_capacity(image.palette().len());
        for entry in image.palette() {
            let Some(symbol) = entry.symbol.chars().next() else {
                return Err(malformed("empty palette symbol"));
            };
            let color = normalize_color(&entry.color, database)?;
            let merged = self.insert(Some(symbol), color)?;
            if merged != symbol {
                debug!("Remapped symbol {:?} to {:?} ({})", symbol, merged, entry.color);
            }
            remap.insert(symbol, merged);
        }

        Ok(image
            .rows()
            .iter()
            .map(|row| row.chars().map(|c| remap.get(&c).copied().unwrap_or(c)).collect())
            .collect())
    }
}

struct FontPart {
    image: PixmapDescription,
    char_width: i32,
    char_height: i32,
}

/// Builder for the strip image of a dockapp
pub struct StripBuilder {
    width: u16,
    height: u16,
    margin: u16,
    style: FrameStyle,
    background_color: String,
    bevel_color: String,
    colors: Vec<(String, String)>,
    background: Option<PixmapDescription>,
    patterns: Option<PixmapDescription>,
    fonts: Vec<FontPart>,
    database: ColorSource,
}

impl StripBuilder {
    /// Strip for a work area of `width` x `height`
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            margin: 3,
            style: FrameStyle::default(),
            background_color: "black".to_string(),
            bevel_color: "#bebebe".to_string(),
            colors: vec![
                ("1".to_string(), "black".to_string()),
                ("2".to_string(), "white".to_string()),
            ],
            background: None,
            patterns: None,
            fonts: Vec::new(),
            database: ColorSource::default(),
        }
    }

    /// Transparent border around a generated work area
    pub fn margin(mut self, margin: u16) -> Self {
        self.margin = margin;
        self
    }

    pub fn style(mut self, style: FrameStyle) -> Self {
        self.style = style;
        self
    }

    pub fn background_color(mut self, color: impl Into<String>) -> Self {
        self.background_color = color.into();
        self
    }

    pub fn bevel_color(mut self, color: impl Into<String>) -> Self {
        self.bevel_color = color.into();
        self
    }

    /// Extra palette color, kept under `symbol` unless that symbol is taken
    pub fn color(mut self, symbol: impl Into<String>, color: impl Into<String>) -> Self {
        self.colors.push((symbol.into(), color.into()));
        self
    }

    /// Work area art; replaces the generated frame
    pub fn background(mut self, image: PixmapDescription) -> Self {
        self.background = Some(image);
        self
    }

    /// Blanking patterns below the work area; defaults to a block of the
    /// background color the size of the work area
    pub fn patterns(mut self, image: PixmapDescription) -> Self {
        self.patterns = Some(image);
        self
    }

    /// Append a character set of `char_width` x `char_height` glyphs
    pub fn font(mut self, image: PixmapDescription, char_width: i32, char_height: i32) -> Self {
        self.fonts.push(FontPart {
            image,
            char_width,
            char_height,
        });
        self
    }

    pub fn color_database(mut self, database: ColorSource) -> Self {
        self.database = database;
        self
    }

    pub fn build(&self) -> Result<Strip> {
        let database = self.database.path();
        let database = database.as_deref();
        let mut palette = Palette::default();
        let blank = palette.insert(Some(' '), TRANSPARENT_COLOR.to_string())?;

        let background = self
            .background
            .as_ref()
            .map(|image| palette.merge(image, database))
            .transpose()?;
        let font_rows = self
            .fonts
            .iter()
            .map(|font| palette.merge(&font.image, database))
            .collect::<Result<Vec<_>>>()?;

        for (symbol, color) in &self.colors {
            let mut chars = symbol.chars();
            let (Some(preferred), None) = (chars.next(), chars.next()) else {
                return Err(malformed(format!("palette symbol {:?} is not one character", symbol)));
            };
            palette.insert(Some(preferred), normalize_color(color, database)?)?;
        }
        let bevel = palette.insert(None, normalize_color(&self.bevel_color, database)?)?;
        let fill = palette.insert(None, normalize_color(&self.background_color, database)?)?;

        let patterns = match &self.patterns {
            Some(image) => palette.merge(image, database)?,
            None => vec![vec![fill; self.width as usize]; self.height as usize],
        };
        let background = match background {
            Some(rows) => rows,
            None => self.frame(blank, fill, bevel)?,
        };

        let patterns_start = background.len() as i32;
        let mut charset_start = patterns_start + patterns.len() as i32;
        let mut fonts = Vec::with_capacity(self.fonts.len());
        for part in &self.fonts {
            let mut font = BitmapFont::for_image(&part.image, part.char_width, part.char_height);
            font.place(charset_start);
            charset_start += font.charset_height;
            fonts.push(font);
        }

        let rows: Vec<Vec<char>> = background
            .into_iter()
            .chain(patterns.iter().cloned())
            .chain(font_rows.into_iter().flatten())
            .collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows: Vec<String> = rows
            .into_iter()
            .map(|row| {
                let padding = width - row.len();
                row.into_iter().chain(std::iter::repeat_n(blank, padding)).collect()
            })
            .collect();

        let strip_width = u16::try_from(width).map_err(|_| malformed("strip too wide"))?;
        let strip_height = u16::try_from(rows.len()).map_err(|_| malformed("strip too tall"))?;
        debug!(
            "Built {}x{} strip with {} colors and {} fonts",
            strip_width,
            strip_height,
            palette.entries.len(),
            fonts.len()
        );

        Ok(Strip {
            image: PixmapDescription::new(strip_width, strip_height, 1, palette.entries, rows)?,
            fonts,
            patterns_start,
            patterns_height: patterns.len() as i32,
        })
    }

    /// Work area framed by a transparent margin, with the bevel along the
    /// right and bottom edges in the bevelled style
    fn frame(&self, blank: char, fill: char, bevel: char) -> Result<Vec<Vec<char>>> {
        let (width, height, margin) = (self.width as usize, self.height as usize, self.margin as usize);
        if width <= margin * 2 || height <= margin * 2 {
            return Err(malformed(format!(
                "margin {} leaves no work area in {}x{}",
                margin, width, height
            )));
        }
        let edge = match self.style {
            FrameStyle::Bevel => bevel,
            FrameStyle::Flat => fill,
        };
        let inner = width - margin * 2;

        let blank_row = vec![blank; width];
        let framed = |body: Vec<char>| -> Vec<char> {
            let mut row = vec![blank; margin];
            row.extend(body);
            row.resize(width, blank);
            row
        };

        let mut rows = vec![blank_row.clone(); margin];
        for _ in margin..height - margin - 1 {
            let mut body = vec![fill; inner - 1];
            body.push(edge);
            rows.push(framed(body));
        }
        rows.push(framed(vec![edge; inner]));
        rows.extend(std::iter::repeat_n(blank_row, margin));
        Ok(rows)
    }
}

/// Merged strip image and the fonts placed in it
#[derive(Debug, Clone)]
pub struct Strip {
    image: PixmapDescription,
    fonts: Vec<BitmapFont>,
    patterns_start: i32,
    patterns_height: i32,
}

impl Strip {
    pub fn image(&self) -> &PixmapDescription {
        &self.image
    }

    pub fn into_image(self) -> PixmapDescription {
        self.image
    }

    /// Fonts in the order they were added, each placed at its character set
    pub fn fonts(&self) -> &[BitmapFont] {
        &self.fonts
    }

    pub fn font(&self, index: usize) -> Option<&BitmapFont> {
        self.fonts.get(index)
    }

    /// First row of the blanking patterns
    pub fn patterns_start(&self) -> i32 {
        self.patterns_start
    }

    pub fn patterns_height(&self) -> i32 {
        self.patterns_height
    }
}
