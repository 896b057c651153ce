//! Icon image pipeline
//!
//! Loads pixel-map descriptions into server-side color and mask drawables and
//! copies rectangular frames between drawables. Multi-frame icon art lives in one
//! strip image; drawing a frame is a `copy_region` from the strip into the back
//! buffer.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{CopyArea, DisplayBackend, Drawable, PixelDepth, Raster};
use crate::color::ColorResolver;
use crate::error::{DockError, Result};
use crate::xpm::PixmapDescription;

/// Pixel written into the color drawable where the icon is transparent
pub const TRANSPARENT_PIXEL: u32 = 0;

/// Rectangle of a source drawable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl SourceRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle covering a whole drawable
    pub fn full(width: u16, height: u16) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }
}

/// Clip a copy of `rect` from a source of `src_size` to `dest` in a destination
/// of `dst_size`
///
/// Parts of the rectangle outside the source, and parts of the write outside the
/// destination, are dropped. Returns `None` when nothing is left to copy.
pub fn clip_copy(
    src_size: (u16, u16),
    dst_size: (u16, u16),
    rect: SourceRect,
    dest: (i32, i32),
) -> Option<CopyArea> {
    let clip_axis = |src: i64, len: i64, dst: i64, src_max: i64, dst_max: i64| {
        let mut src = src;
        let mut dst = dst;
        let mut len = len;
        if src < 0 {
            dst -= src;
            len += src;
            src = 0;
        }
        if dst < 0 {
            src -= dst;
            len += dst;
            dst = 0;
        }
        len = len.min(src_max - src).min(dst_max - dst);
        (len > 0).then_some((src, dst, len))
    };

    let (src_x, dst_x, width) = clip_axis(
        rect.x as i64,
        rect.width as i64,
        dest.0 as i64,
        src_size.0 as i64,
        dst_size.0 as i64,
    )?;
    let (src_y, dst_y, height) = clip_axis(
        rect.y as i64,
        rect.height as i64,
        dest.1 as i64,
        src_size.1 as i64,
        dst_size.1 as i64,
    )?;

    // Everything is now inside drawables whose sides fit in u16
    Some(CopyArea {
        src_x: src_x as i16,
        src_y: src_y as i16,
        dst_x: dst_x as i16,
        dst_y: dst_y as i16,
        width: width as u16,
        height: height as u16,
    })
}

/// Offscreen drawable freed when dropped
pub struct Pixmap<B: DisplayBackend> {
    backend: Arc<B>,
    id: Drawable,
    width: u16,
    height: u16,
    depth: PixelDepth,
}

impl<B: DisplayBackend> Pixmap<B> {
    /// Allocate a drawable on `backend`
    pub fn new(backend: Arc<B>, width: u16, height: u16, depth: PixelDepth) -> Result<Self> {
        let id = backend.create_pixmap(width, height, depth)?;
        Ok(Self {
            backend,
            id,
            width,
            height,
            depth,
        })
    }

    pub fn id(&self) -> Drawable {
        self.id
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn depth(&self) -> PixelDepth {
        self.depth
    }
}

impl<B: DisplayBackend> Drop for Pixmap<B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.free_pixmap(self.id) {
            warn!("Failed to free pixmap 0x{:x}: {}", self.id, e);
        }
    }
}

impl<B: DisplayBackend> std::fmt::Debug for Pixmap<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pixmap")
            .field("id", &format_args!("0x{:x}", self.id))
            .field("width", &self.width)
            .field("height", &self.height)
            .field("depth", &self.depth)
            .finish()
    }
}

/// Metadata of a loaded icon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconAttributes {
    pub width: u16,
    pub height: u16,
    /// Depth of the color drawable
    pub depth: u8,
    /// Palette size of the source image
    pub colors: usize,
    pub chars_per_pixel: usize,
}

/// Color drawable and transparency mask of one icon image
///
/// Both drawables have the size of the source image and are freed together.
#[derive(Debug)]
pub struct IconImage<B: DisplayBackend> {
    pixmap: Pixmap<B>,
    mask: Pixmap<B>,
    attributes: IconAttributes,
}

impl<B: DisplayBackend> IconImage<B> {
    /// Color drawable
    pub fn pixmap(&self) -> Drawable {
        self.pixmap.id()
    }

    /// 1-bit mask drawable, bits set where the icon is opaque
    pub fn mask(&self) -> Drawable {
        self.mask.id()
    }

    pub fn attributes(&self) -> &IconAttributes {
        &self.attributes
    }

    pub fn width(&self) -> u16 {
        self.attributes.width
    }

    pub fn height(&self) -> u16 {
        self.attributes.height
    }
}

/// Image pipeline session on one display connection
pub struct IconPipeline<B: DisplayBackend> {
    backend: Arc<B>,
    colors: ColorResolver,
}

impl<B: DisplayBackend> IconPipeline<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            colors: ColorResolver::new(),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Resolve a color name through the session's cache
    pub fn get_color(&mut self, name: &str) -> Result<u32> {
        self.colors.get_color(self.backend.as_ref(), name)
    }

    /// Upload a pixel-map description as a color drawable plus mask
    ///
    /// A mask bit is set iff the pixel's symbol is not the transparent one.
    /// Transparent pixels of the color drawable hold `TRANSPARENT_PIXEL`.
    pub fn load_icon(&mut self, description: &PixmapDescription) -> Result<IconImage<B>> {
        let mut pixels = Vec::with_capacity(description.palette().len());
        let mut opaque = Vec::with_capacity(description.palette().len());
        for entry in description.palette() {
            if entry.is_transparent() {
                pixels.push(TRANSPARENT_PIXEL);
                opaque.push(false);
                continue;
            }
            let pixel = self.get_color(&entry.color).map_err(|e| match e {
                DockError::UnresolvedColor { .. } => DockError::ColorAllocationFailed {
                    symbol: entry.symbol.clone(),
                    color: entry.color.clone(),
                },
                other => other,
            })?;
            pixels.push(pixel);
            opaque.push(true);
        }

        let (width, height) = (description.width(), description.height());
        let color = Raster {
            width,
            height,
            pixels: description.indices().iter().map(|&i| pixels[i]).collect(),
        };
        let bits = Raster {
            width,
            height,
            pixels: description.indices().iter().map(|&i| opaque[i] as u32).collect(),
        };

        let pixmap = Pixmap::new(self.backend.clone(), width, height, PixelDepth::Color)?;
        let mask = Pixmap::new(self.backend.clone(), width, height, PixelDepth::Mono)?;
        self.backend.put_pixels(pixmap.id(), 0, 0, &color)?;
        self.backend.put_pixels(mask.id(), 0, 0, &bits)?;

        info!(
            "Loaded icon {}x{} ({} colors) into pixmap 0x{:x}",
            width,
            height,
            description.palette().len(),
            pixmap.id()
        );

        Ok(IconImage {
            pixmap,
            mask,
            attributes: IconAttributes {
                width,
                height,
                depth: self.backend.screen().depth,
                colors: description.palette().len(),
                chars_per_pixel: description.chars_per_pixel(),
            },
        })
    }

    /// Copy `rect` of `source` into `destination` at `dest`
    ///
    /// Source and destination must have the same depth. Whatever falls outside
    /// either drawable is silently dropped.
    pub fn copy_region(
        &self,
        source: Drawable,
        rect: SourceRect,
        destination: Drawable,
        dest: (i32, i32),
    ) -> Result<()> {
        let src_size = self.backend.drawable_size(source)?;
        let dst_size = self.backend.drawable_size(destination)?;
        match clip_copy(src_size, dst_size, rect, dest) {
            Some(area) => self.backend.copy_area(source, destination, area),
            None => {
                debug!("Copy of {:?} to {:?} clipped away", rect, dest);
                Ok(())
            }
        }
    }

    /// Build a 1-bit mask with bits set where `color` differs from `transparent`
    pub fn derive_mask(&self, color: Drawable, transparent: u32) -> Result<Pixmap<B>> {
        let raster = self.backend.get_pixels(color)?;
        let bits = Raster {
            width: raster.width,
            height: raster.height,
            pixels: raster
                .pixels
                .iter()
                .map(|&pixel| (pixel != transparent) as u32)
                .collect(),
        };
        let mask = Pixmap::new(self.backend.clone(), raster.width, raster.height, PixelDepth::Mono)?;
        self.backend.put_pixels(mask.id(), 0, 0, &bits)?;
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    fn pipeline() -> (Arc<MemoryBackend>, IconPipeline<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (backend.clone(), IconPipeline::new(backend))
    }

    fn set_bits(raster: &Raster) -> Vec<(u16, u16)> {
        let mut set = Vec::new();
        for y in 0..raster.height {
            for x in 0..raster.width {
                if raster.get(x, y) == Some(1) {
                    set.push((x, y));
                }
            }
        }
        set
    }

    #[test]
    fn test_clip_copy_inside() {
        let area = clip_copy((64, 64), (64, 64), SourceRect::new(10, 20, 5, 6), (1, 2)).unwrap();
        assert_eq!(area, CopyArea { src_x: 10, src_y: 20, dst_x: 1, dst_y: 2, width: 5, height: 6 });
    }

    #[test]
    fn test_clip_copy_edges() {
        // Source rectangle hanging off the left/top of the source
        let area = clip_copy((10, 10), (10, 10), SourceRect::new(-2, -3, 5, 5), (0, 0)).unwrap();
        assert_eq!(area, CopyArea { src_x: 0, src_y: 0, dst_x: 2, dst_y: 3, width: 3, height: 2 });

        // Destination write hanging off the right/bottom
        let area = clip_copy((10, 10), (8, 8), SourceRect::new(0, 0, 10, 10), (5, 6)).unwrap();
        assert_eq!(area, CopyArea { src_x: 0, src_y: 0, dst_x: 5, dst_y: 6, width: 3, height: 2 });

        // Negative destination offset
        let area = clip_copy((10, 10), (10, 10), SourceRect::new(0, 0, 4, 4), (-1, -2)).unwrap();
        assert_eq!(area, CopyArea { src_x: 1, src_y: 2, dst_x: 0, dst_y: 0, width: 3, height: 2 });
    }

    #[test]
    fn test_clip_copy_nothing_left() {
        assert!(clip_copy((10, 10), (10, 10), SourceRect::new(20, 0, 4, 4), (0, 0)).is_none());
        assert!(clip_copy((10, 10), (10, 10), SourceRect::new(0, 0, 4, 4), (10, 0)).is_none());
        assert!(clip_copy((10, 10), (10, 10), SourceRect::new(0, 0, 0, 4), (0, 0)).is_none());
        assert!(clip_copy((10, 10), (10, 10), SourceRect::new(0, 0, -3, 4), (0, 0)).is_none());
    }

    #[test]
    fn test_single_opaque_pixel_mask() {
        let (backend, mut pipeline) = pipeline();
        let lines = ["3 3 2 1", "  c None", "o c red", "   ", "  o", "   "];
        let description = PixmapDescription::from_lines(&lines).unwrap();

        let icon = pipeline.load_icon(&description).unwrap();
        assert_eq!((icon.width(), icon.height()), (3, 3));

        let mask = backend.get_pixels(icon.mask()).unwrap();
        assert_eq!(set_bits(&mask), vec![(2, 1)]);

        let color = backend.get_pixels(icon.pixmap()).unwrap();
        assert_eq!(color.get(2, 1), Some(0xff0000));
        assert_eq!(color.get(0, 0), Some(TRANSPARENT_PIXEL));
    }

    #[test]
    fn test_black_pixels_stay_opaque() {
        let (backend, mut pipeline) = pipeline();
        let lines = ["2 1 2 1", "  c None", "k c black", "k "];
        let icon = pipeline
            .load_icon(&PixmapDescription::from_lines(&lines).unwrap())
            .unwrap();
        assert_eq!(backend.get_pixels(icon.mask()).unwrap().pixels, vec![1, 0]);
    }

    #[test]
    fn test_color_allocation_failure() {
        let (backend, mut pipeline) = pipeline();
        let lines = ["1 1 1 1", "x c octarine", "x"];
        let err = pipeline
            .load_icon(&PixmapDescription::from_lines(&lines).unwrap())
            .unwrap_err();
        match err {
            DockError::ColorAllocationFailed { symbol, color } => {
                assert_eq!(symbol, "x");
                assert_eq!(color, "octarine");
            }
            other => panic!("Wrong error: {:?}", other),
        }
        assert_eq!(backend.pixmap_count(), 0);
    }

    #[test]
    fn test_identity_copy() {
        let (backend, mut pipeline) = pipeline();
        let lines = ["3 2 3 1", "r c red", "g c green", "b c blue", "rgb", "bgr"];
        let icon = pipeline
            .load_icon(&PixmapDescription::from_lines(&lines).unwrap())
            .unwrap();
        let dest = backend.create_pixmap(3, 2, PixelDepth::Color).unwrap();

        pipeline
            .copy_region(icon.pixmap(), SourceRect::full(3, 2), dest, (0, 0))
            .unwrap();

        assert_eq!(
            backend.get_pixels(dest).unwrap(),
            backend.get_pixels(icon.pixmap()).unwrap()
        );
    }

    #[test]
    fn test_partial_copy_leaves_rest_untouched() {
        let (backend, pipeline) = pipeline();
        let source = backend.create_pixmap(4, 4, PixelDepth::Color).unwrap();
        backend.fill_rect(source, 0, 0, 4, 4, 0x00ff00).unwrap();
        let dest = backend.create_pixmap(6, 6, PixelDepth::Color).unwrap();
        backend.fill_rect(dest, 0, 0, 6, 6, 0x123456).unwrap();

        // Rectangle extends two pixels past the right and bottom of the source
        pipeline
            .copy_region(source, SourceRect::new(2, 2, 4, 4), dest, (1, 1))
            .unwrap();

        let out = backend.get_pixels(dest).unwrap();
        for y in 0..6 {
            for x in 0..6 {
                let expected = if (1..3).contains(&x) && (1..3).contains(&y) {
                    0x00ff00
                } else {
                    0x123456
                };
                assert_eq!(out.get(x, y), Some(expected), "pixel ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_copy_frame_from_strip() {
        let (backend, mut pipeline) = pipeline();
        // Two 2x1 frames side by side
        let lines = ["4 1 2 1", "a c red", "b c blue", "aabb"];
        let strip = pipeline
            .load_icon(&PixmapDescription::from_lines(&lines).unwrap())
            .unwrap();
        let dest = backend.create_pixmap(2, 1, PixelDepth::Color).unwrap();

        pipeline
            .copy_region(strip.pixmap(), SourceRect::new(2, 0, 2, 1), dest, (0, 0))
            .unwrap();
        assert_eq!(backend.get_pixels(dest).unwrap().pixels, vec![0x0000ff, 0x0000ff]);
    }

    #[test]
    fn test_copy_fully_outside_is_noop() {
        let (backend, pipeline) = pipeline();
        let source = backend.create_pixmap(2, 2, PixelDepth::Color).unwrap();
        let dest = backend.create_pixmap(2, 2, PixelDepth::Color).unwrap();
        backend.fill_rect(dest, 0, 0, 2, 2, 7).unwrap();

        pipeline
            .copy_region(source, SourceRect::new(50, 50, 2, 2), dest, (0, 0))
            .unwrap();
        assert_eq!(backend.get_pixels(dest).unwrap().pixels, vec![7; 4]);
    }

    #[test]
    fn test_derive_mask() {
        let (backend, pipeline) = pipeline();
        let color = backend.create_pixmap(2, 2, PixelDepth::Color).unwrap();
        backend.fill_rect(color, 0, 0, 2, 2, 0xffffff).unwrap();
        backend.fill_rect(color, 1, 0, 1, 2, 0x00ff00).unwrap();

        let mask = pipeline.derive_mask(color, 0xffffff).unwrap();
        assert_eq!(mask.size(), (2, 2));
        assert_eq!(mask.depth(), PixelDepth::Mono);
        assert_eq!(backend.get_pixels(mask.id()).unwrap().pixels, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_icon_drop_frees_both_drawables() {
        let (backend, mut pipeline) = pipeline();
        let lines = ["1 1 1 1", "x c white", "x"];
        let icon = pipeline
            .load_icon(&PixmapDescription::from_lines(&lines).unwrap())
            .unwrap();
        assert_eq!(backend.pixmap_count(), 2);
        drop(icon);
        assert_eq!(backend.pixmap_count(), 0);
    }
}
