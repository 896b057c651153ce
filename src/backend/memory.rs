//! In-memory display backend
//!
//! Keeps every drawable as a client-side pixel array. Used for headless
//! rendering and as the fake display connection in tests.
//! Color pixels are `0xRRGGBB`; mask pixels are 0 or 1.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{
    Connector, CopyArea, DisplayBackend, DockEvent, Drawable, PixelDepth, Raster, ScreenInfo,
    Window, WindowRequest,
};
use crate::error::{DockError, Result};

/// Default display name of a `MemoryServer`
pub const DEFAULT_DISPLAY: &str = ":0";

/// Names known to the in-memory color database
const NAMED_COLORS: &[(&str, u32)] = &[
    ("black", 0x000000),
    ("white", 0xffffff),
    ("red", 0xff0000),
    ("green", 0x00ff00),
    ("blue", 0x0000ff),
    ("yellow", 0xffff00),
    ("cyan", 0x00ffff),
    ("magenta", 0xff00ff),
    ("gray", 0xbebebe),
    ("grey", 0xbebebe),
    ("darkgray", 0xa9a9a9),
    ("lightgray", 0xd3d3d3),
    ("orange", 0xffa500),
    ("navy", 0x000080),
    ("darkgreen", 0x006400),
    ("lightseagreen", 0x20b2aa),
];

/// A window as recorded by the in-memory backend
#[derive(Debug, Clone)]
pub struct WindowRecord {
    pub request: WindowRequest,
    pub mapped: bool,
    /// Bounding shape: offset and the mask contents at installation time
    pub shape: Option<(i16, i16, Raster)>,
}

#[derive(Debug)]
struct Buffer {
    depth: PixelDepth,
    raster: Raster,
}

#[derive(Debug, Default)]
struct State {
    next_id: u32,
    buffers: HashMap<Drawable, Buffer>,
    windows: HashMap<Window, WindowRecord>,
    events: VecDeque<DockEvent>,
    flushes: usize,
}

impl State {
    fn buffer(&self, drawable: Drawable) -> Result<&Buffer> {
        self.buffers
            .get(&drawable)
            .ok_or(DockError::UnknownDrawable(drawable))
    }

    fn buffer_mut(&mut self, drawable: Drawable) -> Result<&mut Buffer> {
        self.buffers
            .get_mut(&drawable)
            .ok_or(DockError::UnknownDrawable(drawable))
    }

    fn allocate(&mut self, width: u16, height: u16, depth: PixelDepth) -> Drawable {
        self.next_id += 1;
        let id = self.next_id;
        self.buffers.insert(
            id,
            Buffer {
                depth,
                raster: Raster::filled(width, height, 0),
            },
        );
        id
    }
}

/// In-memory display connection
#[derive(Debug)]
pub struct MemoryBackend {
    screen: ScreenInfo,
    state: Mutex<State>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend with a 1280x1024 depth-24 screen
    pub fn new() -> Self {
        Self::with_screen(1280, 1024)
    }

    pub fn with_screen(width: u16, height: u16) -> Self {
        Self {
            screen: ScreenInfo {
                width,
                height,
                depth: 24,
                black_pixel: 0x000000,
                white_pixel: 0xffffff,
            },
            state: Mutex::new(State {
                next_id: 0x0040_0000,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned store still holds consistent pixel data
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue an event for `poll_event`
    pub fn push_event(&self, event: DockEvent) {
        self.lock().events.push_back(event);
    }

    /// Recorded state of a window
    pub fn window(&self, window: Window) -> Option<WindowRecord> {
        self.lock().windows.get(&window).cloned()
    }

    pub fn window_count(&self) -> usize {
        self.lock().windows.len()
    }

    /// Number of live pixmaps (windows excluded)
    pub fn pixmap_count(&self) -> usize {
        let state = self.lock();
        state.buffers.len() - state.windows.len()
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }
}

fn named_color(name: &str) -> Option<u32> {
    let key: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    NAMED_COLORS
        .iter()
        .find(|(known, _)| *known == key)
        .map(|&(_, pixel)| pixel)
}

impl DisplayBackend for MemoryBackend {
    fn screen(&self) -> ScreenInfo {
        self.screen
    }

    fn create_window(&self, request: &WindowRequest) -> Result<Window> {
        let mut state = self.lock();
        let window = state.allocate(request.width, request.height, PixelDepth::Color);
        state.windows.insert(
            window,
            WindowRecord {
                request: request.clone(),
                mapped: false,
                shape: None,
            },
        );
        debug!("Memory window 0x{:x} created ({}x{})", window, request.width, request.height);
        Ok(window)
    }

    fn map_window(&self, window: Window) -> Result<()> {
        let mut state = self.lock();
        let record = state
            .windows
            .get_mut(&window)
            .ok_or(DockError::UnknownDrawable(window))?;
        record.mapped = true;
        Ok(())
    }

    fn destroy_window(&self, window: Window) -> Result<()> {
        let mut state = self.lock();
        state
            .windows
            .remove(&window)
            .ok_or(DockError::UnknownDrawable(window))?;
        state.buffers.remove(&window);
        Ok(())
    }

    fn create_pixmap(&self, width: u16, height: u16, depth: PixelDepth) -> Result<Drawable> {
        Ok(self.lock().allocate(width, height, depth))
    }

    fn free_pixmap(&self, pixmap: Drawable) -> Result<()> {
        let mut state = self.lock();
        if state.windows.contains_key(&pixmap) {
            return Err(DockError::UnknownDrawable(pixmap));
        }
        state
            .buffers
            .remove(&pixmap)
            .map(|_| ())
            .ok_or(DockError::UnknownDrawable(pixmap))
    }

    fn drawable_size(&self, drawable: Drawable) -> Result<(u16, u16)> {
        let state = self.lock();
        let raster = &state.buffer(drawable)?.raster;
        Ok((raster.width, raster.height))
    }

    fn put_pixels(&self, drawable: Drawable, x: i16, y: i16, raster: &Raster) -> Result<()> {
        let mut state = self.lock();
        let buffer = state.buffer_mut(drawable)?;
        let mono = buffer.depth == PixelDepth::Mono;
        let target = &mut buffer.raster;
        for row in 0..raster.height as i32 {
            let ty = y as i32 + row;
            if ty < 0 || ty >= target.height as i32 {
                continue;
            }
            for col in 0..raster.width as i32 {
                let tx = x as i32 + col;
                if tx < 0 || tx >= target.width as i32 {
                    continue;
                }
                let value = raster.pixels[(row * raster.width as i32 + col) as usize];
                let value = if mono { (value != 0) as u32 } else { value };
                target.pixels[(ty * target.width as i32 + tx) as usize] = value;
            }
        }
        Ok(())
    }

    fn get_pixels(&self, drawable: Drawable) -> Result<Raster> {
        Ok(self.lock().buffer(drawable)?.raster.clone())
    }

    fn copy_area(&self, src: Drawable, dst: Drawable, area: CopyArea) -> Result<()> {
        let mut state = self.lock();
        let source = state.buffer(src)?;
        let depth = source.depth;
        let source = source.raster.clone();
        let target = state.buffer_mut(dst)?;
        if target.depth != depth {
            return Err(DockError::UnsupportedDepth(match target.depth {
                PixelDepth::Mono => 1,
                PixelDepth::Color => 24,
            }));
        }
        let target = &mut target.raster;

        // Clip again so a direct caller cannot index out of bounds
        for row in 0..area.height as i32 {
            let (sy, dy) = (area.src_y as i32 + row, area.dst_y as i32 + row);
            if sy < 0 || dy < 0 || sy >= source.height as i32 || dy >= target.height as i32 {
                continue;
            }
            for col in 0..area.width as i32 {
                let (sx, dx) = (area.src_x as i32 + col, area.dst_x as i32 + col);
                if sx < 0 || dx < 0 || sx >= source.width as i32 || dx >= target.width as i32 {
                    continue;
                }
                target.pixels[(dy * target.width as i32 + dx) as usize] =
                    source.pixels[(sy * source.width as i32 + sx) as usize];
            }
        }
        Ok(())
    }

    fn fill_rect(
        &self,
        drawable: Drawable,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        pixel: u32,
    ) -> Result<()> {
        let mut state = self.lock();
        let raster = &mut state.buffer_mut(drawable)?.raster;
        let x0 = (x as i32).max(0);
        let y0 = (y as i32).max(0);
        let x1 = (x as i32 + width as i32).min(raster.width as i32);
        let y1 = (y as i32 + height as i32).min(raster.height as i32);
        for ty in y0..y1 {
            for tx in x0..x1 {
                raster.pixels[(ty * raster.width as i32 + tx) as usize] = pixel;
            }
        }
        Ok(())
    }

    fn alloc_named_color(&self, name: &str) -> Result<u32> {
        named_color(name).ok_or_else(|| DockError::UnresolvedColor { name: name.to_string() })
    }

    fn alloc_rgb_color(&self, red: u16, green: u16, blue: u16) -> Result<u32> {
        Ok(((red as u32 >> 8) << 16) | ((green as u32 >> 8) << 8) | (blue as u32 >> 8))
    }

    fn shape_window(&self, window: Window, x: i16, y: i16, mask: Option<Drawable>) -> Result<()> {
        let mut state = self.lock();
        let shape = match mask {
            Some(mask) => {
                let buffer = state.buffer(mask)?;
                if buffer.depth != PixelDepth::Mono {
                    return Err(DockError::UnsupportedDepth(24));
                }
                Some((x, y, buffer.raster.clone()))
            }
            None => None,
        };
        let record = state
            .windows
            .get_mut(&window)
            .ok_or(DockError::UnknownDrawable(window))?;
        record.shape = shape;
        Ok(())
    }

    fn poll_event(&self) -> Result<Option<DockEvent>> {
        Ok(self.lock().events.pop_front())
    }

    fn flush(&self) -> Result<()> {
        self.lock().flushes += 1;
        Ok(())
    }
}

/// Connector over a fixed set of in-memory displays
#[derive(Debug, Default)]
pub struct MemoryServer {
    displays: HashMap<String, Arc<MemoryBackend>>,
}

impl MemoryServer {
    /// Server reachable as `":0"`
    pub fn new() -> Self {
        let mut server = Self::default();
        server.add_display(DEFAULT_DISPLAY, MemoryBackend::new());
        server
    }

    /// Make a display reachable under `name`
    pub fn add_display(&mut self, name: &str, backend: MemoryBackend) -> Arc<MemoryBackend> {
        let backend = Arc::new(backend);
        self.displays.insert(name.to_string(), backend.clone());
        backend
    }

    pub fn display(&self, name: &str) -> Option<Arc<MemoryBackend>> {
        self.displays.get(name).cloned()
    }
}

impl Connector for MemoryServer {
    type Backend = MemoryBackend;

    fn connect(&self, target: Option<&str>) -> Result<Arc<MemoryBackend>> {
        let name = target.unwrap_or(DEFAULT_DISPLAY);
        self.displays
            .get(name)
            .cloned()
            .ok_or_else(|| DockError::DisplayUnavailable {
                display: name.to_string(),
                reason: "no such display".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_area_between_pixmaps() {
        let backend = MemoryBackend::new();
        let src = backend.create_pixmap(4, 4, PixelDepth::Color).unwrap();
        let dst = backend.create_pixmap(4, 4, PixelDepth::Color).unwrap();
        backend.fill_rect(src, 1, 1, 2, 2, 0xff0000).unwrap();

        let area = CopyArea { src_x: 1, src_y: 1, dst_x: 0, dst_y: 0, width: 2, height: 2 };
        backend.copy_area(src, dst, area).unwrap();

        let out = backend.get_pixels(dst).unwrap();
        assert_eq!(out.get(0, 0), Some(0xff0000));
        assert_eq!(out.get(1, 1), Some(0xff0000));
        assert_eq!(out.get(2, 2), Some(0));
    }

    #[test]
    fn test_copy_area_rejects_depth_mismatch() {
        let backend = MemoryBackend::new();
        let color = backend.create_pixmap(2, 2, PixelDepth::Color).unwrap();
        let mono = backend.create_pixmap(2, 2, PixelDepth::Mono).unwrap();
        let area = CopyArea { src_x: 0, src_y: 0, dst_x: 0, dst_y: 0, width: 2, height: 2 };
        assert!(backend.copy_area(color, mono, area).is_err());
    }

    #[test]
    fn test_mono_pixels_are_bits() {
        let backend = MemoryBackend::new();
        let mask = backend.create_pixmap(2, 1, PixelDepth::Mono).unwrap();
        let raster = Raster { width: 2, height: 1, pixels: vec![7, 0] };
        backend.put_pixels(mask, 0, 0, &raster).unwrap();
        assert_eq!(backend.get_pixels(mask).unwrap().pixels, vec![1, 0]);
    }

    #[test]
    fn test_free_pixmap() {
        let backend = MemoryBackend::new();
        let pixmap = backend.create_pixmap(8, 8, PixelDepth::Color).unwrap();
        assert_eq!(backend.pixmap_count(), 1);
        backend.free_pixmap(pixmap).unwrap();
        assert_eq!(backend.pixmap_count(), 0);
        assert!(matches!(
            backend.free_pixmap(pixmap),
            Err(DockError::UnknownDrawable(_))
        ));
    }

    #[test]
    fn test_named_colors_ignore_case_and_spaces() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.alloc_named_color("Light Sea Green").unwrap(), 0x20b2aa);
        assert!(backend.alloc_named_color("octarine").is_err());
    }

    #[test]
    fn test_server_connect() {
        let server = MemoryServer::new();
        assert!(server.connect(None).is_ok());
        assert!(server.connect(Some(":0")).is_ok());
        assert!(matches!(
            server.connect(Some(":7")),
            Err(DockError::DisplayUnavailable { .. })
        ));
    }
}
