//! Display backends
//!
//! The display connection is the one external collaborator of the dockapp core.
//! `DisplayBackend` lists what the core needs from it: window creation, drawable
//! allocation, named color allocation, rectangle copies and shape installation.

pub mod memory;
pub mod x11;

use std::sync::Arc;

use crate::error::Result;

/// Server-side pixel or bitmap buffer (windows are drawables too)
pub type Drawable = u32;

/// Window id
pub type Window = u32;

/// Pixel format of an offscreen drawable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelDepth {
    /// Screen depth, pixels are device pixel values
    Color,
    /// 1 bit per pixel, pixels are 0 or 1
    Mono,
}

/// Screen properties of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfo {
    pub width: u16,
    pub height: u16,
    pub depth: u8,
    pub black_pixel: u32,
    pub white_pixel: u32,
}

/// Client-side block of pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pub width: u16,
    pub height: u16,
    /// Row-major, `width * height` entries
    pub pixels: Vec<u32>,
}

impl Raster {
    /// Raster filled with a single value
    pub fn filled(width: u16, height: u16, value: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    pub fn get(&self, x: u16, y: u16) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// A copy that has already been clipped to both drawables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyArea {
    pub src_x: i16,
    pub src_y: i16,
    pub dst_x: i16,
    pub dst_y: i16,
    pub width: u16,
    pub height: u16,
}

/// Where the window manager should put the dock window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Let the window manager choose
    #[default]
    WindowManager,
    /// User-specified position in root coordinates
    At { x: i16, y: i16 },
}

/// Parameters for a top-level window
#[derive(Debug, Clone)]
pub struct WindowRequest {
    pub width: u16,
    pub height: u16,
    pub placement: Placement,
    pub title: String,
    /// WM_CLASS instance and class names
    pub instance: String,
    pub class: String,
    /// Start in the withdrawn state (docked) instead of normal
    pub withdrawn: bool,
    /// Icon window announced through WM_HINTS
    pub icon_window: Option<Window>,
}

/// Events delivered to a dock window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockEvent {
    ButtonPress { window: Window, x: i16, y: i16, button: u8 },
    ButtonRelease { window: Window, x: i16, y: i16, button: u8 },
    /// Last expose event of a series
    Expose { window: Window },
    Destroyed { window: Window },
    /// WM_DELETE_WINDOW from the window manager
    CloseRequested { window: Window },
}

impl DockEvent {
    pub fn window(&self) -> Window {
        match *self {
            DockEvent::ButtonPress { window, .. }
            | DockEvent::ButtonRelease { window, .. }
            | DockEvent::Expose { window }
            | DockEvent::Destroyed { window }
            | DockEvent::CloseRequested { window } => window,
        }
    }
}

/// Operations the dockapp core needs from a display connection
pub trait DisplayBackend {
    /// Properties of the screen windows are created on
    fn screen(&self) -> ScreenInfo;

    /// Create an unmapped top-level window
    fn create_window(&self, request: &WindowRequest) -> Result<Window>;

    fn map_window(&self, window: Window) -> Result<()>;

    fn destroy_window(&self, window: Window) -> Result<()>;

    /// Allocate an offscreen drawable
    fn create_pixmap(&self, width: u16, height: u16, depth: PixelDepth) -> Result<Drawable>;

    fn free_pixmap(&self, pixmap: Drawable) -> Result<()>;

    /// Width and height of a drawable
    fn drawable_size(&self, drawable: Drawable) -> Result<(u16, u16)>;

    /// Upload pixels at `(x, y)` of a drawable
    fn put_pixels(&self, drawable: Drawable, x: i16, y: i16, raster: &Raster) -> Result<()>;

    /// Read back the whole drawable
    fn get_pixels(&self, drawable: Drawable) -> Result<Raster>;

    /// Copy a clipped rectangle between drawables of the same depth
    fn copy_area(&self, src: Drawable, dst: Drawable, area: CopyArea) -> Result<()>;

    /// Fill a rectangle with a pixel value
    fn fill_rect(
        &self,
        drawable: Drawable,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        pixel: u32,
    ) -> Result<()>;

    /// Look up and allocate a named color, returning its device pixel
    fn alloc_named_color(&self, name: &str) -> Result<u32>;

    /// Allocate an exact RGB color (16-bit channels)
    fn alloc_rgb_color(&self, red: u16, green: u16, blue: u16) -> Result<u32>;

    /// Set the bounding shape of a window from a 1-bit drawable, or reset it
    fn shape_window(&self, window: Window, x: i16, y: i16, mask: Option<Drawable>) -> Result<()>;

    /// Next pending event, without blocking
    fn poll_event(&self) -> Result<Option<DockEvent>>;

    fn flush(&self) -> Result<()>;
}

/// Opens a display connection for a display target
///
/// `target` is a display name such as `":1"`; `None` means the default display.
pub trait Connector {
    type Backend: DisplayBackend;

    fn connect(&self, target: Option<&str>) -> Result<Arc<Self::Backend>>;
}
