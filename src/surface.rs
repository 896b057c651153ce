//! Window surface
//!
//! Owns the dock window, its icon window and the offscreen buffers behind them.
//! Drawing always goes to the back buffer; `redraw_window` is the only step that
//! touches the visible windows. The shape-mask buffer defines the silhouette of
//! both windows.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{
    Connector, DisplayBackend, DockEvent, Drawable, PixelDepth, Placement, Window, WindowRequest,
};
use crate::error::{DockError, Result};
use crate::image::{IconImage, IconPipeline, Pixmap, SourceRect, clip_copy};
use crate::region::RegionTable;
use crate::xpm::PixmapDescription;

/// Window surface configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceConfig {
    /// Visible window size
    pub width: u16,
    pub height: u16,
    pub placement: Placement,
    /// Display to connect to; `None` for the default display
    pub display: Option<String>,
    pub title: String,
    /// WM_CLASS instance and class names
    pub instance: String,
    pub class: String,
    /// Start withdrawn so dock-aware window managers swallow the icon window
    pub withdrawn: bool,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            placement: Placement::WindowManager,
            display: None,
            title: "wmdock".to_string(),
            instance: "wmdock".to_string(),
            class: "WMDock".to_string(),
            withdrawn: true,
        }
    }
}

/// Lifecycle of a surface; an unopened surface does not exist as a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Opened,
    Closed,
}

struct Buffers<B: DisplayBackend> {
    back_buffer: Pixmap<B>,
    shape_mask: Pixmap<B>,
}

/// A dock icon on screen
pub struct WindowSurface<B: DisplayBackend> {
    backend: Arc<B>,
    pipeline: IconPipeline<B>,
    window: Window,
    icon_window: Window,
    width: u16,
    height: u16,
    buffers: Option<Buffers<B>>,
    regions: RegionTable,
    /// Windows not yet destroyed, by us or by the window manager
    window_alive: bool,
    icon_alive: bool,
    closed: bool,
}

impl<B: DisplayBackend> WindowSurface<B> {
    /// Connect to the configured display and open a surface on it
    ///
    /// Fails with `DisplayUnavailable` before anything is created when the
    /// display cannot be reached.
    pub fn open<C>(connector: &C, config: &SurfaceConfig, seed: Option<&PixmapDescription>) -> Result<Self>
    where
        C: Connector<Backend = B>,
    {
        let backend = connector.connect(config.display.as_deref())?;
        Self::open_on(backend, config, seed)
    }

    /// Open a surface on an established connection
    ///
    /// The back buffer is at least the window size and grows to hold `seed`,
    /// which is copied in at (0, 0). The seed's mask, cut to the window size,
    /// becomes the initial shape.
    pub fn open_on(backend: Arc<B>, config: &SurfaceConfig, seed: Option<&PixmapDescription>) -> Result<Self> {
        let mut pipeline = IconPipeline::new(backend.clone());
        let seed = seed.map(|description| pipeline.load_icon(description)).transpose()?;

        let (width, height) = (config.width.max(1), config.height.max(1));
        let (buffer_width, buffer_height) = match &seed {
            Some(icon) => (width.max(icon.width()), height.max(icon.height())),
            None => (width, height),
        };

        let screen = backend.screen();
        let back_buffer = Pixmap::new(backend.clone(), buffer_width, buffer_height, PixelDepth::Color)?;
        backend.fill_rect(back_buffer.id(), 0, 0, buffer_width, buffer_height, screen.black_pixel)?;
        let shape_mask = Pixmap::new(backend.clone(), width, height, PixelDepth::Mono)?;
        backend.fill_rect(shape_mask.id(), 0, 0, width, height, seed.is_none() as u32)?;

        if let Some(icon) = &seed {
            pipeline.copy_region(icon.pixmap(), SourceRect::full(icon.width(), icon.height()), back_buffer.id(), (0, 0))?;
            pipeline.copy_region(icon.mask(), SourceRect::full(width, height), shape_mask.id(), (0, 0))?;
        }

        let mut request = WindowRequest {
            width,
            height,
            placement: config.placement,
            title: config.title.clone(),
            instance: config.instance.clone(),
            class: config.class.clone(),
            withdrawn: config.withdrawn,
            icon_window: None,
        };
        let icon_window = backend.create_window(&request)?;
        request.icon_window = Some(icon_window);
        let window = match backend.create_window(&request) {
            Ok(window) => window,
            Err(e) => {
                if let Err(cleanup) = backend.destroy_window(icon_window) {
                    warn!("Failed to destroy icon window 0x{:x}: {}", icon_window, cleanup);
                }
                return Err(e);
            }
        };

        let surface = Self {
            backend,
            pipeline,
            window,
            icon_window,
            width,
            height,
            buffers: Some(Buffers { back_buffer, shape_mask }),
            regions: RegionTable::new(),
            window_alive: true,
            icon_alive: true,
            closed: false,
        };
        surface.set_shape_mask(0, 0)?;
        surface.backend.map_window(window)?;
        surface.backend.flush()?;

        info!(
            "Opened dock window 0x{:x} (icon window 0x{:x}) {}x{}, back buffer {}x{}",
            window, icon_window, width, height, buffer_width, buffer_height
        );
        Ok(surface)
    }

    fn buffers(&self) -> Result<&Buffers<B>> {
        self.buffers.as_ref().ok_or(DockError::SurfaceClosed)
    }

    pub fn state(&self) -> SurfaceState {
        if self.buffers.is_some() {
            SurfaceState::Opened
        } else {
            SurfaceState::Closed
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn pipeline(&self) -> &IconPipeline<B> {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut IconPipeline<B> {
        &mut self.pipeline
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn icon_window(&self) -> Window {
        self.icon_window
    }

    /// Visible window size
    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn back_buffer(&self) -> Result<Drawable> {
        Ok(self.buffers()?.back_buffer.id())
    }

    pub fn shape_mask(&self) -> Result<Drawable> {
        Ok(self.buffers()?.shape_mask.id())
    }

    /// Load an icon image on this surface's connection
    pub fn load_icon(&mut self, description: &PixmapDescription) -> Result<IconImage<B>> {
        self.buffers()?;
        self.pipeline.load_icon(description)
    }

    /// Copy a block of an icon's color drawable into the back buffer
    pub fn copy_xpm_area(&self, icon: &IconImage<B>, rect: SourceRect, dest: (i32, i32)) -> Result<()> {
        let back_buffer = self.back_buffer()?;
        self.pipeline.copy_region(icon.pixmap(), rect, back_buffer, dest)
    }

    /// Copy a block of the back buffer onto itself
    ///
    /// Used when the back buffer holds the frame strip next to the visible area.
    pub fn copy_back_buffer_area(&self, rect: SourceRect, dest: (i32, i32)) -> Result<()> {
        let back_buffer = self.back_buffer()?;
        self.pipeline.copy_region(back_buffer, rect, back_buffer, dest)
    }

    /// Copy a block of an icon's mask into the shape-mask buffer
    pub fn copy_xbm_area(&self, icon: &IconImage<B>, rect: SourceRect, dest: (i32, i32)) -> Result<()> {
        let shape_mask = self.shape_mask()?;
        self.pipeline.copy_region(icon.mask(), rect, shape_mask, dest)
    }

    /// Replace the shape-mask buffer with the window-sized block of `icon`'s
    /// mask at `(x, y)`
    ///
    /// Parts of the block outside the icon become transparent. Call
    /// `set_shape_mask` afterwards to apply it.
    pub fn create_mask_from(&self, icon: &IconImage<B>, x: i32, y: i32) -> Result<()> {
        let shape_mask = self.shape_mask()?;
        self.backend.fill_rect(shape_mask, 0, 0, self.width, self.height, 0)?;
        let rect = SourceRect::new(x, y, self.width as i32, self.height as i32);
        self.pipeline.copy_region(icon.mask(), rect, shape_mask, (0, 0))
    }

    /// Blit the back buffer onto the windows
    pub fn redraw_window(&self) -> Result<()> {
        self.redraw_window_xy(0, 0)
    }

    /// Blit the window-sized block of the back buffer at `(x, y)` onto the windows
    pub fn redraw_window_xy(&self, x: i32, y: i32) -> Result<()> {
        let back_buffer = &self.buffers()?.back_buffer;
        let rect = SourceRect::new(x, y, self.width as i32, self.height as i32);
        if let Some(area) = clip_copy(back_buffer.size(), (self.width, self.height), rect, (0, 0)) {
            for window in [self.icon_window, self.window] {
                self.backend.copy_area(back_buffer.id(), window, area)?;
            }
        }
        self.backend.flush()
    }

    /// Apply the shape-mask buffer to both windows, anchored at `(x, y)`
    pub fn set_shape_mask(&self, x: i16, y: i16) -> Result<()> {
        let shape_mask = self.shape_mask()?;
        for window in [self.icon_window, self.window] {
            self.backend.shape_window(window, x, y, Some(shape_mask))?;
        }
        debug!("Shape mask installed at ({}, {})", x, y);
        self.backend.flush()
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    pub fn regions_mut(&mut self) -> &mut RegionTable {
        &mut self.regions
    }

    pub fn add_mouse_region(&mut self, index: usize, left: i32, top: i32, right: i32, bottom: i32) -> Result<()> {
        self.regions.add_mouse_region(index, left, top, right, bottom)
    }

    pub fn check_mouse_region(&self, x: i32, y: i32) -> Option<usize> {
        self.regions.check_mouse_region(x, y)
    }

    /// Region under a button event on one of this surface's windows
    pub fn click_region(&self, event: &DockEvent) -> Option<usize> {
        match *event {
            DockEvent::ButtonPress { window, x, y, .. } | DockEvent::ButtonRelease { window, x, y, .. }
                if self.owns(window) =>
            {
                self.regions.check_mouse_region(x as i32, y as i32)
            }
            _ => None,
        }
    }

    fn owns(&self, window: Window) -> bool {
        window == self.window || window == self.icon_window
    }

    /// Next event for this surface, without blocking
    ///
    /// Exposed windows are redrawn before the event is returned. Events for
    /// other windows are dropped. When the window manager destroys the dock
    /// window the surface becomes closed.
    pub fn poll_event(&mut self) -> Result<Option<DockEvent>> {
        self.buffers()?;
        while let Some(event) = self.backend.poll_event()? {
            if !self.owns(event.window()) {
                continue;
            }
            match event {
                DockEvent::Expose { .. } => self.redraw_window()?,
                DockEvent::Destroyed { window } if window == self.window => {
                    info!("Dock window 0x{:x} destroyed", window);
                    self.window_alive = false;
                    self.buffers = None;
                }
                DockEvent::Destroyed { window } => {
                    debug!("Icon window 0x{:x} destroyed", window);
                    self.icon_alive = false;
                }
                _ => {}
            }
            return Ok(Some(event));
        }
        Ok(None)
    }

    /// Free the buffers and destroy whichever windows are still alive
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffers = None;
        if self.window_alive {
            self.window_alive = false;
            self.backend.destroy_window(self.window)?;
        }
        if self.icon_alive {
            self.icon_alive = false;
            self.backend.destroy_window(self.icon_window)?;
        }
        self.backend.flush()?;
        info!("Closed dock window 0x{:x}", self.window);
        Ok(())
    }
}

impl<B: DisplayBackend> Drop for WindowSurface<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close dock window 0x{:x}: {}", self.window, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBackend, MemoryServer};

    // 4x4 window art followed by a 4x4 second frame
    const STRIP: &[&str] = &[
        "8 4 3 1",
        "  c None",
        "r c red",
        "b c blue",
        " rr bbbb",
        "rrrrbbbb",
        "rrrrbbbb",
        " rr bbbb",
    ];

    fn config() -> SurfaceConfig {
        SurfaceConfig {
            width: 4,
            height: 4,
            ..SurfaceConfig::default()
        }
    }

    fn open() -> (Arc<MemoryBackend>, WindowSurface<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let seed = PixmapDescription::from_lines(STRIP).unwrap();
        let surface = WindowSurface::open_on(backend.clone(), &config(), Some(&seed)).unwrap();
        (backend, surface)
    }

    #[test]
    fn test_open_creates_windows() {
        let (backend, surface) = open();
        assert_eq!(surface.state(), SurfaceState::Opened);
        assert_eq!(backend.window_count(), 2);

        let main = backend.window(surface.window()).unwrap();
        assert!(main.mapped);
        assert_eq!(main.request.icon_window, Some(surface.icon_window()));
        assert!(main.request.withdrawn);

        // Back buffer grew to hold the whole strip
        let back = backend.get_pixels(surface.back_buffer().unwrap()).unwrap();
        assert_eq!((back.width, back.height), (8, 4));
        assert_eq!(back.get(5, 0), Some(0x0000ff));
    }

    #[test]
    fn test_unreachable_display_creates_nothing() {
        let server = MemoryServer::new();
        let config = SurfaceConfig {
            display: Some(":9".to_string()),
            ..config()
        };

        let result = WindowSurface::open(&server, &config, None);
        assert!(matches!(result, Err(DockError::DisplayUnavailable { .. })));

        let default = server.display(":0").unwrap();
        assert_eq!(default.window_count(), 0);
        assert_eq!(default.pixmap_count(), 0);
    }

    #[test]
    fn test_open_through_connector() {
        let server = MemoryServer::new();
        let surface = WindowSurface::open(&server, &config(), None).unwrap();
        assert_eq!(server.display(":0").unwrap().window_count(), 2);
        assert_eq!(surface.size(), (4, 4));
    }

    #[test]
    fn test_redraw_window() {
        let (backend, surface) = open();
        surface.redraw_window().unwrap();

        for window in [surface.window(), surface.icon_window()] {
            let shown = backend.get_pixels(window).unwrap();
            assert_eq!(shown.get(1, 0), Some(0xff0000));
            assert_eq!(shown.get(0, 1), Some(0xff0000));
        }
    }

    #[test]
    fn test_redraw_window_xy_shows_second_frame() {
        let (backend, surface) = open();
        surface.redraw_window_xy(4, 0).unwrap();

        let shown = backend.get_pixels(surface.window()).unwrap();
        assert!(shown.pixels.iter().all(|&p| p == 0x0000ff));
    }

    #[test]
    fn test_copy_back_buffer_area_then_redraw() {
        let (backend, surface) = open();
        surface
            .copy_back_buffer_area(SourceRect::new(4, 0, 2, 2), (0, 0))
            .unwrap();
        surface.redraw_window().unwrap();

        let shown = backend.get_pixels(surface.window()).unwrap();
        assert_eq!(shown.get(0, 0), Some(0x0000ff));
        assert_eq!(shown.get(1, 1), Some(0x0000ff));
        assert_eq!(shown.get(2, 3), Some(0xff0000));
        assert_eq!(shown.get(3, 3), Some(0));
    }

    #[test]
    fn test_shape_mask_from_seed() {
        let (backend, surface) = open();
        let (x, y, mask) = backend.window(surface.window()).unwrap().shape.unwrap();
        assert_eq!((x, y), (0, 0));
        assert_eq!(mask.get(0, 0), Some(0));
        assert_eq!(mask.get(1, 0), Some(1));
        assert_eq!(mask.get(3, 3), Some(0));
    }

    #[test]
    fn test_set_shape_mask_from_icon() {
        let (backend, mut surface) = open();
        let icon = surface
            .load_icon(&PixmapDescription::from_lines(STRIP).unwrap())
            .unwrap();

        // Second frame is fully opaque
        surface.create_mask_from(&icon, 4, 0).unwrap();
        surface.set_shape_mask(2, 3).unwrap();

        for window in [surface.window(), surface.icon_window()] {
            let (x, y, mask) = backend.window(window).unwrap().shape.unwrap();
            assert_eq!((x, y), (2, 3));
            assert!(mask.pixels.iter().all(|&bit| bit == 1));
        }
    }

    #[test]
    fn test_copy_xpm_and_xbm_area() {
        let (backend, mut surface) = open();
        let icon = surface
            .load_icon(&PixmapDescription::from_lines(STRIP).unwrap())
            .unwrap();

        surface.copy_xpm_area(&icon, SourceRect::new(4, 0, 1, 1), (0, 0)).unwrap();
        surface.copy_xbm_area(&icon, SourceRect::new(4, 0, 1, 1), (0, 0)).unwrap();

        let back = backend.get_pixels(surface.back_buffer().unwrap()).unwrap();
        assert_eq!(back.get(0, 0), Some(0x0000ff));
        let mask = backend.get_pixels(surface.shape_mask().unwrap()).unwrap();
        assert_eq!(mask.get(0, 0), Some(1));
    }

    #[test]
    fn test_click_region() {
        let (backend, mut surface) = open();
        surface.add_mouse_region(0, 0, 0, 1, 1).unwrap();
        surface.add_mouse_region(1, 0, 0, 3, 3).unwrap();

        let click = DockEvent::ButtonRelease { window: surface.icon_window(), x: 2, y: 2, button: 1 };
        assert_eq!(surface.click_region(&click), Some(1));

        let corner = DockEvent::ButtonPress { window: surface.window(), x: 0, y: 0, button: 3 };
        assert_eq!(surface.click_region(&corner), Some(0));

        let foreign = DockEvent::ButtonRelease { window: 0xdead, x: 0, y: 0, button: 1 };
        assert_eq!(surface.click_region(&foreign), None);

        drop(surface);
        assert_eq!(backend.window_count(), 0);
    }

    #[test]
    fn test_poll_event_redraws_on_expose() {
        let (backend, mut surface) = open();
        backend.push_event(DockEvent::Expose { window: 0xdead });
        backend.push_event(DockEvent::Expose { window: surface.window() });

        let event = surface.poll_event().unwrap();
        assert_eq!(event, Some(DockEvent::Expose { window: surface.window() }));
        assert_eq!(backend.get_pixels(surface.window()).unwrap().get(1, 0), Some(0xff0000));
        assert_eq!(surface.poll_event().unwrap(), None);
    }

    #[test]
    fn test_destroyed_window_closes_surface() {
        let (backend, mut surface) = open();
        backend.push_event(DockEvent::Destroyed { window: surface.window() });

        surface.poll_event().unwrap();
        assert_eq!(surface.state(), SurfaceState::Closed);
        assert!(matches!(surface.redraw_window(), Err(DockError::SurfaceClosed)));
    }

    #[test]
    fn test_close_after_destroy_frees_icon_window() {
        let (backend, mut surface) = open();
        let icon_window = surface.icon_window();
        backend.destroy_window(surface.window()).unwrap();
        backend.push_event(DockEvent::Destroyed { window: surface.window() });

        surface.poll_event().unwrap();
        assert_eq!(surface.state(), SurfaceState::Closed);
        assert!(backend.window(icon_window).is_some());

        surface.close().unwrap();
        assert!(backend.window(icon_window).is_none());
        assert_eq!(backend.window_count(), 0);
        assert_eq!(backend.pixmap_count(), 0);
    }

    #[test]
    fn test_drop_after_destroy_frees_icon_window() {
        let (backend, mut surface) = open();
        backend.destroy_window(surface.window()).unwrap();
        backend.push_event(DockEvent::Destroyed { window: surface.window() });
        surface.poll_event().unwrap();

        drop(surface);
        assert_eq!(backend.window_count(), 0);
    }

    #[test]
    fn test_close() {
        let (backend, mut surface) = open();
        surface.close().unwrap();

        assert_eq!(surface.state(), SurfaceState::Closed);
        assert_eq!(backend.window_count(), 0);
        assert_eq!(backend.pixmap_count(), 0);
        assert!(matches!(surface.redraw_window(), Err(DockError::SurfaceClosed)));
        assert!(matches!(surface.set_shape_mask(0, 0), Err(DockError::SurfaceClosed)));
        surface.close().unwrap();
    }
}
