//! X11 display backend
//!
//! Talks to a real X server through x11rb. Dock windows get the ICCCM hints a
//! dockapp needs (withdrawn state, icon window, WM_CLASS) and their silhouette
//! through the SHAPE extension.

use std::sync::Arc;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::shape::{ConnectionExt as ShapeExt, SK, SO};
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::{COPY_FROM_PARENT, NONE};

use super::{
    Connector, CopyArea, DisplayBackend, DockEvent, Drawable, PixelDepth, Placement, Raster,
    ScreenInfo, Window, WindowRequest,
};
use crate::error::{DockError, Result};

// ICCCM WM_HINTS flags
const STATE_HINT: u32 = 1 << 1;
const ICON_WINDOW_HINT: u32 = 1 << 3;
const ICON_POSITION_HINT: u32 = 1 << 4;
const WINDOW_GROUP_HINT: u32 = 1 << 6;
const WITHDRAWN_STATE: u32 = 0;
const NORMAL_STATE: u32 = 1;

// ICCCM WM_SIZE_HINTS flags
const US_POSITION: u32 = 1 << 0;
const US_SIZE: u32 = 1 << 1;

/// Pixel layout of the server's images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    /// Bits per pixel of screen-depth images
    pub bits_per_pixel: u8,
    /// Scanline pad of 1-bit images, in bits
    pub bitmap_pad: u8,
    pub lsb_byte_order: bool,
    pub lsb_bit_order: bool,
}

/// Encode screen-depth pixels as a 32 bits-per-pixel ZPixmap
pub fn encode_pixels32(raster: &Raster, lsb_byte_order: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(raster.pixels.len() * 4);
    for &pixel in &raster.pixels {
        if lsb_byte_order {
            data.extend_from_slice(&pixel.to_le_bytes());
        } else {
            data.extend_from_slice(&pixel.to_be_bytes());
        }
    }
    data
}

/// Decode a 32 bits-per-pixel ZPixmap, keeping the low `depth` bits
pub fn decode_pixels32(data: &[u8], width: u16, height: u16, depth: u8, lsb_byte_order: bool) -> Raster {
    let plane_mask = if depth >= 32 { u32::MAX } else { (1u32 << depth) - 1 };
    let pixels = data
        .chunks_exact(4)
        .take(width as usize * height as usize)
        .map(|chunk| {
            let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
            let pixel = if lsb_byte_order {
                u32::from_le_bytes(bytes)
            } else {
                u32::from_be_bytes(bytes)
            };
            pixel & plane_mask
        })
        .collect();
    Raster { width, height, pixels }
}

/// Bytes per scanline of a 1-bit image
pub fn bitmap_stride(width: u16, pad: u8) -> usize {
    let pad = pad.max(8) as usize;
    (width as usize).div_ceil(pad) * pad / 8
}

/// Encode 0/1 pixels as a padded 1-bit image
pub fn encode_bitmap(raster: &Raster, pad: u8, lsb_bit_order: bool) -> Vec<u8> {
    let stride = bitmap_stride(raster.width, pad);
    let mut data = vec![0u8; stride * raster.height as usize];
    for y in 0..raster.height as usize {
        for x in 0..raster.width as usize {
            if raster.pixels[y * raster.width as usize + x] == 0 {
                continue;
            }
            let bit = if lsb_bit_order { x % 8 } else { 7 - x % 8 };
            data[y * stride + x / 8] |= 1 << bit;
        }
    }
    data
}

/// Decode a padded 1-bit image into 0/1 pixels
pub fn decode_bitmap(data: &[u8], width: u16, height: u16, pad: u8, lsb_bit_order: bool) -> Raster {
    let stride = bitmap_stride(width, pad);
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let bit = if lsb_bit_order { x % 8 } else { 7 - x % 8 };
            let byte = data.get(y * stride + x / 8).copied().unwrap_or(0);
            pixels.push(((byte >> bit) & 1) as u32);
        }
    }
    Raster { width, height, pixels }
}

/// X11 display connection
pub struct X11Backend {
    conn: RustConnection,
    screen_num: usize,
    root: Window,
    depth: u8,
    colormap: Colormap,
    layout: ImageLayout,
    color_gc: Gcontext,
    mono_gc: Gcontext,
    wm_protocols: Atom,
    wm_delete_window: Atom,
}

impl X11Backend {
    /// Connect to `target` (or `$DISPLAY` when `None`)
    pub fn connect(target: Option<&str>) -> Result<Self> {
        let display_name = target
            .map(str::to_string)
            .or_else(|| std::env::var("DISPLAY").ok())
            .unwrap_or_default();

        let (conn, screen_num) =
            x11rb::connect(target).map_err(|e| DockError::DisplayUnavailable {
                display: display_name.clone(),
                reason: e.to_string(),
            })?;

        let setup = conn.setup();
        let screen = &setup.roots[screen_num];
        let root = screen.root;
        let depth = screen.root_depth;
        let colormap = screen.default_colormap;

        let bits_per_pixel = setup
            .pixmap_formats
            .iter()
            .find(|format| format.depth == depth)
            .map(|format| format.bits_per_pixel)
            .ok_or(DockError::UnsupportedDepth(depth))?;
        if bits_per_pixel != 32 {
            return Err(DockError::UnsupportedDepth(depth));
        }
        let bitmap_pad = setup
            .pixmap_formats
            .iter()
            .find(|format| format.depth == 1)
            .map(|format| format.scanline_pad)
            .unwrap_or(setup.bitmap_format_scanline_pad);
        let layout = ImageLayout {
            bits_per_pixel,
            bitmap_pad,
            lsb_byte_order: setup.image_byte_order == ImageOrder::LSB_FIRST,
            lsb_bit_order: setup.bitmap_format_bit_order == ImageOrder::LSB_FIRST,
        };

        info!("Connected to X server {:?}, screen {}, root window 0x{:x}", display_name, screen_num, root);
        debug!("Image layout: {:?}", layout);

        let color_gc = conn.generate_id()?;
        conn.create_gc(color_gc, root, &CreateGCAux::new().graphics_exposures(0))?;

        // A GC works for every drawable of the depth it was created on
        let scratch = conn.generate_id()?;
        conn.create_pixmap(1, scratch, root, 1, 1)?;
        let mono_gc = conn.generate_id()?;
        conn.create_gc(mono_gc, scratch, &CreateGCAux::new().graphics_exposures(0))?;
        conn.free_pixmap(scratch)?;

        let wm_protocols = conn.intern_atom(false, b"WM_PROTOCOLS")?.reply()?.atom;
        let wm_delete_window = conn.intern_atom(false, b"WM_DELETE_WINDOW")?.reply()?.atom;
        conn.flush()?;

        Ok(Self {
            conn,
            screen_num,
            root,
            depth,
            colormap,
            layout,
            color_gc,
            mono_gc,
            wm_protocols,
            wm_delete_window,
        })
    }

    /// Underlying x11rb connection
    pub fn connection(&self) -> &RustConnection {
        &self.conn
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    fn depth_of(&self, drawable: Drawable) -> Result<u8> {
        Ok(self.conn.get_geometry(drawable)?.reply()?.depth)
    }

    fn gc_for(&self, depth: u8) -> Gcontext {
        if depth == 1 { self.mono_gc } else { self.color_gc }
    }

    fn set_wm_properties(&self, window: Window, request: &WindowRequest) -> Result<()> {
        self.conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            request.title.as_bytes(),
        )?;

        let mut class = Vec::with_capacity(request.instance.len() + request.class.len() + 2);
        class.extend_from_slice(request.instance.as_bytes());
        class.push(0);
        class.extend_from_slice(request.class.as_bytes());
        class.push(0);
        self.conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            &class,
        )?;

        let (x, y, size_flags) = match request.placement {
            Placement::WindowManager => (0, 0, US_SIZE),
            Placement::At { x, y } => (x as i32, y as i32, US_SIZE | US_POSITION),
        };
        let (w, h) = (request.width as u32, request.height as u32);
        let size_hints = [
            size_flags, x as u32, y as u32, w, h, // flags, position, size
            w, h, w, h, // min, max
            0, 0, 0, 0, 0, 0, // increments, aspects
            w, h, 0, // base size, gravity
        ];
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NORMAL_HINTS,
            AtomEnum::WM_SIZE_HINTS,
            &size_hints,
        )?;

        let mut flags = STATE_HINT | ICON_POSITION_HINT | WINDOW_GROUP_HINT;
        if request.icon_window.is_some() {
            flags |= ICON_WINDOW_HINT;
        }
        let state = if request.withdrawn { WITHDRAWN_STATE } else { NORMAL_STATE };
        let wm_hints = [
            flags,
            0, // input
            state,
            NONE, // icon pixmap
            request.icon_window.unwrap_or(NONE),
            x as u32,
            y as u32,
            NONE, // icon mask
            window,
        ];
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_HINTS,
            AtomEnum::WM_HINTS,
            &wm_hints,
        )?;

        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.wm_protocols,
            AtomEnum::ATOM,
            &[self.wm_delete_window],
        )?;
        Ok(())
    }

    fn translate(&self, event: Event) -> Option<DockEvent> {
        match event {
            Event::ButtonPress(e) => Some(DockEvent::ButtonPress {
                window: e.event,
                x: e.event_x,
                y: e.event_y,
                button: e.detail,
            }),
            Event::ButtonRelease(e) => Some(DockEvent::ButtonRelease {
                window: e.event,
                x: e.event_x,
                y: e.event_y,
                button: e.detail,
            }),
            Event::Expose(e) if e.count == 0 => Some(DockEvent::Expose { window: e.window }),
            Event::DestroyNotify(e) => Some(DockEvent::Destroyed { window: e.window }),
            Event::ClientMessage(e)
                if e.type_ == self.wm_protocols && e.data.as_data32()[0] == self.wm_delete_window =>
            {
                Some(DockEvent::CloseRequested { window: e.window })
            }
            _ => None,
        }
    }
}

impl DisplayBackend for X11Backend {
    fn screen(&self) -> ScreenInfo {
        let screen = &self.conn.setup().roots[self.screen_num];
        ScreenInfo {
            width: screen.width_in_pixels,
            height: screen.height_in_pixels,
            depth: screen.root_depth,
            black_pixel: screen.black_pixel,
            white_pixel: screen.white_pixel,
        }
    }

    fn create_window(&self, request: &WindowRequest) -> Result<Window> {
        let screen = self.screen();
        let window = self.conn.generate_id()?;
        let (x, y) = match request.placement {
            Placement::WindowManager => (0, 0),
            Placement::At { x, y } => (x, y),
        };

        self.conn.create_window(
            COPY_FROM_PARENT as u8,
            window,
            self.root,
            x,
            y,
            request.width,
            request.height,
            1,
            WindowClass::INPUT_OUTPUT,
            COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .background_pixel(screen.white_pixel)
                .border_pixel(screen.black_pixel)
                .event_mask(
                    EventMask::EXPOSURE
                        | EventMask::BUTTON_PRESS
                        | EventMask::BUTTON_RELEASE
                        | EventMask::STRUCTURE_NOTIFY,
                ),
        )?;
        self.set_wm_properties(window, request)?;

        debug!("Created window 0x{:x} ({}x{})", window, request.width, request.height);
        Ok(window)
    }

    fn map_window(&self, window: Window) -> Result<()> {
        self.conn.map_window(window)?;
        Ok(())
    }

    fn destroy_window(&self, window: Window) -> Result<()> {
        self.conn.destroy_window(window)?;
        Ok(())
    }

    fn create_pixmap(&self, width: u16, height: u16, depth: PixelDepth) -> Result<Drawable> {
        let pixmap = self.conn.generate_id()?;
        let depth = match depth {
            PixelDepth::Color => self.depth,
            PixelDepth::Mono => 1,
        };
        self.conn.create_pixmap(depth, pixmap, self.root, width.max(1), height.max(1))?;
        Ok(pixmap)
    }

    fn free_pixmap(&self, pixmap: Drawable) -> Result<()> {
        self.conn.free_pixmap(pixmap)?;
        Ok(())
    }

    fn drawable_size(&self, drawable: Drawable) -> Result<(u16, u16)> {
        let geometry = self.conn.get_geometry(drawable)?.reply()?;
        Ok((geometry.width, geometry.height))
    }

    fn put_pixels(&self, drawable: Drawable, x: i16, y: i16, raster: &Raster) -> Result<()> {
        if raster.width == 0 || raster.height == 0 {
            return Ok(());
        }
        let depth = self.depth_of(drawable)?;
        let data = if depth == 1 {
            encode_bitmap(raster, self.layout.bitmap_pad, self.layout.lsb_bit_order)
        } else {
            encode_pixels32(raster, self.layout.lsb_byte_order)
        };
        self.conn.put_image(
            ImageFormat::Z_PIXMAP,
            drawable,
            self.gc_for(depth),
            raster.width,
            raster.height,
            x,
            y,
            0,
            depth,
            &data,
        )?;
        Ok(())
    }

    fn get_pixels(&self, drawable: Drawable) -> Result<Raster> {
        let geometry = self.conn.get_geometry(drawable)?.reply()?;
        let image = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                drawable,
                0,
                0,
                geometry.width,
                geometry.height,
                u32::MAX,
            )?
            .reply()?;
        let raster = if geometry.depth == 1 {
            decode_bitmap(
                &image.data,
                geometry.width,
                geometry.height,
                self.layout.bitmap_pad,
                self.layout.lsb_bit_order,
            )
        } else {
            decode_pixels32(
                &image.data,
                geometry.width,
                geometry.height,
                geometry.depth,
                self.layout.lsb_byte_order,
            )
        };
        Ok(raster)
    }

    fn copy_area(&self, src: Drawable, dst: Drawable, area: CopyArea) -> Result<()> {
        let depth = self.depth_of(src)?;
        self.conn.copy_area(
            src,
            dst,
            self.gc_for(depth),
            area.src_x,
            area.src_y,
            area.dst_x,
            area.dst_y,
            area.width,
            area.height,
        )?;
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
        let gc = self.gc_for(self.depth_of(drawable)?);
        self.conn.change_gc(gc, &ChangeGCAux::new().foreground(pixel))?;
        self.conn.poly_fill_rectangle(drawable, gc, &[Rectangle { x, y, width, height }])?;
        Ok(())
    }

    fn alloc_named_color(&self, name: &str) -> Result<u32> {
        let reply = self
            .conn
            .alloc_named_color(self.colormap, name.as_bytes())?
            .reply();
        match reply {
            Ok(reply) => Ok(reply.pixel),
            Err(ReplyError::X11Error(e)) => {
                warn!("Server rejected color {:?}: {:?}", name, e.error_kind);
                Err(DockError::UnresolvedColor { name: name.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn alloc_rgb_color(&self, red: u16, green: u16, blue: u16) -> Result<u32> {
        let reply = self.conn.alloc_color(self.colormap, red, green, blue)?.reply();
        match reply {
            Ok(reply) => Ok(reply.pixel),
            Err(ReplyError::X11Error(_)) => Err(DockError::UnresolvedColor {
                name: format!("#{:04x}{:04x}{:04x}", red, green, blue),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn shape_window(&self, window: Window, x: i16, y: i16, mask: Option<Drawable>) -> Result<()> {
        self.conn
            .shape_mask(SO::SET, SK::BOUNDING, window, x, y, mask.unwrap_or(NONE))?;
        Ok(())
    }

    fn poll_event(&self) -> Result<Option<DockEvent>> {
        while let Some(event) = self.conn.poll_for_event()? {
            if let Some(event) = self.translate(event) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}

/// Connector for real X servers
#[derive(Debug, Clone, Copy, Default)]
pub struct X11Connector;

impl Connector for X11Connector {
    type Backend = X11Backend;

    fn connect(&self, target: Option<&str>) -> Result<Arc<X11Backend>> {
        X11Backend::connect(target).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_stride() {
        assert_eq!(bitmap_stride(1, 32), 4);
        assert_eq!(bitmap_stride(32, 32), 4);
        assert_eq!(bitmap_stride(33, 32), 8);
        assert_eq!(bitmap_stride(9, 8), 2);
    }

    #[test]
    fn test_bitmap_bit_order() {
        let raster = Raster { width: 3, height: 1, pixels: vec![1, 0, 1] };

        let lsb = encode_bitmap(&raster, 8, true);
        assert_eq!(lsb, vec![0b0000_0101]);

        let msb = encode_bitmap(&raster, 8, false);
        assert_eq!(msb, vec![0b1010_0000]);

        assert_eq!(decode_bitmap(&lsb, 3, 1, 8, true), raster);
        assert_eq!(decode_bitmap(&msb, 3, 1, 8, false), raster);
    }

    #[test]
    fn test_bitmap_rows_are_padded() {
        let raster = Raster { width: 2, height: 2, pixels: vec![0, 1, 1, 0] };
        let data = encode_bitmap(&raster, 32, true);
        assert_eq!(data.len(), 8);
        assert_eq!(data[0], 0b10);
        assert_eq!(data[4], 0b01);
    }

    #[test]
    fn test_pixels32_byte_order() {
        let raster = Raster { width: 1, height: 1, pixels: vec![0x00112233] };
        assert_eq!(encode_pixels32(&raster, true), vec![0x33, 0x22, 0x11, 0x00]);
        assert_eq!(encode_pixels32(&raster, false), vec![0x00, 0x11, 0x22, 0x33]);

        let decoded = decode_pixels32(&[0x33, 0x22, 0x11, 0xff], 1, 1, 24, true);
        assert_eq!(decoded.pixels, vec![0x00112233]);
    }
}
