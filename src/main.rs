//! wmdock-demo
//!
//! A two-state dockapp: the upper half of the icon toggles a lamp, the lower
//! half quits. Exercises the full pipeline against a real X server.

use anyhow::{Context, Result};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wmdock::backend::x11::X11Backend;
use wmdock::backend::DisplayBackend;
use wmdock::config::Config;
use wmdock::{DockEvent, PixmapDescription, SourceRect, StripBuilder, WindowSurface};

const REGION_LAMP: usize = 0;
const REGION_QUIT: usize = 1;
const MARGIN: usize = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Icon art: visible area, then "lamp off" and "lamp on" frames to its right
fn demo_strip(size: usize) -> Vec<String> {
    let palette = [
        "  c None",
        ". c black",
        "# c #bebebe",
        "o c #20b2aa",
        "x c #004040",
    ];
    let mut lines = vec![format!("{} {} {} 1", size * 3, size, palette.len())];
    lines.extend(palette.iter().map(|line| line.to_string()));

    let inner = MARGIN..size - MARGIN;
    let lamp = size / 4..size / 2;
    for y in 0..size {
        let mut row = String::with_capacity(size * 3);
        for frame in 0..3 {
            for x in 0..size {
                let symbol = if !inner.contains(&x) || !inner.contains(&y) {
                    ' '
                } else if x == size - MARGIN - 1 || y == size - MARGIN - 1 {
                    '#'
                } else if lamp.contains(&x) || lamp.contains(&y) {
                    match frame {
                        2 => 'o',
                        _ => 'x',
                    }
                } else {
                    '.'
                };
                row.push(symbol);
            }
        }
        lines.push(row);
    }
    lines
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "wmdock=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting wmdock demo");

    let config = Config::load().context("Failed to load configuration")?;

    // One connection for the whole process
    let backend = std::sync::Arc::new(
        X11Backend::connect(config.display.name.as_deref())
            .context("Failed to connect to X server")?,
    );
    let surface_config = config.surface_config(&backend.screen())?;
    let size = surface_config.width.min(surface_config.height) as usize;
    anyhow::ensure!(size > 2 * MARGIN + 1, "Window size {} too small for the demo icon", size);

    let art = PixmapDescription::from_lines(&demo_strip(size))
        .context("Failed to build icon art")?;
    let strip = StripBuilder::new(size as u16, size as u16)
        .background(art)
        .build()
        .context("Failed to build strip image")?;
    let mut surface = WindowSurface::open_on(backend, &surface_config, Some(strip.image()))
        .context("Failed to open dock window")?;

    let half = size as i32 / 2;
    surface.add_mouse_region(REGION_LAMP, 0, 0, size as i32 - 1, half - 1)?;
    surface.add_mouse_region(REGION_QUIT, 0, half, size as i32 - 1, size as i32 - 1)?;

    let frame = |lit: bool| {
        let x = (if lit { size * 2 } else { size }) as i32;
        SourceRect::new(x, 0, size as i32, size as i32)
    };
    let mut lit = false;
    surface.copy_back_buffer_area(frame(lit), (0, 0))?;
    surface.redraw_window()?;

    loop {
        while let Some(event) = surface.poll_event()? {
            match event {
                DockEvent::ButtonRelease { button, .. } => match surface.click_region(&event) {
                    Some(REGION_LAMP) => {
                        lit = !lit;
                        debug!("Lamp toggled by button {}: {}", button, lit);
                        surface.copy_back_buffer_area(frame(lit), (0, 0))?;
                        surface.redraw_window()?;
                    }
                    Some(REGION_QUIT) => {
                        info!("Quit region clicked");
                        surface.close()?;
                        return Ok(());
                    }
                    _ => {}
                },
                DockEvent::Destroyed { .. } => {
                    info!("Dock window destroyed, exiting");
                    return Ok(());
                }
                DockEvent::CloseRequested { .. } => {
                    info!("Close requested by window manager");
                    surface.close()?;
                    return Ok(());
                }
                _ => {}
            }
        }

        if let Err(e) = surface.redraw_window() {
            warn!("Redraw failed: {}", e);
            return Err(e.into());
        }
        thread::sleep(POLL_INTERVAL);
    }
}
