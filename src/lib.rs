//! wmdock
//!
//! Building blocks for Window Maker style dock applications: a fixed-size dock
//! icon window, pixmap icon art composed in a back buffer, a non-rectangular
//! window shape and mouse regions for click handling.

pub mod backend;
pub mod color;
pub mod config;
pub mod error;
pub mod font;
pub mod image;
pub mod region;
pub mod strip;
pub mod surface;
pub mod xpm;

pub use backend::{Connector, DisplayBackend, DockEvent, Drawable, Placement, Window};
pub use error::{DockError, Result};
pub use image::{IconImage, IconPipeline, SourceRect};
pub use region::{MAX_MOUSE_REGIONS, RegionTable};
pub use strip::{Strip, StripBuilder};
pub use surface::{SurfaceConfig, WindowSurface};
pub use xpm::PixmapDescription;
