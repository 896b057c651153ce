//! Configuration for wmdock applications
//!
//! Loads configuration from TOML file at `~/.config/wmdock/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::backend::{Placement, ScreenInfo};
use crate::surface::SurfaceConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub window: WindowConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("wmdock");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string)
            .context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }

    /// Build the surface configuration for a screen
    ///
    /// A size in the geometry string overrides `window.width`/`window.height`;
    /// negative offsets count from the right and bottom screen edges.
    pub fn surface_config(&self, screen: &ScreenInfo) -> Result<SurfaceConfig> {
        let mut width = self.window.width;
        let mut height = self.window.height;
        let mut placement = Placement::WindowManager;

        if let Some(spec) = &self.window.geometry {
            let geometry = Geometry::parse(spec)?;
            width = geometry.width.unwrap_or(width);
            height = geometry.height.unwrap_or(height);
            placement = geometry.placement(screen, width, height);
        }

        Ok(SurfaceConfig {
            width,
            height,
            placement,
            display: self.display.name.clone(),
            title: self.window.title.clone(),
            instance: self.window.instance.clone(),
            class: self.window.class.clone(),
            withdrawn: self.window.withdrawn,
        })
    }
}

/// Display connection configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Display name such as ":1"; unset means `$DISPLAY`
    pub name: Option<String>,
}

/// Dock window configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window size in pixels
    pub width: u16,
    pub height: u16,
    /// X geometry string: "[=][WxH][{+-}X{+-}Y]"
    pub geometry: Option<String>,
    /// Window title (WM_NAME)
    pub title: String,
    /// WM_CLASS instance name
    pub instance: String,
    /// WM_CLASS class name
    pub class: String,
    /// Start in the withdrawn state (docked)
    pub withdrawn: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        let surface = SurfaceConfig::default();
        Self {
            width: surface.width,
            height: surface.height,
            geometry: None,
            title: surface.title,
            instance: surface.instance,
            class: surface.class,
            withdrawn: surface.withdrawn,
        }
    }
}

/// Offset of a geometry position, measured from the left/top or the
/// right/bottom edge of the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    FromStart(i32),
    FromEnd(i32),
}

/// Parsed X geometry string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub width: Option<u16>,
    pub height: Option<u16>,
    pub x: Option<Offset>,
    pub y: Option<Offset>,
}

impl Geometry {
    /// Parse "[=][<width>{xX}<height>][{+-}<x>{+-}<y>]"
    pub fn parse(spec: &str) -> Result<Self> {
        let mut rest = spec.trim();
        rest = rest.strip_prefix('=').unwrap_or(rest);
        let mut geometry = Geometry::default();

        let size_end = rest.find(['+', '-']).unwrap_or(rest.len());
        let (size, offsets) = rest.split_at(size_end);
        if !size.is_empty() {
            let Some((w, h)) = size.split_once(['x', 'X']) else {
                bail!("Invalid geometry size {:?}", size);
            };
            geometry.width = Some(w.parse().with_context(|| format!("Invalid geometry width {:?}", w))?);
            geometry.height = Some(h.parse().with_context(|| format!("Invalid geometry height {:?}", h))?);
        }

        if !offsets.is_empty() {
            let (x, after_x) = parse_offset(offsets)?;
            let (y, after_y) = parse_offset(after_x)?;
            if !after_y.is_empty() {
                bail!("Trailing characters in geometry {:?}", spec);
            }
            geometry.x = Some(x);
            geometry.y = Some(y);
        }

        Ok(geometry)
    }

    /// Window position for a window of the given size
    pub fn placement(&self, screen: &ScreenInfo, width: u16, height: u16) -> Placement {
        let resolve = |offset: Offset, screen_len: u16, len: u16| -> i16 {
            let value = match offset {
                Offset::FromStart(v) => v,
                Offset::FromEnd(v) => screen_len as i32 - len as i32 - v,
            };
            value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
        };
        match (self.x, self.y) {
            (Some(x), Some(y)) => Placement::At {
                x: resolve(x, screen.width, width),
                y: resolve(y, screen.height, height),
            },
            _ => Placement::WindowManager,
        }
    }
}

/// Parse one "{+-}<number>" and return the remainder
fn parse_offset(input: &str) -> Result<(Offset, &str)> {
    let mut chars = input.chars();
    let sign = chars.next().context("Missing geometry offset")?;
    let digits = chars.as_str();
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        bail!("Invalid geometry offset {:?}", input);
    }
    let value: i32 = digits[..end].parse().context("Invalid geometry offset")?;
    let offset = match sign {
        '+' => Offset::FromStart(value),
        '-' => Offset::FromEnd(value),
        _ => bail!("Invalid geometry offset {:?}", input),
    };
    Ok((offset, &digits[end..]))
}
