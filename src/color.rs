//! Color resolution
//!
//! Turns symbolic color names into device pixels through the display
//! connection. `#rgb` style names are parsed locally and allocated as exact RGB;
//! everything else goes through the server's color database.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::backend::DisplayBackend;
use crate::error::{DockError, Result};

/// Name marking the transparent palette entry of a pixel map
pub const TRANSPARENT_COLOR: &str = "None";

/// Standard locations of the X11 color database
pub const RGB_FILE_LIST: &[&str] = &[
    "/etc/X11/rgb.txt",
    "/usr/share/X11/rgb.txt",
    "/usr/lib/X11/rgb.txt",
    "/usr/X11R6/lib/X11/rgb.txt",
];

/// Check whether a color name designates transparency
pub fn is_transparent(name: &str) -> bool {
    name.eq_ignore_ascii_case(TRANSPARENT_COLOR)
}

/// Parse `#rgb`, `#rrggbb` or `#rrrrggggbbbb` into 16-bit channels
pub fn parse_hex_color(name: &str) -> Option<(u16, u16, u16)> {
    let digits = name.strip_prefix('#')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let per_channel = match digits.len() {
        3 => 1,
        6 => 2,
        9 => 3,
        12 => 4,
        _ => return None,
    };

    let channel = |i: usize| -> Option<u16> {
        let part = digits.get(i * per_channel..(i + 1) * per_channel)?;
        let value = u16::from_str_radix(part, 16).ok()?;
        // Scale to 16 bits by replicating the digits, so "#fff" is white
        let bits = per_channel as u32 * 4;
        let mut scaled: u32 = 0;
        let mut filled = 0;
        while filled < 16 {
            scaled = (scaled << bits) | value as u32;
            filled += bits;
        }
        Some((scaled >> (filled - 16)) as u16)
    };

    Some((channel(0)?, channel(1)?, channel(2)?))
}

/// Find the first readable color database in the standard locations
pub fn find_rgb_txt() -> Option<PathBuf> {
    RGB_FILE_LIST
        .iter()
        .map(PathBuf::from)
        .find(|path| fs::metadata(path).is_ok())
}

/// Look up a color name in an `rgb.txt` style database
///
/// Returns the color as `#rrggbb`. Names starting with `#` are returned as is.
/// Lines starting with `!` are comments; matching ignores case.
pub fn lookup_rgb_txt(name: &str, path: &Path) -> Result<Option<String>> {
    if name.starts_with('#') {
        return Ok(Some(name.to_string()));
    }

    let content = fs::read_to_string(path).map_err(|source| {
        warn!("Failed to read color database {:?}: {}", path, source);
        DockError::ColorDatabase {
            path: path.to_path_buf(),
            source,
        }
    })?;

    for line in content.lines() {
        if line.starts_with('!') {
            continue;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.len() < 4 {
            continue;
        }
        if !words[3..].join(" ").eq_ignore_ascii_case(name) {
            continue;
        }
        let (Ok(r), Ok(g), Ok(b)) = (
            words[0].parse::<u8>(),
            words[1].parse::<u8>(),
            words[2].parse::<u8>(),
        ) else {
            continue;
        };
        return Ok(Some(format!("#{:02x}{:02x}{:02x}", r, g, b)));
    }

    Ok(None)
}

/// Rewrite a color name as `#rrggbb` through the color database
///
/// Hex names and `None` are kept. Names the database does not know, or any
/// name when no database is given, are kept for the server to resolve.
pub fn normalize_color(name: &str, database: Option<&Path>) -> Result<String> {
    let name = name.trim();
    if name.starts_with('#') || is_transparent(name) {
        return Ok(name.to_string());
    }
    let Some(path) = database else {
        return Ok(name.to_string());
    };
    match lookup_rgb_txt(name, path)? {
        Some(code) => Ok(code),
        None => {
            debug!("Color {:?} not in {:?}, keeping name", name, path);
            Ok(name.to_string())
        }
    }
}

/// Color resolver with a per-connection cache
///
/// A name resolves to the same pixel for the lifetime of the connection, so
/// each distinct name is allocated once.
#[derive(Debug, Default)]
pub struct ColorResolver {
    cache: HashMap<String, u32>,
}

impl ColorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a color name to a device pixel
    pub fn get_color<B: DisplayBackend + ?Sized>(&mut self, backend: &B, name: &str) -> Result<u32> {
        let key = name.trim().to_ascii_lowercase();
        if let Some(&pixel) = self.cache.get(&key) {
            return Ok(pixel);
        }

        let pixel = match parse_hex_color(&key) {
            Some((r, g, b)) => backend.alloc_rgb_color(r, g, b),
            None if key.starts_with('#') => Err(DockError::UnresolvedColor { name: name.to_string() }),
            None => backend.alloc_named_color(&key),
        }?;

        debug!("Resolved color {:?} -> pixel 0x{:x}", name, pixel);
        self.cache.insert(key, pixel);
        Ok(pixel)
    }

    /// Number of cached names
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use std::io::Write;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#ffffff"), Some((0xffff, 0xffff, 0xffff)));
        assert_eq!(parse_hex_color("#fff"), Some((0xffff, 0xffff, 0xffff)));
        assert_eq!(parse_hex_color("#102030"), Some((0x1010, 0x2020, 0x3030)));
        assert_eq!(parse_hex_color("#123456789abc"), Some((0x1234, 0x5678, 0x9abc)));
        assert_eq!(parse_hex_color("#12345"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
        assert_eq!(parse_hex_color("red"), None);
    }

    #[test]
    fn test_is_transparent() {
        assert!(is_transparent("None"));
        assert!(is_transparent("none"));
        assert!(!is_transparent("black"));
    }

    #[test]
    fn test_resolver_caches_names() {
        let backend = MemoryBackend::new();
        let mut resolver = ColorResolver::new();

        assert_eq!(resolver.get_color(&backend, "White").unwrap(), 0xffffff);
        assert_eq!(resolver.get_color(&backend, "white").unwrap(), 0xffffff);
        assert_eq!(resolver.get_color(&backend, "#20b2aa").unwrap(), 0x20b2aa);
        assert_eq!(resolver.cached(), 2);
    }

    #[test]
    fn test_resolver_unknown_name() {
        let backend = MemoryBackend::new();
        let mut resolver = ColorResolver::new();

        let err = resolver.get_color(&backend, "no-such-color").unwrap_err();
        assert!(matches!(err, DockError::UnresolvedColor { .. }));
        assert!(resolver.get_color(&backend, "#xyz").is_err());
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_lookup_rgb_txt() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "! $Xorg: rgb.txt $").unwrap();
        writeln!(file, "255 250 250\t\tsnow").unwrap();
        writeln!(file, " 72  61 139\t\tdark slate blue").unwrap();
        writeln!(file, "190 190 190\t\tgray").unwrap();

        let path = file.path();
        assert_eq!(lookup_rgb_txt("Snow", path).unwrap().as_deref(), Some("#fffafa"));
        assert_eq!(lookup_rgb_txt("dark slate blue", path).unwrap().as_deref(), Some("#483d8b"));
        assert_eq!(lookup_rgb_txt("#bebebe", path).unwrap().as_deref(), Some("#bebebe"));
        assert_eq!(lookup_rgb_txt("chartreuse", path).unwrap(), None);
    }

    #[test]
    fn test_lookup_rgb_txt_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("rgb.txt");
        let err = lookup_rgb_txt("snow", &missing).unwrap_err();
        assert!(matches!(err, DockError::ColorDatabase { ref path, .. } if path == &missing));
        // Hex names never touch the database
        assert!(lookup_rgb_txt("#ffffff", &missing).is_ok());
    }

    #[test]
    fn test_normalize_color() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "255 250 250\t\tsnow").unwrap();
        let path = file.path();

        assert_eq!(normalize_color("Snow", Some(path)).unwrap(), "#fffafa");
        assert_eq!(normalize_color("None", Some(path)).unwrap(), "None");
        assert_eq!(normalize_color("#123", Some(path)).unwrap(), "#123");
        assert_eq!(normalize_color("chartreuse", Some(path)).unwrap(), "chartreuse");
        assert_eq!(normalize_color("snow", None).unwrap(), "snow");
    }
}
