//! Configuration for the image engine
//!
//! Read from the `[images]` table of `~/.jcode/config.toml` (or
//! `$JCODE_HOME/config.toml`). Environment variables override file settings.
//!
//! ```toml
//! [images]
//! protocol = "sixel"
//! cache_size = 50
//! cell_width = 10
//! cell_height = 20
//! ```

use crate::encoder::CellSize;
use crate::logging;
use crate::protocol::Protocol;
use crate::registry::DEFAULT_CAPACITY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Image engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Protocol to draw with (default: auto-detect)
    pub protocol: Protocol,
    /// Max number of cached images (default: 100)
    pub cache_size: usize,
    /// Pixel width of a cell (default: ask the terminal)
    pub cell_width: Option<u16>,
    /// Pixel height of a cell (default: ask the terminal)
    pub cell_height: Option<u16>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Auto,
            cache_size: DEFAULT_CAPACITY,
            cell_width: None,
            cell_height: None,
        }
    }
}

/// Only the table this crate owns; the rest of jcode's config is ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    images: ImageConfig,
}

impl ImageConfig {
    /// Get the config file path
    pub fn path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("JCODE_HOME") {
            return Some(PathBuf::from(path).join("config.toml"));
        }
        dirs::home_dir().map(|home| home.join(".jcode").join("config.toml"))
    }

    /// Load config from file, with environment variable overrides
    ///
    /// A missing or broken file falls back to defaults.
    pub fn load() -> Self {
        let mut config = match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                logging::error(&format!("Failed to load image config: {:#}", e));
                Self::default()
            }),
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load the `[images]` table of `path` (no env overrides)
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.images)
    }

    /// Apply environment variable overrides; invalid values are logged and skipped
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("JCODE_IMAGE_PROTOCOL") {
            match v.parse::<Protocol>() {
                Ok(protocol) => self.protocol = protocol,
                Err(e) => logging::warn(&format!("Ignoring JCODE_IMAGE_PROTOCOL: {}", e)),
            }
        }
        if let Some(v) = var("JCODE_IMAGE_CACHE_SIZE") {
            match v.trim().parse::<usize>() {
                Ok(size) if size > 0 => self.cache_size = size,
                _ => logging::warn(&format!("Ignoring JCODE_IMAGE_CACHE_SIZE={}", v)),
            }
        }
        if let Some(v) = var("JCODE_IMAGE_CELL_WIDTH") {
            match parse_cell_dimension(&v) {
                Some(width) => self.cell_width = Some(width),
                None => logging::warn(&format!("Ignoring JCODE_IMAGE_CELL_WIDTH={}", v)),
            }
        }
        if let Some(v) = var("JCODE_IMAGE_CELL_HEIGHT") {
            match parse_cell_dimension(&v) {
                Some(height) => self.cell_height = Some(height),
                None => logging::warn(&format!("Ignoring JCODE_IMAGE_CELL_HEIGHT={}", v)),
            }
        }
    }

    /// Cell pixel size: configured values first, then the terminal's answer
    pub fn cell_size(&self) -> CellSize {
        let detected = match (self.cell_width, self.cell_height) {
            (Some(_), Some(_)) => CellSize::default(),
            _ => CellSize::from_terminal(),
        };
        CellSize {
            width: self.cell_width.filter(|&w| w > 0).unwrap_or(detected.width),
            height: self.cell_height.filter(|&h| h > 0).unwrap_or(detected.height),
        }
    }
}

fn parse_cell_dimension(value: &str) -> Option<u16> {
    value.trim().parse::<u16>().ok().filter(|&v| v > 0)
}
