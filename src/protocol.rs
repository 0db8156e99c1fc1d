//! Inline graphics protocols understood by the image engine
//!
//! `Auto` is a request, not an answer: the detector always resolves it to one
//! of the concrete variants before anything is drawn.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Terminal image protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Protocol {
    /// Pick the best protocol for the current terminal
    #[default]
    Auto,
    /// Kitty graphics protocol (Kitty, Ghostty, WezTerm)
    Kitty,
    /// iTerm2 inline images
    Iterm,
    /// DEC Sixel graphics
    Sixel,
    /// Unicode upper-half-block cells with 24-bit colour
    Ansi,
    /// Graphics disabled; placeholder cells stay blank
    Fallback,
}

impl Protocol {
    /// Human-readable name, also the canonical config value
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Auto => "auto",
            Protocol::Kitty => "kitty",
            Protocol::Iterm => "iterm",
            Protocol::Sixel => "sixel",
            Protocol::Ansi => "ansi",
            Protocol::Fallback => "fallback",
        }
    }

    /// Whether images are actually drawn with this protocol
    pub fn draws_images(&self) -> bool {
        !matches!(self, Protocol::Auto | Protocol::Fallback)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown image protocol '{0}' (expected auto, kitty, iterm, sixel, ansi or fallback)")]
pub struct UnknownProtocol(pub String);

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Protocol::Auto),
            "kitty" => Ok(Protocol::Kitty),
            "iterm" | "iterm2" => Ok(Protocol::Iterm),
            "sixel" => Ok(Protocol::Sixel),
            "ansi" | "halfblock" => Ok(Protocol::Ansi),
            "fallback" | "none" | "off" => Ok(Protocol::Fallback),
            _ => Err(UnknownProtocol(s.to_string())),
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = UnknownProtocol;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Protocol> for String {
    fn from(value: Protocol) -> Self {
        value.name().to_string()
    }
}
