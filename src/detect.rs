//! Terminal graphics protocol detection
//!
//! Detection runs at most once per detector (until [`ProtocolDetector::reset`]).
//! A forced protocol always wins and never triggers a probe.
//!
//! Order matters: multiplexers are checked before any capability probe
//! because tmux/screen/zellij forward capability answers from the outer
//! terminal but mangle the graphics sequences themselves.

use crate::logging;
use crate::protocol::Protocol;
use std::sync::{Mutex, PoisonError, RwLock};

/// Terminals that draw Sixel but don't reliably answer a generic probe
const SIXEL_TERMINALS: &[&str] = &[
    "foot",
    "foot-extra",
    "mlterm",
    "contour",
    "yaft-256color",
    "mintty",
];

/// Yes/no oracles the detector consults
///
/// Only [`TerminalProbe::var`] is required; the capability checks default to
/// environment heuristics built on top of it. Implementations that can talk
/// to the terminal must bound their own waiting: the detector never times
/// out a probe.
pub trait TerminalProbe: Send + Sync {
    /// Read an environment variable
    fn var(&self, key: &str) -> Option<String>;

    fn in_multiplexer(&self) -> bool {
        if ["TMUX", "STY", "ZELLIJ"]
            .iter()
            .any(|key| self.var(key).is_some())
        {
            return true;
        }
        self.var("TERM")
            .map(|term| term.starts_with("screen") || term.starts_with("tmux"))
            .unwrap_or(false)
    }

    fn supports_kitty(&self) -> bool {
        if self.var("KITTY_WINDOW_ID").is_some() || self.var("GHOSTTY_RESOURCES_DIR").is_some() {
            return true;
        }
        if let Some(term) = self.var("TERM") {
            let lower = term.to_ascii_lowercase();
            if lower.contains("kitty") || lower.contains("ghostty") {
                return true;
            }
        }
        if let Some(program) = self.var("TERM_PROGRAM") {
            let lower = program.to_ascii_lowercase();
            return lower == "wezterm" || lower == "ghostty" || lower == "kitty";
        }
        false
    }

    fn supports_iterm(&self) -> bool {
        if let Some(program) = self.var("TERM_PROGRAM") {
            if program == "iTerm.app" {
                return true;
            }
        }
        self.var("LC_TERMINAL")
            .map(|lc_terminal| lc_terminal == "iTerm2")
            .unwrap_or(false)
    }

    /// Terminal identifiers known to draw Sixel
    fn sixel_allow_listed(&self) -> bool {
        ["TERM", "TERM_PROGRAM"].iter().any(|key| {
            self.var(key)
                .map(|value| SIXEL_TERMINALS.contains(&value.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
    }

    fn supports_sixel(&self) -> bool {
        self.var("TERM")
            .map(|term| term.to_ascii_lowercase().contains("sixel"))
            .unwrap_or(false)
    }
}

/// Probe backed by the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvProbe;

impl TerminalProbe for EnvProbe {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|value| !value.is_empty())
    }
}

/// Decides which protocol the engine draws with
///
/// Owned by the application's composition root and shared by reference.
pub struct ProtocolDetector {
    probe: Box<dyn TerminalProbe>,
    forced: RwLock<Option<Protocol>>,
    detected: RwLock<Option<Protocol>>,
    /// Serializes the one-time probe run
    detecting: Mutex<()>,
}

impl ProtocolDetector {
    pub fn new() -> Self {
        Self::with_probe(EnvProbe)
    }

    pub fn with_probe(probe: impl TerminalProbe + 'static) -> Self {
        Self {
            probe: Box::new(probe),
            forced: RwLock::new(None),
            detected: RwLock::new(None),
            detecting: Mutex::new(()),
        }
    }

    /// The protocol to draw with. Never returns `Auto`.
    pub fn detect(&self) -> Protocol {
        if let Some(forced) = *self.forced.read().unwrap_or_else(PoisonError::into_inner) {
            return forced;
        }
        if let Some(detected) = *self.detected.read().unwrap_or_else(PoisonError::into_inner) {
            return detected;
        }

        let _guard = self.detecting.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have finished probing while we waited.
        if let Some(detected) = *self.detected.read().unwrap_or_else(PoisonError::into_inner) {
            return detected;
        }
        let detected = self.probe_terminal();
        logging::info(&format!("Detected terminal image protocol: {}", detected));
        *self.detected.write().unwrap_or_else(PoisonError::into_inner) = Some(detected);
        detected
    }

    /// Override detection until [`reset`](Self::reset). Last call wins.
    ///
    /// Forcing `Auto` removes the override.
    pub fn force(&self, protocol: Protocol) {
        let value = (protocol != Protocol::Auto).then_some(protocol);
        *self.forced.write().unwrap_or_else(PoisonError::into_inner) = value;
        logging::debug(&format!("Image protocol forced to {}", protocol));
    }

    /// The forced protocol, if any
    pub fn forced(&self) -> Option<Protocol> {
        *self.forced.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the override and the cached detection so the next `detect` probes again
    pub fn reset(&self) {
        let _guard = self.detecting.lock().unwrap_or_else(PoisonError::into_inner);
        *self.forced.write().unwrap_or_else(PoisonError::into_inner) = None;
        *self.detected.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn probe_terminal(&self) -> Protocol {
        let probe = self.probe.as_ref();
        if probe.in_multiplexer() {
            return Protocol::Ansi;
        }
        if probe.supports_kitty() {
            return Protocol::Kitty;
        }
        if probe.supports_iterm() {
            return Protocol::Iterm;
        }
        if probe.sixel_allow_listed() || probe.supports_sixel() {
            return Protocol::Sixel;
        }
        Protocol::Ansi
    }
}

impl Default for ProtocolDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProtocolDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolDetector")
            .field("forced", &self.forced())
            .field(
                "detected",
                &*self.detected.read().unwrap_or_else(PoisonError::into_inner),
            )
            .finish()
    }
}
