//! Inline terminal images for the jcode TUI
//!
//! Text is rendered into a ratatui [`Buffer`](ratatui::buffer::Buffer) with
//! placeholder cells marking where each image goes. After the text pass,
//! [`ImageEngine::scan_and_draw`] finds those cells and draws the images with
//! the best protocol the terminal supports, cropping whatever was scrolled
//! out of view.

pub mod compositor;
pub mod config;
pub mod detect;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod palette;
pub mod protocol;
pub mod registry;
pub mod sink;

pub use compositor::{Compositor, ImagePlaceholder};
pub use config::ImageConfig;
pub use detect::{EnvProbe, ProtocolDetector, TerminalProbe};
pub use encoder::{CellSize, ImageEncoder};
pub use engine::ImageEngine;
pub use error::EncodeError;
pub use geometry::{CellRect, PixelRect, Placement};
pub use protocol::Protocol;
pub use registry::{HANDLE_BASE, ImageHandle, ImageRecord, ImageRegistry};
pub use sink::{MemorySink, OutputSink, StdoutSink};
