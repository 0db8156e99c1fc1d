//! Protocol encoders
//!
//! Each encoder turns a registered image and a [`Placement`] into the bytes
//! for one protocol. [`draw`] does the parts every protocol shares: clipping,
//! the cursor save/move/restore bracket, and the single write to the sink.

mod halfblock;
mod iterm;
mod kitty;
mod sixel;

pub use halfblock::HalfBlockEncoder;
pub use iterm::ItermEncoder;
pub use kitty::KittyEncoder;
pub use sixel::SixelEncoder;

use crate::error::{EncodeError, Result};
use crate::geometry::{self, CellRect, Placement};
use crate::logging;
use crate::protocol::Protocol;
use crate::registry::{ImageHandle, ImageRecord};
use crate::sink::OutputSink;
use crossterm::cursor::{MoveTo, RestorePosition, SavePosition};
use crossterm::queue;
use image::DynamicImage;
use ratatui::layout::Rect;
use std::sync::Arc;

/// Pixel size of one terminal cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSize {
    pub width: u16,
    pub height: u16,
}

impl Default for CellSize {
    fn default() -> Self {
        Self {
            width: 8,
            height: 16,
        }
    }
}

impl CellSize {
    /// Ask the terminal for its pixel size; falls back to 8×16
    pub fn from_terminal() -> Self {
        match crossterm::terminal::window_size() {
            Ok(size) if size.columns > 0 && size.rows > 0 && size.width > 0 && size.height > 0 => {
                Self {
                    width: (size.width / size.columns).max(1),
                    height: (size.height / size.rows).max(1),
                }
            }
            _ => Self::default(),
        }
    }
}

/// Turns one image placement into protocol bytes
///
/// Implementations must not write anywhere: the returned buffer is written
/// by [`draw`] only after encoding succeeded. The cursor is already at the
/// top-left cell of `placement.area` when these bytes are emitted.
///
/// State that assumes the terminal saw the bytes belongs in
/// [`ImageEncoder::committed`], which only runs after a successful write.
pub trait ImageEncoder: Send + Sync {
    fn protocol(&self) -> Protocol;

    fn encode(&self, image: &ImageRecord, placement: &Placement) -> Result<Vec<u8>>;

    /// The bytes for `image` reached the sink
    fn committed(&self, _image: &ImageRecord) {}

    /// `handle` was evicted; drop anything kept for it
    fn forget(&self, _handle: ImageHandle) {}

    /// Forget any terminal-side state (e.g. uploaded image ids)
    fn reset(&self) {}
}

/// One encoder per drawing protocol
pub fn default_encoders(cell: CellSize) -> Vec<Box<dyn ImageEncoder>> {
    vec![
        Box::new(KittyEncoder::new()),
        Box::new(ItermEncoder),
        Box::new(SixelEncoder::new(cell)),
        Box::new(HalfBlockEncoder),
    ]
}

/// Clip, encode and write one image
///
/// Returns whether anything was written. Nothing is written when the image
/// is fully clipped, has no bitmap, or fails to encode.
pub fn draw(
    image: &ImageRecord,
    dest: impl Into<CellRect>,
    clip: Rect,
    encoder: &dyn ImageEncoder,
    sink: &dyn OutputSink,
) -> bool {
    let Some(bitmap) = image.bitmap.as_ref() else {
        return false;
    };
    let Some(placement) = geometry::place(dest, clip, bitmap.width(), bitmap.height()) else {
        return false;
    };

    let bytes = match encoder
        .encode(image, &placement)
        .and_then(|payload| bracket(placement.area, &payload))
    {
        Ok(bytes) => bytes,
        Err(e) => {
            logging::warn(&format!(
                "Skipping {} draw of image {} ({}): {}",
                encoder.protocol(),
                image.handle,
                image.url,
                e
            ));
            return false;
        }
    };

    match sink.write_bytes(&bytes) {
        Ok(()) => {
            encoder.committed(image);
            true
        }
        Err(e) => {
            logging::warn(&format!("Failed to write image {}: {}", image.handle, e));
            false
        }
    }
}

/// `ESC 7`, move to `area`'s top-left cell, payload, `ESC 8`
fn bracket(area: Rect, payload: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len() + 16);
    queue!(out, SavePosition, MoveTo(area.x, area.y))?;
    out.extend_from_slice(payload);
    queue!(out, RestorePosition)?;
    Ok(out)
}

pub(crate) fn bitmap(image: &ImageRecord) -> Result<&Arc<DynamicImage>> {
    image
        .bitmap
        .as_ref()
        .ok_or(EncodeError::MissingBitmap(image.handle.get()))
}

/// The visible part of the bitmap, re-encoded as PNG
pub(crate) fn cropped_png(image: &ImageRecord, placement: &Placement) -> Result<Vec<u8>> {
    let source = placement.source;
    let cropped = bitmap(image)?.crop_imm(source.x, source.y, source.width, source.height);
    png(&cropped)
}

pub(crate) fn png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = std::io::Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}


#[cfg(test)]
mod tests {
    use super::test_support::BrokenSink;
    use super::*;
    use crate::sink::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing;

    impl ImageEncoder for Failing {
        fn protocol(&self) -> Protocol {
            Protocol::Kitty
        }

        fn encode(&self, _image: &ImageRecord, _placement: &Placement) -> Result<Vec<u8>> {
            Err(EncodeError::Io(std::io::Error::other("boom")))
        }
    }

    struct Echo;

    impl ImageEncoder for Echo {
        fn protocol(&self) -> Protocol {
            Protocol::Iterm
        }

        fn encode(&self, _image: &ImageRecord, _placement: &Placement) -> Result<Vec<u8>> {
            Ok(b"IMG".to_vec())
        }
    }

    #[derive(Default)]
    struct Committing(AtomicUsize);

    impl ImageEncoder for Committing {
        fn protocol(&self) -> Protocol {
            Protocol::Kitty
        }

        fn encode(&self, _image: &ImageRecord, _placement: &Placement) -> Result<Vec<u8>> {
            Ok(b"IMG".to_vec())
        }

        fn committed(&self, _image: &ImageRecord) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_commit_follows_successful_write_only() {
        let image = test_support::record(4, 2, 8, 8);
        let encoder = Committing::default();
        let dest = Rect::new(0, 0, 4, 2);
        let clip = Rect::new(0, 0, 80, 24);

        assert!(!draw(&image, dest, clip, &encoder, &BrokenSink));
        assert_eq!(encoder.0.load(Ordering::SeqCst), 0);

        assert!(draw(&image, dest, clip, &encoder, &MemorySink::new()));
        assert_eq!(encoder.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_draw_brackets_payload_with_cursor_save_restore() {
        let image = test_support::record(4, 2, 8, 8);
        let sink = MemorySink::new();
        let drawn = draw(&image, Rect::new(3, 1, 4, 2), Rect::new(0, 0, 80, 24), &Echo, &sink);
        assert!(drawn);
        assert_eq!(sink.write_count(), 1);
        assert_eq!(sink.contents(), b"\x1b7\x1b[2;4HIMG\x1b8");
    }

    #[test]
    fn test_draw_moves_to_clipped_corner() {
        let image = test_support::record(4, 4, 8, 8);
        let sink = MemorySink::new();
        draw(&image, Rect::new(0, 0, 4, 4), Rect::new(0, 2, 80, 20), &Echo, &sink);
        assert_eq!(sink.contents(), b"\x1b7\x1b[3;1HIMG\x1b8");
    }

    #[test]
    fn test_offscreen_draw_writes_nothing() {
        let image = test_support::record(4, 2, 8, 8);
        let sink = MemorySink::new();
        assert!(!draw(&image, Rect::new(0, 0, 4, 2), Rect::new(0, 10, 80, 5), &Echo, &sink));
        assert_eq!(sink.write_count(), 0);
    }

    #[test]
    fn test_failed_encode_writes_nothing() {
        let image = test_support::record(4, 2, 8, 8);
        let sink = MemorySink::new();
        assert!(!draw(&image, Rect::new(0, 0, 4, 2), Rect::new(0, 0, 80, 24), &Failing, &sink));
        assert_eq!(sink.write_count(), 0);
    }

    #[test]
    fn test_unloaded_image_writes_nothing() {
        let mut image = test_support::record(4, 2, 8, 8);
        image.bitmap = None;
        let sink = MemorySink::new();
        assert!(!draw(&image, Rect::new(0, 0, 4, 2), Rect::new(0, 0, 80, 24), &Echo, &sink));
        assert_eq!(sink.write_count(), 0);
    }
}
