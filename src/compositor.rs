//! Draws images over placeholder cells after the text screen is rendered
//!
//! Placeholders are single-space cells whose foreground colour is an image
//! handle (see [`ImageHandle::color`]). The compositor finds them inside a
//! region, draws each image once through the active encoder, and marks the
//! image's cells `skip` so the text backend doesn't paint over the graphics.

use crate::detect::ProtocolDetector;
use crate::encoder::{self, CellSize, ImageEncoder};
use crate::geometry::CellRect;
use crate::logging;
use crate::protocol::Protocol;
use crate::registry::{ImageHandle, ImageRegistry};
use crate::sink::OutputSink;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::widgets::Widget;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Fills its area with placeholder cells for `handle`
#[derive(Debug, Clone, Copy)]
pub struct ImagePlaceholder {
    pub handle: ImageHandle,
}

impl ImagePlaceholder {
    pub fn new(handle: ImageHandle) -> Self {
        Self { handle }
    }
}

impl Widget for ImagePlaceholder {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let area = area.intersection(buf.area);
        let color = self.handle.color();
        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                if let Some(cell) = buf.cell_mut((x, y)) {
                    cell.set_symbol(" ").set_fg(color);
                }
            }
        }
    }
}

/// Visible cells of one handle, first discovered cell first
#[derive(Debug, Clone, Copy)]
struct Seen {
    handle: ImageHandle,
    width: u16,
    height: u16,
    left: u16,
    top: u16,
    right: u16,
    bottom: u16,
}

impl Seen {
    fn new(handle: ImageHandle, width: u16, height: u16, x: u16, y: u16) -> Self {
        Self {
            handle,
            width,
            height,
            left: x,
            top: y,
            right: x,
            bottom: y,
        }
    }

    fn extend(&mut self, x: u16, y: u16) {
        self.left = self.left.min(x);
        self.top = self.top.min(y);
        self.right = self.right.max(x);
        self.bottom = self.bottom.max(y);
    }

    /// Full declared footprint, reconstructed from the visible cells
    ///
    /// Visible cells hugging the region's top (left) edge while covering
    /// fewer rows (columns) than declared mean the image continues above
    /// (left of) the region. A box touching both opposite edges can't tell
    /// which side was cut, so it keeps the first discovered cell as origin.
    fn footprint(&self, region: Rect) -> CellRect {
        let seen_width = self.right - self.left + 1;
        let seen_height = self.bottom - self.top + 1;
        let cut_left = self.left == region.left()
            && self.right + 1 < region.right()
            && seen_width < self.width;
        let cut_top = self.top == region.top()
            && self.bottom + 1 < region.bottom()
            && seen_height < self.height;

        let x = if cut_left {
            i32::from(self.right) + 1 - i32::from(self.width)
        } else {
            i32::from(self.left)
        };
        let y = if cut_top {
            i32::from(self.bottom) + 1 - i32::from(self.height)
        } else {
            i32::from(self.top)
        };
        CellRect::new(x, y, self.width, self.height)
    }
}

pub struct Compositor {
    detector: Arc<ProtocolDetector>,
    registry: Arc<ImageRegistry>,
    sink: Arc<dyn OutputSink>,
    encoders: Vec<Box<dyn ImageEncoder>>,
}

impl Compositor {
    pub fn new(
        detector: Arc<ProtocolDetector>,
        registry: Arc<ImageRegistry>,
        sink: Arc<dyn OutputSink>,
        cell: CellSize,
    ) -> Self {
        Self {
            detector,
            registry,
            sink,
            encoders: encoder::default_encoders(cell),
        }
    }

    /// Replace the encoder for `encoder.protocol()`
    pub fn with_encoder(mut self, encoder: Box<dyn ImageEncoder>) -> Self {
        let protocol = encoder.protocol();
        self.encoders.retain(|existing| existing.protocol() != protocol);
        self.encoders.push(encoder);
        self
    }

    pub fn encoder(&self, protocol: Protocol) -> Option<&dyn ImageEncoder> {
        self.encoders
            .iter()
            .find(|encoder| encoder.protocol() == protocol)
            .map(Box::as_ref)
    }

    /// Forget terminal-side encoder state, e.g. after the terminal was cleared
    pub fn reset_encoders(&self) {
        for encoder in &self.encoders {
            encoder.reset();
        }
    }

    /// Draw every image with a placeholder inside `region`
    ///
    /// Call after the text for `region` is fully in `buf`. Returns how many
    /// images were written to the sink.
    pub fn scan_and_draw(&self, buf: &mut Buffer, region: Rect) -> usize {
        let region = region.intersection(buf.area);
        if region.is_empty() {
            return 0;
        }

        let protocol = self.detector.detect();
        if !protocol.draws_images() {
            return 0;
        }
        let Some(active) = self.encoder(protocol) else {
            logging::warn(&format!("No encoder for {}, images not drawn", protocol));
            return 0;
        };
        self.forget_evicted();

        let found = self.scan(buf, region);
        let mut drawn = 0;
        for seen in found {
            // May have been evicted or replaced since the scan.
            let Some(record) = self.registry.prepare(seen.handle, protocol) else {
                continue;
            };
            let dest = seen.footprint(region);
            if encoder::draw(&record, dest, region, active, self.sink.as_ref()) {
                lock_cells(buf, dest.intersection(region));
                drawn += 1;
            }
        }

        if drawn > 0 {
            logging::debug(&format!("Drew {} image(s) with {}", drawn, protocol));
        }
        drawn
    }

    /// Drop encoder state for images the registry evicted since the last pass
    fn forget_evicted(&self) {
        for handle in self.registry.take_evicted() {
            for encoder in &self.encoders {
                encoder.forget(handle);
            }
        }
    }

    /// Loaded images with placeholders in `region`, in discovery order
    ///
    /// Holds the registry's read lock for the whole pass.
    fn scan(&self, buf: &Buffer, region: Rect) -> Vec<Seen> {
        let view = self.registry.view();
        let mut found: Vec<Seen> = Vec::new();
        let mut index: HashMap<ImageHandle, usize> = HashMap::new();
        let mut skipped: HashSet<ImageHandle> = HashSet::new();

        for y in region.top()..region.bottom() {
            for x in region.left()..region.right() {
                let Some(cell) = buf.cell((x, y)) else {
                    continue;
                };
                if cell.symbol() != " " {
                    continue;
                }
                let Some(handle) = ImageHandle::from_color(cell.fg) else {
                    continue;
                };

                if let Some(&i) = index.get(&handle) {
                    found[i].extend(x, y);
                    continue;
                }
                if skipped.contains(&handle) {
                    continue;
                }
                match view.get(handle) {
                    Some(record) if record.is_loaded() => {
                        index.insert(handle, found.len());
                        found.push(Seen::new(handle, record.width, record.height, x, y));
                    }
                    // Still decoding, or evicted with its colour left on screen.
                    _ => {
                        skipped.insert(handle);
                    }
                }
            }
        }
        found
    }
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let protocols: Vec<Protocol> = self.encoders.iter().map(|e| e.protocol()).collect();
        f.debug_struct("Compositor")
            .field("encoders", &protocols)
            .finish()
    }
}

fn lock_cells(buf: &mut Buffer, area: Rect) {
    for y in area.top()..area.bottom() {
        for x in area.left()..area.right() {
            if let Some(cell) = buf.cell_mut((x, y)) {
                cell.set_skip(true);
            }
        }
    }
}
