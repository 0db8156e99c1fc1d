//! Clip math between cell space and pixel space
//!
//! A destination rectangle is the full cell footprint an image should cover.
//! Intersecting it with the visible viewport tells us how many cells were
//! scrolled off each side; each side's cell count is then scaled to the
//! bitmap's native size independently.

use ratatui::layout::Rect;

/// Rectangle in source-bitmap pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Cell footprint that may start above or left of the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellRect {
    pub x: i32,
    pub y: i32,
    pub width: u16,
    pub height: u16,
}

impl CellRect {
    pub fn new(x: i32, y: i32, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + i32::from(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y + i32::from(self.height)
    }

    /// Overlap with an on-screen rectangle
    pub fn intersection(&self, clip: Rect) -> Rect {
        let left = self.x.max(i32::from(clip.x));
        let top = self.y.max(i32::from(clip.y));
        let right = self.right().min(i32::from(clip.right()));
        let bottom = self.bottom().min(i32::from(clip.bottom()));
        if right <= left || bottom <= top {
            return Rect::default();
        }
        // Inside `clip`, so every coordinate fits in u16.
        Rect::new(
            left as u16,
            top as u16,
            (right - left) as u16,
            (bottom - top) as u16,
        )
    }
}

impl From<Rect> for CellRect {
    fn from(rect: Rect) -> Self {
        Self::new(i32::from(rect.x), i32::from(rect.y), rect.width, rect.height)
    }
}

/// Where and what to draw after clipping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Full declared footprint in cells
    pub dest: CellRect,
    /// Visible part of `dest`; the cursor goes to its top-left cell
    pub area: Rect,
    /// Part of the native bitmap that maps onto `area`
    pub source: PixelRect,
}

impl Placement {
    /// Cells clipped off the left and top of `dest`
    pub fn cell_offset(&self) -> (u16, u16) {
        (
            (i32::from(self.area.x) - self.dest.x) as u16,
            (i32::from(self.area.y) - self.dest.y) as u16,
        )
    }
}

/// `round(cells * pixels / total_cells)` in integer arithmetic
///
/// `total_cells` must be non-zero.
pub fn scale_crop(cells: u16, pixels: u32, total_cells: u16) -> u32 {
    let numerator = 2 * u64::from(cells) * u64::from(pixels) + u64::from(total_cells);
    (numerator / (2 * u64::from(total_cells))) as u32
}

/// Clip `dest` against `clip` and derive the matching source crop of a
/// `native_width`×`native_height` bitmap.
///
/// Returns `None` when nothing would be visible: empty intersection, empty
/// bitmap, or a crop that eats the whole width or height.
pub fn place(
    dest: impl Into<CellRect>,
    clip: Rect,
    native_width: u32,
    native_height: u32,
) -> Option<Placement> {
    let dest = dest.into();
    let area = dest.intersection(clip);
    // Checked before any division: dest.width/height are non-zero past here.
    if area.is_empty() || native_width == 0 || native_height == 0 {
        return None;
    }

    let top = (i32::from(area.y) - dest.y) as u16;
    let bottom = (dest.bottom() - i32::from(area.bottom())) as u16;
    let left = (i32::from(area.x) - dest.x) as u16;
    let right = (dest.right() - i32::from(area.right())) as u16;

    let crop_top = scale_crop(top, native_height, dest.height);
    let crop_bottom = scale_crop(bottom, native_height, dest.height);
    let crop_left = scale_crop(left, native_width, dest.width);
    let crop_right = scale_crop(right, native_width, dest.width);

    if crop_top + crop_bottom >= native_height || crop_left + crop_right >= native_width {
        return None;
    }

    Some(Placement {
        dest,
        area,
        source: PixelRect {
            x: crop_left,
            y: crop_top,
            width: native_width - crop_left - crop_right,
            height: native_height - crop_top - crop_bottom,
        },
    })
}
