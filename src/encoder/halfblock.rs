//! Unicode half-block fallback
//!
//! Each cell is an upper half block (▀): foreground from the upper pixel,
//! background from the lower one, so a cell carries two pixel rows.
//! Transparent pixels keep the terminal's default colour; a cell whose upper
//! half is transparent is drawn with a lower half block (▄) instead. The
//! bitmap is sampled from a `width × 2·height` copy, never at native size.
//!
//! Cells are positioned and coloured one by one. After clipping, neighbours
//! are not guaranteed to be contiguous with what the terminal already shows.

use super::{ImageEncoder, bitmap};
use crate::error::Result;
use crate::geometry::Placement;
use crate::palette::ALPHA_THRESHOLD;
use crate::protocol::Protocol;
use crate::registry::ImageRecord;
use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Color, Colors, Print, ResetColor, SetColors};
use image::RgbaImage;
use image::imageops::FilterType;
use std::sync::Arc;

pub const UPPER_HALF_BLOCK: char = '▀';
pub const LOWER_HALF_BLOCK: char = '▄';

#[derive(Debug, Default, Clone, Copy)]
pub struct HalfBlockEncoder;

impl ImageEncoder for HalfBlockEncoder {
    fn protocol(&self) -> Protocol {
        Protocol::Ansi
    }

    fn encode(&self, image: &ImageRecord, placement: &Placement) -> Result<Vec<u8>> {
        let (width, height) = image.downscaled_size();
        let downscaled = match &image.downscaled {
            Some(cached) if cached.dimensions() == (width, height) => Arc::clone(cached),
            _ => Arc::new(
                bitmap(image)?
                    .resize_exact(width, height, FilterType::Triangle)
                    .to_rgba8(),
            ),
        };

        let area = placement.area;
        let (left, top) = placement.cell_offset();
        let mut out = Vec::with_capacity(usize::from(area.width) * usize::from(area.height) * 40);

        for row in 0..area.height {
            let y = 2 * u32::from(top + row);
            for col in 0..area.width {
                let x = u32::from(left + col);
                let (colors, glyph) = match (sample(&downscaled, x, y), sample(&downscaled, x, y + 1)) {
                    (Some(upper), lower) => (
                        Colors::new(upper, lower.unwrap_or(Color::Reset)),
                        UPPER_HALF_BLOCK,
                    ),
                    (None, Some(lower)) => (Colors::new(lower, Color::Reset), LOWER_HALF_BLOCK),
                    (None, None) => (Colors::new(Color::Reset, Color::Reset), ' '),
                };
                queue!(
                    out,
                    MoveTo(area.x + col, area.y + row),
                    SetColors(colors),
                    Print(glyph)
                )?;
            }
        }
        queue!(out, ResetColor)?;
        Ok(out)
    }
}

/// `None` for pixels outside the image or below the alpha threshold
fn sample(image: &RgbaImage, x: u32, y: u32) -> Option<Color> {
    let px = image.get_pixel_checked(x, y)?;
    (px[3] >= ALPHA_THRESHOLD).then(|| Color::Rgb {
        r: px[0],
        g: px[1],
        b: px[2],
    })
}
