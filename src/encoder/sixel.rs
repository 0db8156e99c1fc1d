//! DEC Sixel graphics
//!
//! `ESC P 0;1;0 q "1;1;<w>;<h> #<reg>;2;<r>;<g>;<b> ... <bands> ESC \`
//!
//! Sixel draws at the terminal's pixel resolution, so the visible part of
//! the palette-quantized copy is scaled to the clipped cell area. Nearest
//! neighbour keeps every pixel a valid palette index. P2=1 leaves
//! transparent pixels untouched.

use super::{CellSize, ImageEncoder, bitmap};
use crate::error::Result;
use crate::geometry::Placement;
use crate::palette::{ALPHA_THRESHOLD, PALETTE_SIZE, PalettedImage, XtermPalette};
use crate::protocol::Protocol;
use crate::registry::ImageRecord;
use image::GrayAlphaImage;
use image::imageops::{self, FilterType};
use std::io::Write;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct SixelEncoder {
    cell: CellSize,
}

impl SixelEncoder {
    pub fn new(cell: CellSize) -> Self {
        Self { cell }
    }
}

impl ImageEncoder for SixelEncoder {
    fn protocol(&self) -> Protocol {
        Protocol::Sixel
    }

    fn encode(&self, image: &ImageRecord, placement: &Placement) -> Result<Vec<u8>> {
        let paletted = match &image.paletted {
            Some(paletted) => Arc::clone(paletted),
            // Cached before Sixel became active.
            None => Arc::new(PalettedImage::quantize(bitmap(image)?)),
        };

        let source = placement.source;
        let visible =
            imageops::crop_imm(&paletted.pixels, source.x, source.y, source.width, source.height)
                .to_image();
        let width = u32::from(placement.area.width) * u32::from(self.cell.width);
        let height = u32::from(placement.area.height) * u32::from(self.cell.height);
        let scaled = imageops::resize(&visible, width, height, FilterType::Nearest);

        encode_sixel(&scaled)
    }
}

/// Encode palette indices (luma) with alpha as a sixel image
pub(crate) fn encode_sixel(pixels: &GrayAlphaImage) -> Result<Vec<u8>> {
    let (width, height) = pixels.dimensions();
    let mut out = Vec::new();
    write!(out, "\x1bP0;1;0q\"1;1;{};{}", width, height)?;

    let opaque = |x: u32, y: u32| {
        let px = pixels.get_pixel(x, y);
        (px[1] >= ALPHA_THRESHOLD).then_some(px[0])
    };

    let mut used = [false; PALETTE_SIZE];
    for y in 0..height {
        for x in 0..width {
            if let Some(index) = opaque(x, y) {
                used[usize::from(index).min(PALETTE_SIZE - 1)] = true;
            }
        }
    }
    for (index, _) in used.iter().enumerate().filter(|(_, used)| **used) {
        let [r, g, b] = XtermPalette::rgb(index);
        write!(out, "#{};2;{};{};{}", index, percent(r), percent(g), percent(b))?;
    }

    let bands = height.div_ceil(6);
    for band in 0..bands {
        let top = band * 6;
        let rows = (height - top).min(6);

        let mut in_band = [false; PALETTE_SIZE];
        for y in top..top + rows {
            for x in 0..width {
                if let Some(index) = opaque(x, y) {
                    in_band[usize::from(index).min(PALETTE_SIZE - 1)] = true;
                }
            }
        }

        for (index, _) in in_band.iter().enumerate().filter(|(_, present)| **present) {
            write!(out, "#{}", index)?;
            let sixels = (0..width).map(|x| {
                let bits = (0..rows).fold(0u8, |bits, dy| {
                    if opaque(x, top + dy).map(usize::from) == Some(index) {
                        bits | (1 << dy)
                    } else {
                        bits
                    }
                });
                bits + 0x3f
            });
            write_runs(&mut out, sixels)?;
            out.push(b'$');
        }

        if band + 1 < bands {
            out.push(b'-');
        }
    }

    out.extend_from_slice(b"\x1b\\");
    Ok(out)
}

/// Run-length encode sixel characters, dropping a trailing blank run
fn write_runs(out: &mut Vec<u8>, sixels: impl Iterator<Item = u8>) -> Result<()> {
    let mut run: Option<(u8, usize)> = None;
    for ch in sixels {
        run = match run {
            Some((current, count)) if current == ch => Some((current, count + 1)),
            Some((current, count)) => {
                write_run(out, current, count)?;
                Some((ch, 1))
            }
            None => Some((ch, 1)),
        };
    }
    if let Some((ch, count)) = run {
        if ch != b'?' {
            write_run(out, ch, count)?;
        }
    }
    Ok(())
}

fn write_run(out: &mut Vec<u8>, ch: u8, count: usize) -> Result<()> {
    if count > 3 {
        write!(out, "!{}", count)?;
        out.push(ch);
    } else {
        out.extend(std::iter::repeat_n(ch, count));
    }
    Ok(())
}

/// Sixel colour components are 0–100
fn percent(value: u8) -> u32 {
    (u32::from(value) * 100 + 127) / 255
}
