//! Palette quantization for Sixel
//!
//! Uses the fixed xterm 6×6×6 colour cube plus the 24-step grey ramp
//! (240 entries). A fixed palette keeps quantization deterministic and lets
//! every cached image share the same colour registers.

use image::imageops::{self, ColorMap};
use image::{DynamicImage, GrayAlphaImage, LumaA, Rgba};

const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];
const CUBE_SIZE: usize = 216;
pub const PALETTE_SIZE: usize = CUBE_SIZE + 24;

/// Alpha below this is treated as transparent
pub const ALPHA_THRESHOLD: u8 = 128;

/// The xterm-256 palette without the 16 theme-dependent system colours
#[derive(Debug, Clone, Copy, Default)]
pub struct XtermPalette;

impl XtermPalette {
    /// RGB value of palette entry `index`
    pub fn rgb(index: usize) -> [u8; 3] {
        if index < CUBE_SIZE {
            let r = CUBE_LEVELS[index / 36];
            let g = CUBE_LEVELS[(index / 6) % 6];
            let b = CUBE_LEVELS[index % 6];
            [r, g, b]
        } else {
            let gray = 8 + 10 * (index - CUBE_SIZE).min(23) as u8;
            [gray, gray, gray]
        }
    }

    /// Index of the closest palette entry
    pub fn nearest(r: u8, g: u8, b: u8) -> usize {
        let level = |v: u8| {
            CUBE_LEVELS
                .iter()
                .enumerate()
                .min_by_key(|(_, level)| (i16::from(**level) - i16::from(v)).unsigned_abs())
                .map(|(i, _)| i)
                .unwrap_or(0)
        };
        let cube = level(r) * 36 + level(g) * 6 + level(b);

        let avg = (u16::from(r) + u16::from(g) + u16::from(b)) / 3;
        let gray_step = (avg.saturating_sub(3) / 10).min(23) as usize;
        let gray = CUBE_SIZE + gray_step;

        if distance([r, g, b], Self::rgb(gray)) < distance([r, g, b], Self::rgb(cube)) {
            gray
        } else {
            cube
        }
    }
}

fn distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = i32::from(*x) - i32::from(*y);
            (d * d) as u32
        })
        .sum()
}

impl ColorMap for XtermPalette {
    type Color = Rgba<u8>;

    fn index_of(&self, color: &Rgba<u8>) -> usize {
        Self::nearest(color[0], color[1], color[2])
    }

    fn lookup(&self, index: usize) -> Option<Rgba<u8>> {
        (index < PALETTE_SIZE).then(|| {
            let [r, g, b] = Self::rgb(index);
            Rgba([r, g, b, 255])
        })
    }

    fn has_lookup(&self) -> bool {
        true
    }

    fn map_color(&self, color: &mut Rgba<u8>) {
        let [r, g, b] = Self::rgb(self.index_of(color));
        color[0] = r;
        color[1] = g;
        color[2] = b;
    }
}

/// Image reduced to palette indices, one `LumaA` pixel per source pixel:
/// luma is the palette index, alpha is carried over from the source
#[derive(Debug, Clone)]
pub struct PalettedImage {
    pub pixels: GrayAlphaImage,
}

impl PalettedImage {
    /// Dither `image` onto [`XtermPalette`]
    pub fn quantize(image: &DynamicImage) -> Self {
        let mut rgba = image.to_rgba8();
        imageops::dither(&mut rgba, &XtermPalette);
        let indices = imageops::index_colors(&rgba, &XtermPalette);

        let pixels = GrayAlphaImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            LumaA([indices.get_pixel(x, y)[0], rgba.get_pixel(x, y)[3]])
        });
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}
