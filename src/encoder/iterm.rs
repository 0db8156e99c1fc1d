//! iTerm2 inline images
//!
//! `ESC ] 1337 ; File=<args> : <base64> BEL`
//!
//! iTerm2 can't crop on its side, so the visible region is cut out of the
//! bitmap and re-encoded as PNG before sending.

use super::{ImageEncoder, cropped_png};
use crate::error::Result;
use crate::geometry::Placement;
use crate::protocol::Protocol;
use crate::registry::ImageRecord;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use std::io::Write;

#[derive(Debug, Default, Clone, Copy)]
pub struct ItermEncoder;

impl ImageEncoder for ItermEncoder {
    fn protocol(&self) -> Protocol {
        Protocol::Iterm
    }

    fn encode(&self, image: &ImageRecord, placement: &Placement) -> Result<Vec<u8>> {
        let data = cropped_png(image, placement)?;
        let encoded = BASE64.encode(&data);

        let mut out = Vec::with_capacity(encoded.len() + 96);
        write!(
            out,
            "\x1b]1337;File=inline=1;size={};width={};height={};preserveAspectRatio=0:{}\x07",
            data.len(),
            placement.area.width,
            placement.area.height,
            encoded
        )?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::test_support::record;
    use crate::geometry::place;
    use image::GenericImageView;
    use ratatui::layout::Rect;

    fn decode_payload(bytes: &[u8]) -> (String, image::DynamicImage) {
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let body = text
            .strip_prefix("\x1b]1337;File=")
            .and_then(|s| s.strip_suffix('\x07'))
            .unwrap();
        let (args, payload) = body.split_once(':').unwrap();
        let png = BASE64.decode(payload).unwrap();
        (args.to_string(), image::load_from_memory(&png).unwrap())
    }

    #[test]
    fn test_full_image_sequence() {
        let image = record(10, 5, 100, 50);
        let placement = place(Rect::new(0, 0, 10, 5), Rect::new(0, 0, 80, 24), 100, 50).unwrap();
        let (args, decoded) = decode_payload(&ItermEncoder.encode(&image, &placement).unwrap());

        assert!(args.starts_with("inline=1;size="));
        assert!(args.ends_with(";width=10;height=5;preserveAspectRatio=0"));
        assert_eq!(decoded.dimensions(), (100, 50));
    }

    #[test]
    fn test_sends_only_the_visible_crop() {
        let image = record(10, 5, 100, 50);
        // Right half clipped away: only red pixels remain.
        let placement = place(Rect::new(0, 0, 10, 5), Rect::new(0, 2, 5, 20), 100, 50).unwrap();
        let (args, decoded) = decode_payload(&ItermEncoder.encode(&image, &placement).unwrap());

        assert!(args.ends_with(";width=5;height=3;preserveAspectRatio=0"));
        assert_eq!(decoded.dimensions(), (50, 30));
        assert_eq!(decoded.get_pixel(49, 0).0, [255, 0, 0, 255]);
    }
}
