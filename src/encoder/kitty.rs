//! Kitty graphics protocol
//!
//! `ESC _ G <key>=<value>,... ; <payload> ESC \`
//!
//! The registry handle is the kitty image id. The full bitmap is uploaded
//! once (PNG, base64, 4096-byte chunks); after that every draw is a single
//! placement that crops server-side with `x,y,w,h`. Placement id 1 makes a
//! redraw move the existing placement instead of adding another.
//!
//! An upload only counts once its bytes were written, and only for the
//! bitmap that was sent: replacing a record's bitmap uploads again under the
//! same id, which kitty treats as a replacement.

use super::{ImageEncoder, bitmap, png};
use crate::error::Result;
use crate::geometry::Placement;
use crate::protocol::Protocol;
use crate::registry::{ImageHandle, ImageRecord};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use image::DynamicImage;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Max base64 bytes per chunk
pub const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Default)]
pub struct KittyEncoder {
    /// Bitmap each image id currently holds on the terminal
    uploaded: Mutex<HashMap<ImageHandle, Weak<DynamicImage>>>,
}

impl KittyEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal already holds this record's current bitmap
    pub fn is_uploaded(&self, image: &ImageRecord) -> bool {
        let Some(bitmap) = image.bitmap.as_ref() else {
            return false;
        };
        self.uploaded()
            .get(&image.handle)
            .and_then(Weak::upgrade)
            .is_some_and(|sent| Arc::ptr_eq(&sent, bitmap))
    }

    /// Number of image ids believed to be on the terminal
    pub fn uploaded_count(&self) -> usize {
        self.uploaded().len()
    }

    fn uploaded(&self) -> MutexGuard<'_, HashMap<ImageHandle, Weak<DynamicImage>>> {
        self.uploaded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ImageEncoder for KittyEncoder {
    fn protocol(&self) -> Protocol {
        Protocol::Kitty
    }

    fn encode(&self, image: &ImageRecord, placement: &Placement) -> Result<Vec<u8>> {
        let id = image.handle.get();
        let mut out = Vec::new();

        if !self.is_uploaded(image) {
            let data = png(bitmap(image)?)?;
            transmit(&mut out, id, &data)?;
        }

        let source = placement.source;
        write!(
            out,
            "\x1b_Ga=p,i={},p=1,x={},y={},w={},h={},c={},r={},C=1,q=2\x1b\\",
            id,
            source.x,
            source.y,
            source.width,
            source.height,
            placement.area.width,
            placement.area.height
        )?;
        Ok(out)
    }

    fn committed(&self, image: &ImageRecord) {
        if let Some(bitmap) = image.bitmap.as_ref() {
            self.uploaded().insert(image.handle, Arc::downgrade(bitmap));
        }
    }

    fn forget(&self, handle: ImageHandle) {
        self.uploaded().remove(&handle);
    }

    fn reset(&self) {
        self.uploaded().clear();
    }
}

/// Upload `data` (PNG) as image `id` without displaying it
fn transmit(out: &mut Vec<u8>, id: u32, data: &[u8]) -> Result<()> {
    let encoded = BASE64.encode(data);
    let chunks: Vec<&[u8]> = encoded.as_bytes().chunks(CHUNK_SIZE).collect();
    let last = chunks.len().saturating_sub(1);

    for (i, chunk) in chunks.iter().enumerate() {
        let more = u8::from(i != last);
        if i == 0 {
            write!(out, "\x1b_Ga=t,f=100,i={},q=2,m={};", id, more)?;
        } else {
            write!(out, "\x1b_Gm={};", more)?;
        }
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\x1b\\");
    }
    Ok(())
}
