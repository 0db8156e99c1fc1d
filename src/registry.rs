//! Image registry: URL → handle → decoded bitmap
//!
//! Handles double as placeholder colours in the text buffer, so they live in
//! a reserved range starting at [`HANDLE_BASE`], well above the theme's
//! 24-bit colours, and never exceed [`HANDLE_MAX`].
//!
//! Capacity is enforced FIFO by insertion order. Reads don't refresh an entry:
//! images leave a chat transcript in roughly the order they arrived.

use crate::detect::ProtocolDetector;
use crate::logging;
use crate::palette::PalettedImage;
use crate::protocol::Protocol;
use crate::sink::OutputSink;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use ratatui::style::Color;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

/// First handle ever issued
pub const HANDLE_BASE: u32 = 0x10_0000;
/// Largest handle that still fits in an RGB placeholder colour
pub const HANDLE_MAX: u32 = 0xFF_FFFF;
pub const DEFAULT_CAPACITY: usize = 100;

/// Kitty: delete every image and free its data
pub const KITTY_DELETE_ALL: &[u8] = b"\x1b_Ga=d,d=A,q=2\x1b\\";

/// Numeric identity of a registered image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageHandle(u32);

impl ImageHandle {
    /// `None` unless `raw` is in the reserved range
    pub fn new(raw: u32) -> Option<Self> {
        (HANDLE_BASE..=HANDLE_MAX).contains(&raw).then_some(Self(raw))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Placeholder foreground colour for this handle
    pub fn color(self) -> Color {
        Color::Rgb((self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8)
    }

    /// Read a handle back out of a placeholder colour
    pub fn from_color(color: Color) -> Option<Self> {
        match color {
            Color::Rgb(r, g, b) => Self::new(u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b)),
            _ => None,
        }
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One registered image
///
/// Bitmaps and their derivatives are shared, so cloning a record is cheap.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub url: String,
    pub handle: ImageHandle,
    /// Declared footprint in cells
    pub width: u16,
    pub height: u16,
    /// `None` until decoding finishes
    pub bitmap: Option<Arc<DynamicImage>>,
    /// Palette-quantized copy for Sixel
    pub paletted: Option<Arc<PalettedImage>>,
    /// `width × 2·height` pixel copy for the half-block renderer
    pub downscaled: Option<Arc<RgbaImage>>,
}

impl ImageRecord {
    fn new(url: &str, handle: ImageHandle, width: u16, height: u16) -> Self {
        Self {
            url: url.to_string(),
            handle,
            width,
            height,
            bitmap: None,
            paletted: None,
            downscaled: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.bitmap.is_some()
    }

    /// Pixel size the half-block renderer samples from
    pub fn downscaled_size(&self) -> (u32, u32) {
        (u32::from(self.width), 2 * u32::from(self.height))
    }

    fn downscaled_is_current(&self) -> bool {
        self.downscaled
            .as_ref()
            .is_some_and(|image| image.dimensions() == self.downscaled_size())
    }
}

#[derive(Default)]
struct RegistryState {
    by_url: HashMap<String, ImageHandle>,
    records: HashMap<ImageHandle, ImageRecord>,
    /// Live handles, oldest first
    order: VecDeque<ImageHandle>,
    /// Handles dropped since the last `take_evicted`
    evicted: Vec<ImageHandle>,
    next_handle: u32,
}

impl RegistryState {
    fn allocate(&mut self) -> ImageHandle {
        // Terminates: the live set is far smaller than the handle range.
        loop {
            let raw = self.next_handle.clamp(HANDLE_BASE, HANDLE_MAX);
            self.next_handle = if raw >= HANDLE_MAX { HANDLE_BASE } else { raw + 1 };
            let handle = ImageHandle(raw);
            if !self.records.contains_key(&handle) {
                return handle;
            }
        }
    }

    fn evict_oldest(&mut self) -> Option<ImageHandle> {
        let handle = self.order.pop_front()?;
        if let Some(record) = self.records.remove(&handle) {
            self.by_url.remove(&record.url);
        }
        self.evicted.push(handle);
        Some(handle)
    }

    /// Write `update` into the record only if it still holds `bitmap`
    fn update_if_current(
        &mut self,
        handle: ImageHandle,
        bitmap: &Arc<DynamicImage>,
        update: impl FnOnce(&mut ImageRecord),
    ) -> Option<ImageRecord> {
        let record = self.records.get_mut(&handle)?;
        if record.bitmap.as_ref().is_some_and(|b| Arc::ptr_eq(b, bitmap)) {
            update(record);
        }
        Some(record.clone())
    }
}

/// Read-locked view used by the compositor for a consistent scan
pub struct RegistryView<'a> {
    state: RwLockReadGuard<'a, RegistryState>,
}

impl RegistryView<'_> {
    pub fn get(&self, handle: ImageHandle) -> Option<&ImageRecord> {
        self.state.records.get(&handle)
    }
}

/// Bounded cache of images keyed by origin URL
pub struct ImageRegistry {
    state: RwLock<RegistryState>,
    capacity: usize,
    detector: Arc<ProtocolDetector>,
    sink: Arc<dyn OutputSink>,
}

impl ImageRegistry {
    pub fn new(detector: Arc<ProtocolDetector>, sink: Arc<dyn OutputSink>) -> Self {
        Self::with_capacity(detector, sink, DEFAULT_CAPACITY)
    }

    /// `capacity` is clamped to at least one image
    pub fn with_capacity(
        detector: Arc<ProtocolDetector>,
        sink: Arc<dyn OutputSink>,
        capacity: usize,
    ) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                next_handle: HANDLE_BASE,
                ..Default::default()
            }),
            capacity: capacity.max(1),
            detector,
            sink,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Handle for `url`, registering a bitmap-less record if it's new
    ///
    /// A known URL returns its existing handle untouched, even if `width`
    /// and `height` differ from the first registration.
    pub fn register(&self, url: &str, width: u16, height: u16) -> ImageHandle {
        let (handle, evicted) = {
            let mut state = self.write();
            if let Some(&handle) = state.by_url.get(url) {
                return handle;
            }

            let mut evicted = Vec::new();
            while state.records.len() >= self.capacity {
                match state.evict_oldest() {
                    Some(handle) => evicted.push(handle),
                    None => break,
                }
            }

            let handle = state.allocate();
            state
                .records
                .insert(handle, ImageRecord::new(url, handle, width, height));
            state.by_url.insert(url.to_string(), handle);
            state.order.push_back(handle);
            (handle, evicted)
        };

        if !evicted.is_empty() {
            logging::debug(&format!(
                "Image cache full ({}), evicted {} image(s)",
                self.capacity,
                evicted.len()
            ));
            self.free_on_terminal(&evicted);
        }
        handle
    }

    pub fn get(&self, handle: ImageHandle) -> Option<ImageRecord> {
        self.read().records.get(&handle).cloned()
    }

    pub fn handle_for(&self, url: &str) -> Option<ImageHandle> {
        self.read().by_url.get(url).copied()
    }

    /// Attach a decoded bitmap. Unknown handles are ignored: the record may
    /// have been evicted while the image was decoding.
    ///
    /// With Sixel active the palette copy is built here rather than on the
    /// first draw.
    pub fn set_image(&self, handle: ImageHandle, bitmap: DynamicImage) {
        if !self.read().records.contains_key(&handle) {
            logging::debug(&format!("Dropping decoded image for evicted handle {}", handle));
            return;
        }

        let paletted = (self.detector.detect() == Protocol::Sixel)
            .then(|| Arc::new(PalettedImage::quantize(&bitmap)));

        let mut state = self.write();
        if let Some(record) = state.records.get_mut(&handle) {
            record.bitmap = Some(Arc::new(bitmap));
            record.paletted = paletted;
            record.downscaled = None;
        }
    }

    /// Drop every record. Kitty also gets told to free its copies.
    pub fn clear_all(&self) {
        {
            let mut state = self.write();
            let cleared: Vec<ImageHandle> = state.order.drain(..).collect();
            state.evicted.extend(cleared);
            state.by_url.clear();
            state.records.clear();
        }

        if self.detector.detect() == Protocol::Kitty {
            if let Err(e) = self.sink.write_bytes(KITTY_DELETE_ALL) {
                logging::warn(&format!("Failed to clear kitty images: {}", e));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live handles, oldest first
    pub fn handles(&self) -> Vec<ImageHandle> {
        self.read().order.iter().copied().collect()
    }

    /// Handles evicted or cleared since the previous call
    pub fn take_evicted(&self) -> Vec<ImageHandle> {
        std::mem::take(&mut self.write().evicted)
    }

    /// Hold the read lock for a multi-lookup pass
    pub fn view(&self) -> RegistryView<'_> {
        RegistryView { state: self.read() }
    }

    /// Record with whatever derivative `protocol` draws from filled in
    ///
    /// Derivatives are computed without holding the lock and only stored if
    /// the bitmap wasn't replaced in the meantime.
    pub fn prepare(&self, handle: ImageHandle, protocol: Protocol) -> Option<ImageRecord> {
        let record = self.get(handle)?;
        let bitmap = record.bitmap.clone()?;

        match protocol {
            Protocol::Sixel if record.paletted.is_none() => {
                let paletted = Arc::new(PalettedImage::quantize(&bitmap));
                self.write().update_if_current(handle, &bitmap, |record| {
                    record.paletted = Some(paletted);
                })
            }
            Protocol::Ansi if !record.downscaled_is_current() => {
                let (width, height) = record.downscaled_size();
                if width == 0 || height == 0 {
                    return Some(record);
                }
                let downscaled = Arc::new(
                    bitmap
                        .resize_exact(width, height, FilterType::Triangle)
                        .to_rgba8(),
                );
                self.write().update_if_current(handle, &bitmap, |record| {
                    record.downscaled = Some(downscaled);
                })
            }
            _ => Some(record),
        }
    }

    fn free_on_terminal(&self, handles: &[ImageHandle]) {
        if self.detector.detect() != Protocol::Kitty {
            return;
        }
        let bytes: Vec<u8> = handles
            .iter()
            .flat_map(|handle| format!("\x1b_Ga=d,d=I,i={},q=2\x1b\\", handle.get()).into_bytes())
            .collect();
        if let Err(e) = self.sink.write_bytes(&bytes) {
            logging::warn(&format!("Failed to free evicted kitty images: {}", e));
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ImageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRegistry")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
