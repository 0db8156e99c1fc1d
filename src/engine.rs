//! The image engine: one detector, one registry, one compositor, one sink
//!
//! Applications build a single [`ImageEngine`] at startup and share it. All
//! methods take `&self`; decoding threads may call [`ImageEngine::set_image`]
//! while the render loop calls [`ImageEngine::scan_and_draw`].

use crate::compositor::Compositor;
use crate::config::ImageConfig;
use crate::detect::ProtocolDetector;
use crate::encoder::{CellSize, ImageEncoder};
use crate::logging;
use crate::protocol::Protocol;
use crate::registry::{ImageHandle, ImageRecord, ImageRegistry};
use crate::sink::OutputSink;
use image::DynamicImage;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use std::sync::Arc;

#[derive(Debug)]
pub struct ImageEngine {
    detector: Arc<ProtocolDetector>,
    registry: Arc<ImageRegistry>,
    compositor: Compositor,
}

impl ImageEngine {
    /// Engine probing the real terminal environment
    pub fn new(config: &ImageConfig, sink: Arc<dyn OutputSink>) -> Self {
        Self::with_detector(config, Arc::new(ProtocolDetector::new()), sink)
    }

    /// Engine with an injected detector; a configured protocol is forced on it
    pub fn with_detector(
        config: &ImageConfig,
        detector: Arc<ProtocolDetector>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self::with_cell_size(config, detector, sink, config.cell_size())
    }

    pub fn with_cell_size(
        config: &ImageConfig,
        detector: Arc<ProtocolDetector>,
        sink: Arc<dyn OutputSink>,
        cell: CellSize,
    ) -> Self {
        if config.protocol != Protocol::Auto {
            detector.force(config.protocol);
        }
        let registry = Arc::new(ImageRegistry::with_capacity(
            detector.clone(),
            sink.clone(),
            config.cache_size,
        ));
        let compositor = Compositor::new(detector.clone(), registry.clone(), sink, cell);
        logging::debug(&format!(
            "Image engine ready: protocol={}, cache_size={}, cell={}x{}",
            config.protocol,
            registry.capacity(),
            cell.width,
            cell.height
        ));
        Self {
            detector,
            registry,
            compositor,
        }
    }

    /// Swap in a custom encoder for its protocol
    pub fn with_encoder(mut self, encoder: Box<dyn ImageEncoder>) -> Self {
        self.compositor = self.compositor.with_encoder(encoder);
        self
    }

    pub fn register(&self, url: &str, width: u16, height: u16) -> ImageHandle {
        self.registry.register(url, width, height)
    }

    pub fn set_image(&self, handle: ImageHandle, bitmap: DynamicImage) {
        self.registry.set_image(handle, bitmap);
    }

    pub fn get(&self, handle: ImageHandle) -> Option<ImageRecord> {
        self.registry.get(handle)
    }

    /// Drop every image, on the terminal too where the protocol allows
    pub fn clear_all(&self) {
        self.registry.clear_all();
        self.compositor.reset_encoders();
    }

    pub fn scan_and_draw(&self, buf: &mut Buffer, region: Rect) -> usize {
        self.compositor.scan_and_draw(buf, region)
    }

    pub fn force(&self, protocol: Protocol) {
        self.detector.force(protocol);
    }

    pub fn detect(&self) -> Protocol {
        self.detector.detect()
    }

    pub fn reset(&self) {
        self.detector.reset();
    }

    pub fn registry(&self) -> &Arc<ImageRegistry> {
        &self.registry
    }

    pub fn detector(&self) -> &Arc<ProtocolDetector> {
        &self.detector
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }
}
