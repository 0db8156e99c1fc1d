//! Recording encoder for e2e tests
//!
//! Captures every placement it is asked to encode and returns a fixed
//! payload, so tests can assert on geometry without decoding escape bytes.

use jcode_tui_image::error::Result;
use jcode_tui_image::{ImageEncoder, ImageHandle, ImageRecord, Placement, Protocol};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct EncodeCall {
    pub handle: ImageHandle,
    pub url: String,
    pub placement: Placement,
}

/// Shared log of encode calls; clone it before boxing the encoder
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<EncodeCall>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<EncodeCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

pub struct RecordingEncoder {
    protocol: Protocol,
    log: CallLog,
    payload: Vec<u8>,
}

impl RecordingEncoder {
    pub fn new(protocol: Protocol) -> (Self, CallLog) {
        let log = CallLog::default();
        let encoder = Self {
            protocol,
            log: log.clone(),
            payload: b"<image>".to_vec(),
        };
        (encoder, log)
    }
}

impl ImageEncoder for RecordingEncoder {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn encode(&self, image: &ImageRecord, placement: &Placement) -> Result<Vec<u8>> {
        self.log.0.lock().unwrap().push(EncodeCall {
            handle: image.handle,
            url: image.url.clone(),
            placement: *placement,
        });
        Ok(self.payload.clone())
    }
}
