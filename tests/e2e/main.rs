//! End-to-end tests for the image engine
//!
//! These drive the full flow from registration through placeholder scanning
//! to the bytes handed to the output sink, without touching a real terminal.

mod recording_encoder;

use image::{DynamicImage, Rgba, RgbaImage};
use jcode_tui_image::encoder::{self, HalfBlockEncoder};
use jcode_tui_image::registry::KITTY_DELETE_ALL;
use jcode_tui_image::{
    CellSize, HANDLE_BASE, ImageConfig, ImageEngine, ImagePlaceholder, MemorySink, PixelRect,
    Protocol, ProtocolDetector, TerminalProbe,
};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::widgets::Widget;
use recording_encoder::RecordingEncoder;
use std::collections::HashMap;
use std::sync::Arc;

const URL: &str = "https://x/img.png";

struct StaticEnv(HashMap<&'static str, &'static str>);

impl TerminalProbe for StaticEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.0.get(key).map(|v| v.to_string())
    }
}

fn engine_with(protocol: Protocol, cache_size: usize) -> (ImageEngine, Arc<MemorySink>) {
    let config = ImageConfig {
        protocol,
        cache_size,
        ..Default::default()
    };
    let sink = Arc::new(MemorySink::new());
    // No terminal variables at all: detection alone would pick Ansi.
    let detector = Arc::new(ProtocolDetector::with_probe(StaticEnv(HashMap::new())));
    let engine = ImageEngine::with_cell_size(&config, detector, sink.clone(), CellSize::default());
    (engine, sink)
}

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width) as u8, (y * 255 / height) as u8, 128, 255])
    }))
}

fn screen(width: u16, height: u16) -> Buffer {
    Buffer::empty(Rect::new(0, 0, width, height))
}

/// Register `URL` as 10×5 cells backed by a 100×50 bitmap
fn load_scenario_image(engine: &ImageEngine) -> jcode_tui_image::ImageHandle {
    let handle = engine.register(URL, 10, 5);
    engine.set_image(handle, gradient(100, 50));
    handle
}

/// Top two rows of a 10×5 image scrolled out of a list starting at row 2
#[test]
fn test_scrolled_image_is_cropped_from_the_top() {
    let (encoder, log) = RecordingEncoder::new(Protocol::Ansi);
    let (engine, sink) = engine_with(Protocol::Ansi, 10);
    let engine = engine.with_encoder(Box::new(encoder));
    let handle = load_scenario_image(&engine);

    let mut buf = screen(10, 12);
    ImagePlaceholder::new(handle).render(Rect::new(0, 0, 10, 5), &mut buf);
    let drawn = engine.scan_and_draw(&mut buf, Rect::new(0, 2, 10, 10));

    assert_eq!(drawn, 1);
    let calls = log.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].url, URL);
    let placement = calls[0].placement;
    assert_eq!(placement.source, PixelRect::new(0, 20, 100, 30));
    assert_eq!(placement.area, Rect::new(0, 2, 10, 3));
    assert_eq!(sink.contents(), b"\x1b7\x1b[3;1H<image>\x1b8");
}

/// Same scenario through the real half-block encoder
#[test]
fn test_scrolled_image_half_block_bytes() {
    let (engine, _) = engine_with(Protocol::Ansi, 10);
    let handle = load_scenario_image(&engine);
    let record = engine
        .registry()
        .prepare(handle, Protocol::Ansi)
        .expect("loaded record");
    let sink = MemorySink::new();

    let drawn = encoder::draw(
        &record,
        Rect::new(0, 0, 10, 5),
        Rect::new(0, 2, 10, 10),
        &HalfBlockEncoder,
        &sink,
    );

    assert!(drawn);
    assert_eq!(sink.write_count(), 1);
    let out = sink.contents_string();
    assert!(out.starts_with("\x1b7\x1b[3;1H"), "{out:?}");
    assert!(out.ends_with("\x1b8"));
    // 10 columns × 3 visible rows
    assert_eq!(out.matches('▀').count(), 30);
    // Nothing is drawn on the scrolled-off rows.
    assert!(!out.contains("\x1b[1;1H"));
    assert!(!out.contains("\x1b[2;1H"));
}

#[test]
fn test_placeholder_block_encodes_once() {
    let (encoder, log) = RecordingEncoder::new(Protocol::Kitty);
    let (engine, sink) = engine_with(Protocol::Kitty, 10);
    let engine = engine.with_encoder(Box::new(encoder));
    let handle = engine.register("https://x/square.png", 4, 4);
    engine.set_image(handle, gradient(32, 64));

    let mut buf = screen(20, 10);
    ImagePlaceholder::new(handle).render(Rect::new(3, 2, 4, 4), &mut buf);
    let area = buf.area;
    engine.scan_and_draw(&mut buf, area);

    assert_eq!(log.len(), 1);
    assert_eq!(sink.write_count(), 1);
    for y in 2..6 {
        for x in 3..7 {
            assert!(buf[(x, y)].skip);
        }
    }
    assert!(!buf[(2, 2)].skip);
}

#[test]
fn test_offscreen_image_writes_nothing() {
    let (engine, sink) = engine_with(Protocol::Ansi, 10);
    let handle = load_scenario_image(&engine);
    let record = engine.get(handle).expect("registered");

    let drawn = encoder::draw(
        &record,
        Rect::new(0, 0, 10, 5),
        Rect::new(0, 5, 10, 10),
        &HalfBlockEncoder,
        sink.as_ref(),
    );
    assert!(!drawn);
    assert_eq!(sink.write_count(), 0);
}

#[test]
fn test_each_protocol_writes_its_own_sequence() {
    let cases: [(Protocol, &str); 4] = [
        (Protocol::Kitty, "\x1b_Ga=t,f=100,"),
        (Protocol::Iterm, "\x1b]1337;File=inline=1;"),
        (Protocol::Sixel, "\x1bP0;1;0q\"1;1;"),
        (Protocol::Ansi, "▀"),
    ];

    for (protocol, marker) in cases {
        let (engine, sink) = engine_with(protocol, 10);
        let handle = engine.register(URL, 6, 3);
        engine.set_image(handle, gradient(48, 48));

        let mut buf = screen(20, 6);
        ImagePlaceholder::new(handle).render(Rect::new(1, 1, 6, 3), &mut buf);
        let area = buf.area;
        assert_eq!(engine.scan_and_draw(&mut buf, area), 1, "{protocol}");

        let out = sink.contents_string();
        assert!(out.starts_with("\x1b7\x1b[2;2H"), "{protocol}: {out:?}");
        assert!(out.contains(marker), "{protocol}: missing {marker:?}");
        assert!(out.ends_with("\x1b8"), "{protocol}");
    }
}

#[test]
fn test_kitty_redraw_only_moves_the_placement() {
    let (engine, sink) = engine_with(Protocol::Kitty, 10);
    let handle = load_scenario_image(&engine);
    let mut buf = screen(10, 12);
    ImagePlaceholder::new(handle).render(Rect::new(0, 0, 10, 5), &mut buf);

    let area = buf.area;
    engine.scan_and_draw(&mut buf, area);
    sink.take();

    engine.scan_and_draw(&mut buf, Rect::new(0, 2, 10, 10));
    assert_eq!(
        sink.contents_string(),
        format!(
            "\x1b7\x1b[3;1H\x1b_Ga=p,i={},p=1,x=0,y=20,w=100,h=30,c=10,r=3,C=1,q=2\x1b\\\x1b8",
            handle.get()
        )
    );
}

#[test]
fn test_kitty_eviction_and_clear_free_terminal_memory() {
    let (engine, sink) = engine_with(Protocol::Kitty, 2);
    let first = engine.register("https://x/1.png", 1, 1);
    engine.register("https://x/2.png", 1, 1);
    assert_eq!(sink.write_count(), 0);

    engine.register("https://x/3.png", 1, 1);
    assert_eq!(
        sink.contents_string(),
        format!("\x1b_Ga=d,d=I,i={},q=2\x1b\\", first.get())
    );
    assert!(engine.get(first).is_none());
    sink.take();

    engine.clear_all();
    assert_eq!(sink.contents(), KITTY_DELETE_ALL);
    assert!(engine.registry().is_empty());
}

#[test]
fn test_fifo_bound_keeps_last_registered() {
    let (engine, _) = engine_with(Protocol::Ansi, 3);
    let handles: Vec<_> = (0..5)
        .map(|i| engine.register(&format!("https://x/{i}.png"), 2, 2))
        .collect();

    assert_eq!(engine.registry().handles(), handles[2..].to_vec());
    assert!(handles.iter().all(|h| h.get() >= HANDLE_BASE));
}

#[test]
fn test_forced_protocol_beats_environment() {
    let env = StaticEnv(HashMap::from([("KITTY_WINDOW_ID", "1"), ("TMUX", "/tmp/tmux")]));
    let detector = Arc::new(ProtocolDetector::with_probe(env));
    let engine = ImageEngine::with_cell_size(
        &ImageConfig::default(),
        detector,
        Arc::new(MemorySink::new()),
        CellSize::default(),
    );

    // tmux wins over kitty's own variables.
    assert_eq!(engine.detect(), Protocol::Ansi);

    engine.force(Protocol::Sixel);
    assert_eq!(engine.detect(), Protocol::Sixel);

    engine.force(Protocol::Auto);
    assert_eq!(engine.detect(), Protocol::Ansi);
}

#[test]
fn test_kitty_uploads_replacement_bitmap() {
    let (engine, sink) = engine_with(Protocol::Kitty, 10);
    let handle = load_scenario_image(&engine);
    let mut buf = screen(10, 6);
    ImagePlaceholder::new(handle).render(Rect::new(0, 0, 10, 5), &mut buf);
    let area = buf.area;

    engine.scan_and_draw(&mut buf, area);
    engine.scan_and_draw(&mut buf, area);
    assert_eq!(sink.contents_string().matches("a=t,").count(), 1);
    sink.take();

    engine.set_image(handle, gradient(50, 25));
    engine.scan_and_draw(&mut buf, area);
    assert!(sink.contents_string().contains("\x1b_Ga=t,f=100,"));
}
