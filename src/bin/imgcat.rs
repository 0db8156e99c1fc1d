//! jcode-imgcat: draw an image file inline with the jcode image engine

use anyhow::{Context, Result, bail};
use clap::Parser;
use jcode_tui_image::{
    ImageConfig, ImageEngine, ImagePlaceholder, Protocol, StdoutSink, logging,
};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::widgets::Widget;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "jcode-imgcat")]
#[command(version = env!("JCODE_VERSION"))]
#[command(about = "Draw an image in the terminal using the jcode image engine")]
struct Args {
    /// Image file (PNG or JPEG)
    #[arg(required_unless_present = "detect")]
    path: Option<PathBuf>,

    /// Protocol to draw with (auto, kitty, iterm, sixel, ansi, fallback)
    #[arg(short, long)]
    protocol: Option<Protocol>,

    /// Width in cells (default: fit the terminal)
    #[arg(long)]
    cols: Option<u16>,

    /// Height in cells (default: keep the aspect ratio)
    #[arg(long)]
    rows: Option<u16>,

    /// Pretend this many rows were scrolled off the top
    #[arg(long, default_value_t = 0)]
    scroll: u16,

    /// Print the detected protocol and exit
    #[arg(long)]
    detect: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init();

    let mut config = ImageConfig::load();
    if let Some(protocol) = args.protocol {
        config.protocol = protocol;
    }
    let engine = ImageEngine::new(&config, Arc::new(StdoutSink));

    if args.detect {
        println!("{}", engine.detect());
        return Ok(());
    }
    let Some(path) = args.path else {
        bail!("no image path given");
    };

    let bitmap = image::open(&path).with_context(|| format!("opening {}", path.display()))?;
    let (term_cols, term_rows) = crossterm::terminal::size().unwrap_or((80, 24));
    let cell = config.cell_size();

    let max_rows = term_rows.saturating_sub(1).max(1);
    let fit = |cols: u16| -> u16 {
        // Keep the pixel aspect ratio given the cell shape.
        let pixel_width = u64::from(cols) * u64::from(cell.width);
        let pixel_height = pixel_width * u64::from(bitmap.height()) / u64::from(bitmap.width().max(1));
        (pixel_height / u64::from(cell.height)).clamp(1, u64::from(u16::MAX)) as u16
    };

    let mut cols = args
        .cols
        .unwrap_or_else(|| (bitmap.width() / u32::from(cell.width)).min(u32::from(term_cols)) as u16)
        .clamp(1, term_cols.max(1));
    let mut rows = args.rows.unwrap_or_else(|| fit(cols)).max(1);
    if args.cols.is_none() && args.rows.is_none() && rows - rows.min(args.scroll) > max_rows {
        // Shrink to fit the screen.
        let scale = (f64::from(max_rows) + f64::from(args.scroll)) / f64::from(rows);
        cols = ((f64::from(cols) * scale) as u16).max(1);
        rows = fit(cols);
    }

    if args.scroll >= rows {
        bail!("--scroll {} hides the whole {}-row image", args.scroll, rows);
    }
    let visible = rows - args.scroll;
    if visible > max_rows {
        bail!(
            "{} visible rows don't fit a {}-row terminal; pass --rows or --scroll",
            visible,
            term_rows
        );
    }

    let url = path.display().to_string();
    let handle = engine.register(&url, cols, rows);
    engine.set_image(handle, bitmap);

    // Make room below the prompt, then find where that room ended up.
    let mut stdout = io::stdout();
    stdout.write_all("\n".repeat(usize::from(visible)).as_bytes())?;
    stdout.flush()?;
    let bottom = crossterm::cursor::position()
        .map(|(_, row)| row)
        .unwrap_or(term_rows.saturating_sub(1));
    let top = bottom.saturating_sub(visible);

    // The cursor row below the image stays in the region: an image that
    // ends before the region's bottom edge is known to be cut at the top.
    let region = Rect::new(0, top, cols, visible + 1);
    let mut buf = Buffer::empty(region);
    // Only the visible rows get placeholders; the engine infers the rest.
    ImagePlaceholder::new(handle).render(Rect::new(0, top, cols, visible), &mut buf);

    if engine.scan_and_draw(&mut buf, region) == 0 {
        logging::warn(&format!("Nothing drawn for {} ({})", url, engine.detect()));
        eprintln!("jcode-imgcat: nothing drawn (protocol: {})", engine.detect());
    }
    Ok(())
}
