// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for headless rendering and export
//!
//! This module provides command-line functionality for:
//! - Listing filters
//! - Exporting a filtered image, video or frame sequence
//! - Driving the playback controller without a display

use chrono::Local;
use image::codecs::gif::{GifEncoder, Repeat};
use image::Delay;
use snapreel::config::Config;
use snapreel::constants::export::DEFAULT_FRAME_INTERVAL;
use snapreel::constants::file_formats;
use snapreel::filters::{FilterFactory, FilterType};
use snapreel::media::decoders::{GstVideoAsset, load_image};
use snapreel::media::{Dimensions, PixelBuffer};
use snapreel::pipelines::{ExportFrame, MediaExporter};
use snapreel::playback::{MediaContent, MediaPlayer, PixelBufferView, PlaybackMode};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Filter selection shared by the export commands
pub struct RenderOptions {
    pub filter: Option<FilterType>,
    pub overlays: Vec<PathBuf>,
    pub fill: Option<Dimensions>,
}

/// Parse a `WIDTHxHEIGHT` size
pub fn parse_dimensions(value: &str) -> Result<Dimensions, String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("Expected WIDTHxHEIGHT, got '{}'", value))?;
    let width: u32 = w.trim().parse().map_err(|_| format!("Invalid width '{}'", w))?;
    let height: u32 = h.trim().parse().map_err(|_| format!("Invalid height '{}'", h))?;
    if width == 0 || height == 0 {
        return Err("Width and height must be non-zero".to_string());
    }
    Ok(Dimensions::new(width, height))
}

/// Parse a filter key such as `manga` or `wave_pool`
pub fn parse_filter(value: &str) -> Result<FilterType, String> {
    value.parse()
}

/// List all filter keys
pub fn list_filters() -> CliResult {
    println!("Available filters:");
    println!();
    for filter in FilterType::ALL {
        let key = filter.key().unwrap_or("-");
        let animated = if filter.is_time_driven() { " (animated)" } else { "" };
        println!("  {:<16} {}{}", key, filter.display_name(), animated);
    }
    Ok(())
}

/// Filter one image and save it
pub fn export_image(input: &Path, options: RenderOptions, output: Option<PathBuf>) -> CliResult {
    let config = Config::load();
    let exporter = build_exporter(&config, &options)?;

    let image = image::open(input)?.to_rgba8();
    println!("Input: {} ({}x{})", input.display(), image.width(), image.height());
    println!("Filter: {}", exporter.filter_type());

    let result = exporter.export_image(&image, 0.0)?;

    let output_path = match output {
        Some(path) => path,
        None => default_output(&config, "png")?,
    };
    result.save(&output_path)?;
    println!(
        "Image saved: {} ({}x{})",
        output_path.display(),
        result.width(),
        result.height()
    );
    Ok(())
}

/// Re-encode a video through the filter
pub fn export_video(input: &Path, options: RenderOptions, output: Option<PathBuf>) -> CliResult {
    let config = Config::load();
    let mut exporter = build_exporter(&config, &options)?;
    if let Some(dir) = output.as_ref().and_then(|p| p.parent()) {
        if !dir.as_os_str().is_empty() {
            exporter.set_output_dir(Some(dir.to_path_buf()));
        }
    }

    let asset = Arc::new(GstVideoAsset::open(input)?);
    println!("Input: {}", input.display());
    println!("Filter: {}", exporter.filter_type());

    // Ctrl+C cancels the export; the exporter reports it as incomplete
    let cancel_handle = exporter.clone();
    ctrlc::set_handler(move || {
        cancel_handle.cancel();
    })?;

    println!();
    println!("Exporting... (press Ctrl+C to cancel)");
    let rt = tokio::runtime::Runtime::new()?;
    let exported = rt.block_on(exporter.export_video(asset, |progress| {
        print!("\rProgress: {:>3.0}%", progress * 100.0);
        let _ = std::io::stdout().flush();
    }));
    println!();
    let exported = exported?;

    let final_path = match output {
        Some(path) if path != exported => {
            std::fs::rename(&exported, &path)
                .or_else(|_| std::fs::copy(&exported, &path).map(|_| ()))?;
            let _ = std::fs::remove_file(&exported);
            path
        }
        _ => exported,
    };
    println!("Video saved: {}", final_path.display());
    Ok(())
}

/// Filter a list of stills and write them as an animated GIF
pub fn export_frames(
    inputs: &[PathBuf],
    interval_ms: Option<u64>,
    options: RenderOptions,
    output: Option<PathBuf>,
) -> CliResult {
    if inputs.is_empty() {
        return Err("No input images".into());
    }
    let config = Config::load();
    let exporter = build_exporter(&config, &options)?;
    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_FRAME_INTERVAL);

    let mut frames = Vec::with_capacity(inputs.len());
    for path in inputs {
        frames.push(ExportFrame {
            image: image::open(path)?.to_rgba8(),
            interval,
        });
    }
    println!("Loaded {} frames", frames.len());

    let rt = tokio::runtime::Runtime::new()?;
    let start = Instant::now();
    let exported = rt.block_on(exporter.export_frames(frames));
    println!(
        "Processed {} of {} frames in {:.2}s",
        exported.len(),
        inputs.len(),
        start.elapsed().as_secs_f64()
    );
    if exported.is_empty() {
        return Err("No frames could be exported".into());
    }

    let output_path = match output {
        Some(path) => path,
        None => default_output(&config, "gif")?,
    };
    write_gif(&output_path, exported)?;
    println!("GIF saved: {}", output_path.display());
    Ok(())
}

/// Play media headlessly and print each item as it comes up
pub fn play(
    inputs: &[PathBuf],
    mode: PlaybackMode,
    rate: f64,
    seconds: f64,
    filter: Option<FilterType>,
) -> CliResult {
    let config = Config::load();
    let player = MediaPlayer::new(config.filter_factory());
    player.set_filter_type(filter.unwrap_or(config.default_filter));
    player.set_still_interval(config.still_interval());

    let view = Arc::new(CountingView::default());
    let view_dyn: Arc<dyn PixelBufferView> = view.clone();
    player.set_view(Arc::downgrade(&view_dyn));

    let mut items = Vec::with_capacity(inputs.len());
    for path in inputs {
        items.push(load_media(path)?);
    }

    player.set_playback_mode(mode);
    player.set_rate(rate);
    println!("Playing {} items ({}, rate {})", items.len(), mode, rate);
    player.play(items);

    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    let mut sequence = Vec::new();
    while Instant::now() < deadline {
        let index = player.current_index();
        if index.is_some() && sequence.last() != Some(&index) {
            sequence.push(index);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    player.stop();

    let indices: Vec<String> = sequence
        .iter()
        .flatten()
        .map(|index| index.to_string())
        .collect();
    println!("Sequence: {}", indices.join(", "));
    println!("Frames displayed: {}", view.displayed.load(Ordering::SeqCst));
    Ok(())
}

#[derive(Default)]
struct CountingView {
    displayed: AtomicU64,
}

impl PixelBufferView for CountingView {
    fn display_pixel_buffer(&self, _buffer: PixelBuffer) {
        self.displayed.fetch_add(1, Ordering::SeqCst);
    }

    fn flush_pixel_buffer_cache(&self) {}
}

fn build_exporter(
    config: &Config,
    options: &RenderOptions,
) -> Result<MediaExporter, Box<dyn std::error::Error>> {
    let factory: FilterFactory = config.filter_factory();
    let mut exporter = MediaExporter::new(factory);
    exporter.set_filter_type(options.filter.unwrap_or(config.default_filter));
    exporter.set_render_size(options.fill);
    exporter.set_output_dir(config.output_dir.clone());
    exporter.set_bitrate(config.bitrate_preset);

    let mut overlays = Vec::with_capacity(options.overlays.len());
    for path in &options.overlays {
        overlays.push(load_image(path)?);
    }
    exporter.set_overlays(overlays);
    Ok(exporter)
}

fn load_media(path: &Path) -> Result<MediaContent, Box<dyn std::error::Error>> {
    if is_supported_image(path) {
        Ok(MediaContent::image(load_image(path)?))
    } else {
        Ok(MediaContent::Video(Arc::new(GstVideoAsset::open(path)?)))
    }
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(file_formats::is_image_extension)
}

fn write_gif(path: &Path, frames: Vec<ExportFrame>) -> CliResult {
    let file = std::fs::File::create(path)?;
    let mut encoder = GifEncoder::new(std::io::BufWriter::new(file));
    encoder.set_repeat(Repeat::Infinite)?;
    for frame in frames {
        let delay = Delay::from_saturating_duration(frame.interval);
        encoder.encode_frame(image::Frame::from_parts(frame.image, 0, 0, delay))?;
    }
    Ok(())
}

/// `snapreel_<timestamp>.<ext>` in the configured output directory
fn default_output(config: &Config, extension: &str) -> Result<PathBuf, std::io::Error> {
    let dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| dirs::picture_dir().unwrap_or_else(std::env::temp_dir));
    std::fs::create_dir_all(&dir)?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    Ok(dir.join(format!("snapreel_{}.{}", timestamp, extension)))
}

