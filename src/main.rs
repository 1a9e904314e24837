// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use snapreel::filters::FilterType;
use snapreel::media::Dimensions;
use snapreel::playback::PlaybackMode;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "snapreel")]
#[command(about = "Apply filters to stills and videos, play them back and export the result")]
#[command(version = env!("SNAPREEL_BUILD_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RenderArgs {
    /// Filter key (see 'snapreel filters'); the configured default when omitted
    #[arg(short, long, value_parser = cli::parse_filter)]
    filter: Option<FilterType>,

    /// PNG overlay blended on top of the filtered frame (repeatable)
    #[arg(long = "overlay")]
    overlays: Vec<PathBuf>,

    /// Crop to fill this size, e.g. 1080x1920
    #[arg(long, value_parser = cli::parse_dimensions)]
    fill: Option<Dimensions>,
}

impl From<RenderArgs> for cli::RenderOptions {
    fn from(args: RenderArgs) -> Self {
        Self {
            filter: args.filter,
            overlays: args.overlays,
            fill: args.fill,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List available filters
    Filters,

    /// Filter a single image
    Image {
        input: PathBuf,

        #[command(flatten)]
        render: RenderArgs,

        /// Output file path (default: ~/Pictures/snapreel_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-encode a video through a filter
    Video {
        input: PathBuf,

        #[command(flatten)]
        render: RenderArgs,

        /// Output file path (default: a unique file in the output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Filter a sequence of stills into an animated GIF
    Frames {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Display time of each frame in milliseconds
        #[arg(short, long)]
        interval_ms: Option<u64>,

        #[command(flatten)]
        render: RenderArgs,

        /// Output GIF path (default: ~/Pictures/snapreel_TIMESTAMP.gif)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Play stills and videos without a display and report the item sequence
    Play {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Playback mode: loop, reverse or rebound
        #[arg(short, long, default_value = "loop")]
        mode: PlaybackMode,

        /// Playback rate multiplier
        #[arg(short, long, default_value = "1.0")]
        rate: f64,

        /// How long to play in seconds
        #[arg(short, long, default_value = "5")]
        seconds: f64,

        /// Filter key
        #[arg(short, long, value_parser = cli::parse_filter)]
        filter: Option<FilterType>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=snapreel=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Filters => cli::list_filters(),
        Commands::Image {
            input,
            render,
            output,
        } => cli::export_image(&input, render.into(), output),
        Commands::Video {
            input,
            render,
            output,
        } => cli::export_video(&input, render.into(), output),
        Commands::Frames {
            inputs,
            interval_ms,
            render,
            output,
        } => cli::export_frames(&inputs, interval_ms, render.into(), output),
        Commands::Play {
            inputs,
            mode,
            rate,
            seconds,
            filter,
        } => cli::play(&inputs, mode, rate, seconds, filter),
    }
}
