//! MuseTalk CLI - lip-synced video from a portrait and a voice track

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod assembler;
mod client;
mod commands;
mod error;
mod inputs;

use assembler::VideoAssembler;
use client::MuseTalkClient;
use commands::GenerateArgs;

/// MuseTalk - lip-sync a portrait to speech
///
/// Examples:
///   musetalk generate -r face.png -a speech.wav -o out.mp4
///   musetalk --server http://gpu-box:8000 health
#[derive(Parser, Debug)]
#[command(
    name = "musetalk",
    version = env!("CARGO_PKG_VERSION"),
    arg_required_else_help = true,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// MuseTalk server URL
    #[arg(
        long,
        global = true,
        value_name = "URL",
        default_value = "http://localhost:8000",
        env = "MUSETALK_SERVER"
    )]
    server: String,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a lip-synced video
    ///
    /// Falls back to a still-image video when the server is unreachable,
    /// unless --no-fallback is given.
    Generate {
        /// Reference portrait (PNG or JPEG)
        #[arg(short, long, value_name = "PATH")]
        reference: PathBuf,

        /// Voice track (WAV)
        #[arg(short, long, value_name = "PATH")]
        audio: PathBuf,

        /// Output video file
        #[arg(short, long, value_name = "PATH", default_value = "output.mp4")]
        output: PathBuf,

        /// Output frame rate
        #[arg(long, default_value = "25", value_parser = clap::value_parser!(u32).range(1..))]
        fps: u32,

        /// Vertical shift of the face crop (v1 models)
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        bbox_shift: i32,

        /// ffmpeg executable
        #[arg(long, default_value = "ffmpeg", env = "MUSETALK_FFMPEG")]
        ffmpeg: String,

        /// Inference request timeout in seconds
        #[arg(long, default_value = "900")]
        timeout: u64,

        /// Validate inputs and exit
        #[arg(long)]
        dry_run: bool,

        /// Fail instead of producing a still-image video
        #[arg(long)]
        no_fallback: bool,
    },

    /// Show server status
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("musetalk=debug,reqwest=info")
    } else if cli.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!("Parsed arguments: {:?}", cli);

    match cli.command {
        Command::Generate {
            reference,
            audio,
            output,
            fps,
            bbox_shift,
            ffmpeg,
            timeout,
            dry_run,
            no_fallback,
        } => {
            let client = MuseTalkClient::new(&cli.server, Duration::from_secs(timeout));
            let args = GenerateArgs {
                reference,
                audio,
                output,
                fps,
                bbox_shift,
                dry_run,
                no_fallback,
            };
            commands::generate(&client, VideoAssembler::new(ffmpeg, fps), &args)
                .await
                .context("Video generation failed")?;
        }
        Command::Health => {
            let client = MuseTalkClient::new(&cli.server, Duration::from_secs(10));
            commands::health(&client)
                .await
                .context("Health check failed")?;
        }
    }

    Ok(())
}
