use blockpress::engine::Quality;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "blockpress")]
#[command(about = "Transcode video into a block-compressed container", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Input video file
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Output file (defaults to the input path with its extension replaced)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Quality tier: fast|balanced|high or 0|1|2 (overrides config)
    #[arg(short, long, value_name = "TIER")]
    pub quality: Option<Quality>,

    /// Encoder threads, 0 = auto (overrides config)
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<u32>,

    /// Partition count override, -1 = use quality preset
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub partitions: Option<i64>,

    /// Compression effort (uber level) override, -1 = use quality preset
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub uber: Option<i64>,

    /// Encode every frame as a key frame
    #[arg(long)]
    pub all_i: bool,

    /// Disable skip blocks
    #[arg(long)]
    pub no_skip: bool,

    /// Disable solid-color blocks
    #[arg(long)]
    pub no_solid: bool,

    /// Compress at quarter resolution
    #[arg(long)]
    pub quarter_res: bool,

    /// Print the final session summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed with the HAP encoder
    CheckFfmpeg,

    /// Probe a video file for dimensions, frame rate and frame count
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
