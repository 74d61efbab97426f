use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use blockpress::config::Config;
use blockpress::engine::{
    self, FfmpegDecoder, FfmpegHapEncoder, MAX_EFFORT, MAX_PARTITIONS, Settings,
    TranscodeSession, derive_output_path, parse_override,
};
use std::path::PathBuf;
use std::process;
use tracing::Level;

pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) {
    if let Some(command) = cli.command {
        match command {
            Commands::CheckFfmpeg => handle_check_ffmpeg(),
            Commands::Probe { file } => handle_probe(file),
            Commands::InitConfig => handle_init_config(),
        }
        return;
    }

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %format!("{e:#}"), "failed to load config, using defaults");
        Config::default()
    });

    let settings = match build_settings(&cli, &config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(2);
        }
    };

    process::exit(handle_transcode(settings, &config, cli.json));
}

/// Merge CLI flags over config defaults
fn build_settings(cli: &Cli, config: &Config) -> Result<Settings> {
    let input = cli
        .input
        .clone()
        .context("No input given. Use -i/--input <path> (see --help)")?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| derive_output_path(&input, &config.defaults.output_extension));

    if output == input {
        anyhow::bail!("Output path must differ from input: {}", input.display());
    }

    let quality = match cli.quality {
        Some(q) => q,
        None => config.defaults.quality()?,
    };

    let partitions = match cli.partitions {
        Some(raw) => parse_override("partitions", raw, MAX_PARTITIONS)?,
        None => config.defaults.partitions_override()?,
    };

    let effort = match cli.uber {
        Some(raw) => parse_override("uber", raw, MAX_EFFORT)?,
        None => config.defaults.uber_override()?,
    };

    Ok(Settings {
        quality,
        partitions,
        effort,
        threads: cli.jobs.unwrap_or(config.defaults.jobs),
        force_all_key_frames: cli.all_i,
        enable_skip_blocks: !cli.no_skip,
        enable_solid_color_blocks: !cli.no_solid,
        enable_quarter_resolution: cli.quarter_res,
        ..Settings::new(input, output)
    })
}

/// Host loop: tick until the session reaches a terminal phase.
/// Returns the process exit code.
fn handle_transcode(settings: Settings, config: &Config, json: bool) -> i32 {
    let mut session = TranscodeSession::with_limits(
        FfmpegDecoder::new(),
        FfmpegHapEncoder::new(),
        config.scheduler.limits(),
    );

    if let Err(e) = session.begin(settings) {
        eprintln!("Error: {}", e);
        if json {
            print_summary_json(&session);
        }
        return 1;
    }

    session.run_paced(config.host.tick_interval());

    let summary = session.summary();
    if json {
        print_summary_json(&session);
    } else {
        println!(
            "{}: {} of {} frames encoded ({})",
            summary.phase,
            summary.encoded_frames,
            summary.total_frames,
            summary
                .end_reason
                .map(|r| r.description())
                .unwrap_or("unknown")
        );
        if let Some(output) = &summary.output {
            println!("Output: {}", output.display());
        }
    }

    if summary.is_truncated() {
        eprintln!(
            "Warning: output has {} frames but the source reported {}",
            summary.encoded_frames, summary.total_frames
        );
    }

    if let Some(err) = session.finalize_error() {
        eprintln!("Error: {}", err);
        return 1;
    }

    0
}

fn print_summary_json<D, E>(session: &TranscodeSession<D, E>)
where
    D: engine::FrameDecoder,
    E: engine::BlockEncoder,
{
    match serde_json::to_string_pretty(&session.summary()) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: failed to serialize summary: {}", e),
    }
}

fn handle_check_ffmpeg() {
    let mut ok = true;

    match engine::ffmpeg_version() {
        Ok(version) => println!("ffmpeg found: {}", version),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ok = false;
        }
    }

    match engine::ffprobe_version() {
        Ok(version) => println!("ffprobe found: {}", version),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ok = false;
        }
    }

    if ok {
        if engine::hap_encoder_available() {
            println!("HAP encoder: available");
        } else {
            eprintln!("Error: this ffmpeg build has no HAP encoder");
            ok = false;
        }
    }

    process::exit(if ok { 0 } else { 1 });
}

fn handle_probe(file: PathBuf) {
    match engine::probe::probe_input_info(&file) {
        Ok(info) => {
            println!("File: {}", file.display());
            println!("Dimensions: {}x{}", info.width, info.height);
            println!("Frame rate: {:.3} fps", info.fps);
            match info.duration {
                Some(d) => println!("Duration: {:.2}s", d),
                None => println!("Duration: unknown"),
            }
            match info.frame_count {
                Some(n) => println!("Frames: {}", n),
                None => println!("Frames: ~{} (estimated)", info.estimated_frames()),
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_init_config() {
    match Config::config_path() {
        Ok(path) => {
            if Config::exists() {
                println!("Config file exists: {}", path.display());
            } else {
                match Config::ensure_default() {
                    Ok(()) => println!("Created default config: {}", path.display()),
                    Err(e) => {
                        eprintln!("Error: {:#}", e);
                        process::exit(1);
                    }
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
