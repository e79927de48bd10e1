//! vsplay - headless A/V player on top of the vsplay sync engine
//!
//! This is the command line front end. It:
//! 1. Loads the player config and applies command line overrides
//! 2. Opens the source (a file through Symphonia, or a `testsrc` generator)
//! 3. Starts audio output and the stdin command reader
//! 4. Runs the session on the main thread until quit or end of input
//!
//! ## Command line flags
//!
//! - `--config <path>`: Use this config file instead of ~/.config/vsplay/config.yaml
//! - `--sync audio|video|external`: Override the master clock
//! - `--audio headless|cpal`: Override the audio output backend
//! - `--exit-on-eof`: Quit once the source is exhausted and every queue has drained
//! - `--write-config`: Save the effective configuration and exit

mod audio;
mod commands;
mod config;
mod display;
mod symphonia_backend;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use vsplay_core::config::{load_config, save_config};
use vsplay_core::media::testsrc::{TestSourceBackend, TestSourceConfig};
use vsplay_core::media::{MediaBackend, PassthroughConverter};
use vsplay_core::playback::PlaybackSession;
use vsplay_core::sync::SyncMode;

use audio::start_audio_output;
use commands::spawn_stdin_reader;
use config::{default_config_path, AudioBackend, PlayerConfig};
use display::HeadlessDisplay;
use symphonia_backend::SymphoniaBackend;

const USAGE: &str = "usage: vsplay <file|testsrc[:key=value,...]> [--config <path>] \
[--sync audio|video|external] [--audio headless|cpal] [--exit-on-eof] [--write-config]";

/// Parsed command line
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    source: Option<String>,
    config_path: Option<PathBuf>,
    sync: Option<SyncMode>,
    audio: Option<AudioBackend>,
    exit_on_eof: bool,
    write_config: bool,
    help: bool,
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                cli.config_path = Some(PathBuf::from(path));
            }
            "--sync" => {
                let mode = iter.next().context("--sync needs a mode")?;
                cli.sync = Some(match mode.as_str() {
                    "audio" => SyncMode::AudioMaster,
                    "video" => SyncMode::VideoMaster,
                    "external" | "ext" => SyncMode::ExternalMaster,
                    other => bail!("unknown sync mode {:?}", other),
                });
            }
            "--audio" => {
                let backend = iter.next().context("--audio needs a backend")?;
                cli.audio = Some(match backend.as_str() {
                    "headless" => AudioBackend::Headless,
                    "cpal" => AudioBackend::Cpal,
                    other => bail!("unknown audio backend {:?}", other),
                });
            }
            "--exit-on-eof" => cli.exit_on_eof = true,
            "--write-config" => cli.write_config = true,
            "-h" | "--help" => cli.help = true,
            flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
            source => {
                if cli.source.replace(source.to_string()).is_some() {
                    bail!("only one source can be played at a time");
                }
            }
        }
    }
    Ok(cli)
}

/// Fold command line overrides into the loaded config
fn apply_overrides(config: &mut PlayerConfig, cli: &CliArgs) {
    if let Some(mode) = cli.sync {
        config.playback.sync.mode = mode;
    }
    if let Some(backend) = cli.audio {
        config.audio.backend = backend;
    }
    if cli.exit_on_eof {
        config.playback.demux.exit_on_eof = true;
    }
}

fn open_backend(source: &str) -> Result<Box<dyn MediaBackend>> {
    if source.starts_with("testsrc") {
        let generator = TestSourceConfig::parse(source)?;
        Ok(Box::new(TestSourceBackend::new(generator)))
    } else {
        Ok(Box::new(SymphoniaBackend::new()))
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;
    if cli.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config_path = cli.config_path.clone().unwrap_or_else(default_config_path);
    let mut config: PlayerConfig = load_config(&config_path);
    apply_overrides(&mut config, &cli);

    if cli.write_config {
        save_config(&config, &config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    let Some(source) = cli.source.as_deref() else {
        bail!("no source given\n{}", USAGE);
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                          vsplay                              ║");
    println!("║              audio/video playback sync engine                ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let backend = open_backend(source)?;
    let mut session = PlaybackSession::open(backend.as_ref(), source, config.playback.clone())
        .with_context(|| format!("Failed to open {}", source))?;
    log::info!(
        "Sync mode: {:?} (requested {:?})",
        session.shared().sync_mode(),
        config.playback.sync.mode
    );

    let audio_output = match session.take_audio_renderer() {
        Some(renderer) => {
            let output = start_audio_output(renderer, &config.audio)?;
            log::info!("Audio output: {}", output.describe());
            Some(output)
        }
        None => None,
    };

    // Detached; ends on its own once the session refuses commands
    spawn_stdin_reader(session.commands(), config.seek_step_secs, config.seek_long_step_secs)
        .context("Failed to start command reader")?;

    let mut display = HeadlessDisplay::new(config.display.clone());
    let result = session.run(&mut display, Box::new(PassthroughConverter));

    // Queues are aborted by now, so the audio sink can't be stuck in fill
    drop(audio_output);

    let summary = result?;
    log::info!(
        "Stopped at {:.3}s: {} frames shown, {} audio / {} video packets, {} seeks ({} failed), {} silence fills, {} resyncs",
        summary.position,
        summary.stats.frames_displayed,
        summary.stats.audio_packets,
        summary.stats.video_packets,
        summary.stats.seeks_completed,
        summary.stats.seeks_failed,
        summary.stats.silence_fills,
        summary.stats.resyncs
    );
    Ok(())
}

fn main() {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run() {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_full_command_line() {
        let cli = parse_args(&args(&[
            "movie.flac",
            "--sync",
            "external",
            "--audio",
            "cpal",
            "--exit-on-eof",
            "--config",
            "/tmp/vsplay.yaml",
        ]))
        .unwrap();
        assert_eq!(cli.source.as_deref(), Some("movie.flac"));
        assert_eq!(cli.sync, Some(SyncMode::ExternalMaster));
        assert_eq!(cli.audio, Some(AudioBackend::Cpal));
        assert!(cli.exit_on_eof);
        assert_eq!(cli.config_path, Some(PathBuf::from("/tmp/vsplay.yaml")));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_args(&args(&["--sync", "wallclock"])).is_err());
        assert!(parse_args(&args(&["--config"])).is_err());
        assert!(parse_args(&args(&["a.wav", "b.wav"])).is_err());
        assert!(parse_args(&args(&["--fullscreen"])).is_err());
    }

    #[test]
    fn test_overrides_apply_to_playback_config() {
        let cli = parse_args(&args(&["testsrc", "--sync", "audio", "--exit-on-eof"])).unwrap();
        let mut config = PlayerConfig::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.playback.sync.mode, SyncMode::AudioMaster);
        assert!(config.playback.demux.exit_on_eof);
        assert_eq!(config.audio.backend, AudioBackend::Headless);
    }

    #[test]
    fn test_backend_selection() {
        assert!(open_backend("testsrc:duration=2,fps=10").is_ok());
        assert!(open_backend("testsrc:fps=banana").is_err());
        // Files are only touched when the demuxer is opened
        assert!(open_backend("/nonexistent.wav").is_ok());
    }
}
