use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clip_roulette::core::{AppConfig, Catalog, PlaybackError, VideoSource};
use clip_roulette::video::{format_timestamp, FfprobeReader, PlaybackSupervisor};
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "clip-roulette")]
#[command(about = "Play random videos or random clips of them through an external player")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play random videos until interrupted
    Play {
        /// Video directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Clip length in seconds, 0 plays whole videos
        #[arg(long)]
        clip: Option<f64>,

        /// Mute the player
        #[arg(short, long)]
        mute: bool,

        /// Stop after this many videos
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Player executable
        #[arg(long)]
        player: Option<PathBuf>,
    },

    /// List playable videos with their durations
    List {
        /// Video directory
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Delete a video from the video directory
    Remove {
        /// File name inside the video directory
        filename: String,

        /// Video directory
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("Failed to load config")?;

    match cli.command {
        Commands::Play { dir, clip, mute, count, player } => {
            if let Some(dir) = dir {
                config.video_directory = dir;
            }
            if let Some(clip) = clip {
                config.clip_duration_secs = clip;
            }
            if let Some(player) = player {
                config.player.program = player;
            }
            config.mute |= mute;
            play(config, count).await
        }
        Commands::List { dir } => {
            if let Some(dir) = dir {
                config.video_directory = dir;
            }
            let catalog = open_catalog(&config);
            for item in catalog.items() {
                println!("{}\t{}", format_timestamp(item.duration_secs), item.path.display());
            }
            println!("{} videos in {}", catalog.len(), catalog.directory().display());
            Ok(())
        }
        Commands::Remove { filename, dir } => {
            if let Some(dir) = dir {
                config.video_directory = dir;
            }
            open_catalog(&config).remove(&filename);
            Ok(())
        }
    }
}

fn open_catalog(config: &AppConfig) -> Catalog<FfprobeReader> {
    Catalog::new(
        &config.video_directory,
        &config.video_extension,
        FfprobeReader::new(config.ffprobe_program()),
    )
}

/// Ctrl-C latch. A signal that arrives while the player is being polled or
/// shut down is kept until the loop next waits on it.
#[derive(Clone, Default)]
struct Interrupt {
    notify: Arc<Notify>,
}

impl Interrupt {
    fn listen() -> Self {
        let interrupt = Self::default();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => trigger.trigger(),
                Err(e) => log::error!("Failed to listen for Ctrl-C: {}", e),
            }
        });
        interrupt
    }

    fn trigger(&self) {
        self.notify.notify_one();
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

async fn play(config: AppConfig, count: Option<u64>) -> anyhow::Result<()> {
    let interrupt = Interrupt::listen();
    let catalog = open_catalog(&config);
    let mut supervisor = PlaybackSupervisor::new(catalog, config.player.clone(), config.grace_period());
    let mut ticker = tokio::time::interval(config.poll_interval());
    let mut played = 0u64;

    log::info!(
        "Playing from {} (clip {}s, mute {})",
        config.video_directory.display(),
        config.clip_duration_secs,
        config.mute
    );

    while count.map_or(true, |count| played < count) {
        let current = match supervisor.start_playback(config.mute, config.clip_duration_secs) {
            Ok(current) => current,
            Err(e @ (PlaybackError::EmptyCatalog { .. } | PlaybackError::Spawn { .. })) => {
                log::warn!("Nothing played: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
                    _ = interrupt.wait() => break,
                }
            }
            Err(e) => return Err(e.into()),
        };
        played += 1;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if tokio::task::block_in_place(|| supervisor.is_finished()) {
                        break;
                    }
                }
                _ = interrupt.wait() => {
                    log::info!("Interrupted, stopping player");
                    tokio::task::block_in_place(|| supervisor.stop());
                    return Ok(());
                }
            }
        }

        log::info!("Finished {}", current.item.path.display());
        if config.delete_after_play {
            if let Some(filename) = current.item.path.file_name().and_then(|s| s.to_str()) {
                supervisor.remove(filename);
            }
        }
    }

    log::info!("Played {} videos", played);
    Ok(())
}
