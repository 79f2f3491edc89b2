use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the external player is invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub program: PathBuf,
    pub base_args: Vec<String>, // background playback, no on-screen display
    pub mute_args: Vec<String>,
    pub seek_flag: String, // followed by an H:MM:SS timestamp
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("/usr/bin/omxplayer"),
            base_args: vec!["-b".to_string(), "--no-osd".to_string()],
            mute_args: vec!["-n".to_string(), "-1".to_string()],
            seek_flag: "--pos".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub video_directory: PathBuf,
    pub video_extension: String,
    pub ffprobe_path: Option<PathBuf>,
    pub player: PlayerConfig,
    pub clip_duration_secs: f64, // 0 plays whole files
    pub mute: bool,
    pub grace_period_secs: f64,
    pub poll_interval_ms: u64,
    pub delete_after_play: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            video_directory: PathBuf::from("./videos"),
            video_extension: "mp4".to_string(),
            ffprobe_path: None,
            player: PlayerConfig::default(),
            clip_duration_secs: 0.0,
            mute: false,
            grace_period_secs: 3.0,
            poll_interval_ms: 250,
            delete_after_play: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load the config at `config_path`, writing defaults there if the file is
    /// missing or cannot be parsed.
    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file at {}: {}", config_path.display(), e))?;

            match serde_json::from_str::<Self>(&content) {
                Ok(config) => {
                    log::info!("Loaded existing config from {}", config_path.display());
                    Ok(config)
                }
                Err(e) => {
                    log::warn!("Config file exists but has issues ({}), creating new one with defaults", e);
                    let new_config = Self::default();
                    new_config.save_to(config_path)
                        .map_err(|save_err| anyhow::anyhow!("Failed to save new config: {}", save_err))?;
                    log::info!("Created new config file at {}", config_path.display());
                    Ok(new_config)
                }
            }
        } else {
            log::info!("No config file found, creating default config");
            let config = Self::default();
            config.save_to(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to save default config: {}", e))?;
            log::info!("Created new config file at {}", config_path.display());
            Ok(config)
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clip-roulette")
            .join("config.json")
    }

    pub fn ffprobe_program(&self) -> PathBuf {
        self.ffprobe_path.clone().unwrap_or_else(|| PathBuf::from("ffprobe"))
    }

    /// Grace period for the shutdown protocol; nonsense values fall back to the default.
    pub fn grace_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.grace_period_secs).unwrap_or_else(|_| {
            log::warn!("Invalid grace period {}, using 3s", self.grace_period_secs);
            Duration::from_secs(3)
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
