use std::path::{Path, PathBuf};
use std::process::Command;

/// Reads the playable duration of a media file.
pub trait MetadataReader {
    fn duration_secs(&self, file_path: &Path) -> anyhow::Result<f64>;
}

/// Duration lookup backed by `ffprobe`.
pub struct FfprobeReader {
    program: PathBuf,
}

impl FfprobeReader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    pub fn get_video_info(&self, file_path: &Path) -> anyhow::Result<VideoInfo> {
        let output = Command::new(&self.program)
            .arg("-v").arg("quiet")
            .arg("-print_format").arg("json")
            .arg("-show_format")
            .arg(file_path)
            .output()
            .map_err(|e| anyhow::anyhow!("Failed to run {}: {}", self.program.display(), e))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!("ffprobe failed ({}): {}", output.status, error.trim()));
        }

        let json_str = String::from_utf8(output.stdout)?;
        VideoInfo::from_ffprobe_json(&json_str)
    }
}

impl Default for FfprobeReader {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MetadataReader for FfprobeReader {
    fn duration_secs(&self, file_path: &Path) -> anyhow::Result<f64> {
        Ok(self.get_video_info(file_path)?.duration)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub duration: f64,
}

impl VideoInfo {
    /// Parse `ffprobe -print_format json -show_format` output.
    pub fn from_ffprobe_json(json_str: &str) -> anyhow::Result<Self> {
        let info: serde_json::Value = serde_json::from_str(json_str)?;

        // ffprobe reports the duration as a string
        let duration = match &info["format"]["duration"] {
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            serde_json::Value::Number(n) => n.as_f64(),
            _ => None,
        }
        .ok_or_else(|| anyhow::anyhow!("ffprobe output has no format.duration"))?;

        if !duration.is_finite() || duration <= 0.0 {
            return Err(anyhow::anyhow!("Invalid duration {}", duration));
        }

        Ok(VideoInfo { duration })
    }
}
