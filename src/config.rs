use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::CapturePolicy;

const DEFAULT_INTERVAL_SECS: u64 = 3;
const DEFAULT_SAVE_PATH: &str = "./camera/camera-sn.png";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct StillframeConfigFile {
    /// Capture interval in seconds. The name predates the interval semantics.
    camera_size: Option<u64>,
    save_path: Option<String>,
    ffmpeg: Option<String>,
    backoff_ms: Option<u64>,
    #[serde(default)]
    cameras: Vec<CameraConfigFile>,
}

#[derive(Debug, Deserialize)]
struct CameraConfigFile {
    sn: String,
    url: String,
}

/// One configured source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    pub sn: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct StillframeConfig {
    pub interval_secs: u64,
    pub save_path: PathBuf,
    pub ffmpeg: PathBuf,
    pub restart_backoff: Duration,
    pub cameras: Vec<CameraSettings>,
}

impl StillframeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file_cfg = read_config_file(path)?;
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: StillframeConfigFile) -> Self {
        let interval_secs = file
            .camera_size
            .filter(|secs| *secs != 0)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        let save_path = file
            .save_path
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| DEFAULT_SAVE_PATH.to_string());
        let ffmpeg = file.ffmpeg.unwrap_or_else(|| DEFAULT_FFMPEG.to_string());
        let restart_backoff =
            Duration::from_millis(file.backoff_ms.unwrap_or(DEFAULT_BACKOFF_MS));
        let cameras = file
            .cameras
            .into_iter()
            .map(|camera| CameraSettings {
                sn: camera.sn,
                url: camera.url,
            })
            .collect();
        Self {
            interval_secs,
            save_path: PathBuf::from(save_path),
            ffmpeg: PathBuf::from(ffmpeg),
            restart_backoff,
            cameras,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(secs) = env_u64("STILLFRAME_INTERVAL_SECS")? {
            if secs != 0 {
                self.interval_secs = secs;
            }
        }
        if let Ok(path) = std::env::var("STILLFRAME_SAVE_PATH") {
            if !path.trim().is_empty() {
                self.save_path = PathBuf::from(path);
            }
        }
        if let Ok(ffmpeg) = std::env::var("STILLFRAME_FFMPEG") {
            if !ffmpeg.trim().is_empty() {
                self.ffmpeg = PathBuf::from(ffmpeg);
            }
        }
        if let Some(ms) = env_u64("STILLFRAME_BACKOFF_MS")? {
            self.restart_backoff = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.save_path.file_name().is_none() {
            bail!("savePath '{}' has no file name", self.save_path.display());
        }

        let mut seen = HashSet::new();
        for camera in &mut self.cameras {
            camera.sn = camera.sn.trim().to_string();
            camera.url = camera.url.trim().to_string();
            if camera.sn.is_empty() {
                bail!("camera sn must not be empty");
            }
            if camera.sn.contains(['/', '\\']) {
                bail!("camera sn '{}' must not contain path separators", camera.sn);
            }
            if camera.url.is_empty() {
                bail!("camera '{}' has an empty url", camera.sn);
            }
            if !seen.insert(camera.sn.clone()) {
                bail!("camera sn '{}' is configured more than once", camera.sn);
            }
        }
        if self.cameras.is_empty() {
            log::warn!("no cameras configured; nothing will be captured");
        }
        Ok(())
    }

    /// Capture settings shared by every session.
    pub fn capture_policy(&self) -> CapturePolicy {
        CapturePolicy {
            output_template: self.save_path.clone(),
            interval_secs: self.interval_secs,
        }
    }
}

fn read_config_file(path: &Path) -> Result<StillframeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", key)),
        _ => Ok(None),
    }
}
