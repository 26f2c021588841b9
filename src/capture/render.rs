//! Still-image rendering of assembled fragments.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Renders the first decodable frame of a fragment file to an image.
///
/// Implementations must overwrite `output` if it exists and must be safe to
/// call from several source threads at once.
pub trait FrameRenderer: Send + Sync {
    fn render(&self, fragment: &Path, output: &Path) -> Result<()>;
}

/// Renderer backed by the `ffmpeg` binary.
#[derive(Clone, Debug)]
pub struct FfmpegRenderer {
    binary: PathBuf,
}

impl Default for FfmpegRenderer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, fragment: &Path, output: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(fragment)
            .arg("-frames:v")
            .arg("1")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        command
    }
}

impl FrameRenderer for FfmpegRenderer {
    fn render(&self, fragment: &Path, output: &Path) -> Result<()> {
        let result = self
            .command(fragment, output)
            .output()
            .with_context(|| format!("failed to run {}", self.binary.display()))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.binary.display(),
                result.status,
                stderr.trim()
            ));
        }
        Ok(())
    }
}
