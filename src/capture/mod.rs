//! Keyframe capture: throttle, fragment assembly and still rendering.

use std::path::{Path, PathBuf};

pub mod fragment;
pub mod render;
pub mod throttle;

pub use fragment::assemble;
pub use render::{FfmpegRenderer, FrameRenderer};
pub use throttle::{should_capture, CaptureCursor};

/// Placeholder in the output file name that is replaced by the source identity.
pub const IDENTITY_PLACEHOLDER: &str = "sn";

/// Shared, read-only capture settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturePolicy {
    /// Output path template, e.g. `./camera/camera-sn.png`.
    pub output_template: PathBuf,
    /// Minimum spacing between captures, in seconds.
    pub interval_secs: u64,
}

impl CapturePolicy {
    /// Resolves the output path for a source.
    ///
    /// Every occurrence of the placeholder in the file name is replaced; the
    /// directory part of the template is left untouched.
    pub fn output_path(&self, sn: &str) -> PathBuf {
        let file_name = self
            .output_template
            .file_name()
            .map(|name| name.to_string_lossy().replace(IDENTITY_PLACEHOLDER, sn))
            .unwrap_or_else(|| sn.to_string());
        match self.output_template.parent() {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    /// Directory the output files land in.
    pub fn output_dir(&self) -> &Path {
        self.output_template
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}
