//! Keyframe capture throttle.

use crate::ingest::UnitKind;

/// Decides whether a unit is a keyframe due for capture.
///
/// A keyframe qualifies when at least `interval_secs` have passed since the
/// last capture, or while the cursor is still below one interval. The second
/// clause forces the first capture of a session; it also re-arms capture if a
/// source's timestamps restart near zero.
pub fn should_capture(kind: UnitKind, unit_pts_ms: u64, last_captured_pts_ms: u64, interval_secs: u64) -> bool {
    if kind != UnitKind::Keyframe {
        return false;
    }
    let interval_ms = interval_secs.saturating_mul(1000);
    unit_pts_ms.saturating_sub(last_captured_pts_ms) >= interval_ms || last_captured_pts_ms < interval_ms
}

/// Timestamp of the last successful capture in a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureCursor {
    last_pts_ms: u64,
}

impl CaptureCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_pts_ms(&self) -> u64 {
        self.last_pts_ms
    }

    pub fn is_due(&self, kind: UnitKind, pts_ms: u64, interval_secs: u64) -> bool {
        should_capture(kind, pts_ms, self.last_pts_ms, interval_secs)
    }

    /// Records a capture. The cursor never moves backwards.
    pub fn advance(&mut self, pts_ms: u64) {
        self.last_pts_ms = self.last_pts_ms.max(pts_ms);
    }
}
