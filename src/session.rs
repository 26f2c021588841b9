//! One connection's lifecycle for one source.
//!
//! A session connects, negotiates the H.264 track, then feeds every access
//! unit through the throttle. Qualifying keyframes are assembled into a
//! standalone fragment, written to a temp file and rendered to the source's
//! output path.
//!
//! Per-unit failures (malformed unit, render failure, temp-file I/O) are logged
//! and skipped. Only negotiation failure, connection loss or cancellation end a
//! session.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::capture::{assemble, CaptureCursor, CapturePolicy, FrameRenderer};
use crate::config::CameraSettings;
use crate::ingest::{AccessUnit, ParameterSets, StreamConnector, StreamEvent};
use crate::shutdown::CancelToken;

/// Process-wide session numbering; keeps temp fragment names distinct.
static SESSION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Collaborators shared by every session of every source.
#[derive(Clone)]
pub struct CaptureContext {
    pub policy: Arc<CapturePolicy>,
    pub renderer: Arc<dyn FrameRenderer>,
    pub connector: Arc<dyn StreamConnector>,
    /// Where temp fragments are written.
    pub temp_dir: PathBuf,
}

impl CaptureContext {
    pub fn new(
        policy: Arc<CapturePolicy>,
        renderer: Arc<dyn FrameRenderer>,
        connector: Arc<dyn StreamConnector>,
    ) -> Self {
        Self {
            policy,
            renderer,
            connector,
            temp_dir: std::env::temp_dir(),
        }
    }
}

#[derive(Debug)]
pub enum SessionState {
    Connecting,
    Streaming,
    /// `None` when the session was cancelled deliberately.
    Terminated(Option<anyhow::Error>),
}

/// Counters for one session, logged when it ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub units: u64,
    pub malformed: u64,
    pub captures: u64,
    pub failed_captures: u64,
}

pub struct Session {
    camera: CameraSettings,
    ctx: CaptureContext,
    state: SessionState,
    cursor: CaptureCursor,
    stats: SessionStats,
    session_id: u64,
    capture_seq: u64,
    output_path: PathBuf,
}

impl Session {
    pub fn new(camera: CameraSettings, ctx: CaptureContext) -> Self {
        let output_path = ctx.policy.output_path(&camera.sn);
        Self {
            camera,
            ctx,
            state: SessionState::Connecting,
            cursor: CaptureCursor::new(),
            stats: SessionStats::default(),
            session_id: SESSION_SEQ.fetch_add(1, Ordering::Relaxed),
            capture_seq: 0,
            output_path,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn cursor(&self) -> CaptureCursor {
        self.cursor
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, SessionState::Terminated(_))
    }

    /// The error that ended the session; `None` while running or if cancelled.
    pub fn terminal_error(&self) -> Option<&anyhow::Error> {
        match &self.state {
            SessionState::Terminated(err) => err.as_ref(),
            _ => None,
        }
    }

    pub fn into_terminal_error(self) -> Option<anyhow::Error> {
        match self.state {
            SessionState::Terminated(err) => err,
            _ => None,
        }
    }

    /// Runs the session until the connection ends or `cancel` fires.
    pub fn run(&mut self, cancel: &CancelToken) {
        let outcome = self.drive(cancel);
        log::info!(
            "sn@{}, session {} ended: units={} captures={} failed={} malformed={}",
            self.camera.sn,
            self.session_id,
            self.stats.units,
            self.stats.captures,
            self.stats.failed_captures,
            self.stats.malformed
        );
        self.state = SessionState::Terminated(outcome.err());
    }

    fn drive(&mut self, cancel: &CancelToken) -> Result<()> {
        self.state = SessionState::Connecting;
        self.prepare_output_dir();

        // The client is dropped on every exit path below, which closes the
        // connection.
        let mut client = self
            .ctx
            .connector
            .connect(&self.camera.url)
            .with_context(|| format!("connect {}", self.camera.url))?;
        if cancel.is_cancelled() {
            return Ok(());
        }
        let params = client
            .describe()
            .with_context(|| format!("describe {}", self.camera.url))?;

        self.state = SessionState::Streaming;
        log::info!(
            "sn@{}, streaming (sps {} bytes, pps {} bytes)",
            self.camera.sn,
            params.sps.len(),
            params.pps.len()
        );

        while !cancel.is_cancelled() {
            match client.next_event()? {
                StreamEvent::Unit(unit) => self.on_unit(&params, &unit),
                StreamEvent::Malformed(err) => {
                    self.stats.malformed += 1;
                    log::warn!("sn@{}, skipped malformed unit: {:#}", self.camera.sn, err);
                }
                StreamEvent::Idle => {}
            }
        }
        Ok(())
    }

    fn on_unit(&mut self, params: &ParameterSets, unit: &AccessUnit) {
        self.stats.units += 1;
        if !self
            .cursor
            .is_due(unit.kind, unit.pts_ms, self.ctx.policy.interval_secs)
        {
            return;
        }
        if unit.payload.is_empty() {
            self.stats.malformed += 1;
            log::warn!("sn@{}, skipped empty keyframe at {}ms", self.camera.sn, unit.pts_ms);
            return;
        }

        match self.capture(params, unit) {
            Ok(()) => {
                self.stats.captures += 1;
                self.cursor.advance(unit.pts_ms);
                log::info!("sn@{}, write file {}", self.camera.sn, self.output_path.display());
            }
            Err(err) => {
                self.stats.failed_captures += 1;
                log::warn!(
                    "sn@{}, capture at {}ms failed: {:#}",
                    self.camera.sn,
                    unit.pts_ms,
                    err
                );
            }
        }
    }

    fn capture(&mut self, params: &ParameterSets, unit: &AccessUnit) -> Result<()> {
        let fragment = assemble(&params.sps, &params.pps, &unit.payload);

        self.capture_seq += 1;
        let prefix = format!(
            "{}_{}_{}_{}_",
            self.camera.sn,
            unix_secs(),
            self.session_id,
            self.capture_seq
        );
        let mut temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".h264")
            .tempfile_in(&self.ctx.temp_dir)
            .with_context(|| format!("create temp fragment in {}", self.ctx.temp_dir.display()))?;
        temp.write_all(&fragment)
            .and_then(|_| temp.flush())
            .context("write temp fragment")?;

        let rendered = self.ctx.renderer.render(temp.path(), &self.output_path);
        let removed = temp.close().context("remove temp fragment");
        rendered?;
        removed
    }

    fn prepare_output_dir(&self) {
        let dir = self.ctx.policy.output_dir();
        if let Err(err) = std::fs::create_dir_all(dir) {
            log::warn!(
                "sn@{}, cannot create output directory {}: {}",
                self.camera.sn,
                dir.display(),
                err
            );
        }
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
