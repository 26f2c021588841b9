//! Starts one supervisor per configured camera.
//!
//! Supervisors run on their own threads with no coordination between them.
//! Nothing is drained on shutdown: cancelling the fleet stops the loops at
//! their next poll or backoff, and a capture in flight may finish or be
//! abandoned when the process exits.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::capture::FfmpegRenderer;
use crate::config::StillframeConfig;
use crate::ingest::RtspConnector;
use crate::session::CaptureContext;
use crate::shutdown::CancelToken;
use crate::supervisor::Supervisor;

pub struct Fleet {
    config: Arc<StillframeConfig>,
    ctx: CaptureContext,
}

impl Fleet {
    /// Fleet wired to RTSP sources and the configured ffmpeg binary.
    pub fn new(config: Arc<StillframeConfig>) -> Self {
        let ctx = CaptureContext::new(
            Arc::new(config.capture_policy()),
            Arc::new(FfmpegRenderer::new(config.ffmpeg.clone())),
            Arc::new(RtspConnector),
        );
        Self::with_context(config, ctx)
    }

    pub fn with_context(config: Arc<StillframeConfig>, ctx: CaptureContext) -> Self {
        Self { config, ctx }
    }

    pub fn start(&self, cancel: &CancelToken) -> Result<FleetHandle> {
        let mut supervisors = Vec::with_capacity(self.config.cameras.len());
        for camera in &self.config.cameras {
            let supervisor = Supervisor::new(camera.clone(), self.ctx.clone())
                .with_backoff(self.config.restart_backoff);
            let sn = supervisor.sn().to_string();
            match supervisor.spawn(cancel.clone()) {
                Ok(join) => supervisors.push((sn, join)),
                Err(err) => {
                    cancel.cancel();
                    return Err(err);
                }
            }
        }
        log::info!("fleet started: {} cameras", supervisors.len());
        Ok(FleetHandle {
            cancel: cancel.clone(),
            supervisors,
        })
    }
}

pub struct FleetHandle {
    cancel: CancelToken,
    supervisors: Vec<(String, JoinHandle<u64>)>,
}

impl FleetHandle {
    pub fn len(&self) -> usize {
        self.supervisors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supervisors.is_empty()
    }

    /// Signals every supervisor without waiting for them.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels and joins every supervisor, returning sessions run per camera.
    pub fn stop(self) -> Result<Vec<(String, u64)>> {
        self.cancel.cancel();
        self.supervisors
            .into_iter()
            .map(|(sn, join)| {
                join.join()
                    .map(|sessions| (sn.clone(), sessions))
                    .map_err(|_| anyhow!("supervisor thread for sn@{} panicked", sn))
            })
            .collect()
    }
}
