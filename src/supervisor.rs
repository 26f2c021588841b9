//! Keeps one source's session alive forever.
//!
//! loop { new session; run to termination; log the error; sleep backoff }.
//! The backoff is constant and there is no retry limit. Only cancellation
//! stops the loop.

use anyhow::{anyhow, Context, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::CameraSettings;
use crate::session::{CaptureContext, Session};
use crate::shutdown::CancelToken;

pub const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_secs(1);

pub struct Supervisor {
    camera: CameraSettings,
    ctx: CaptureContext,
    backoff: Duration,
}

impl Supervisor {
    pub fn new(camera: CameraSettings, ctx: CaptureContext) -> Self {
        Self {
            camera,
            ctx,
            backoff: DEFAULT_RESTART_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn sn(&self) -> &str {
        &self.camera.sn
    }

    /// Runs sessions back to back until cancelled. Returns how many ran.
    pub fn run(&self, cancel: &CancelToken) -> u64 {
        log::info!("run sn@{}, url@{}", self.camera.sn, self.camera.url);
        let mut sessions = 0u64;
        while !cancel.is_cancelled() {
            sessions += 1;
            match self.run_session(cancel) {
                Some(err) => log::warn!("sn@{}, err@{:#}", self.camera.sn, err),
                None => break,
            }
            if cancel.sleep(self.backoff) {
                break;
            }
        }
        log::info!("sn@{}, stopped after {} sessions", self.camera.sn, sessions);
        sessions
    }

    /// One session to completion. `None` means it was cancelled.
    fn run_session(&self, cancel: &CancelToken) -> Option<anyhow::Error> {
        let mut session = Session::new(self.camera.clone(), self.ctx.clone());
        match catch_unwind(AssertUnwindSafe(|| session.run(cancel))) {
            Ok(()) => session.into_terminal_error(),
            Err(_) => Some(anyhow!("session panicked")),
        }
    }

    /// Runs the supervisor on its own named thread.
    pub fn spawn(self, cancel: CancelToken) -> Result<JoinHandle<u64>> {
        let name = format!("sn-{}", self.camera.sn);
        std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || self.run(&cancel))
            .with_context(|| format!("spawn supervisor thread {}", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CapturePolicy, FrameRenderer};
    use crate::ingest::{ParameterSets, StreamClient, StreamConnector, StreamEvent};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    struct NoopRenderer;

    impl FrameRenderer for NoopRenderer {
        fn render(&self, _fragment: &Path, _output: &Path) -> Result<()> {
            Ok(())
        }
    }

    /// Tracks how many clients are alive at once.
    #[derive(Default)]
    struct Liveness {
        live: AtomicUsize,
        peak: AtomicUsize,
    }

    struct DroppingClient {
        liveness: Arc<Liveness>,
    }

    impl StreamClient for DroppingClient {
        fn describe(&mut self) -> Result<ParameterSets> {
            Ok(ParameterSets {
                sps: vec![0x67],
                pps: vec![0x68],
            })
        }

        fn next_event(&mut self) -> Result<StreamEvent> {
            Err(anyhow!("connection reset by peer"))
        }
    }

    impl Drop for DroppingClient {
        fn drop(&mut self) {
            self.liveness.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Hands out clients that drop immediately; cancels after `limit` connects.
    struct CountingConnector {
        connects: Mutex<Vec<Instant>>,
        limit: usize,
        cancel: CancelToken,
        liveness: Arc<Liveness>,
    }

    impl StreamConnector for CountingConnector {
        fn connect(&self, _url: &str) -> Result<Box<dyn StreamClient>> {
            let mut connects = self.connects.lock().expect("connects lock");
            connects.push(Instant::now());
            if connects.len() >= self.limit {
                self.cancel.cancel();
            }
            let live = self.liveness.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.liveness.peak.fetch_max(live, Ordering::SeqCst);
            Ok(Box::new(DroppingClient {
                liveness: self.liveness.clone(),
            }))
        }
    }

    fn supervisor(connector: Arc<CountingConnector>, backoff: Duration) -> Result<(Supervisor, tempfile::TempDir)> {
        let dir = tempfile::tempdir()?;
        let policy = CapturePolicy {
            output_template: dir.path().join("cam-sn.png"),
            interval_secs: 3,
        };
        let ctx = CaptureContext::new(Arc::new(policy), Arc::new(NoopRenderer), connector);
        let camera = CameraSettings {
            sn: "cam1".to_string(),
            url: "stub://cam1".to_string(),
        };
        Ok((Supervisor::new(camera, ctx).with_backoff(backoff), dir))
    }

    #[test]
    fn restarts_after_each_termination_with_backoff() -> Result<()> {
        let cancel = CancelToken::new();
        let liveness = Arc::new(Liveness::default());
        let connector = Arc::new(CountingConnector {
            connects: Mutex::new(Vec::new()),
            limit: 4,
            cancel: cancel.clone(),
            liveness: liveness.clone(),
        });
        let backoff = Duration::from_millis(25);
        let (supervisor, _dir) = supervisor(connector.clone(), backoff)?;

        let sessions = supervisor.run(&cancel);

        // The fourth session sees the cancel before describing and ends cleanly.
        assert_eq!(sessions, 4);
        let connects = connector.connects.lock().expect("connects lock");
        assert_eq!(connects.len(), 4);
        for pair in connects.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= backoff);
        }
        assert_eq!(liveness.peak.load(Ordering::SeqCst), 1);
        assert_eq!(liveness.live.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn cancel_interrupts_backoff() -> Result<()> {
        let cancel = CancelToken::new();
        let connector = Arc::new(CountingConnector {
            connects: Mutex::new(Vec::new()),
            limit: usize::MAX,
            cancel: cancel.clone(),
            liveness: Arc::new(Liveness::default()),
        });
        let (supervisor, _dir) = supervisor(connector.clone(), Duration::from_secs(60))?;

        let handle = supervisor.spawn(cancel.clone())?;
        std::thread::sleep(Duration::from_millis(50));
        cancel.cancel();
        let sessions = handle.join().map_err(|_| anyhow!("supervisor thread panicked"))?;

        assert_eq!(sessions, 1);
        assert_eq!(connector.connects.lock().expect("connects lock").len(), 1);
        Ok(())
    }

    #[test]
    fn cancelled_before_start_runs_nothing() -> Result<()> {
        let cancel = CancelToken::new();
        cancel.cancel();
        let connector = Arc::new(CountingConnector {
            connects: Mutex::new(Vec::new()),
            limit: usize::MAX,
            cancel: cancel.clone(),
            liveness: Arc::new(Liveness::default()),
        });
        let (supervisor, _dir) = supervisor(connector.clone(), Duration::from_millis(1))?;
        assert_eq!(supervisor.run(&cancel), 0);
        assert!(connector.connects.lock().expect("connects lock").is_empty());
        Ok(())
    }
}
