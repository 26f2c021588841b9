//! stillframe
//!
//! Keeps live connections to RTSP cameras and writes one still image per
//! camera at a fixed cadence.
//!
//! # Architecture
//!
//! - `ingest`: stream clients yielding H.264 access units (GStreamer, synthetic)
//! - `capture`: keyframe throttle, fragment assembly, ffmpeg rendering
//! - `session`: one connection's lifecycle (Connecting, Streaming, Terminated)
//! - `supervisor`: restarts a camera's session forever with a constant backoff
//! - `fleet`: one supervisor thread per configured camera
//!
//! Sources never share state. A failing camera is retried indefinitely and
//! never takes the process or another camera down with it.

pub mod capture;
pub mod config;
pub mod fleet;
pub mod ingest;
pub mod session;
pub mod shutdown;
pub mod supervisor;

pub use capture::{assemble, should_capture, CaptureCursor, CapturePolicy, FfmpegRenderer, FrameRenderer};
pub use config::{CameraSettings, StillframeConfig};
pub use fleet::{Fleet, FleetHandle};
pub use ingest::{
    AccessUnit, ParameterSets, RtspConfig, RtspConnector, RtspSource, StreamClient, StreamConnector,
    StreamEvent, UnitKind,
};
pub use session::{CaptureContext, Session, SessionState, SessionStats};
pub use shutdown::CancelToken;
pub use supervisor::Supervisor;
