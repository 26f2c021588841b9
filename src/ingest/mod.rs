//! Stream ingestion.
//!
//! A `StreamClient` wraps one live connection to a source. It negotiates the
//! session, locates the single H.264 track and its parameter sets, then yields
//! access units one at a time in source order.
//!
//! Backends:
//! - `stub://` synthetic stream (always available, used by tests and dry runs)
//! - `rtsp://` / `rtsps://` via GStreamer (feature: rtsp-gstreamer)
//!
//! A client owns its connection. Dropping it releases the connection, so a
//! session that exits for any reason never leaks the underlying pipeline.

use anyhow::Result;

pub mod h264;
pub mod rtsp;
#[cfg(feature = "rtsp-gstreamer")]
pub(crate) mod rtsp_gstreamer;

pub use rtsp::{RtspConfig, RtspSource};

/// Picture type of an access unit, as far as capture cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitKind {
    /// Decodable without prior units (H.264 IDR).
    Keyframe,
    Other,
}

/// One unit of coded video handed out by a stream client.
#[derive(Clone, Debug)]
pub struct AccessUnit {
    /// NAL unit bytes without a start code.
    pub payload: Vec<u8>,
    pub kind: UnitKind,
    /// Presentation timestamp in milliseconds.
    pub pts_ms: u64,
}

/// Codec parameter sets needed to decode a standalone keyframe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterSets {
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
}

/// Result of one poll on a streaming connection.
#[derive(Debug)]
pub enum StreamEvent {
    Unit(AccessUnit),
    /// A unit arrived but could not be used. The connection is still healthy.
    Malformed(anyhow::Error),
    /// Nothing arrived within the poll window.
    Idle,
}

/// Pull interface over one live connection.
///
/// `Err` from either method is terminal for the connection.
pub trait StreamClient: Send {
    /// Negotiate with the source and locate the H.264 track.
    fn describe(&mut self) -> Result<ParameterSets>;

    /// Wait up to one poll window for the next unit.
    fn next_event(&mut self) -> Result<StreamEvent>;
}

/// Opens a stream client for a source URL.
pub trait StreamConnector: Send + Sync {
    fn connect(&self, url: &str) -> Result<Box<dyn StreamClient>>;
}

/// Connector used by the daemon: picks the backend from the URL scheme.
#[derive(Clone, Debug, Default)]
pub struct RtspConnector;

impl StreamConnector for RtspConnector {
    fn connect(&self, url: &str) -> Result<Box<dyn StreamClient>> {
        let source = RtspSource::new(RtspConfig {
            url: url.to_string(),
            ..RtspConfig::default()
        })?;
        Ok(Box::new(source))
    }
}
