//! RTSP stream client.
//!
//! `RtspSource` connects to an IP camera and yields H.264 access units.
//!
//! The RTSP source is responsible for:
//! - Negotiating the session and locating the single H.264 track
//! - Extracting SPS/PPS before streaming begins
//! - Splitting access units into VCL NAL units tagged keyframe / other
//! - Reporting connection loss as a terminal error
//!
//! `stub://` URLs select a synthetic source for tests. Options ride in the
//! query string: `frames=N` ends the stream after N units, `gop=N` sets the
//! keyframe spacing, `fps=N` the frame rate, `reject` fails negotiation and
//! `realtime=0` disables pacing.

use anyhow::{anyhow, bail, Context, Result};
use std::time::Duration;

use super::h264::{NAL_IDR, NAL_PPS, NAL_SLICE, NAL_SPS};
#[cfg(feature = "rtsp-gstreamer")]
use super::rtsp_gstreamer::GstreamerRtspSource;
use super::{AccessUnit, ParameterSets, StreamClient, StreamEvent, UnitKind};

/// Configuration for an RTSP source.
#[derive(Clone, Debug)]
pub struct RtspConfig {
    /// RTSP URL (e.g., "rtsp://192.168.1.100:554/stream")
    pub url: String,
    /// How long one `next_event` call may block before reporting `Idle`.
    pub poll_timeout: Duration,
    /// How long negotiation may take before the source is declared unusable.
    pub describe_timeout: Duration,
    /// A connection silent for this long is treated as dropped.
    pub stall_timeout: Duration,
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            url: "rtsp://localhost:554/stream".to_string(),
            poll_timeout: Duration::from_millis(500),
            describe_timeout: Duration::from_secs(10),
            stall_timeout: Duration::from_secs(10),
        }
    }
}

/// RTSP stream client.
///
/// Uses GStreamer for real RTSP, with a synthetic fallback for `stub://` URLs.
pub struct RtspSource {
    backend: RtspBackend,
}

enum RtspBackend {
    Synthetic(SyntheticRtspSource),
    #[cfg(feature = "rtsp-gstreamer")]
    Gstreamer(GstreamerRtspSource),
}

impl RtspSource {
    pub fn new(config: RtspConfig) -> Result<Self> {
        if config.url.starts_with("stub://") {
            Ok(Self {
                backend: RtspBackend::Synthetic(SyntheticRtspSource::new(config)?),
            })
        } else if config.url.starts_with("rtsp://") || config.url.starts_with("rtsps://") {
            #[cfg(feature = "rtsp-gstreamer")]
            {
                Ok(Self {
                    backend: RtspBackend::Gstreamer(GstreamerRtspSource::new(config)?),
                })
            }
            #[cfg(not(feature = "rtsp-gstreamer"))]
            {
                bail!("RTSP requires the rtsp-gstreamer feature")
            }
        } else {
            bail!("unsupported stream url '{}'", config.url)
        }
    }
}

impl StreamClient for RtspSource {
    fn describe(&mut self) -> Result<ParameterSets> {
        match &mut self.backend {
            RtspBackend::Synthetic(source) => source.describe(),
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.describe(),
        }
    }

    fn next_event(&mut self) -> Result<StreamEvent> {
        match &mut self.backend {
            RtspBackend::Synthetic(source) => source.next_event(),
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.next_event(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

const SYNTHETIC_SPS: [u8; 10] = [NAL_SPS | 0x60, 0x42, 0xc0, 0x1e, 0xda, 0x02, 0x80, 0xbf, 0xe5, 0x84];
const SYNTHETIC_PPS: [u8; 4] = [NAL_PPS | 0x60, 0xce, 0x3c, 0x80];

#[derive(Clone, Debug, PartialEq, Eq)]
struct SyntheticOptions {
    max_units: Option<u64>,
    gop: u64,
    fps: u64,
    reject: bool,
    realtime: bool,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            max_units: None,
            gop: 25,
            fps: 25,
            reject: false,
            realtime: true,
        }
    }
}

impl SyntheticOptions {
    fn parse(url: &str) -> Result<Self> {
        let mut options = Self::default();
        let Some((_, query)) = url.split_once('?') else {
            return Ok(options);
        };
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let number = || -> Result<u64> {
                value
                    .parse()
                    .with_context(|| format!("stub option '{}' needs an integer", key))
            };
            match key {
                "frames" => options.max_units = Some(number()?),
                "gop" => options.gop = number()?.max(1),
                "fps" => options.fps = number()?.max(1),
                "reject" => options.reject = true,
                "realtime" => options.realtime = value != "0",
                other => bail!("unknown stub option '{}'", other),
            }
        }
        Ok(options)
    }
}

struct SyntheticRtspSource {
    config: RtspConfig,
    options: SyntheticOptions,
    unit_count: u64,
    described: bool,
}

impl SyntheticRtspSource {
    fn new(config: RtspConfig) -> Result<Self> {
        let options = SyntheticOptions::parse(&config.url)?;
        Ok(Self {
            config,
            options,
            unit_count: 0,
            described: false,
        })
    }

    fn describe(&mut self) -> Result<ParameterSets> {
        if self.options.reject {
            bail!("{} rejected negotiation (synthetic)", self.config.url);
        }
        self.described = true;
        log::info!("RtspSource: connected to {} (synthetic)", self.config.url);
        Ok(ParameterSets {
            sps: SYNTHETIC_SPS.to_vec(),
            pps: SYNTHETIC_PPS.to_vec(),
        })
    }

    fn next_event(&mut self) -> Result<StreamEvent> {
        if !self.described {
            return Err(anyhow!("stream polled before describe"));
        }
        if let Some(max) = self.options.max_units {
            if self.unit_count >= max {
                bail!("synthetic stream ended after {} units", max);
            }
        }

        let frame_ms = 1000 / self.options.fps;
        if self.options.realtime {
            std::thread::sleep(Duration::from_millis(frame_ms).min(self.config.poll_timeout));
        }

        let index = self.unit_count;
        self.unit_count += 1;

        let (kind, header) = if index % self.options.gop == 0 {
            (UnitKind::Keyframe, NAL_IDR | 0x60)
        } else {
            (UnitKind::Other, NAL_SLICE | 0x40)
        };
        let mut payload = vec![header, 0x88, 0x84];
        payload.extend_from_slice(&index.to_be_bytes());

        Ok(StreamEvent::Unit(AccessUnit {
            payload,
            kind,
            pts_ms: index * frame_ms,
        }))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(url: &str) -> RtspConfig {
        RtspConfig {
            url: url.to_string(),
            ..RtspConfig::default()
        }
    }

    fn next_unit(source: &mut RtspSource) -> Result<AccessUnit> {
        match source.next_event()? {
            StreamEvent::Unit(unit) => Ok(unit),
            other => Err(anyhow!("expected unit, got {:?}", other)),
        }
    }

    #[test]
    fn stub_source_describes_h264_track() -> Result<()> {
        let mut source = RtspSource::new(stub_config("stub://front?realtime=0"))?;
        let params = source.describe()?;
        assert_eq!(params.sps[0] & 0x1f, NAL_SPS);
        assert_eq!(params.pps[0] & 0x1f, NAL_PPS);
        Ok(())
    }

    #[test]
    fn stub_source_emits_keyframes_on_gop_boundaries() -> Result<()> {
        let mut source = RtspSource::new(stub_config("stub://front?gop=3&fps=10&realtime=0"))?;
        source.describe()?;

        let units: Vec<AccessUnit> = (0..6).map(|_| next_unit(&mut source)).collect::<Result<_>>()?;
        let kinds: Vec<UnitKind> = units.iter().map(|unit| unit.kind).collect();
        assert_eq!(
            kinds,
            vec![
                UnitKind::Keyframe,
                UnitKind::Other,
                UnitKind::Other,
                UnitKind::Keyframe,
                UnitKind::Other,
                UnitKind::Other,
            ]
        );
        let pts: Vec<u64> = units.iter().map(|unit| unit.pts_ms).collect();
        assert_eq!(pts, vec![0, 100, 200, 300, 400, 500]);
        Ok(())
    }

    #[test]
    fn stub_source_ends_after_frame_budget() -> Result<()> {
        let mut source = RtspSource::new(stub_config("stub://front?frames=2&realtime=0"))?;
        source.describe()?;
        next_unit(&mut source)?;
        next_unit(&mut source)?;
        assert!(source.next_event().is_err());
        Ok(())
    }

    #[test]
    fn stub_source_can_reject_negotiation() -> Result<()> {
        let mut source = RtspSource::new(stub_config("stub://front?reject"))?;
        assert!(source.describe().is_err());
        Ok(())
    }

    #[test]
    fn rejects_unknown_schemes_and_options() {
        assert!(RtspSource::new(stub_config("http://camera/stream")).is_err());
        assert!(RtspSource::new(stub_config("stub://front?bogus=1")).is_err());
        assert!(RtspSource::new(stub_config("stub://front?gop=x")).is_err());
    }
}
