//! Production RTSP client using GStreamer.
//!
//! Pipeline: rtspsrc ! rtph264depay ! h264parse ! byte-stream/au caps ! appsink.
//! `h264parse config-interval=-1` repeats SPS/PPS in front of every IDR, which
//! is where the parameter sets are read from during describe.

use anyhow::{anyhow, bail, Context, Result};
use gstreamer::prelude::*;
use std::collections::VecDeque;
use std::time::Instant;

use super::h264::{extract_parameter_sets, vcl_units};
use super::rtsp::RtspConfig;
use super::{AccessUnit, ParameterSets, StreamEvent};

pub(crate) struct GstreamerRtspSource {
    config: RtspConfig,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    pending: VecDeque<AccessUnit>,
    last_sample_at: Option<Instant>,
    unit_count: u64,
}

impl GstreamerRtspSource {
    pub(crate) fn new(config: RtspConfig) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let pipeline_description = format!(
            "rtspsrc location=\"{}\" latency=200 protocols=tcp ! rtph264depay ! \
             h264parse config-interval=-1 ! \
             video/x-h264,stream-format=byte-stream,alignment=au ! \
             appsink name=appsink sync=false max-buffers=8",
            config.url
        );
        let pipeline = gstreamer::parse::launch(&pipeline_description)
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("RTSP pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;
        appsink.set_drop(false);
        appsink.set_sync(false);

        Ok(Self {
            config,
            pipeline,
            appsink,
            pending: VecDeque::new(),
            last_sample_at: None,
            unit_count: 0,
        })
    }

    pub(crate) fn describe(&mut self) -> Result<ParameterSets> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .context("set RTSP pipeline to Playing")?;

        let deadline = Instant::now() + self.config.describe_timeout;
        while Instant::now() < deadline {
            self.poll_bus()?;
            let Some(sample) = self.pull_sample() else {
                if self.appsink.is_eos() {
                    bail!("{} closed during negotiation", self.config.url);
                }
                continue;
            };
            let Ok((data, pts_ms)) = sample_to_access_unit(&sample) else {
                continue;
            };
            // Delta frames before the first IDR cannot be decoded without
            // parameter sets; skip them.
            if let Some(params) = extract_parameter_sets(&data) {
                self.pending.extend(vcl_units(&data, pts_ms));
                self.last_sample_at = Some(Instant::now());
                log::info!("RtspSource: connected to {}", self.config.url);
                return Ok(params);
            }
        }

        bail!("no suitable H.264 track found at {}", self.config.url)
    }

    pub(crate) fn next_event(&mut self) -> Result<StreamEvent> {
        if let Some(unit) = self.pending.pop_front() {
            self.unit_count += 1;
            return Ok(StreamEvent::Unit(unit));
        }

        self.poll_bus()?;

        let Some(sample) = self.pull_sample() else {
            if self.appsink.is_eos() {
                bail!("RTSP stream reached EOS after {} units", self.unit_count);
            }
            if let Some(last) = self.last_sample_at {
                if last.elapsed() > self.config.stall_timeout {
                    bail!("RTSP stream stalled");
                }
            }
            return Ok(StreamEvent::Idle);
        };
        self.last_sample_at = Some(Instant::now());

        let (data, pts_ms) = match sample_to_access_unit(&sample) {
            Ok(unit) => unit,
            Err(err) => return Ok(StreamEvent::Malformed(err)),
        };
        self.pending.extend(vcl_units(&data, pts_ms));
        match self.pending.pop_front() {
            Some(unit) => {
                self.unit_count += 1;
                Ok(StreamEvent::Unit(unit))
            }
            None => Ok(StreamEvent::Malformed(anyhow!(
                "access unit at {}ms carries no picture data",
                pts_ms
            ))),
        }
    }

    fn pull_sample(&self) -> Option<gstreamer::Sample> {
        let timeout = gstreamer::ClockTime::from_mseconds(self.config.poll_timeout.as_millis() as u64);
        self.appsink.try_pull_sample(timeout)
    }

    fn poll_bus(&mut self) -> Result<()> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        while let Some(message) = bus.pop() {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    bail!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    );
                }
                MessageView::Eos(..) => bail!("gstreamer reached EOS"),
                _ => {}
            }
        }
        Ok(())
    }
}

impl Drop for GstreamerRtspSource {
    fn drop(&mut self) {
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("RtspSource: failed to stop pipeline for {}: {}", self.config.url, err);
        }
    }
}

fn sample_to_access_unit(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u64)> {
    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let pts_ms = buffer
        .pts()
        .map(|pts| pts.mseconds())
        .context("RTSP sample missing pts")?;
    let map = buffer.map_readable().context("map RTSP buffer")?;
    Ok((map.as_slice().to_vec(), pts_ms))
}
