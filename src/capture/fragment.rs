//! Standalone Annex B fragment assembly.

use crate::ingest::h264::START_CODE;

/// Builds `start | sps | start | pps | start | unit`.
///
/// The renderer decodes the fragment without any prior stream context, so the
/// parameter sets must precede the picture.
pub fn assemble(sps: &[u8], pps: &[u8], unit: &[u8]) -> Vec<u8> {
    let mut fragment = Vec::with_capacity(3 * START_CODE.len() + sps.len() + pps.len() + unit.len());
    for part in [sps, pps, unit] {
        fragment.extend_from_slice(&START_CODE);
        fragment.extend_from_slice(part);
    }
    fragment
}
