//! H.264 bitstream helpers.
//!
//! Only what the capture path needs: NAL type classification, Annex B
//! splitting, and parameter-set extraction from an access unit.

use super::{AccessUnit, ParameterSets, UnitKind};

/// 4-byte Annex B start code.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

pub const NAL_SLICE: u8 = 1;
pub const NAL_IDR: u8 = 5;
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;

/// NAL unit type from the first header byte.
pub fn nal_type(nal: &[u8]) -> Option<u8> {
    nal.first().map(|header| header & 0x1f)
}

/// Video coding layer NAL units carry picture data (types 1..=5).
pub fn is_vcl(nal_type: u8) -> bool {
    (NAL_SLICE..=NAL_IDR).contains(&nal_type)
}

pub fn unit_kind(nal_type: u8) -> UnitKind {
    if nal_type == NAL_IDR {
        UnitKind::Keyframe
    } else {
        UnitKind::Other
    }
}

/// Iterator over the NAL units of an Annex B byte stream.
///
/// Accepts both 3- and 4-byte start codes. Yielded slices exclude the start
/// code; trailing zero bytes belonging to the next start code are trimmed.
pub struct AnnexBNalIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AnnexBNalIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let pos = find_start_code(data, 0).map_or(data.len(), |(_, end)| end);
        Self { data, pos }
    }
}

impl<'a> Iterator for AnnexBNalIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.data.len() {
            let start = self.pos;
            let (end, next) = match find_start_code(self.data, start) {
                Some((sc_start, sc_end)) => (sc_start, sc_end),
                None => (self.data.len(), self.data.len()),
            };
            self.pos = next;
            let mut nal = &self.data[start..end];
            while let Some((&0, rest)) = nal.split_last() {
                nal = rest;
            }
            if !nal.is_empty() {
                return Some(nal);
            }
        }
        None
    }
}

/// Finds the next start code at or after `from`; returns (start, end) offsets.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                return Some((i, i + 3));
            }
            if data[i + 2] == 0 && i + 4 <= data.len() && data[i + 3] == 1 {
                return Some((i, i + 4));
            }
        }
        i += 1;
    }
    None
}

/// Pulls the first SPS and PPS out of an Annex B access unit.
pub fn extract_parameter_sets(access_unit: &[u8]) -> Option<ParameterSets> {
    let mut sps = None;
    let mut pps = None;
    for nal in AnnexBNalIter::new(access_unit) {
        match nal_type(nal) {
            Some(NAL_SPS) if sps.is_none() => sps = Some(nal.to_vec()),
            Some(NAL_PPS) if pps.is_none() => pps = Some(nal.to_vec()),
            _ => {}
        }
    }
    Some(ParameterSets {
        sps: sps?,
        pps: pps?,
    })
}

/// Splits an Annex B access unit into its picture-carrying NAL units.
///
/// Parameter sets, SEI and delimiters are dropped; every unit shares `pts_ms`.
pub fn vcl_units(access_unit: &[u8], pts_ms: u64) -> Vec<AccessUnit> {
    AnnexBNalIter::new(access_unit)
        .filter_map(|nal| {
            let kind = nal_type(nal).filter(|t| is_vcl(*t)).map(unit_kind)?;
            Some(AccessUnit {
                payload: nal.to_vec(),
                kind,
                pts_ms,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_mixed_start_codes() {
        let stream = [
            0, 0, 0, 1, 0x67, 0xaa, // SPS, 4-byte start code
            0, 0, 1, 0x68, 0xbb, // PPS, 3-byte start code
            0, 0, 0, 1, 0x65, 0x01, 0x02, // IDR
        ];
        let nals: Vec<&[u8]> = AnnexBNalIter::new(&stream).collect();
        let expected: Vec<&[u8]> = vec![&[0x67u8, 0xaa][..], &[0x68u8, 0xbb][..], &[0x65u8, 0x01, 0x02][..]];
        assert_eq!(nals, expected);
    }

    #[test]
    fn classifies_nal_types() {
        assert_eq!(nal_type(&[0x65]), Some(NAL_IDR));
        assert_eq!(nal_type(&[0x41]), Some(NAL_SLICE));
        assert_eq!(nal_type(&[]), None);
        assert!(is_vcl(NAL_IDR));
        assert!(!is_vcl(NAL_SPS));
        assert!(!is_vcl(NAL_AUD));
        assert_eq!(unit_kind(NAL_IDR), UnitKind::Keyframe);
        assert_eq!(unit_kind(NAL_SLICE), UnitKind::Other);
    }

    #[test]
    fn extracts_parameter_sets_from_idr_access_unit() {
        let au = [
            0, 0, 0, 1, 0x09, 0xf0, // AUD
            0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1e, // SPS
            0, 0, 0, 1, 0x68, 0xce, 0x3c, 0x80, // PPS
            0, 0, 0, 1, 0x65, 0x88, 0x84, // IDR
        ];
        let params = extract_parameter_sets(&au).expect("parameter sets");
        assert_eq!(params.sps, vec![0x67, 0x42, 0x00, 0x1e]);
        assert_eq!(params.pps, vec![0x68, 0xce, 0x3c, 0x80]);
    }

    #[test]
    fn missing_pps_yields_none() {
        let au = [0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x65, 0x88];
        assert!(extract_parameter_sets(&au).is_none());
    }

    #[test]
    fn vcl_units_skip_non_picture_nals() {
        let au = [
            0, 0, 0, 1, 0x09, 0xf0, // AUD
            0, 0, 0, 1, 0x06, 0x05, 0x01, // SEI
            0, 0, 0, 1, 0x67, 0x42, // SPS
            0, 0, 0, 1, 0x68, 0xce, // PPS
            0, 0, 0, 1, 0x65, 0x88, 0x84, // IDR slice 1
            0, 0, 0, 1, 0x65, 0x88, 0x85, // IDR slice 2
        ];
        let units = vcl_units(&au, 4200);
        assert_eq!(units.len(), 2);
        assert!(units.iter().all(|unit| unit.kind == UnitKind::Keyframe));
        assert!(units.iter().all(|unit| unit.pts_ms == 4200));
        assert_eq!(units[0].payload, vec![0x65, 0x88, 0x84]);

        let delta = [0, 0, 0, 1, 0x41, 0x9a, 0x10];
        let units = vcl_units(&delta, 4240);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].kind, UnitKind::Other);
    }
}
