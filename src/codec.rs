//! Binary frames exchanged with the controller.
//!
//! A frame is one byte per raw order slot followed by a checksum byte that
//! makes the XOR of the whole frame zero.

use crate::constants::MODEL_PARAMETER;
use crate::error::{ControllerError, Result};
use crate::profile::Profile;
use crate::registry::Family;
use crate::schema::Slot;
use log::{debug, trace};

/// XOR of all bytes.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Build the upload frame for a profile.
///
/// Fails with [`ControllerError::OutOfRange`] if a value does not fit a byte
/// under the active model.
pub fn encode(profile: &Profile) -> Result<Vec<u8>> {
    let schema = profile.family().schema;
    let mut frame = Vec::with_capacity(schema.frame_len());

    for slot in schema.raw_order {
        let byte = match *slot {
            Slot::Literal(value) => value,
            Slot::Param(name) => profile.raw_byte(schema.require(name)?)?,
        };
        frame.push(byte);
    }

    if let Some(quirk) = profile.controller()?.quirk {
        if let Some(byte) = frame.get_mut(quirk.offset) {
            trace!("Forcing byte {} to {} for {}", quirk.offset, quirk.value, profile.model_name());
            *byte = quirk.value;
        }
    }

    frame.push(checksum(&frame));
    Ok(frame)
}

/// Rebuild a profile from a received frame.
///
/// Bytes past the frame length are ignored. The model is looked up by the
/// model byte when the family transmits one, narrowed by `pattern` when
/// several models share it.
pub fn decode(family: &'static Family, data: &[u8], pattern: Option<&str>) -> Result<Profile> {
    let schema = family.schema;
    let frame_len = schema.frame_len();
    if data.len() < frame_len {
        return Err(ControllerError::FrameLength {
            expected: frame_len,
            actual: data.len(),
        });
    }
    if data.len() > frame_len {
        debug!("Ignoring {} trailing bytes", data.len() - frame_len);
    }
    let frame = &data[..frame_len];
    if checksum(frame) != 0 {
        return Err(ControllerError::ChecksumMismatch);
    }

    let model_id = schema.model_slot().map(|slot| frame[slot]);
    let (selection, model) = family.find_model(model_id, pattern)?;
    debug!("Decoding {} frame for {}", family.name, model.name);

    let mut profile = Profile::new(family);
    profile.set_parameter(MODEL_PARAMETER, selection as f64)?;

    for (slot, &byte) in schema.raw_order.iter().zip(frame) {
        let Slot::Param(name) = *slot else {
            continue;
        };
        if name == MODEL_PARAMETER {
            continue;
        }
        let desc = schema.require(name)?;
        let value = desc.conversion.from_raw(f64::from(byte), family.models, model);
        profile.store(desc, value);
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::{EB2XX, KH6XX, KT};

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x02, 0x0F]), 0x0D);
        assert_eq!(checksum(&[0xAA, 0xAA]), 0);
    }

    #[test]
    fn test_encode_default_kh6xx() {
        let frame = encode(&Profile::new(&KH6XX)).unwrap();
        assert_eq!(frame.len(), 64);
        assert_eq!(&frame[..2], &[2, 15]);
        // 30 A * 2.85, 14 A * 5.10
        assert_eq!(frame[2], 86);
        assert_eq!(frame[3], 71);
        // model id of KH606
        assert_eq!(frame[24], 1);
        // Angle120 and EBSEnable in wire bit order
        assert_eq!(frame[31], 0xC0);
        assert_eq!(checksum(&frame), 0);
    }

    #[test]
    fn test_lyen_quirk() {
        let mut profile = Profile::new(&EB2XX);
        profile.set_parameter("ControllerModel", 7.0).unwrap();
        let frame = encode(&profile).unwrap();
        assert_eq!(frame.len(), 32);
        assert_eq!(frame[23], 80);
        assert_eq!(checksum(&frame), 0);

        profile.set_parameter("ControllerModel", 6.0).unwrap();
        assert_eq!(encode(&profile).unwrap()[23], 0);
    }

    #[test]
    fn test_encode_out_of_range() {
        let mut profile = Profile::new(&EB2XX);
        // 30 A is below the EB215/Lyen offset
        profile.set_parameter("ControllerModel", 9.0).unwrap();
        assert!(matches!(
            encode(&profile),
            Err(ControllerError::OutOfRange { ref name, min: 0, max: 255, .. }) if name == "PhaseCurrent"
        ));
    }

    #[test]
    fn test_decode_reencodes() {
        let mut profile = Profile::new(&KH6XX);
        profile.set_parameter("ControllerModel", 4.0).unwrap();
        profile.set_parameter("SoftStartEnable", 1.0).unwrap();
        let frame = encode(&profile).unwrap();

        let decoded = decode(&KH6XX, &frame, None).unwrap();
        assert_eq!(decoded.model_name(), "KH615");
        assert_eq!(decoded.get_parameter("SoftStartEnable").unwrap(), 1.0);
        assert_eq!(encode(&decoded).unwrap(), frame);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut data = encode(&Profile::new(&KT)).unwrap();
        data.extend_from_slice(&[0xFF, 0x00, 0x13]);
        let profile = decode(&KT, &data, None).unwrap();
        assert_eq!(profile.raw_value("PhaseCurrent").unwrap(), 90);
    }

    #[test]
    fn test_decode_errors() {
        let frame = encode(&Profile::new(&KT)).unwrap();
        assert!(matches!(
            decode(&KT, &frame[..3], None),
            Err(ControllerError::FrameLength { expected: 4, actual: 3 })
        ));

        let mut broken = frame.clone();
        broken[1] ^= 0x01;
        assert!(matches!(decode(&KT, &broken, None), Err(ControllerError::ChecksumMismatch)));

        let mut unknown = frame;
        unknown[0] = 7;
        unknown[3] = checksum(&unknown[..3]);
        assert!(matches!(
            decode(&KT, &unknown, None),
            Err(ControllerError::UnknownModel { model_id: Some(7), pattern: None })
        ));
    }

    #[test]
    fn test_decode_without_model_slot_uses_pattern() {
        let mut profile = Profile::new(&EB2XX);
        profile.set_parameter("ControllerModel", 3.0).unwrap();
        let frame = encode(&profile).unwrap();

        assert_eq!(decode(&EB2XX, &frame, None).unwrap().model_name(), "EB206");
        assert_eq!(decode(&EB2XX, &frame, Some("EB212")).unwrap().model_name(), "EB212");
    }
}
