use infineon_protocol::codec::{checksum, decode, encode};
use infineon_protocol::coefficients::{CoefficientSet, Quantity};
use infineon_protocol::families::{KH6XX, KT};
use infineon_protocol::protocol::{Handshake, LinkSettings};
use infineon_protocol::schema::Slot::{Literal, Param};
use infineon_protocol::schema::{Conversion, EditGroup, ParameterDescriptor as P, Schema, Slot};
use infineon_protocol::{Capabilities, ControllerError, Family, Profile, Registry};
use proptest::prelude::*;
use rstest::rstest;

static MODELS: [CoefficientSet; 3] = [
    CoefficientSet::proportional("ZX1/A", 1, 2.0, 4.0, 2.0),
    CoefficientSet::proportional("ZX1/B", 1, 4.0, 2.0, 2.0),
    CoefficientSet::proportional("ZX2", 2, 0.5, 0.5, 4.0),
];

const MODEL_DEPENDENT: &[&str] = &["ControllerModel"];

static PARAMETERS: &[P] = &[
    P::integer("ControllerModel", "Model")
        .range(1, 3)
        .default(1.0)
        .conversion(Conversion::ModelSelect),
    P::float("PhaseCurrent", "Phase current")
        .range(1, 255)
        .default(30.0)
        .depends_on(MODEL_DEPENDENT)
        .conversion(Conversion::Model(Quantity::PhaseCurrent)),
    P::float("BatteryCurrent", "Battery current")
        .range(1, 255)
        .default(12.5)
        .depends_on(MODEL_DEPENDENT)
        .conversion(Conversion::Model(Quantity::BatteryCurrent)),
    P::float("LowVoltage", "Low voltage")
        .range(1, 255)
        .default(36.0)
        .depends_on(MODEL_DEPENDENT)
        .conversion(Conversion::Model(Quantity::Voltage)),
    P::float("BlockTime", "Block time")
        .range(0, 100)
        .default(1.5)
        .conversion(Conversion::Scale(10.0)),
    P::integer("Speed", "Speed")
        .range(0, 128)
        .default(100.0)
        .conversion(Conversion::Scale(0.5)),
    P::integer("Mode", "Mode").choices(&["Off", "On", "Auto"]).default(2.0),
    P::integer("Pulses", "Pulses").range(3, 255).default(7.0),
];

static ORDER: [Slot; 22] = [
    Literal(2),
    Literal(15),
    Param("ControllerModel"),
    Param("PhaseCurrent"),
    Param("BatteryCurrent"),
    Param("LowVoltage"),
    Param("BlockTime"),
    Param("Speed"),
    Param("Mode"),
    Param("Pulses"),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
];

fn detect(lines: &[&str]) -> bool {
    lines.first().is_some_and(|l| l.contains(":ZX"))
}

static TEST22: Family = Family {
    name: "Test22",
    schema: Schema {
        parameters: PARAMETERS,
        load_order: &ORDER,
        raw_order: &ORDER,
        edit_order: &[EditGroup {
            title: "",
            parameters: &["ControllerModel", "PhaseCurrent", "Mode"],
        }],
    },
    models: &MODELS,
    capabilities: Capabilities::DOWNLOAD,
    link: LinkSettings::STANDARD,
    handshake: Handshake::STANDARD,
    detect,
};

#[rstest]
fn default_profile_survives_encode_decode() {
    let profile = Profile::new(&TEST22);
    let frame = encode(&profile).unwrap();

    assert_eq!(frame.len(), 23);
    assert_eq!(checksum(&frame), 0);
    assert_eq!(&frame[..10], &[2, 15, 1, 60, 50, 72, 15, 50, 2, 7]);

    let decoded = decode(&TEST22, &frame, None).unwrap();
    assert_eq!(decoded, profile);
}

// Defaults off the raw grid still compare equal after a trip through the frame
#[rstest]
#[case::kh6xx(&KH6XX)]
#[case::kt(&KT)]
fn builtin_defaults_survive_encode_decode(#[case] family: &'static Family) {
    let profile = Profile::new(family);
    let decoded = decode(family, &encode(&profile).unwrap(), None).unwrap();
    assert_eq!(decoded, profile);
}

#[rstest]
#[case::first(None, "ZX1/A")]
#[case::narrowed(Some("*/B"), "ZX1/B")]
fn shared_model_id_is_narrowed_by_pattern(#[case] pattern: Option<&str>, #[case] expected: &str) {
    let mut profile = Profile::new(&TEST22);
    profile.set_parameter("ControllerModel", 2.0).unwrap();
    let frame = encode(&profile).unwrap();
    assert_eq!(frame[2], 1);

    let decoded = decode(&TEST22, &frame, pattern).unwrap();
    assert_eq!(decoded.model_name(), expected);
}

#[rstest]
fn download_groups_for_shared_ids() {
    let mut registry = Registry::new();
    registry.register(&TEST22).unwrap();
    let groups = registry.download_groups();

    let offered: Vec<_> = groups.iter().map(|g| (g.label.as_str(), g.pattern.as_deref())).collect();
    assert_eq!(offered, [("Test22, */A", Some("*/A")), ("Test22, */B", Some("*/B"))]);
}

#[rstest]
fn model_change_can_make_values_unencodable() {
    let mut profile = Profile::new(&TEST22);
    profile.set_parameter("PhaseCurrent", 100.0).unwrap();
    // 100 A needs 400 raw with the ZX1/B shunt
    profile.set_parameter("ControllerModel", 2.0).unwrap();
    assert!(matches!(
        encode(&profile),
        Err(ControllerError::OutOfRange { ref name, .. }) if name == "PhaseCurrent"
    ));
}

fn kh6xx_frame() -> impl Strategy<Value = Vec<u8>> {
    let slots = KH6XX.schema.raw_order.len();
    (1u8..=5, prop::collection::vec(any::<u8>(), slots), 0u8..16).prop_map(|(model, bytes, flags)| {
        let mut frame: Vec<u8> = KH6XX
            .schema
            .raw_order
            .iter()
            .zip(bytes)
            .map(|(slot, byte)| match *slot {
                Literal(value) => value,
                Param("ControllerModel") => model,
                Param("BitFlags") => flags << 4,
                Param(_) => byte,
            })
            .collect();
        frame.push(checksum(&frame));
        frame
    })
}

proptest! {
    #[test]
    fn kh6xx_frames_survive_decode_encode(frame in kh6xx_frame()) {
        let profile = decode(&KH6XX, &frame, None).unwrap();
        prop_assert_eq!(encode(&profile).unwrap(), frame);
    }

    #[test]
    fn single_byte_corruption_is_detected(
        frame in kh6xx_frame(),
        index in 0usize..63,
        delta in 1u8..=255,
    ) {
        let mut corrupted = frame;
        corrupted[index] ^= delta;
        prop_assert!(matches!(
            decode(&KH6XX, &corrupted, None),
            Err(ControllerError::ChecksumMismatch)
        ));
    }
}
