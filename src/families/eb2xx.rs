//! EB2xx (Infineon 2) controllers.
//!
//! These frames carry no model byte, so the model only survives in text
//! profiles. Firmware answers uploads with a single `U` and cannot be read
//! back.

use super::annotation_starts_with;
use crate::coefficients::{CoefficientSet, Linear, Quantity};
use crate::coefficients::Linear as L;
use crate::protocol::{Handshake, LinkSettings};
use crate::registry::{Capabilities, Family};
use crate::schema::Slot::{Literal, Param};
use crate::schema::{Conversion, EditGroup, ParameterDescriptor as P, Schema, Slot};

const VOLTS_TO_RAW: Linear = Linear::scale(3.281);
const RAW_TO_VOLTS: Linear = Linear::scale(1.0 / 3.281);

const fn model(
    name: &'static str,
    model_id: u8,
    phase_to_raw: Linear,
    raw_to_phase: Linear,
    battery_to_raw: Linear,
    raw_to_battery: Linear,
) -> CoefficientSet {
    CoefficientSet {
        name,
        model_id,
        phase_to_raw,
        raw_to_phase,
        battery_to_raw,
        raw_to_battery,
        volts_to_raw: VOLTS_TO_RAW,
        raw_to_volts: RAW_TO_VOLTS,
        quirk: None,
    }
}

/// Byte 23 of Lyen firmware frames must read 80.
const fn lyen(set: CoefficientSet) -> CoefficientSet {
    set.with_quirk(23, 80)
}

const fn crystalyte(mut set: CoefficientSet) -> CoefficientSet {
    set.volts_to_raw = Linear::scale(3.281 / 1.2);
    set.raw_to_volts = Linear::scale(1.2 / 3.281);
    set
}

pub static MODELS: [CoefficientSet; 13] = [
    model("EB206", 1, L::new(1.25, -0.2), L::new(0.8, 0.16), L::new(1.256, 1.25), L::new(0.796, -0.995)),
    model("EB209", 2, L::new(1.25, -19.2), L::new(0.8, 15.36), L::new(1.256, -2.8), L::new(0.796, 2.229)),
    model("EB212", 3, L::new(0.625, -7.0), L::new(1.6, 11.2), L::new(0.624, -1.5), L::new(1.603, 2.404)),
    model("EB215", 4, L::new(0.416, -18.9), L::new(2.4038, 45.4327), L::new(0.425, -3.3), L::new(2.353, 7.765)),
    model("EB218", 5, L::new(0.187, -0.1), L::new(5.3476, 0.5348), L::new(0.213, 0.1), L::new(4.695, -0.469)),
    model("EB206/Lyen", 6, L::new(1.25, -0.2), L::new(0.8, 0.16), L::new(1.249, -4.26), L::new(0.8, 3.41)),
    lyen(model("EB209/Lyen", 7, L::new(1.25, -19.2), L::new(0.8, 15.36), L::new(1.249, -2.26), L::new(0.8, 1.81))),
    lyen(model("EB212/Lyen", 8, L::new(0.625, -7.0), L::new(1.6, 11.2), L::new(0.631, -1.5), L::new(1.58, 2.38))),
    lyen(model("EB215/Lyen", 9, L::new(0.834, -30.1), L::new(1.199, 36.09), L::new(0.83, -5.86), L::new(1.205, 7.06))),
    lyen(model("EB218/Lyen", 10, L::new(0.624, -16.0), L::new(1.6, 25.64), L::new(0.625, -5.0), L::new(1.6, 8.0))),
    lyen(model("EB224/Lyen", 11, L::new(0.624, -18.0), L::new(1.6, 28.846), L::new(0.627, -4.12), L::new(1.594, 6.57))),
    lyen(model("EB232/Lyen", 12, L::new(0.5, -20.2), L::new(2.0, 40.4), L::new(0.5, -4.0), L::new(2.0, 8.0))),
    crystalyte(model(
        "EB218/Crystalyte",
        13,
        L::new(0.0935, -0.05),
        L::new(10.6952, 0.5348),
        L::new(0.1065, 0.05),
        L::new(9.3897, -0.469),
    )),
];

/// Raw byte for each EBS level.
const EBS_LEVELS: [f64; 4] = [0.0, 4.0, 8.0, 255.0];

fn ebs_level_to_raw(level: f64) -> f64 {
    let index = level.round().clamp(0.0, (EBS_LEVELS.len() - 1) as f64) as usize;
    EBS_LEVELS[index]
}

fn ebs_level_from_raw(raw: f64) -> f64 {
    EBS_LEVELS.iter().rposition(|&threshold| raw >= threshold).unwrap_or(0) as f64
}

const MODEL_DEPENDENT: &[&str] = &["ControllerModel"];

const fn model_quantity(name: &'static str, label: &'static str, units: &'static str, default: f64, quantity: Quantity) -> P {
    P::float(name, label)
        .units(units)
        .range(1, 255)
        .default(default)
        .depends_on(MODEL_DEPENDENT)
        .conversion(Conversion::Model(quantity))
}

const fn speed(name: &'static str, label: &'static str) -> P {
    P::integer(name, label)
        .units("%")
        .range(1, 95)
        .default(100.0)
        .conversion(Conversion::Scale(1.0 / 1.26))
}

static PARAMETERS: &[P] = &[
    P::integer("ControllerModel", "Controller model")
        .describe("Controller type; selects the shunt and divider coefficients.")
        .range(1, 13)
        .default(1.0)
        .conversion(Conversion::ModelSelect),
    model_quantity("PhaseCurrent", "Phase current limit", "A", 30.0, Quantity::PhaseCurrent)
        .describe("Current limit in the motor phase wires."),
    model_quantity("BatteryCurrent", "Battery current limit", "A", 14.0, Quantity::BatteryCurrent)
        .describe("Limit for the current drawn out of the battery."),
    model_quantity("LowVoltage", "Battery low voltage", "V", 32.5, Quantity::Voltage)
        .describe("The controller stops below this voltage."),
    model_quantity("LowVoltageTolerance", "Battery low voltage threshold", "V", 1.0, Quantity::Voltage),
    P::integer("SpeedSwitchMode", "Speed switch mode").choices(&["Switch", "Cycle"]),
    speed("Speed1", "Speed limit 1"),
    speed("Speed2", "Speed limit 2"),
    speed("Speed3", "Speed limit 3"),
    P::integer("LimitedSpeed", "Limited speed")
        .describe("Speed at full throttle while the SL contact is grounded.")
        .units("%")
        .range(1, 128)
        .default(100.0)
        .conversion(Conversion::Scale(1.28)),
    P::integer("ReverseSpeed", "Reverse speed")
        .units("%")
        .range(1, 128)
        .default(35.0)
        .conversion(Conversion::Scale(1.28)),
    P::float("BlockTime", "Overcurrent detection delay")
        .units("s")
        .range(0, 100)
        .default(1.0)
        .conversion(Conversion::Scale(10.0)),
    P::float("AutoCruisingTime", "Auto cruising time")
        .units("s")
        .range(10, 150)
        .default(5.0)
        .conversion(Conversion::Scale(10.0)),
    P::integer("SlipChargeMode", "Slip charge mode")
        .choices(&["Enable", "Disable"])
        .default(1.0),
    P::integer("IndicatorMode", "LED indicator mode")
        .choices(&["Common VCC", "Common GND", "164 Mode P1-DAT P2-CLK"])
        .default(1.0),
    P::integer("EBSLevel", "EBS level")
        .describe("Strength of electronic braking.")
        .choices(&["Disabled", "Moderate", "Strong", "Unlimited"])
        .conversion(Conversion::Custom {
            to_raw: ebs_level_to_raw,
            from_raw: ebs_level_from_raw,
        }),
    model_quantity("EBSLimVoltage", "EBS limit voltage", "V", 75.0, Quantity::Voltage)
        .describe("Upper voltage limit while regenerating."),
    P::integer("GuardLevel", "Guard signal polarity").choices(&["Low", "High"]),
    P::integer("ThrottleProtect", "Throttle blowout protect")
        .choices(&["Disabled", "Enabled"])
        .default(1.0),
    P::integer("PASMode", "PAS mode").choices(&["Long (~3s)", "Short (~1s)"]),
    P::integer("P3Mode", "P3 mode").choices(&["Cruise", "Cruise & Failure code"]),
    P::integer("SensorAngle", "Hall sensors angle")
        .choices(&["120°", "60°", "Auto"])
        .default(2.0),
];

static LOAD_ORDER: [Slot; 22] = [
    Param("ControllerModel"),
    Param("PhaseCurrent"),
    Param("BatteryCurrent"),
    Param("LowVoltage"),
    Param("LowVoltageTolerance"),
    Param("LimitedSpeed"),
    Param("SpeedSwitchMode"),
    Param("Speed1"),
    Param("Speed2"),
    Param("Speed3"),
    Param("BlockTime"),
    Param("AutoCruisingTime"),
    Param("SlipChargeMode"),
    Param("IndicatorMode"),
    Param("EBSLevel"),
    Param("ReverseSpeed"),
    Param("EBSLimVoltage"),
    Param("GuardLevel"),
    Param("ThrottleProtect"),
    Param("PASMode"),
    Param("P3Mode"),
    Param("SensorAngle"),
];

static RAW_ORDER: [Slot; 31] = [
    Literal(2),
    Literal(15),
    Param("PhaseCurrent"),
    Param("BatteryCurrent"),
    Param("LowVoltage"),
    Param("LowVoltageTolerance"),
    Param("LimitedSpeed"),
    Param("SpeedSwitchMode"),
    Param("Speed1"),
    Param("Speed2"),
    Param("Speed3"),
    Param("BlockTime"),
    Param("AutoCruisingTime"),
    Param("SlipChargeMode"),
    Param("IndicatorMode"),
    Param("EBSLevel"),
    Param("ReverseSpeed"),
    Param("EBSLimVoltage"),
    Param("GuardLevel"),
    Param("ThrottleProtect"),
    Param("PASMode"),
    Param("P3Mode"),
    Param("SensorAngle"),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
    Literal(0),
];

static EDIT_ORDER: &[EditGroup] = &[
    EditGroup {
        title: "",
        parameters: &["ControllerModel"],
    },
    EditGroup {
        title: "Current/Voltage design",
        parameters: &["BatteryCurrent", "PhaseCurrent", "BlockTime", "LowVoltage", "LowVoltageTolerance"],
    },
    EditGroup {
        title: "Speed modes",
        parameters: &["SpeedSwitchMode", "Speed1", "Speed2", "Speed3", "LimitedSpeed", "ReverseSpeed"],
    },
    EditGroup {
        title: "Regeneration",
        parameters: &["EBSLevel", "EBSLimVoltage", "SlipChargeMode"],
    },
    EditGroup {
        title: "External devices",
        parameters: &[
            "SensorAngle",
            "AutoCruisingTime",
            "GuardLevel",
            "ThrottleProtect",
            "PASMode",
            "IndicatorMode",
            "P3Mode",
        ],
    },
];

fn detect(lines: &[&str]) -> bool {
    lines.len() >= LOAD_ORDER.len() && annotation_starts_with(lines, 0, "EB2")
}

pub static EB2XX: Family = Family {
    name: "EB2xx",
    schema: Schema {
        parameters: PARAMETERS,
        load_order: &LOAD_ORDER,
        raw_order: &RAW_ORDER,
        edit_order: EDIT_ORDER,
    },
    models: &MODELS,
    capabilities: Capabilities::empty(),
    link: LinkSettings::LEGACY,
    handshake: Handshake::LEGACY,
    detect,
};

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(1.0, 4.0)]
    #[case(2.0, 8.0)]
    #[case(3.0, 255.0)]
    fn test_ebs_levels(#[case] level: f64, #[case] raw: f64) {
        assert_eq!(ebs_level_to_raw(level), raw);
        assert_eq!(ebs_level_from_raw(raw), level);
    }

    #[test]
    fn test_lyen_quirk_applies_to_later_models_only() {
        let quirky: Vec<_> = MODELS.iter().filter(|m| m.quirk.is_some()).map(|m| m.name).collect();
        assert_eq!(quirky.len(), 6);
        assert!(!quirky.contains(&"EB206/Lyen"));
        assert!(quirky.iter().all(|name| name.ends_with("/Lyen")));
    }

    #[test]
    fn test_frame_has_no_model_slot() {
        assert_eq!(EB2XX.schema.model_slot(), None);
        assert_eq!(EB2XX.schema.frame_len(), 32);
    }

    #[test]
    fn test_detect() {
        let mut lines = vec!["0"; 22];
        lines[0] = "8:EB212";
        assert!(detect(&lines));
        lines[0] = "8:KH612";
        assert!(!detect(&lines));
    }
}
