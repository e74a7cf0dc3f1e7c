//! KH6xx (Infineon 4) controllers.
//!
//! 48-line text profiles, 64-byte frames. Four on/off options share the
//! `BitFlags` byte, whose bit order on the wire differs from the order used
//! in text profiles.

use super::annotation_starts_with;
use crate::coefficients::{CoefficientSet, Quantity};
use crate::protocol::{Handshake, LinkSettings};
use crate::registry::{Capabilities, Family};
use crate::schema::Slot::{Literal, Param};
use crate::schema::{BitPacking, Conversion, EditGroup, ParameterDescriptor as P, Schema, Slot};

const BF_120: u32 = 1;
const BF_EBS: u32 = 2;
const BF_SOFTSTART: u32 = 4;
const BF_LVHALT: u32 = 8;

/// (profile bit, wire bit)
const WIRE_BITS: [(u32, u32); 4] = [(BF_120, 0x80), (BF_EBS, 0x40), (BF_SOFTSTART, 0x20), (BF_LVHALT, 0x10)];

fn bit_flags_to_raw(value: f64) -> f64 {
    let flags = value.round() as u32;
    let raw = WIRE_BITS
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .fold(0, |acc, (_, wire)| acc | wire);
    f64::from(raw)
}

fn bit_flags_from_raw(raw: f64) -> f64 {
    let raw = raw.round() as u32;
    let flags = WIRE_BITS
        .iter()
        .filter(|(_, wire)| raw & wire != 0)
        .fold(0, |acc, (bit, _)| acc | bit);
    f64::from(flags)
}

pub static MODELS: [CoefficientSet; 5] = [
    CoefficientSet::proportional("KH606", 1, 2.85, 5.10, 3.285),
    CoefficientSet::proportional("KH609", 2, 2.46, 5.10, 3.285),
    CoefficientSet::proportional("KH612", 3, 1.20, 2.73, 3.285),
    CoefficientSet::proportional("KH615", 4, 0.79, 2.55, 3.285),
    CoefficientSet::proportional("KH618", 5, 0.53, 1.70, 3.285),
];

const MODEL_DEPENDENT: &[&str] = &["ControllerModel"];

const fn speed(name: &'static str, label: &'static str) -> P {
    P::integer(name, label)
        .units("%")
        .range(0, 104)
        .default(100.0)
        .conversion(Conversion::Scale(0.8))
}

const fn current_limit(name: &'static str, label: &'static str) -> P {
    P::integer(name, label)
        .units("%")
        .range(0, 141)
        .default(100.0)
        .precision(1)
        .conversion(Conversion::Scale(1.28))
}

const fn plain(name: &'static str, label: &'static str, min: i64, max: i64, default: f64) -> P {
    P::integer(name, label).range(min, max).default(default)
}

const fn flag(name: &'static str, label: &'static str, mask: u32, default: f64) -> P {
    P::integer(name, label)
        .default(default)
        .packed(BitPacking::flag("BitFlags", mask))
}

static PARAMETERS: &[P] = &[
    P::integer("ControllerModel", "Controller model")
        .describe("Controller type; selects the shunt and divider coefficients.")
        .range(1, 5)
        .default(1.0)
        .conversion(Conversion::ModelSelect),
    P::float("PhaseCurrent", "Phase current limit")
        .describe("Current limit in the motor phase wires.")
        .units("A")
        .range(1, 255)
        .default(30.0)
        .depends_on(MODEL_DEPENDENT)
        .conversion(Conversion::Model(Quantity::PhaseCurrent)),
    P::float("BatteryCurrent", "Battery current limit")
        .describe("Limit for the current drawn out of the battery.")
        .units("A")
        .range(1, 255)
        .default(14.0)
        .depends_on(MODEL_DEPENDENT)
        .conversion(Conversion::Model(Quantity::BatteryCurrent)),
    plain("CurrentCompensation", "Current compensation", 0, 100, 85.0),
    P::float("LowVoltage", "Battery low voltage")
        .describe("Voltage considered 'low'; see 'Halt on low voltage'.")
        .units("V")
        .range(1, 255)
        .default(32.5)
        .depends_on(MODEL_DEPENDENT)
        .conversion(Conversion::Model(Quantity::Voltage)),
    P::float("LowVoltageTolerance", "Battery low voltage threshold")
        .describe("Voltage rise needed to leave the low-voltage condition.")
        .units("V")
        .range(1, 255)
        .default(1.0)
        .depends_on(MODEL_DEPENDENT)
        .conversion(Conversion::Model(Quantity::Voltage)),
    flag("LowVoltageHalt", "Halt on low voltage", BF_LVHALT, 0.0)
        .describe("Stop instead of switching to the low-voltage limits."),
    P::float("LowVoltageCurrent", "Low voltage current limit")
        .describe("Battery current limit while the voltage is low.")
        .units("A")
        .range(1, 255)
        .default(10.0)
        .conversion(Conversion::Scale(13.18)),
    P::integer("SpeedSwitchMode", "Speed switch mode")
        .choices(&["Switch", "Cycle 3", "High Switch", "Cycle 4"]),
    P::integer("DefaultSpeed", "Default speed")
        .describe("Speed selected after power on without a selector switch.")
        .choices(&["Speed 1", "Speed 2", "Speed 3", "Speed 4"])
        .default(1.0),
    speed("Speed1", "Speed limit 1"),
    current_limit("Current1", "Current limit 1"),
    speed("LowVoltageSpeed1", "Low-voltage speed 1"),
    speed("Speed2", "Speed limit 2"),
    current_limit("Current2", "Current limit 2"),
    speed("LowVoltageSpeed2", "Low-voltage speed 2"),
    speed("Speed3", "Speed limit 3"),
    current_limit("Current3", "Current limit 3"),
    speed("LowVoltageSpeed3", "Low-voltage speed 3"),
    speed("Speed4", "Speed limit 4"),
    current_limit("Current4", "Current limit 4"),
    speed("LowVoltageSpeed4", "Low-voltage speed 4"),
    P::integer("LimitedSpeed", "Limited speed")
        .describe("Speed at full throttle while the SL contact is grounded.")
        .units("%")
        .range(1, 96)
        .default(100.0)
        .precision(1)
        .conversion(Conversion::Scale(0.96)),
    P::integer("ReverseSpeed", "Reverse speed")
        .units("%")
        .range(1, 128)
        .default(35.0)
        .precision(1)
        .conversion(Conversion::Scale(1.28)),
    P::integer("SlowSpeed", "Slow speed")
        .units("%")
        .range(0, 80)
        .default(35.0)
        .conversion(Conversion::Scale(0.8)),
    P::integer("RecoverySpeed", "Recovery speed")
        .units("%")
        .range(0, 128)
        .default(35.0)
        .precision(1)
        .conversion(Conversion::Scale(1.28)),
    flag("SoftStartEnable", "Enable soft start", BF_SOFTSTART, 0.0),
    plain("SoftStartTime", "Soft start time", 0, 10, 0.0),
    P::float("BlockTime", "Overcurrent detection delay")
        .describe("Time before the phase current limit takes effect; 0 disables it.")
        .units("s")
        .range(0, 100)
        .default(1.0)
        .conversion(Conversion::Scale(10.0)),
    P::float("AutoCruisingTime", "Auto cruising time")
        .describe("Seconds of steady throttle before cruise engages.")
        .units("s")
        .range(10, 150)
        .default(5.0)
        .conversion(Conversion::Scale(10.0)),
    P::integer("SlipChargeMode", "Slip charge mode")
        .describe("Regenerative braking when the throttle is released.")
        .choices(&["Enable", "Disable"])
        .default(1.0),
    P::integer("LimitCruise", "Limit cruise").choices(&["No", "Yes"]),
    P::integer("IndicatorMode", "LED indicator mode")
        .choices(&["Common VCC", "Common GND"])
        .default(1.0),
    flag("EBSEnable", "Enable EBS", BF_EBS, 1.0).describe("Electronic braking when the brake levers are pressed."),
    plain("EBSForce", "EBS force", 0, 200, 40.0),
    P::float("EBSLimVoltage", "EBS limit voltage")
        .describe("Upper voltage limit while regenerating.")
        .units("V")
        .range(1, 255)
        .default(60.0)
        .depends_on(MODEL_DEPENDENT)
        .conversion(Conversion::Model(Quantity::Voltage)),
    P::integer("GuardLevel", "Guard signal polarity").choices(&["Low", "High"]),
    P::integer("ThrottleProtect", "Throttle blowout protect")
        .choices(&["Disabled", "Enabled"])
        .default(1.0),
    plain("PASLevel", "PAS level", 1, 21, 21.0),
    plain("PASStartPulse", "PAS start pulse", 3, 255, 5.0)
        .describe("PAS pulses to skip before assisting."),
    P::integer("PASMaxSpeed", "PAS max speed")
        .units("%")
        .range(1, 128)
        .default(35.0)
        .precision(1)
        .conversion(Conversion::Scale(1.28)),
    flag("Angle120", "Hall sensors angle", BF_120, 1.0).choices(&["60°", "120°"]),
    plain("FluxWeaken", "Flux weakening level", 0, 191, 0.0),
    plain("FluxFineTune", "Flux weakening finetune", 0, 255, 0.0),
    plain("FluxWeakPosition", "Flux weakening position", 0, 40, 0.0),
    plain("FluxWeakTurnPoint", "Flux weakening turnpoint", 0, 255, 0.0),
    P::integer("BitFlags", "Bit flags")
        .describe("Backing byte for Angle120, EBSEnable, SoftStartEnable and LowVoltageHalt.")
        .range(0, 15)
        .conversion(Conversion::Custom {
            to_raw: bit_flags_to_raw,
            from_raw: bit_flags_from_raw,
        }),
];

static LOAD_ORDER: [Slot; 48] = [
    Literal(0),
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
    Param("EBSForce"),
    Param("ReverseSpeed"),
    Param("EBSLimVoltage"),
    Param("GuardLevel"),
    Param("ThrottleProtect"),
    Param("PASLevel"),
    Param("PASStartPulse"),
    Param("DefaultSpeed"),
    Param("Speed4"),
    Param("ControllerModel"),
    Param("LimitCruise"),
    Param("PASMaxSpeed"),
    Param("FluxWeaken"),
    Param("FluxFineTune"),
    Param("FluxWeakPosition"),
    Param("FluxWeakTurnPoint"),
    Param("BitFlags"),
    Literal(0),
    Param("LowVoltageSpeed1"),
    Param("LowVoltageSpeed2"),
    Param("LowVoltageSpeed3"),
    Param("LowVoltageSpeed4"),
    Param("Current1"),
    Param("Current2"),
    Param("Current3"),
    Param("Current4"),
    Param("LowVoltageCurrent"),
    Param("SoftStartTime"),
    Param("SlowSpeed"),
    Param("RecoverySpeed"),
    Param("CurrentCompensation"),
    Literal(0),
    Literal(0),
    Literal(0),
];

// Frame header, then the same sequence as the text profile, then padding.
static RAW_ORDER: [Slot; 63] = [
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
    Param("EBSForce"),
    Param("ReverseSpeed"),
    Param("EBSLimVoltage"),
    Param("GuardLevel"),
    Param("ThrottleProtect"),
    Param("PASLevel"),
    Param("PASStartPulse"),
    Param("DefaultSpeed"),
    Param("Speed4"),
    Param("ControllerModel"),
    Param("LimitCruise"),
    Param("PASMaxSpeed"),
    Param("FluxWeaken"),
    Param("FluxFineTune"),
    Param("FluxWeakPosition"),
    Param("FluxWeakTurnPoint"),
    Param("BitFlags"),
    Literal(0),
    Param("LowVoltageSpeed1"),
    Param("LowVoltageSpeed2"),
    Param("LowVoltageSpeed3"),
    Param("LowVoltageSpeed4"),
    Param("Current1"),
    Param("Current2"),
    Param("Current3"),
    Param("Current4"),
    Param("LowVoltageCurrent"),
    Param("SoftStartTime"),
    Param("SlowSpeed"),
    Param("RecoverySpeed"),
    Param("CurrentCompensation"),
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
        parameters: &[
            "BatteryCurrent",
            "PhaseCurrent",
            "BlockTime",
            "SoftStartEnable",
            "SoftStartTime",
            "LowVoltage",
            "LowVoltageTolerance",
            "LowVoltageHalt",
            "LowVoltageCurrent",
            "CurrentCompensation",
        ],
    },
    EditGroup {
        title: "Speed modes",
        parameters: &[
            "SpeedSwitchMode",
            "Speed1",
            "Current1",
            "Speed2",
            "Current2",
            "Speed3",
            "Current3",
            "Speed4",
            "Current4",
            "LowVoltageSpeed1",
            "LowVoltageSpeed2",
            "LowVoltageSpeed3",
            "LowVoltageSpeed4",
            "DefaultSpeed",
            "LimitedSpeed",
            "ReverseSpeed",
            "SlowSpeed",
            "RecoverySpeed",
        ],
    },
    EditGroup {
        title: "Regeneration",
        parameters: &["EBSEnable", "EBSForce", "EBSLimVoltage", "SlipChargeMode"],
    },
    EditGroup {
        title: "Pedal Assist Sensor",
        parameters: &["PASLevel", "PASStartPulse", "PASMaxSpeed"],
    },
    EditGroup {
        title: "Flux weakening",
        parameters: &["FluxWeaken", "FluxFineTune", "FluxWeakPosition", "FluxWeakTurnPoint"],
    },
    EditGroup {
        title: "External devices",
        parameters: &[
            "Angle120",
            "AutoCruisingTime",
            "LimitCruise",
            "GuardLevel",
            "ThrottleProtect",
            "IndicatorMode",
        ],
    },
];

fn detect(lines: &[&str]) -> bool {
    lines.len() >= LOAD_ORDER.len() && annotation_starts_with(lines, 23, "KH6")
}

pub static KH6XX: Family = Family {
    name: "KH6xx",
    schema: Schema {
        parameters: PARAMETERS,
        load_order: &LOAD_ORDER,
        raw_order: &RAW_ORDER,
        edit_order: EDIT_ORDER,
    },
    models: &MODELS,
    capabilities: Capabilities::DOWNLOAD,
    link: LinkSettings::STANDARD,
    handshake: Handshake::STANDARD,
    detect,
};
