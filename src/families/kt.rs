//! KT controllers.
//!
//! Only the current limits are known for this family so far.

use super::annotation_starts_with;
use crate::coefficients::{CoefficientSet, Quantity};
use crate::protocol::{Handshake, LinkSettings};
use crate::registry::{Capabilities, Family};
use crate::schema::Slot::Param;
use crate::schema::{Conversion, EditGroup, ParameterDescriptor as P, Schema, Slot};

pub static MODELS: [CoefficientSet; 1] = [CoefficientSet::proportional("KT36/48SVPRD", 1, 3.0, 4.5, 2.5)];

const MODEL_DEPENDENT: &[&str] = &["ControllerModel"];

static PARAMETERS: &[P] = &[
    P::integer("ControllerModel", "Controller model")
        .range(1, 1)
        .default(1.0)
        .conversion(Conversion::ModelSelect),
    P::float("PhaseCurrent", "Phase current limit")
        .units("A")
        .range(1, 255)
        .default(30.0)
        .depends_on(MODEL_DEPENDENT)
        .conversion(Conversion::Model(Quantity::PhaseCurrent)),
    P::float("BatteryCurrent", "Battery current limit")
        .units("A")
        .range(1, 255)
        .default(14.0)
        .depends_on(MODEL_DEPENDENT)
        .conversion(Conversion::Model(Quantity::BatteryCurrent)),
];

static ORDER: [Slot; 3] = [Param("ControllerModel"), Param("PhaseCurrent"), Param("BatteryCurrent")];

static EDIT_ORDER: &[EditGroup] = &[
    EditGroup {
        title: "",
        parameters: &["ControllerModel"],
    },
    EditGroup {
        title: "Current design",
        parameters: &["BatteryCurrent", "PhaseCurrent"],
    },
];

fn detect(lines: &[&str]) -> bool {
    lines.len() >= ORDER.len() && annotation_starts_with(lines, 0, "KT")
}

pub static KT: Family = Family {
    name: "KT",
    schema: Schema {
        parameters: PARAMETERS,
        load_order: &ORDER,
        raw_order: &ORDER,
        edit_order: EDIT_ORDER,
    },
    models: &MODELS,
    capabilities: Capabilities::DOWNLOAD,
    link: LinkSettings::STANDARD,
    handshake: Handshake::STANDARD,
    detect,
};
