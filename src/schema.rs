//! Declarative parameter schema.
//!
//! A family describes its parameters with a table of [`ParameterDescriptor`]
//! entries and three orderings over them: the line layout of text profiles
//! (load order), the byte layout of the wire frame (raw order) and the
//! grouping used by editors (edit order).

use crate::coefficients::{CoefficientSet, ModelCoefficients, Quantity};
use crate::constants::MODEL_PARAMETER;
use crate::error::{ControllerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Integer,
    Float,
}

/// Location of a parameter inside a shared integer backing parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitPacking {
    pub backing: &'static str,
    pub shift: u32,
    pub mask: u32,
}

impl BitPacking {
    /// Single-bit flag identified by its mask value.
    pub const fn flag(backing: &'static str, mask: u32) -> Self {
        Self {
            backing,
            shift: mask.trailing_zeros(),
            mask,
        }
    }

    pub fn extract(&self, backing: u32) -> u32 {
        (backing & self.mask) >> self.shift
    }

    pub fn insert(&self, backing: u32, value: u32) -> u32 {
        (backing & !self.mask) | (value.wrapping_shl(self.shift) & self.mask)
    }
}

/// How a stored value maps onto its raw frame byte.
#[derive(Debug, Clone, Copy)]
pub enum Conversion {
    /// Stored value is the raw value.
    Identity,
    /// `raw = stored * factor`, `display = raw / factor`.
    Scale(f64),
    /// Engineering quantity converted with the active model's coefficients.
    Model(Quantity),
    /// Stored value is a 1-based index into the model table, raw is its `model_id`.
    ModelSelect,
    /// Family-specific translation, e.g. enumerations or reordered bit flags.
    Custom {
        to_raw: fn(f64) -> f64,
        from_raw: fn(f64) -> f64,
    },
}

impl Conversion {
    /// Whether the stored value is in engineering units and the range applies
    /// to its raw equivalent.
    pub fn is_unit_conversion(&self) -> bool {
        matches!(self, Conversion::Scale(_) | Conversion::Model(_))
    }

    pub fn to_raw(&self, value: f64, models: &[CoefficientSet], active: &CoefficientSet) -> f64 {
        match *self {
            Conversion::Identity => value,
            Conversion::Scale(factor) => value * factor,
            Conversion::Model(quantity) => active.to_raw(quantity, value),
            Conversion::ModelSelect => {
                let index = value.round() as usize;
                match index.checked_sub(1).and_then(|i| models.get(i)) {
                    Some(model) => f64::from(model.model_id),
                    None => f64::from(active.model_id),
                }
            }
            Conversion::Custom { to_raw, .. } => to_raw(value),
        }
    }

    pub fn from_raw(&self, raw: f64, models: &[CoefficientSet], active: &CoefficientSet) -> f64 {
        match *self {
            Conversion::Identity => raw,
            Conversion::Scale(factor) => raw / factor,
            Conversion::Model(quantity) => active.from_raw(quantity, raw),
            Conversion::ModelSelect => models
                .iter()
                .position(|m| f64::from(m.model_id) == raw)
                .map_or(0.0, |i| (i + 1) as f64),
            Conversion::Custom { from_raw, .. } => from_raw(raw),
        }
    }
}

/// Immutable description of one named parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParameterDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub kind: ParameterKind,
    /// Inclusive range in raw units for unit conversions, stored units otherwise
    pub range: (i64, i64),
    pub default: f64,
    /// Decimal digits used for display and text files
    pub precision: usize,
    pub units: Option<&'static str>,
    pub depends_on: &'static [&'static str],
    pub packing: Option<BitPacking>,
    pub conversion: Conversion,
    /// Labels for enumerated values, indexed from `range.0`
    pub choices: &'static [&'static str],
}

impl ParameterDescriptor {
    pub const fn integer(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            description: "",
            kind: ParameterKind::Integer,
            range: (0, 255),
            default: 0.0,
            precision: 0,
            units: None,
            depends_on: &[],
            packing: None,
            conversion: Conversion::Identity,
            choices: &[],
        }
    }

    pub const fn float(name: &'static str, label: &'static str) -> Self {
        Self {
            kind: ParameterKind::Float,
            precision: 1,
            ..Self::integer(name, label)
        }
    }

    pub const fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn range(mut self, min: i64, max: i64) -> Self {
        self.range = (min, max);
        self
    }

    pub const fn default(mut self, value: f64) -> Self {
        self.default = value;
        self
    }

    pub const fn precision(mut self, digits: usize) -> Self {
        self.precision = digits;
        self
    }

    pub const fn units(mut self, units: &'static str) -> Self {
        self.units = Some(units);
        self
    }

    pub const fn depends_on(mut self, names: &'static [&'static str]) -> Self {
        self.depends_on = names;
        self
    }

    pub const fn packed(mut self, packing: BitPacking) -> Self {
        self.packing = Some(packing);
        self.range = (0, (packing.mask >> packing.shift) as i64);
        self
    }

    pub const fn conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }

    pub const fn choices(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = choices;
        self.range = (0, choices.len() as i64 - 1);
        self
    }

    /// Value compared against `range` when `value` is assigned.
    pub fn range_value(&self, value: f64, models: &[CoefficientSet], active: &CoefficientSet) -> f64 {
        if self.conversion.is_unit_conversion() {
            self.conversion.to_raw(value, models, active).round()
        } else {
            value
        }
    }

    pub fn accepts(&self, value: f64, models: &[CoefficientSet], active: &CoefficientSet) -> bool {
        if !value.is_finite() {
            return false;
        }
        let checked = self.range_value(value, models, active);
        checked >= self.range.0 as f64 && checked <= self.range.1 as f64
    }

    pub fn out_of_range(&self, value: f64) -> ControllerError {
        ControllerError::OutOfRange {
            name: self.name.to_string(),
            value,
            min: self.range.0,
            max: self.range.1,
        }
    }
}

/// Entry in a load or raw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Reserved position holding a fixed value.
    Literal(u8),
    Param(&'static str),
}

/// Titled group of parameters shown together by an editor.
#[derive(Debug, Clone, Copy)]
pub struct EditGroup {
    pub title: &'static str,
    pub parameters: &'static [&'static str],
}

/// Parameter table of one controller family.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub parameters: &'static [ParameterDescriptor],
    pub load_order: &'static [Slot],
    pub raw_order: &'static [Slot],
    pub edit_order: &'static [EditGroup],
}

impl Schema {
    pub fn descriptor(&self, name: &str) -> Option<&'static ParameterDescriptor> {
        self.parameters.iter().find(|d| d.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&'static ParameterDescriptor> {
        self.descriptor(name)
            .ok_or_else(|| ControllerError::UnknownParameter(name.to_string()))
    }

    /// Length of the wire frame including the checksum byte.
    pub fn frame_len(&self) -> usize {
        self.raw_order.len() + 1
    }

    /// Frame offset of the controller model byte, if the family transmits it.
    pub fn model_slot(&self) -> Option<usize> {
        self.raw_order
            .iter()
            .position(|slot| *slot == Slot::Param(MODEL_PARAMETER))
    }

    /// Parameters whose displayed value must be recomputed when `name` changes.
    pub fn dependents<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'static ParameterDescriptor> + 'a {
        self.parameters
            .iter()
            .filter(move |d| d.depends_on.iter().any(|dep| *dep == name))
    }

    /// Check the cross references between the orders and the descriptor table.
    pub fn validate(&self, family: &str) -> Result<()> {
        let invalid = |reason: String| ControllerError::InvalidSchema {
            family: family.to_string(),
            reason,
        };

        let ordered = self
            .load_order
            .iter()
            .chain(self.raw_order)
            .filter_map(|slot| match slot {
                Slot::Param(name) => Some(*name),
                Slot::Literal(_) => None,
            })
            .chain(self.edit_order.iter().flat_map(|g| g.parameters.iter().copied()));
        for name in ordered {
            if self.descriptor(name).is_none() {
                return Err(invalid(format!("'{name}' is ordered but not described")));
            }
        }

        for desc in self.parameters {
            if let Some(packing) = desc.packing {
                match self.descriptor(packing.backing) {
                    Some(backing) if backing.packing.is_none() => {}
                    Some(_) => return Err(invalid(format!("backing '{}' is itself packed", packing.backing))),
                    None => return Err(invalid(format!("backing '{}' of '{}' is missing", packing.backing, desc.name))),
                }
            }
            if let Some(missing) = desc.depends_on.iter().find(|d| self.descriptor(d).is_none()) {
                return Err(invalid(format!("'{}' depends on unknown '{missing}'", desc.name)));
            }
        }

        Ok(())
    }
}
