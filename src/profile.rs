//! In-memory controller configuration.

use crate::coefficients::CoefficientSet;
use crate::constants::{MODEL_PARAMETER, PROFILE_EXTENSION};
use crate::error::{ControllerError, Result};
use crate::registry::Family;
use crate::schema::{Conversion, ParameterDescriptor};
use crate::types::{ParameterReading, ProfileReport};
use chrono::Utc;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const UNKNOWN_MODEL: &str = "???";

/// Named parameter values of one controller family.
///
/// Values are kept in the units users edit them in: amps, volts, seconds
/// and percent for converted parameters, plain numbers otherwise. Packed
/// parameters have no storage of their own and live inside their backing
/// parameter.
#[derive(Clone)]
pub struct Profile {
    family: &'static Family,
    file_name: Option<PathBuf>,
    description: String,
    values: BTreeMap<&'static str, f64>,
}

impl Profile {
    /// Create a profile holding the family defaults.
    pub fn new(family: &'static Family) -> Self {
        let mut values = BTreeMap::new();
        let parameters = family.schema.parameters;

        for desc in parameters.iter().filter(|d| d.packing.is_none()) {
            values.insert(desc.name, desc.default);
        }
        for desc in parameters {
            if let Some(packing) = desc.packing {
                let backing = values.entry(packing.backing).or_insert(0.0);
                *backing = f64::from(packing.insert(*backing as u32, desc.default.round() as u32));
            }
        }

        Self {
            family,
            file_name: None,
            description: String::new(),
            values,
        }
    }

    /// Create a profile with defaults bound to `file_name` (`.asv` is appended if missing).
    pub fn with_file_name(family: &'static Family, file_name: impl AsRef<Path>) -> Self {
        let mut profile = Self::new(family);
        profile.assign_file_name(file_name.as_ref());
        profile
    }

    pub fn family(&self) -> &'static Family {
        self.family
    }

    pub fn file_name(&self) -> Option<&Path> {
        self.file_name.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn get_parameter(&self, name: &str) -> Result<f64> {
        let desc = self.family.schema.require(name)?;
        Ok(self.stored(desc))
    }

    /// Assign a parameter after checking it against the schema range.
    ///
    /// Packed parameters are not range checked: the value is masked to the
    /// field width and written into the backing parameter.
    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        let desc = self.family.schema.require(name)?;
        let accepted = match desc.packing {
            Some(_) => value.is_finite(),
            None => desc.accepts(value, self.family.models, self.controller()?),
        };
        if !accepted {
            return Err(desc.out_of_range(value));
        }
        self.store(desc, value);
        Ok(())
    }

    /// Quantized frame byte for a parameter under the active model.
    pub fn raw_value(&self, name: &str) -> Result<u8> {
        let desc = self.family.schema.require(name)?;
        self.raw_byte(desc)
    }

    /// Value as shown to users: the stored value after a round trip through
    /// its raw byte, so that it matches what the controller will apply.
    pub fn display(&self, name: &str) -> Result<f64> {
        let desc = self.family.schema.require(name)?;
        if !desc.conversion.is_unit_conversion() {
            return Ok(self.stored(desc));
        }
        let raw = self.raw_byte(desc)?;
        Ok(desc
            .conversion
            .from_raw(f64::from(raw), self.family.models, self.controller()?))
    }

    /// Assign a value entered in display units, snapping it to the nearest raw step.
    pub fn set_from_display(&mut self, name: &str, value: f64) -> Result<()> {
        let desc = self.family.schema.require(name)?;
        if !desc.conversion.is_unit_conversion() {
            return self.set_parameter(name, value);
        }
        let models = self.family.models;
        let active = self.controller()?;
        if !desc.accepts(value, models, active) {
            return Err(desc.out_of_range(value));
        }
        let raw = desc.conversion.to_raw(value, models, active).round();
        let snapped = desc.conversion.from_raw(raw, models, active);
        self.store(desc, snapped);
        Ok(())
    }

    /// Human readable value: a choice label, the model name or a number with units.
    pub fn display_text(&self, name: &str) -> Result<String> {
        let desc = self.family.schema.require(name)?;
        if matches!(desc.conversion, Conversion::ModelSelect) {
            return Ok(self.model_name().to_string());
        }

        let value = self.display(name)?;
        if !desc.choices.is_empty() {
            let index = value.round() as i64 - desc.range.0;
            if let Some(choice) = usize::try_from(index).ok().and_then(|i| desc.choices.get(i)) {
                return Ok((*choice).to_string());
            }
        }

        let number = format!("{:.*}", desc.precision, value);
        Ok(match desc.units {
            Some(units) => format!("{number} {units}"),
            None => number,
        })
    }

    /// Coefficients of the selected model, falling back to the first model
    /// when the selection is out of range.
    pub fn controller(&self) -> Result<&'static CoefficientSet> {
        match self.selected_model() {
            Some(model) => Ok(model),
            None => self.family.default_model(),
        }
    }

    /// Name of the selected model, or `???` when the selection is out of range.
    pub fn model_name(&self) -> &'static str {
        self.selected_model().map_or(UNKNOWN_MODEL, |model| model.name)
    }

    /// Model name up to the first `/`, as written after the model line of a text profile.
    pub fn model_prefix(&self) -> &'static str {
        self.selected_model().map_or(UNKNOWN_MODEL, CoefficientSet::name_prefix)
    }

    fn selected_model(&self) -> Option<&'static CoefficientSet> {
        self.model_index().and_then(|i| self.family.models.get(i))
    }

    /// Copy every parameter both families know, clamping values to this family's ranges.
    ///
    /// The model is copied first so later conversions use the right coefficients.
    pub fn copy_parameters(&mut self, other: &Profile) -> Result<()> {
        let schema = self.family.schema;
        let mut names: Vec<&'static str> = schema.parameters.iter().map(|d| d.name).collect();
        if let Some(pos) = names.iter().position(|n| *n == MODEL_PARAMETER) {
            names.remove(pos);
            names.insert(0, MODEL_PARAMETER);
        }

        for name in names {
            let Ok(value) = other.get_parameter(name) else {
                continue;
            };
            let desc = schema.require(name)?;
            let (min, max) = (desc.range.0 as f64, desc.range.1 as f64);
            let value = if desc.conversion.is_unit_conversion() {
                let models = self.family.models;
                let active = self.controller()?;
                let raw = desc.conversion.to_raw(value, models, active).round().clamp(min, max);
                desc.conversion.from_raw(raw, models, active)
            } else {
                value.clamp(min, max)
            };
            self.store(desc, value);
        }
        debug!("Copied {} parameters into {}", other.family.name, self.family.name);
        Ok(())
    }

    /// Bind the profile to a new file, renaming the current file if it exists.
    pub fn set_file_name(&mut self, file_name: impl AsRef<Path>) -> Result<()> {
        let new_name = with_profile_extension(file_name.as_ref());
        if let Some(old) = &self.file_name {
            if old.exists() && *old != new_name {
                debug!("Renaming {} to {}", old.display(), new_name.display());
                fs::rename(old, &new_name)?;
            }
        }
        self.assign_file_name(&new_name);
        Ok(())
    }

    /// Change the description, which renames the file in its current directory.
    pub fn set_description(&mut self, description: &str) -> Result<()> {
        let dir = self
            .file_name
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.set_file_name(dir.join(format!("{description}.{PROFILE_EXTENSION}")))
    }

    /// Delete the profile file.
    pub fn remove(&self) -> Result<()> {
        let path = self.file_name.as_deref().ok_or(ControllerError::MissingFileName)?;
        fs::remove_file(path)?;
        Ok(())
    }

    /// Write the profile as text to its file name.
    pub fn save(&self) -> Result<()> {
        let path = self.file_name.as_deref().ok_or(ControllerError::MissingFileName)?;
        fs::write(path, crate::text::save(self))?;
        debug!("Saved {} profile to {}", self.family.name, path.display());
        Ok(())
    }

    /// Snapshot of every parameter in edit order.
    pub fn report(&self) -> Result<ProfileReport> {
        let mut parameters = Vec::new();
        for group in self.family.schema.edit_order {
            for &name in group.parameters {
                let desc = self.family.schema.require(name)?;
                parameters.push(ParameterReading {
                    group: group.title.to_string(),
                    name: desc.name.to_string(),
                    label: desc.label.to_string(),
                    value: self.stored(desc),
                    raw: self.raw_byte(desc).ok(),
                    text: self.display_text(name)?,
                });
            }
        }

        Ok(ProfileReport {
            timestamp: Utc::now(),
            family: self.family.name.to_string(),
            model: self.model_name().to_string(),
            description: self.description.clone(),
            parameters,
        })
    }

    pub(crate) fn stored(&self, desc: &ParameterDescriptor) -> f64 {
        match desc.packing {
            Some(packing) => {
                let backing = self.values.get(packing.backing).copied().unwrap_or(0.0);
                f64::from(packing.extract(backing as u32))
            }
            None => self.values.get(desc.name).copied().unwrap_or(desc.default),
        }
    }

    /// Assign without range checks.
    pub(crate) fn store(&mut self, desc: &'static ParameterDescriptor, value: f64) {
        match desc.packing {
            Some(packing) => {
                let backing = self.values.entry(packing.backing).or_insert(0.0);
                *backing = f64::from(packing.insert(*backing as u32, value.round() as i64 as u32));
            }
            None => {
                self.values.insert(desc.name, value);
            }
        }

        for dependent in self.family.schema.dependents(desc.name) {
            trace!("{} changed, {} display is stale", desc.name, dependent.name);
        }
    }

    /// Raw value before quantization.
    pub(crate) fn raw_unrounded(&self, desc: &ParameterDescriptor) -> Result<f64> {
        Ok(desc
            .conversion
            .to_raw(self.stored(desc), self.family.models, self.controller()?))
    }

    pub(crate) fn raw_byte(&self, desc: &ParameterDescriptor) -> Result<u8> {
        let raw = self.raw_unrounded(desc)?.round();
        if (0.0..=255.0).contains(&raw) {
            Ok(raw as u8)
        } else {
            Err(ControllerError::OutOfRange {
                name: desc.name.to_string(),
                value: self.stored(desc),
                min: 0,
                max: 255,
            })
        }
    }

    fn model_index(&self) -> Option<usize> {
        let selected = self.values.get(MODEL_PARAMETER)?.round();
        if selected >= 1.0 {
            Some(selected as usize - 1)
        } else {
            None
        }
    }

    fn assign_file_name(&mut self, file_name: &Path) {
        let file_name = with_profile_extension(file_name);
        self.description = file_name
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.file_name = Some(file_name);
    }
}

fn with_profile_extension(path: &Path) -> PathBuf {
    let has_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PROFILE_EXTENSION));
    if has_extension {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(PROFILE_EXTENSION);
        PathBuf::from(name)
    }
}

/// Profiles are equal when they would produce the same controller settings:
/// unit-converted parameters compare by raw byte, everything else by value.
impl PartialEq for Profile {
    fn eq(&self, other: &Self) -> bool {
        if !std::ptr::eq(self.family, other.family) {
            return false;
        }
        self.family
            .schema
            .parameters
            .iter()
            .filter(|desc| desc.packing.is_none())
            .all(|desc| {
                if desc.conversion.is_unit_conversion() {
                    if let (Ok(a), Ok(b)) = (self.raw_byte(desc), other.raw_byte(desc)) {
                        return a == b;
                    }
                }
                self.stored(desc) == other.stored(desc)
            })
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("family", &self.family.name)
            .field("file_name", &self.file_name)
            .field("values", &self.values)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::{EB2XX, KH6XX, KT};
    use rstest::rstest;
    use tempfile::tempdir;

    #[test]
    fn test_packed_flags_share_backing() {
        let mut profile = Profile::new(&KH6XX);
        // Angle120 and EBSEnable default on
        assert_eq!(profile.get_parameter("BitFlags").unwrap(), 3.0);

        profile.set_parameter("LowVoltageHalt", 1.0).unwrap();
        assert_eq!(profile.get_parameter("BitFlags").unwrap(), 11.0);
        profile.set_parameter("Angle120", 0.0).unwrap();
        assert_eq!(profile.get_parameter("BitFlags").unwrap(), 10.0);
        assert_eq!(profile.get_parameter("EBSEnable").unwrap(), 1.0);
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(1.0, 1.0)]
    #[case(2.0, 0.0)]
    #[case(3.0, 1.0)]
    #[case(255.0, 1.0)]
    #[case(-1.0, 1.0)]
    fn test_packed_values_are_masked(#[case] value: f64, #[case] expected: f64) {
        let mut profile = Profile::new(&KH6XX);
        let others = profile.get_parameter("BitFlags").unwrap() as u32 & !8;

        profile.set_parameter("LowVoltageHalt", value).unwrap();
        assert_eq!(profile.get_parameter("LowVoltageHalt").unwrap(), expected);
        assert_eq!(profile.get_parameter("BitFlags").unwrap() as u32 & !8, others);
    }

    #[test]
    fn test_packed_value_must_be_finite() {
        let mut profile = Profile::new(&KH6XX);
        assert!(matches!(
            profile.set_parameter("LowVoltageHalt", f64::NAN),
            Err(ControllerError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_equality_uses_raw_steps() {
        let mut a = Profile::new(&KH6XX);
        let mut b = a.clone();
        // 2.85 raw per amp at KH606: both land on raw 86
        a.set_parameter("PhaseCurrent", 30.1).unwrap();
        b.set_parameter("PhaseCurrent", 30.2).unwrap();
        assert_eq!(a, b);

        b.set_parameter("PhaseCurrent", 31.0).unwrap();
        assert_ne!(a, b);
        assert_ne!(Profile::new(&KT), Profile::new(&KH6XX));
    }

    #[test]
    fn test_range_is_checked_in_raw_units() {
        let mut profile = Profile::new(&KH6XX);
        // 0.8 raw per percent, raw limit 104
        profile.set_parameter("Speed1", 130.0).unwrap();
        let err = profile.set_parameter("Speed1", 131.0).unwrap_err();
        assert!(matches!(err, ControllerError::OutOfRange { min: 0, max: 104, .. }));
    }

    #[test]
    fn test_unknown_parameter() {
        let mut profile = Profile::new(&KT);
        assert!(matches!(
            profile.set_parameter("FluxWeaken", 1.0),
            Err(ControllerError::UnknownParameter(name)) if name == "FluxWeaken"
        ));
    }

    #[test]
    fn test_display_snaps_to_raw_step() {
        let mut profile = Profile::new(&KH6XX);
        // 31 A is 88.35 raw
        profile.set_from_display("PhaseCurrent", 31.0).unwrap();
        let raw = profile.raw_value("PhaseCurrent").unwrap();
        assert_eq!(raw, 88);
        let expected = 88.0 / 2.85;
        assert!((profile.get_parameter("PhaseCurrent").unwrap() - expected).abs() < 1e-9);
        assert!((profile.display("PhaseCurrent").unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_display_text() {
        let mut profile = Profile::new(&KH6XX);
        assert_eq!(profile.display_text("ControllerModel").unwrap(), "KH606");
        assert_eq!(profile.display_text("SpeedSwitchMode").unwrap(), "Switch");
        assert_eq!(profile.display_text("Angle120").unwrap(), "120°");
        profile.set_parameter("BlockTime", 2.5).unwrap();
        assert_eq!(profile.display_text("BlockTime").unwrap(), "2.5 s");
        assert_eq!(profile.display_text("PASLevel").unwrap(), "21");
    }

    #[test]
    fn test_controller_falls_back_to_first_model() {
        let mut profile = Profile::new(&EB2XX);
        profile.store(EB2XX.schema.require("ControllerModel").unwrap(), 0.0);
        assert_eq!(profile.controller().unwrap().name, "EB206");
        assert_eq!(profile.model_name(), "???");
    }

    #[test]
    fn test_copy_parameters_clamps() {
        let mut source = Profile::new(&KH6XX);
        source.set_parameter("ControllerModel", 3.0).unwrap();
        source.set_parameter("PhaseCurrent", 200.0).unwrap();

        let mut target = Profile::new(&KT);
        target.copy_parameters(&source).unwrap();
        // KT has a single model and a raw ceiling of 255 for 3 raw per amp
        assert_eq!(target.get_parameter("ControllerModel").unwrap(), 1.0);
        assert_eq!(target.raw_value("PhaseCurrent").unwrap(), 255);
        assert!((target.get_parameter("PhaseCurrent").unwrap() - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_file_name_gets_extension_and_renames() {
        let dir = tempdir().unwrap();
        let mut profile = Profile::with_file_name(&KH6XX, dir.path().join("touring"));
        assert_eq!(profile.description(), "touring");
        assert_eq!(profile.file_name().unwrap(), dir.path().join("touring.asv"));

        profile.save().unwrap();
        profile.set_description("racing").unwrap();
        assert!(!dir.path().join("touring.asv").exists());
        assert!(dir.path().join("racing.asv").exists());

        profile.remove().unwrap();
        assert!(!dir.path().join("racing.asv").exists());
    }

    #[test]
    fn test_save_without_file_name() {
        let profile = Profile::new(&KT);
        assert!(matches!(profile.save(), Err(ControllerError::MissingFileName)));
    }

    #[test]
    fn test_report_follows_edit_order() {
        let report = Profile::new(&KT).report().unwrap();
        let names: Vec<_> = report.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["ControllerModel", "BatteryCurrent", "PhaseCurrent"]);
        assert_eq!(report.model, "KT36/48SVPRD");
        assert_eq!(report.parameters[2].raw, Some(90));
    }
}
