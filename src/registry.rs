//! Controller families and the registry that recognises their profiles.

use crate::coefficients::CoefficientSet;
use crate::error::{ControllerError, Result};
use crate::families::BUILTIN;
use crate::profile::Profile;
use crate::protocol::{Handshake, LinkSettings};
use crate::schema::Schema;
use crate::text;
use bitflags::bitflags;
use glob::Pattern;
use log::{debug, info};
use std::fmt;
use std::path::Path;

bitflags! {
    /// Optional operations a family supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Configuration can be read back from the controller
        const DOWNLOAD = 0b0000_0001;
    }
}

/// Static description of one controller family.
pub struct Family {
    pub name: &'static str,
    pub schema: Schema,
    /// Coefficient table; the stored model selection indexes it from 1
    pub models: &'static [CoefficientSet],
    pub capabilities: Capabilities,
    pub link: LinkSettings,
    pub handshake: Handshake,
    /// Recognises the lines of a text profile
    pub detect: fn(&[&str]) -> bool,
}

impl Family {
    pub fn supports(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn recognizes(&self, lines: &[&str]) -> bool {
        (self.detect)(lines)
    }

    /// New profile with defaults, bound to `file_name`.
    pub fn create_profile(&'static self, file_name: impl AsRef<Path>) -> Profile {
        Profile::with_file_name(self, file_name)
    }

    /// Look up a model by its transmitted identifier and an optional
    /// shell-style name pattern. Returns the 1-based model selection.
    ///
    /// Without an identifier the first model matching the pattern wins.
    pub fn find_model(&self, model_id: Option<u8>, pattern: Option<&str>) -> Result<(usize, &'static CoefficientSet)> {
        let pattern = pattern.map(Pattern::new).transpose()?;
        self.models
            .iter()
            .enumerate()
            .find(|(_, model)| {
                model_id.map_or(true, |id| model.model_id == id)
                    && pattern.as_ref().map_or(true, |p| p.matches(model.name))
            })
            .map(|(index, model)| (index + 1, model))
            .ok_or_else(|| ControllerError::UnknownModel {
                model_id,
                pattern: pattern.map(|p| p.as_str().to_string()),
            })
    }

    /// First model, used while a profile holds no valid selection.
    pub fn default_model(&self) -> Result<&'static CoefficientSet> {
        self.models.first().ok_or_else(|| self.invalid("no controller models".to_string()))
    }

    /// Check the tables, including that every default is accepted under the first model.
    pub fn validate(&self) -> Result<()> {
        let first = self.default_model()?;
        self.schema.validate(self.name)?;
        for desc in self.schema.parameters {
            if !desc.accepts(desc.default, self.models, first) {
                return Err(self.invalid(format!(
                    "default {} of '{}' is outside {}..={}",
                    desc.default, desc.name, desc.range.0, desc.range.1
                )));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> ControllerError {
        ControllerError::InvalidSchema {
            family: self.name.to_string(),
            reason,
        }
    }
}

impl fmt::Debug for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Family")
            .field("name", &self.name)
            .field("models", &self.models.len())
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Download target offered to users: a family, optionally narrowed to
/// models whose names match `pattern`.
#[derive(Debug, Clone)]
pub struct DownloadGroup {
    pub family: &'static Family,
    pub pattern: Option<String>,
    pub label: String,
}

/// Ordered set of known families.
#[derive(Debug, Clone)]
pub struct Registry {
    families: Vec<&'static Family>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self { families: Vec::new() }
    }

    /// Registry holding EB2xx, KH6xx and KT, in that detection order.
    pub fn with_builtin() -> Self {
        Self {
            families: BUILTIN.to_vec(),
        }
    }

    /// Append a family after checking its tables.
    pub fn register(&mut self, family: &'static Family) -> Result<()> {
        family.validate()?;
        debug!("Registered family {}", family.name);
        self.families.push(family);
        Ok(())
    }

    pub fn families(&self) -> &[&'static Family] {
        &self.families
    }

    pub fn find(&self, name: &str) -> Option<&'static Family> {
        self.families.iter().copied().find(|f| f.name == name)
    }

    /// First registered family recognising the profile lines.
    pub fn detect(&self, lines: &[&str]) -> Option<&'static Family> {
        self.families.iter().copied().find(|f| f.recognizes(lines))
    }

    /// Read a text profile, picking the family by content.
    pub fn load_profile(&self, path: impl AsRef<Path>) -> Result<Profile> {
        let path = path.as_ref();
        let contents = text::read_profile_text(path)?;
        let lines: Vec<&str> = contents.lines().collect();

        let family = self
            .detect(&lines)
            .ok_or_else(|| ControllerError::UnrecognizedFormat(path.to_path_buf()))?;
        info!("Loading {} as {}", path.display(), family.name);

        let mut profile = family.create_profile(path);
        text::load(&mut profile, &lines)?;
        Ok(profile)
    }

    /// Download targets for every family able to download.
    ///
    /// Models sharing an identifier cannot be told apart on the wire, so each
    /// such group gets a name pattern. A family without ambiguity is offered
    /// whole.
    pub fn download_groups(&self) -> Vec<DownloadGroup> {
        let mut groups = Vec::new();
        for &family in self.families.iter().filter(|f| f.supports(Capabilities::DOWNLOAD)) {
            let mut by_id: Vec<(u8, Vec<&str>)> = Vec::new();
            for model in family.models {
                match by_id.iter_mut().find(|(id, _)| *id == model.model_id) {
                    Some((_, names)) => names.push(model.name),
                    None => by_id.push((model.model_id, vec![model.name])),
                }
            }

            let mut patterns: Vec<String> = Vec::new();
            for (_, names) in by_id.iter().filter(|(_, names)| names.len() > 1) {
                for pattern in make_wildcards(names) {
                    if !patterns.contains(&pattern) {
                        patterns.push(pattern);
                    }
                }
            }

            if patterns.is_empty() {
                groups.push(whole_family(family));
            }
            for pattern in patterns {
                if pattern == "*" {
                    groups.push(whole_family(family));
                } else {
                    groups.push(DownloadGroup {
                        family,
                        label: format!("{}, {pattern}", family.name),
                        pattern: Some(pattern),
                    });
                }
            }
        }
        groups
    }
}

fn whole_family(family: &'static Family) -> DownloadGroup {
    DownloadGroup {
        family,
        pattern: None,
        label: family.name.to_string(),
    }
}

/// Replace `/`-separated name components shared by every name with `*`.
fn make_wildcards(names: &[&str]) -> Vec<String> {
    let mut split: Vec<Vec<&str>> = names.iter().map(|n| n.split('/').collect()).collect();
    let Some(first) = split.first().cloned() else {
        return Vec::new();
    };

    for (index, component) in first.iter().enumerate() {
        if split.iter().all(|parts| parts.get(index) == Some(component)) {
            for parts in &mut split {
                parts[index] = "*";
            }
        }
    }

    split.into_iter().map(|parts| parts.join("/")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficients::Quantity;
    use crate::families::{EB2XX, KH6XX, KT};
    use crate::schema::{Conversion, EditGroup, ParameterDescriptor as P, Slot};
    use rstest::rstest;

    static MODELS: [CoefficientSet; 1] = [CoefficientSet::proportional("ZX1", 1, 2.0, 2.0, 2.0)];

    // 200 A at 2 raw per amp does not fit the byte range
    static PARAMETERS: &[P] = &[
        P::integer("ControllerModel", "Model")
            .range(1, 1)
            .default(1.0)
            .conversion(Conversion::ModelSelect),
        P::float("PhaseCurrent", "Phase current")
            .range(1, 255)
            .default(200.0)
            .conversion(Conversion::Model(Quantity::PhaseCurrent)),
    ];

    static ORDER: [Slot; 2] = [Slot::Param("ControllerModel"), Slot::Param("PhaseCurrent")];

    static EDIT_ORDER: &[EditGroup] = &[EditGroup {
        title: "",
        parameters: &["ControllerModel", "PhaseCurrent"],
    }];

    fn never(_: &[&str]) -> bool {
        false
    }

    const fn test_family(name: &'static str, models: &'static [CoefficientSet]) -> Family {
        Family {
            name,
            schema: Schema {
                parameters: PARAMETERS,
                load_order: &ORDER,
                raw_order: &ORDER,
                edit_order: EDIT_ORDER,
            },
            models,
            capabilities: Capabilities::empty(),
            link: LinkSettings::STANDARD,
            handshake: Handshake::STANDARD,
            detect: never,
        }
    }

    static BAD_DEFAULT: Family = test_family("BadDefault", &MODELS);
    static NO_MODELS: Family = test_family("NoModels", &[]);

    #[rstest]
    #[case(&["EB212", "EB212/Lyen"], &["*", "*/Lyen"])]
    #[case(&["KH612/A", "KH612/B"], &["*/A", "*/B"])]
    #[case(&["EB218/Lyen", "EB218/Crystalyte/X"], &["*/Lyen", "*/Crystalyte/X"])]
    #[case(&["A", "B"], &["A", "B"])]
    fn test_make_wildcards(#[case] names: &[&str], #[case] expected: &[&str]) {
        assert_eq!(make_wildcards(names), expected);
    }

    #[test]
    fn test_builtin_order() {
        let registry = Registry::with_builtin();
        let names: Vec<_> = registry.families().iter().map(|f| f.name).collect();
        assert_eq!(names, ["EB2xx", "KH6xx", "KT"]);
        assert!(std::ptr::eq(registry.find("KT").unwrap(), &KT));
        assert!(registry.find("EB3xx").is_none());
    }

    #[test]
    fn test_download_groups_skip_upload_only_families() {
        let groups = Registry::with_builtin().download_groups();
        let labels: Vec<_> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, ["KH6xx", "KT"]);
        assert!(groups.iter().all(|g| g.pattern.is_none()));
    }

    #[test]
    fn test_find_model() {
        let (index, model) = KH6XX.find_model(Some(4), None).unwrap();
        assert_eq!((index, model.name), (4, "KH615"));

        let (index, model) = EB2XX.find_model(None, Some("*/Lyen")).unwrap();
        assert_eq!((index, model.name), (6, "EB206/Lyen"));

        assert!(matches!(
            KH6XX.find_model(Some(9), None),
            Err(ControllerError::UnknownModel { model_id: Some(9), .. })
        ));
        assert!(matches!(
            KH6XX.find_model(None, Some("[")),
            Err(ControllerError::InvalidPattern(_))
        ));
    }

    #[rstest]
    #[case(&BAD_DEFAULT, "PhaseCurrent")]
    #[case(&NO_MODELS, "no controller models")]
    fn test_register_rejects_invalid_family(#[case] family: &'static Family, #[case] reason_part: &str) {
        let mut registry = Registry::new();
        match registry.register(family) {
            Err(ControllerError::InvalidSchema { family: name, reason }) => {
                assert_eq!(name, family.name);
                assert!(reason.contains(reason_part), "{reason}");
            }
            other => panic!("expected InvalidSchema, got {other:?}"),
        }
        assert!(registry.families().is_empty());
    }

    #[test]
    fn test_profile_without_models_reports_error() {
        let mut profile = Profile::new(&NO_MODELS);
        assert_eq!(profile.model_name(), "???");
        assert!(matches!(profile.controller(), Err(ControllerError::InvalidSchema { .. })));
        assert!(matches!(
            profile.set_parameter("PhaseCurrent", 10.0),
            Err(ControllerError::InvalidSchema { .. })
        ));
        assert!(matches!(crate::codec::encode(&profile), Err(ControllerError::InvalidSchema { .. })));
    }

    #[test]
    fn test_register_validates() {
        let mut registry = Registry::new();
        registry.register(&KT).unwrap();
        assert_eq!(registry.families().len(), 1);
        assert!(registry.detect(&["1:KT36", "30", "14"]).is_some());
        assert!(registry.detect(&["1:KH606", "30", "14"]).is_none());
    }
}
