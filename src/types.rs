//! Serializable snapshots of a profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One parameter as shown to users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterReading {
    /// Edit group title, empty for the model selector
    pub group: String,
    pub name: String,
    pub label: String,
    /// Stored value
    pub value: f64,
    /// Frame byte, absent when the value does not fit the active model
    pub raw: Option<u8>,
    /// Display text including units or the choice label
    pub text: String,
}

/// Snapshot of a profile, e.g. right after a download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileReport {
    pub timestamp: DateTime<Utc>,
    pub family: String,
    pub model: String,
    pub description: String,
    pub parameters: Vec<ParameterReading>,
}

impl ProfileReport {
    pub fn get(&self, name: &str) -> Option<&ParameterReading> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Parameters whose raw bytes differ from `other`, by name.
    pub fn changed_from<'a>(&'a self, other: &'a ProfileReport) -> impl Iterator<Item = &'a str> + 'a {
        self.parameters
            .iter()
            .filter(move |p| other.get(&p.name).map_or(true, |o| o.raw != p.raw))
            .map(|p| p.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use crate::families::KT;
    use crate::profile::Profile;

    #[test]
    fn test_changed_from() {
        let base = Profile::new(&KT);
        let mut edited = base.clone();
        edited.set_parameter("BatteryCurrent", 20.0).unwrap();

        let before = base.report().unwrap();
        let after = edited.report().unwrap();
        assert_eq!(after.changed_from(&before).collect::<Vec<_>>(), ["BatteryCurrent"]);
        assert_eq!(before.changed_from(&before).count(), 0);

        assert_eq!(after.get("BatteryCurrent").unwrap().text, "20.0 A");
        assert_eq!(before.get("BatteryCurrent").unwrap().raw, Some(63));
        assert!(after.get("Speed1").is_none());
    }
}
