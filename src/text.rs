//! Line-oriented text profiles (`.asv`).
//!
//! One value per line in the family load order, CRLF line endings. Anything
//! after the first `:` on a line is an annotation; the model line is saved
//! with the model name there so the family can be recognised.

use crate::constants::MODEL_PARAMETER;
use crate::error::{ControllerError, Result, ValueParseError};
use crate::profile::Profile;
use crate::schema::{Conversion, ParameterKind, Slot};
use log::debug;
use std::fs;
use std::path::Path;

/// Read a profile file, replacing invalid UTF-8.
pub fn read_profile_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Value part of a line: whitespace trimmed, annotation removed.
fn value_text(line: &str) -> &str {
    let line = line.trim();
    match line.split_once(':') {
        Some((value, _)) => value.trim(),
        None => line,
    }
}

fn parse_value(kind: ParameterKind, text: &str) -> std::result::Result<f64, ValueParseError> {
    match kind {
        ParameterKind::Integer => Ok(text.parse::<i64>()? as f64),
        ParameterKind::Float => Ok(text.parse::<f64>()?),
    }
}

/// Fill `profile` from the lines of a text profile.
///
/// Either every line is applied or the profile is left untouched. Files
/// shorter than the load order keep defaults for the missing lines.
pub fn load(profile: &mut Profile, lines: &[&str]) -> Result<()> {
    let family = profile.family();
    let load_order = family.schema.load_order;
    let mut loaded = profile.clone();

    // The model line goes first so converted values are checked with the
    // right coefficients.
    let mut indices: Vec<usize> = (0..lines.len()).collect();
    if let Some(model_line) = load_order.iter().position(|slot| *slot == Slot::Param(MODEL_PARAMETER)) {
        if model_line < lines.len() {
            indices.remove(model_line);
            indices.insert(0, model_line);
        }
    }

    for index in indices {
        let text = value_text(lines[index]);
        let Some(slot) = load_order.get(index) else {
            if !text.is_empty() {
                return Err(ControllerError::TrailingData {
                    line: index + 1,
                    text: text.to_string(),
                });
            }
            continue;
        };

        let Slot::Param(name) = *slot else {
            continue;
        };
        let desc = family.schema.require(name)?;
        let value = parse_value(desc.kind, text).map_err(|source| ControllerError::Parse {
            line: index + 1,
            text: text.to_string(),
            source,
        })?;
        loaded.set_parameter(name, value)?;
    }

    if lines.len() < load_order.len() {
        debug!(
            "{} profile has {} of {} lines, keeping defaults for the rest",
            family.name,
            lines.len(),
            load_order.len()
        );
    }
    *profile = loaded;
    Ok(())
}

/// Render a profile in its family load order.
pub fn save(profile: &Profile) -> String {
    let schema = profile.family().schema;
    let mut out = String::new();

    for slot in schema.load_order {
        match *slot {
            Slot::Literal(value) => out.push_str(&value.to_string()),
            Slot::Param(name) => {
                let Some(desc) = schema.descriptor(name) else {
                    continue;
                };
                let value = profile.stored(desc);
                match desc.kind {
                    ParameterKind::Integer => out.push_str(&format!("{}", value.round() as i64)),
                    ParameterKind::Float => out.push_str(&format!("{:.*}", desc.precision, value)),
                }
                if matches!(desc.conversion, Conversion::ModelSelect) {
                    out.push(':');
                    out.push_str(profile.model_prefix());
                }
            }
        }
        out.push_str("\r\n");
    }
    out
}
