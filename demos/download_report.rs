//! Download Report Example
//!
//! This example reads the configuration out of a controller. It includes:
//! - Choosing the family (and model group) to download as
//! - Interactive serial port selection (or command-line argument)
//! - Printing the downloaded profile and exporting it as JSON
//! - Comparing it with a text profile on disk
//! - Saving it as a text profile
//!
//! Usage:
//!   cargo run --example download_report                   # Interactive mode
//!   cargo run --example download_report -- /dev/ttyUSB0
//!   cargo run --example download_report -- /dev/ttyUSB0 touring.asv
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example download_report

use infineon_protocol::{Controller, Outcome, Progress, Registry, Result};
use inquire::{Select, Text};
use log::{error, info};
use std::io;

fn prompt_error(e: inquire::InquireError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("Selection cancelled: {}", e))
}

/// Interactive serial port selection using inquire
fn select_port() -> Result<String> {
    let ports = Controller::list_ports()?;

    if ports.is_empty() {
        eprintln!("No serial ports found!");
        std::process::exit(1);
    }

    let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();
    Ok(Select::new("Select a serial port:", port_names)
        .prompt()
        .map_err(prompt_error)?)
}

fn main() -> Result<()> {
    // Initialize logger with default info level if RUST_LOG is not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let registry = Registry::with_builtin();
    let groups = registry.download_groups();
    let labels: Vec<String> = groups.iter().map(|g| g.label.clone()).collect();
    let label = Select::new("Controller family:", labels)
        .prompt()
        .map_err(prompt_error)?;
    let Some(group) = groups.iter().find(|g| g.label == label) else {
        return Ok(());
    };

    let port_name = std::env::args().nth(1).map(Ok).unwrap_or_else(select_port)?;
    let controller = Controller::open(&port_name, group.family)?;

    info!("Switch the controller on now");
    let mut last_percent = 0;
    let outcome = controller.download(group.family, group.pattern.as_deref(), |progress| {
        if let Progress::Fraction(fraction) = progress {
            let percent = (fraction * 100.0) as u32;
            if percent >= last_percent + 25 {
                info!("{}% received", percent);
                last_percent = percent;
            }
        }
        true
    });

    let mut profile = match outcome {
        Ok(Outcome::Done(profile)) => profile,
        Ok(Outcome::Cancelled) => {
            info!("Download cancelled");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to download configuration: {}", e);
            error!("Check that:");
            error!("1. The controller is powered and connected");
            error!("2. The right family is selected");
            error!("3. TX and RX are not swapped");
            return Ok(());
        }
    };

    let report = profile.report()?;
    info!("=== {} {} ===", report.family, report.model);
    for reading in &report.parameters {
        info!("{:<24} {}", reading.label, reading.text);
    }

    if let Ok(json) = serde_json::to_string_pretty(&report) {
        info!("JSON Export:");
        info!("{}", json);
    }

    if let Some(reference) = std::env::args().nth(2) {
        let expected = registry.load_profile(&reference)?.report()?;
        let changed: Vec<&str> = report.changed_from(&expected).collect();
        if changed.is_empty() {
            info!("✓ Controller matches {}", reference);
        }
        for name in changed {
            let file_text = expected.get(name).map_or("-", |p| p.text.as_str());
            let controller_text = report.get(name).map_or("-", |p| p.text.as_str());
            info!("{:<24} controller {} / file {}", name, controller_text, file_text);
        }
    }

    let name = Text::new("Save as (empty to skip):").prompt().unwrap_or_default();
    if !name.trim().is_empty() {
        profile.set_file_name(name.trim())?;
        profile.save()?;
        info!("Saved {}", profile.file_name().map(|p| p.display().to_string()).unwrap_or_default());
    }

    Ok(())
}
