//! Basic Usage Example
//!
//! This example demonstrates the core functionality of the library:
//! - Loading a text profile and detecting its controller family
//! - Printing parameters by edit group
//! - Selecting a serial port and uploading the profile
//!
//! Usage:
//!   cargo run --example basic_usage -- touring.asv                  # Interactive port selection
//!   cargo run --example basic_usage -- touring.asv /dev/ttyUSB0
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=trace cargo run --example basic_usage -- touring.asv

use infineon_protocol::{Controller, Outcome, Progress, Registry, Result, Stage};
use inquire::{Confirm, Select};
use log::{error, info};

/// Interactive serial port selection using inquire
fn select_port() -> Result<String> {
    let ports = Controller::list_ports()?;

    if ports.is_empty() {
        eprintln!("No serial ports found!");
        std::process::exit(1);
    }

    let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

    let selection = Select::new("Select a serial port:", port_names)
        .prompt()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("Selection cancelled: {}", e)))?;

    Ok(selection)
}

fn main() -> Result<()> {
    // Initialize logger with default info level if RUST_LOG is not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("Usage: basic_usage <profile.asv> [port]");
        std::process::exit(2);
    };

    let registry = Registry::with_builtin();
    let profile = registry.load_profile(&path)?;
    info!("{} profile '{}' for {}", profile.family().name, profile.description(), profile.model_name());

    // Print every parameter grouped the way editors show them
    for group in profile.family().schema.edit_order {
        if !group.title.is_empty() {
            info!("=== {} ===", group.title);
        }
        for &name in group.parameters {
            let desc = profile.family().schema.require(name)?;
            info!("{:<32} {}", desc.label, profile.display_text(name)?);
        }
    }

    let upload = Confirm::new("Upload this profile to the controller?")
        .with_default(false)
        .prompt()
        .unwrap_or(false);
    if !upload {
        return Ok(());
    }

    let port_name = args.next().map(Ok).unwrap_or_else(select_port)?;
    let controller = Controller::open(&port_name, profile.family())?;

    info!("Switch the controller on now");
    let outcome = controller.upload(&profile, |progress| {
        match progress {
            Progress::Stage(Stage::AwaitingReady) => info!("Waiting for controller ready"),
            Progress::Stage(Stage::AwaitingAck) => info!("Waiting for acknowledgement"),
            _ => {}
        }
        true
    });

    match outcome {
        Ok(Outcome::Done(())) => info!("✓ Profile uploaded"),
        Ok(Outcome::Cancelled) => info!("Upload cancelled"),
        Err(e) => error!("✗ Upload failed: {}", e),
    }

    Ok(())
}
