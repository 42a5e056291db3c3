//! CLI Check-Config Command
//!
//! Loads the config the same way `serve` does, then prints every finding
//! and a redacted snapshot.

use anyhow::{bail, Result};

use linebridge_config::{redacted_snapshot, BridgeConfig, ValidationReport};

pub fn run(config: &BridgeConfig, report: &ValidationReport) -> Result<()> {
    println!("\n🔍 Checking linebridge configuration...\n");

    for error in &report.errors {
        println!("  🔴 {}: {}", error.path, error.message);
    }
    for warning in &report.warnings {
        println!("  🟡 {}: {}", warning.path, warning.message);
    }
    if report.errors.is_empty() && report.warnings.is_empty() {
        println!("  🟢 No problems found");
    }

    println!("\nEffective configuration (secrets redacted):");
    println!("{}", serde_json::to_string_pretty(&redacted_snapshot(config))?);
    println!();

    if !report.is_valid() {
        bail!("configuration has {} error(s)", report.errors.len());
    }
    println!("✅ Configuration is usable.");
    Ok(())
}
