//! Terminal output for gaedriverctl.

use eyre::Result;
use gaedriver::UpdateReport;
use gaedriver_core::{Config, Target};

pub fn print_argv(argv: &[String], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(argv)?);
    } else {
        for arg in argv {
            println!("{arg}");
        }
    }
    Ok(())
}

pub fn print_output(stdout: &str, stderr: &str) {
    print!("{stdout}");
    eprint!("{stderr}");
}

pub fn print_update_report(report: &UpdateReport) {
    print_output(&report.output.stdout, &report.output.stderr);
    let plural = if report.attempts == 1 { "" } else { "s" };
    println!("Deployed after {} attempt{plural}.", report.attempts);
}

/// Raw config plus the target it resolves to.
pub fn print_config(config: &Config, target: &Target) -> Result<()> {
    let value = serde_json::json!({
        "config": config,
        "target": target,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
