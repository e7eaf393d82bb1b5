//! CLI command for `polybuild doctor`
//!
//! Checks that the toolchains the manifest needs are installed.

use anyhow::Result;
use std::path::Path;

use crate::cli::output::{is_json, is_quiet, print_detail, print_info, print_success, print_warning, status};
use crate::core::doctor::run_doctor;
use crate::core::manifest::Manifest;

/// Execute the doctor command
pub fn execute(manifest_path: &Path) -> Result<()> {
    let base_dir = manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut load_issue = None;
    let manifest = if manifest_path.exists() {
        match Manifest::load(manifest_path) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                load_issue = Some(e.to_string());
                None
            }
        }
    } else {
        None
    };

    let mut report = run_doctor(manifest.as_ref().map(|m| (m, base_dir)));
    report.config_issues.extend(load_issue);

    if is_json() {
        let json = serde_json::json!({
            "status": if report.all_passed() { "success" } else if report.failed_required().is_empty() { "warning" } else { "error" },
            "checks": report.checks,
            "config_issues": report.config_issues,
            "passed_count": report.passed_count(),
            "total_count": report.checks.len(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        if !report.failed_required().is_empty() {
            return Err(anyhow::anyhow!("Missing required toolchains"));
        }
        return Ok(());
    }

    if is_quiet() {
        let failed_required = report.failed_required();
        if !failed_required.is_empty() {
            for check in failed_required {
                eprintln!("{} Missing required: {}", status::ERROR, check.name);
            }
            return Err(anyhow::anyhow!("Missing required toolchains"));
        }
        return Ok(());
    }

    print_info("Checking build toolchains...");
    println!();

    for check in &report.checks {
        let version_str = check
            .version
            .as_ref()
            .map(|v| format!(" (v{v})"))
            .unwrap_or_default();
        let required_str = if check.required { "" } else { " [optional]" };

        if check.passed {
            println!("  {} {}{version_str}{required_str}", status::SUCCESS, check.name);
        } else {
            println!("  {} {}{required_str}", status::ERROR, check.name);
            if let Some(error) = &check.error {
                print_detail(&format!("Error: {error}"));
            }
            if let Some(suggestion) = &check.suggestion {
                print_detail(&format!("Suggestion: {suggestion}"));
            }
        }
    }

    if !report.config_issues.is_empty() {
        println!();
        print_warning("Configuration issues:");
        for issue in &report.config_issues {
            print_detail(&format!("• {issue}"));
        }
    }

    println!();
    let passed = report.passed_count();
    let total = report.checks.len();

    if report.all_passed() {
        print_success(&format!("All checks passed ({passed}/{total})"));
    } else if report.all_required_passed() {
        print_warning(&format!("{passed}/{total} checks passed"));
    } else {
        println!("{} {passed}/{total} checks passed", status::ERROR);
        return Err(anyhow::anyhow!(
            "Missing required toolchains. Install them and run 'polybuild doctor' again."
        ));
    }

    Ok(())
}
