//! Setup check - validates config, role bindings and the project registry

use anyhow::{bail, Result};
use colored::Colorize;
use conductor_core::tools::PROJECT_ROOT_ENV;
use conductor_core::{build_registry, AgentRole, ConductorConfig, FileService};
use conductor_daemon::read_snapshot;
use std::path::Path;
use std::sync::Arc;

/// Check status indicator
enum Status {
    Ok,
    Warning,
    Error,
    NotConfigured,
}

impl Status {
    fn symbol(&self) -> String {
        match self {
            Status::Ok => "✓".green().to_string(),
            Status::Warning => "!".yellow().to_string(),
            Status::Error => "✗".red().to_string(),
            Status::NotConfigured => "○".dimmed().to_string(),
        }
    }
}

#[derive(Default)]
struct Report {
    errors: usize,
}

impl Report {
    fn check(&mut self, status: Status, label: &str, value: &str) {
        if matches!(status, Status::Error) {
            self.errors += 1;
        }
        println!("  {} {}: {}", status.symbol(), label, value);
    }
}

fn print_section(title: &str) {
    println!("\n{}", title.bold());
}

pub fn execute(config: &ConductorConfig, config_path: Option<&Path>) -> Result<()> {
    let mut report = Report::default();

    print_section("Configuration");
    let source = config_path
        .map(Path::to_path_buf)
        .or_else(ConductorConfig::default_path)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());
    report.check(Status::Ok, "Source", &source);
    match config.validate() {
        Ok(()) => report.check(Status::Ok, "Validation", "passed"),
        Err(e) => report.check(Status::Error, "Validation", &e.to_string()),
    }

    print_section("Sandbox");
    let files = match FileService::from_env() {
        Ok(files) => {
            report.check(Status::Ok, PROJECT_ROOT_ENV, &files.root().display().to_string());
            Some(files)
        }
        Err(e) => {
            report.check(Status::Warning, PROJECT_ROOT_ENV, &format!("{} (needed by serve)", e));
            None
        }
    };

    print_section("Role map");
    let files = match files {
        Some(files) => files,
        None => FileService::new(std::env::current_dir()?)?,
    };
    match build_registry(config, Arc::new(files)) {
        Ok((catalog, roles)) => {
            report.check(Status::Ok, "Catalog", &format!("{} tools", catalog.len()));
            for role in AgentRole::ALL {
                let count = roles.tools_for(role).len();
                let status = if count == 0 { Status::Warning } else { Status::Ok };
                report.check(status, role.as_str(), &format!("{} tools", count));
            }
        }
        Err(e) => report.check(Status::Error, "Bindings", &e.to_string()),
    }

    print_section("Project registry");
    match config.registry.path.as_deref() {
        None => report.check(Status::NotConfigured, "Snapshot", "not configured"),
        Some(path) => match read_snapshot(path) {
            Ok(projects) => {
                let local = projects.iter().filter(|p| p.local_path.is_some()).count();
                report.check(
                    Status::Ok,
                    "Snapshot",
                    &format!("{} projects ({} with local paths)", projects.len(), local),
                );
            }
            Err(e) => report.check(
                Status::Error,
                "Snapshot",
                &format!("{}: {}", path.display(), e),
            ),
        },
    }

    print_section("Orchestrator");
    report.check(Status::Ok, "Completion URL", &config.orchestrator.completion_url());

    println!();
    if report.errors > 0 {
        bail!("{} check(s) failed", report.errors);
    }
    println!("{}", "All checks passed".green());
    Ok(())
}
