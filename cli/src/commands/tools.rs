use super::describe_registry;
use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use conductor_core::{ConductorConfig, ToolSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

pub fn execute(config: &ConductorConfig, role: Option<&str>, format: OutputFormat) -> Result<()> {
    let (catalog, roles) = describe_registry(config)?;

    let tools: Vec<ToolSummary> = match role {
        Some(role) => roles
            .tools_for_role(role)
            .iter()
            .filter_map(|name| catalog.get(name))
            .map(|t| t.summary())
            .collect(),
        None => catalog.summaries(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tools)?),
        OutputFormat::Table => print_table(role, &tools),
    }

    Ok(())
}

fn print_table(role: Option<&str>, tools: &[ToolSummary]) {
    let title = match role {
        Some(role) => format!("Tools for role {}", role),
        None => "Tool catalog".to_string(),
    };

    if tools.is_empty() {
        println!("{}", format!("{}: none", title).yellow());
        return;
    }

    println!("\n{}", title.green().bold());
    println!("{}", "─".repeat(80).dimmed());
    println!("{:<20} {}", "NAME".bold(), "DESCRIPTION".bold());
    println!("{}", "─".repeat(80).dimmed());

    for tool in tools {
        println!("{:<20} {}", tool.name.cyan(), tool.description);
    }
    println!();
}
