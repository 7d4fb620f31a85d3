use super::describe_registry;
use anyhow::Result;
use conductor_core::ConductorConfig;

/// Print the reminder exactly as it would be appended to a system prompt.
/// Unknown roles print nothing.
pub fn execute(config: &ConductorConfig, role: &str) -> Result<()> {
    let (_, roles) = describe_registry(config)?;
    print!("{}", roles.build_reminder(role));
    Ok(())
}
