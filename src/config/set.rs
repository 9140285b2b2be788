use anyhow::Result;

use crate::ui::{print_command_status, CommandStatus};

pub fn run(key: &str, value: &str) -> Result<()> {
    let path = super::config_path()?;
    let mut cfg = super::load_file(&path);

    cfg.set_field(key, value)?;
    super::save_file(&path, &cfg)?;

    let shown = if key == "token" { "********" } else { value };
    print_command_status(CommandStatus::Success, &format!("Set {key} = {shown}"));
    Ok(())
}

pub fn unset(key: &str) -> Result<()> {
    let path = super::config_path()?;
    let mut cfg = super::load_file(&path);

    cfg.unset_field(key);
    super::save_file(&path, &cfg)?;

    print_command_status(CommandStatus::Success, &format!("Unset {key}"));
    Ok(())
}
