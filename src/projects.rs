use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use crate::args::BaseArgs;
use crate::config::Settings;
use crate::ui::{print_command_status, CommandStatus};

#[derive(Debug, Clone, Args)]
pub struct ProjectsArgs {
    /// Only print projects whose path contains this text
    #[arg(value_name = "FILTER")]
    filter: Option<String>,
}

pub fn run(base: BaseArgs, args: ProjectsArgs) -> Result<()> {
    let settings = Settings::load(&base)?;
    let mut projects = read_projects(&settings.projects_file)?;
    if projects.is_empty() {
        print_command_status(
            CommandStatus::Warning,
            "No projects synced yet. Run `lab sync` first.",
        );
        return Ok(());
    }

    if let Some(filter) = args.filter.as_deref().map(str::to_lowercase) {
        projects.retain(|p| p.to_lowercase().contains(&filter));
    }

    if base.json {
        println!("{}", serde_json::to_string(&projects)?);
    } else {
        for project in projects {
            println!("{project}");
        }
    }
    Ok(())
}

/// Persist the synced project list, one path per line.
pub fn write_projects(path: &Path, projects: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut contents = projects.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, contents)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// A missing file means nothing has been synced yet.
pub fn read_projects(path: &Path) -> Result<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}
