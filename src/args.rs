use std::path::PathBuf;

use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct BaseArgs {
    /// Output as JSON
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Override the GitLab base URL (or via GITLAB_BASE_URL)
    #[arg(
        long,
        env = "GITLAB_BASE_URL",
        hide_env_values = true,
        global = true
    )]
    pub base_url: Option<String>,

    /// Override the stored access token (or via GITLAB_TOKEN)
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Path to a .env file to load before running commands.
    #[arg(long, env = "LAB_ENV_FILE", hide_env_values = true)]
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct CLIArgs<T: Args> {
    #[command(flatten)]
    pub base: BaseArgs,

    #[command(flatten)]
    pub args: T,
}
