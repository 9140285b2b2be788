use anyhow::{bail, Context, Result};
use tokio::process::Command;

/// Translate a clone URL into the `namespace/project` path GitLab uses.
///
/// ```text
/// git@gitlab.com:Ackerr/lab.git            -> Ackerr/lab
/// ssh://git@gitlab.com:2222/Ackerr/lab.git -> Ackerr/lab
/// https://gitlab.com/Ackerr/lab.git        -> Ackerr/lab
/// ```
///
/// For instances served under a sub path, `base_url` is stripped first.
pub fn project_path_from_git_url(base_url: &str, git_url: &str) -> Option<String> {
    let url = git_url.trim();
    let base_url = base_url.trim_end_matches('/');

    let under_base = url
        .strip_prefix(base_url)
        .filter(|rest| !base_url.is_empty() && rest.starts_with('/'));

    let path = if let Some(rest) = under_base {
        rest
    } else if let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("ssh://"))
    {
        // drop user@host[:port]
        &rest[rest.find('/')?..]
    } else if url.contains('@') && url.contains(':') {
        // scp-like syntax: user@host:path
        url.split_once(':')?.1
    } else {
        return None;
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path).trim_end_matches('/');
    (path.contains('/')).then(|| path.to_string())
}

async fn git(args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .output()
        .await
        .context("failed to run git")?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// The project path of the `origin` remote in the current directory.
pub async fn origin_project(base_url: &str) -> Result<String> {
    let url = git(&["remote", "get-url", "origin"])
        .await
        .context("not inside a git repository with an origin remote; pass --project")?;
    match project_path_from_git_url(base_url, &url) {
        Some(path) => Ok(path),
        None => bail!("could not derive a project path from remote {url}; pass --project"),
    }
}

/// `None` on a detached HEAD or outside a repository.
pub async fn current_branch() -> Option<String> {
    git(&["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .ok()
        .filter(|b| !b.is_empty() && b != "HEAD")
}
