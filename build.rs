use std::env;
use std::process::Command;

fn git_describe() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=10", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

fn main() {
    let pkg_version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let version = env::var("LAB_VERSION_STRING")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| match git_describe() {
            Some(sha) => format!("{pkg_version}+{sha}"),
            None => pkg_version.clone(),
        });
    println!("cargo:rustc-env=LAB_VERSION_STRING={version}");
    println!("cargo:rerun-if-env-changed=LAB_VERSION_STRING");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
