use anyhow::Result;
use serde_json::{Map, Value};

use crate::args::BaseArgs;

pub fn run(base: BaseArgs, show_token: bool) -> Result<()> {
    let path = super::config_path()?;
    let config = super::load_file(&path);

    let output = format_fields(&config, base.json, show_token)?;
    if base.json {
        // json goes to stdout so it can be piped to other tools
        println!("{output}");
    } else if output.is_empty() {
        eprintln!("No values set in {}", path.display());
    } else {
        eprintln!("{}\n{output}", path.display());
    }

    Ok(())
}

fn format_fields(config: &super::Config, json: bool, show_token: bool) -> Result<String> {
    let fields: Vec<(&str, String)> = config
        .non_empty_fields()
        .into_iter()
        .map(|(k, v)| {
            if k == "token" && !show_token {
                (k, mask(&v))
            } else {
                (k, v)
            }
        })
        .collect();

    if json {
        let map: Map<String, Value> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
            .collect();
        Ok(serde_json::to_string(&map)?)
    } else {
        Ok(fields
            .iter()
            .map(|(k, v)| format!("  {k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Env references stay readable; literal tokens keep only their last 4 chars.
fn mask(token: &str) -> String {
    if token.starts_with('$') {
        return token.to_string();
    }
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
