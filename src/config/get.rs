use anyhow::{bail, Result};

use crate::args::BaseArgs;

pub fn run(base: BaseArgs, key: &str) -> Result<()> {
    let cfg = super::load()?;

    match cfg.get_field(key) {
        Some(value) => {
            if base.json {
                println!("{}", serde_json::to_string(&value)?);
            } else {
                println!("{value}");
            }
            Ok(())
        }
        None => bail!("{key} is not set"),
    }
}
