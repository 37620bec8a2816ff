//! `rangefetch config` – show where the config lives and what is in effect.

use anyhow::{Context, Result};
use rangefetch_core::config;

pub fn run_config() -> Result<()> {
    let path = config::config_path()?;
    let mut cfg = config::load_or_init()?;
    cfg.apply_env()?;
    println!("# {}", path.display());
    print!(
        "{}",
        toml::to_string_pretty(&cfg).context("render effective config")?
    );
    Ok(())
}
