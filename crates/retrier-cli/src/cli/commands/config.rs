//! `retrier config` – show where the config lives and what it says.

use anyhow::Result;
use retrier_core::config::{self, RetrierConfig};

pub fn run_config(cfg: &RetrierConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", cfg.to_toml_string()?);
    Ok(())
}
