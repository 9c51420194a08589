use anyhow::{Context, Result};
use clap::Args;
use lead_core::config::Settings;
use std::path::Path;
use tracing::info;

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    tracing::info!("loading config from `{}`...", path.display());

    let config_data = std::fs::read_to_string(path)
        .with_context(|| format!("could not read config from `{}`", path.display()))?;

    let settings: Settings = toml::from_str(&config_data).context("could not parse TOML")?;
    Ok(settings.apply_env_overrides())
}

#[derive(Debug, Args)]
#[clap(about = "verify configuration")]
pub struct Command {
    #[clap(env, default_value = "config.toml")]
    config_file: String,
}

impl Command {
    pub async fn execute(self) -> Result<()> {
        let settings = load_settings(&self.config_file)?;
        info!("{settings:#?}");
        Ok(())
    }
}
