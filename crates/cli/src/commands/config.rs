//! `hare-gate config`: inspect or create configuration files.

use anyhow::{Result, bail};

use crate::config::Config;

/// Show the effective configuration
pub async fn cmd_config_show(config: &Config, explicit: bool) -> Result<()> {
  if explicit {
    println!("Using config given on the command line");
  } else if Config::project_config_path().exists() {
    println!("Using project config: {:?}", Config::project_config_path());
  } else if let Some(user_path) = Config::user_config_path()
    && user_path.exists()
  {
    println!("Using user config: {:?}", user_path);
  } else {
    println!("Using default configuration (no config file found)");
  }
  println!();

  // Show config as TOML
  let toml_str = toml::to_string_pretty(config)?;
  println!("{}", toml_str);

  Ok(())
}

/// Write the default configuration to ./hare-gate.toml
pub async fn cmd_config_init(force: bool) -> Result<()> {
  let config_path = Config::project_config_path();

  if config_path.exists() && !force {
    bail!("Config file already exists: {:?} (use --force to overwrite)", config_path);
  }

  let template = Config::generate_template()?;
  tokio::fs::write(&config_path, template).await?;
  println!("Created config file: {:?}", config_path);

  Ok(())
}
