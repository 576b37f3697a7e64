//! Configuration display.

use console::style;

use crate::config::Config;

/// Print the effective configuration (file + environment) as TOML.
pub(crate) fn cmd_config_show(config: &Config) -> anyhow::Result<()> {
    match config.source_path {
        Some(ref path) => eprintln!("{} Source: {}", style("→").dim(), path.display()),
        None => eprintln!("{} No config file found; showing defaults", style("!").yellow()),
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
