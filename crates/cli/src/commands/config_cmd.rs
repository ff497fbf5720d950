//! `ledgerbridge config` — Print configuration.

use ledgerbridge_config::AppConfig;
use std::path::Path;

use crate::pipeline;

pub fn run(config_path: Option<&Path>, default: bool) -> Result<(), Box<dyn std::error::Error>> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = pipeline::load_config(config_path)?;
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    println!("# {}", path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = ledgerbridge_config::AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains(".ledgerbridge"));
    }
}
