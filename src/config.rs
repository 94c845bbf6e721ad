use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Default toolkit installation directory.
pub const DEFAULT_INSTALLATION_PATH: &str = "C:\\Program Files\\Microsoft Deployment Toolkit";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("mdtctl"))
}

/// The mdtctl configuration structure
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Default deployment share for request documents that don't name one
    #[serde(default)]
    pub share_path: Option<String>,

    /// Toolkit installation directory
    #[serde(default)]
    pub installation_path: Option<String>,
}

impl Config {
    /// Load the config from ~/.config/mdtctl/config.toml
    pub fn load() -> Result<Self> {
        let config_path = config_dir()?.join("config.toml");

        if !config_path.exists() {
            // Return default config if file doesn't exist
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Could not read config file: {}", config_path.display()))?;
        toml::from_str(&content).context("Invalid TOML format in mdtctl config")
    }

    /// The toolkit installation directory, expanded.
    pub fn installation_path(&self) -> PathBuf {
        let raw = self
            .installation_path
            .as_deref()
            .unwrap_or(DEFAULT_INSTALLATION_PATH);
        PathBuf::from(shellexpand::tilde(raw).as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_installation_path() {
        let config = Config::default();
        assert_eq!(
            config.installation_path(),
            PathBuf::from(DEFAULT_INSTALLATION_PATH)
        );
    }

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(
            r#"
share_path = "C:\\MDTShare"
installation_path = "D:\\MDT"
"#,
        )
        .unwrap();
        assert_eq!(config.share_path.as_deref(), Some("C:\\MDTShare"));
        assert_eq!(config.installation_path(), PathBuf::from("D:\\MDT"));
    }
}
