use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub workspace_dir: PathBuf,
    /// Seconds between flush cycles. Workers clamp this to 1..=60.
    pub flush_interval_secs: u64,
    /// Batches larger than this trigger compaction of the persisted table.
    pub compact_threshold: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        // Be resilient in environments without HOME by falling back to CWD.
        let base_dir = dirs::home_dir()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let workspace_dir = base_dir.join(".whowas");

        Self {
            workspace_dir,
            flush_interval_secs: 5,
            compact_threshold: 20_000,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let config_path = defaults.workspace_dir.join("config.toml");

        let mut builder = Config::builder()
            // Avoid panics on non-UTF8 paths by using lossy conversion.
            .set_default(
                "workspace_dir",
                defaults.workspace_dir.to_string_lossy().as_ref(),
            )?
            .set_default("flush_interval_secs", defaults.flush_interval_secs)?
            .set_default("compact_threshold", defaults.compact_threshold as u64)?;

        if config_path.exists() {
            builder = builder.add_source(File::from(config_path));
        }

        // Environment variables override the config file.
        builder = builder.add_source(Environment::with_prefix("WHOWAS"));

        let config = builder.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.flush_interval_secs, 5);
        assert_eq!(config.compact_threshold, 20_000);
        assert!(config.workspace_dir.ends_with(".whowas"));
    }
}
