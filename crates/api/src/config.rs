use annotate::StoreOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreOptions,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub project_dir: String,
    /// Allow any origin, for a UI served from another port.
    pub cors_permissive: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:3000".to_string(),
                project_dir: "data/projects".to_string(),
                cors_permissive: false,
            },
            store: StoreOptions::default(),
            logging: LoggingConfig {
                format: LogFormat::Pretty,
            },
        }
    }
}

impl AppConfig {
    /// Defaults overridden by environment variables.
    ///
    /// | Env Var                   | Default          |
    /// |---------------------------|------------------|
    /// | `BIND_ADDR`               | `0.0.0.0:3000`   |
    /// | `PROJECT_DIR`             | `data/projects`  |
    /// | `CORS_PERMISSIVE`         | `false`          |
    /// | `CHECK_OVERLAP_ON_UPDATE` | `false`          |
    /// | `LOG_FORMAT`              | `pretty`         |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.server.bind_addr = addr;
        }
        if let Some(dir) = lookup("PROJECT_DIR") {
            config.server.project_dir = dir;
        }
        if let Some(flag) = lookup("CORS_PERMISSIVE") {
            config.server.cors_permissive = flag
                .trim()
                .parse()
                .context("CORS_PERMISSIVE must be true or false")?;
        }
        if let Some(flag) = lookup("CHECK_OVERLAP_ON_UPDATE") {
            config.store.check_overlap_on_update = flag
                .trim()
                .parse()
                .context("CHECK_OVERLAP_ON_UPDATE must be true or false")?;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.logging.format = match format.trim().to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" | "text" => LogFormat::Pretty,
                other => anyhow::bail!("Unknown LOG_FORMAT: {}", other),
            };
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.server.project_dir, "data/projects");
        assert!(!config.store.check_overlap_on_update);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PROJECT_DIR", "/srv/projects"),
            ("CHECK_OVERLAP_ON_UPDATE", "true"),
            ("LOG_FORMAT", "JSON"),
            ("CORS_PERMISSIVE", " true "),
        ]))
        .unwrap();
        assert_eq!(config.server.project_dir, "/srv/projects");
        assert!(config.store.check_overlap_on_update);
        assert!(config.server.cors_permissive);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values() {
        assert!(AppConfig::from_lookup(lookup(&[("CHECK_OVERLAP_ON_UPDATE", "yes")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).is_err());
    }
}
