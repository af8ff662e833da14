use crate::database::DatabaseSettings;
use anyhow::{anyhow, Result};
use config::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Database declared in the configuration file, owned by the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PlugdbConfig {
    /// How long statements wait on a locked database, in milliseconds.
    /// Unset keeps the SQLite default.
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,

    /// Databases registered by the application at startup
    #[serde(default)]
    pub databases: Vec<DatabaseEntry>,
}

const EMPTY_CONFIG: &str = r#"### plugdb configuration file

### how long statements wait on a locked database (milliseconds)
# busy_timeout_ms = 5000

### databases registered by the application itself
# [[databases]]
# name = "main"
# url = "sqlite:///main.sqlite3"
# description = "application database"
"#;

impl PlugdbConfig {
    /// Function to create and initialize a new configuration
    ///
    /// Reads the given TOML file, or `$HOME/.plugdb/plugdb.toml` by default,
    /// writing a commented template when the file does not exist. Settings
    /// from `PLUGDB_*` environment variables override the file.
    pub fn new(path: &Option<String>) -> Result<PlugdbConfig> {
        let mut builder = Config::builder();

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                let plugdb_dir = Self::config_dir()?;
                std::fs::create_dir_all(plugdb_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create plugdb directory: {}", e))?;
                let p = format!("{}/plugdb.toml", plugdb_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // E.g., `PLUGDB_BUSY_TIMEOUT_MS=2000 plugdb database list`
        builder = builder.add_source(config::Environment::with_prefix("PLUGDB").try_parsing(true));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<PlugdbConfig>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configuration that could never be registered
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.databases {
            if entry.name.is_empty() {
                return Err(anyhow!("Configured database with url {} has no name", entry.url));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(anyhow!("Database {} is configured twice", entry.name));
            }
        }
        Ok(())
    }

    /// Connection settings applied to every database
    pub fn database_settings(&self) -> DatabaseSettings {
        DatabaseSettings {
            busy_timeout: self.busy_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let timeout = match self.busy_timeout_ms {
            Some(ms) => format!("{} ms", ms),
            None => "driver default".to_string(),
        };
        let mut lines = vec![
            format!("Config File:        {}", Self::config_file_path()),
            format!("Busy Timeout:       {}", timeout),
            format!("Databases:          {}", self.databases.len()),
        ];
        for entry in &self.databases {
            lines.push(format!("  {:<18}{}", entry.name, entry.url));
        }
        lines.join("\n")
    }

    fn config_dir() -> Result<String> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?
            .to_owned();
        Ok(format!("{}/.plugdb", home_dir))
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.plugdb/plugdb.toml", home_dir)
    }
}
