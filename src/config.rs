use std::collections::HashMap;
use std::fs;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {0}.")]
    Unreadable(String),
    #[error("Invalid config line {0}.")]
    InvalidLine(String),
    #[error("Missing config property {0}.")]
    MissingProperty(String),
}

/// Integer-valued `key=value` configuration. Lines starting with `#` are
/// comments.
pub struct Config {
    properties: HashMap<String, i64>,
}

impl Config {
    pub fn load(name: &str) -> Result<Self, ConfigError> {
        let text =
            fs::read_to_string(name).map_err(|_| ConfigError::Unreadable(name.to_string()))?;

        let mut properties = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidLine(line.to_string()))?;
            let value = value
                .trim()
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidLine(line.to_string()))?;
            properties.insert(key.trim().to_string(), value);
        }
        Ok(Config { properties })
    }

    pub fn get(&self, name: &str) -> Result<i64, ConfigError> {
        self.properties
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::MissingProperty(name.to_string()))
    }
}

#[cfg(test)]
mod config_test {
    use super::*;

    fn scratch_file(name: &str, text: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("clesh_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_load_and_get() {
        let path = scratch_file("config", "# window\nmemory=1024\nwidth = 640\nheight=480\n");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.get("memory").unwrap(), 1024);
        assert_eq!(config.get("width").unwrap(), 640);
        assert!(matches!(
            config.get("program"),
            Err(ConfigError::MissingProperty(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::load("no_such_config_file"),
            Err(ConfigError::Unreadable(_))
        ));
    }

    #[test]
    fn test_invalid_line() {
        let path = scratch_file("bad", "memory\n");
        assert!(matches!(
            Config::load(path.to_str().unwrap()),
            Err(ConfigError::InvalidLine(_))
        ));
    }
}
