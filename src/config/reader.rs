use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::de::Error as SerdeDeError;

use super::ConfigError;

/// Key/value view over one TOML config file.
///
/// Typed settings are deserialized from the whole table; collaborator
/// factories look up individual keys with [`ConfigReader::get_value`].
#[derive(Debug, Clone, Default)]
pub struct ConfigReader {
    path: Option<PathBuf>,
    table: toml::Table,
}

impl ConfigReader {
    /// Read a TOML file, treating a missing file as an empty table.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("Config {} not found; using defaults", path.display());
            return Ok(Self {
                path: Some(path.to_path_buf()),
                table: toml::Table::new(),
            });
        }
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source: SerdeDeError::custom(source),
        })?;
        let mut reader = Self::from_toml_str(&text).map_err(|err| match err {
            ConfigError::ParseToml { source, .. } => ConfigError::ParseToml {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        reader.path = Some(path.to_path_buf());
        Ok(reader)
    }

    /// Parse TOML text held in memory.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let table = text
            .parse::<toml::Table>()
            .map_err(|source| ConfigError::ParseToml {
                path: PathBuf::new(),
                source,
            })?;
        Ok(Self { path: None, table })
    }

    /// Look up a dotted key (`pipeline.trace_dimension`) and render it as a string.
    pub fn get_value(&self, key: &str) -> Option<String> {
        let mut parts = key.split('.');
        let first = parts.next()?;
        let mut value = self.table.get(first)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        Some(match value {
            toml::Value::String(text) => text.clone(),
            toml::Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    toml::Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            other => other.to_string(),
        })
    }

    /// Deserialize the whole table into a typed settings struct.
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        toml::Value::Table(self.table.clone())
            .try_into()
            .map_err(|source| ConfigError::ParseToml {
                path: self.path.clone().unwrap_or_default(),
                source,
            })
    }
}
