//! Layered configuration loading
//!
//! Layers are applied in order, later ones winning: built-in defaults, an
//! optional TOML file, environment variables, then explicit overrides
//! (typically command line flags).

use std::path::{Path, PathBuf};

use ::config::builder::DefaultState;
use ::config::{ConfigBuilder, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::types::{Error, Result};

/// Source of configuration data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Built-in default values
    Default,
    /// Configuration file
    File(PathBuf),
    /// Environment variables with the given prefix
    Environment(String),
    /// Explicit overrides such as command line arguments
    CommandLine,
}

/// Builder for a configuration assembled from several sources
pub struct LayeredConfig {
    builder: ConfigBuilder<DefaultState>,
    sources: Vec<ConfigSource>,
}

impl LayeredConfig {
    /// Start from the serialized form of `defaults`
    pub fn with_defaults<T: Serialize>(defaults: &T) -> Result<Self> {
        let defaults = ::config::Config::try_from(defaults)?;
        Ok(Self {
            builder: ::config::Config::builder().add_source(defaults),
            sources: vec![ConfigSource::Default],
        })
    }

    /// Layer a TOML file; a missing file is an error
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        self.builder = self
            .builder
            .add_source(File::from(path).format(FileFormat::Toml).required(true));
        self.sources.push(ConfigSource::File(path.to_path_buf()));
        self
    }

    /// Layer environment variables named `{PREFIX}__{SECTION}__{KEY}`.
    ///
    /// Keys listed in `list_keys` are split on commas.
    pub fn env(mut self, prefix: &str, list_keys: &[&str]) -> Self {
        let mut environment = Environment::with_prefix(prefix)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true);

        if !list_keys.is_empty() {
            environment = environment.list_separator(",");
            for key in list_keys {
                environment = environment.with_list_parse_key(key);
            }
        }

        self.builder = self.builder.add_source(environment);
        self.sources.push(ConfigSource::Environment(prefix.to_string()));
        self
    }

    /// Force a single key, e.g. from a command line flag
    pub fn set_override<V: Into<::config::Value>>(mut self, key: &str, value: V) -> Result<Self> {
        self.builder = self.builder.set_override(key, value)?;
        if self.sources.last() != Some(&ConfigSource::CommandLine) {
            self.sources.push(ConfigSource::CommandLine);
        }
        Ok(self)
    }

    /// Like [`set_override`](Self::set_override) but skips `None`
    pub fn set_override_option<V: Into<::config::Value>>(self, key: &str, value: Option<V>) -> Result<Self> {
        match value {
            Some(value) => self.set_override(key, value),
            None => Ok(self),
        }
    }

    pub fn sources(&self) -> &[ConfigSource] {
        &self.sources
    }

    /// Merge all layers and deserialize the result
    pub fn load<T: DeserializeOwned>(self) -> Result<T> {
        debug!("Loading configuration from {:?}", self.sources);
        let merged = self.builder.build()?;
        merged
            .try_deserialize()
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))
    }
}
