use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use courier_common::{Clock, SystemClock, internal};
use courier_dispatch::{ConfigError, DispatchConfig, DispatchEngine, TransportConfig};
use serde::{Deserialize, Serialize};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "COURIER_CONFIG";

/// Locations searched, in order, when neither `--config` nor
/// [`CONFIG_ENV`] is given
pub const DEFAULT_CONFIG_PATHS: [&str; 2] =
    ["./courier.config.ron", "/etc/courier/courier.config.ron"];

/// One configured delivery provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub transport: TransportConfig,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            name: name.into(),
            transport,
        }
    }
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new("ProviderA", TransportConfig::default()),
        ProviderConfig::new("ProviderB", TransportConfig::default()),
    ]
}

/// Application configuration, and the owner of everything built from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Courier {
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Providers in priority order
    #[serde(alias = "provider", default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for Courier {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            providers: default_providers(),
        }
    }
}

impl Courier {
    /// Parse a RON configuration document
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is not a valid configuration.
    pub fn from_ron(content: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(content)?)
    }

    /// Load the configuration from `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or parsed.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::from_ron(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load the effective configuration
    ///
    /// Falls back to the built-in defaults when no file is found.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file is missing, or the chosen
    /// file can't be read or parsed.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let search = DEFAULT_CONFIG_PATHS.map(PathBuf::from);
        let env = std::env::var(CONFIG_ENV).ok();

        match find_config_file(explicit, env.as_deref(), &search)? {
            Some(path) => {
                internal!(level = DEBUG, "Loading configuration from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                internal!(level = DEBUG, "No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// The configuration as a pretty-printed RON document
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_ron(&self) -> anyhow::Result<String> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Build a dispatch engine running on the system clock
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid.
    pub fn engine(&self) -> Result<DispatchEngine, ConfigError> {
        self.engine_with_clock(Arc::new(SystemClock))
    }

    /// Build a dispatch engine running on `clock`
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid.
    pub fn engine_with_clock(&self, clock: Arc<dyn Clock>) -> Result<DispatchEngine, ConfigError> {
        self.providers
            .iter()
            .fold(
                DispatchEngine::builder(self.dispatch.clone()).clock(clock),
                |builder, provider| {
                    builder.provider(provider.name.as_str(), provider.transport.build(&provider.name))
                },
            )
            .build()
    }
}

/// Find the configuration file using the following precedence:
/// 1. `explicit`, from the `--config` flag
/// 2. `env`, the value of [`CONFIG_ENV`]
/// 3. the first of `search` that exists
///
/// Returns `Ok(None)` when nothing was named and nothing was found.
///
/// # Errors
///
/// Returns an error if `explicit` or `env` names a file that does not exist.
pub fn find_config_file(
    explicit: Option<&Path>,
    env: Option<&str>,
    search: &[PathBuf],
) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Some(env_path) = env {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    Ok(search.iter().find(|path| path.exists()).cloned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_providers() {
        let courier = Courier::default();
        let names: Vec<_> = courier.providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["ProviderA", "ProviderB"]);
        assert_eq!(
            courier.providers[0].transport,
            TransportConfig::Simulated {
                fail_rate: 0.3,
                seed: None
            }
        );
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(Courier::from_ron("()").unwrap(), Courier::default());
    }

    #[test]
    fn test_pretty_output_parses_back() {
        let courier = Courier::default();
        let text = courier.to_ron().unwrap();
        assert!(text.contains("ProviderA"));
        assert_eq!(Courier::from_ron(&text).unwrap(), courier);
    }

    #[test]
    fn test_empty_provider_list_is_rejected() {
        let courier = Courier::from_ron("(providers: [])").unwrap();
        assert_eq!(courier.engine().unwrap_err(), ConfigError::NoProviders);
    }

    #[test]
    fn test_nothing_named_nothing_found() {
        let found = find_config_file(None, None, &[PathBuf::from("/nonexistent/courier.ron")]);
        assert_eq!(found.unwrap(), None);
    }
}
