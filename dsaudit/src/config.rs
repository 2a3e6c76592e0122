//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program. Crashes are most likely
//! to originate from this code, intentionally.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use dsaudit_metrics::Thresholds;
use serde::Deserialize;
use tracing::debug;

use crate::{audit, collector, report};

/// Environment variable that, when set, holds the configuration itself.
pub const CONFIG_ENV: &str = "DSAUDIT_CONFIG";
/// Environment variable consulted for the cluster password.
pub const PASSWORD_ENV: &str = "DSAUDIT_PASSWORD";
/// Where the configuration is looked for when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dsaudit/dsaudit.yaml";

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// Invalid cluster settings
    #[error(transparent)]
    Cluster(#[from] collector::elasticsearch::Error),
    /// Invalid classification thresholds
    #[error(transparent)]
    Thresholds(#[from] dsaudit_metrics::Error),
}

/// Main configuration struct for this program
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// How to reach the cluster
    #[serde(default)]
    pub cluster: collector::Config,
    /// Fan-out and retry behaviour of the audit
    #[serde(default)]
    pub audit: audit::Config,
    /// Classification thresholds
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Presentation of the results
    #[serde(default)]
    pub report: report::Config,
}

impl Config {
    /// Parse and validate configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster settings or thresholds are invalid.
    pub fn validate(&self) -> Result<(), Error> {
        self.cluster.validate()?;
        self.thresholds.validate()?;
        Ok(())
    }

    /// Load configuration for a run.
    ///
    /// The [`CONFIG_ENV`] variable takes precedence over any file. Otherwise
    /// `path` is read and must exist. With no `path`, [`DEFAULT_CONFIG_PATH`]
    /// is read if present and defaults apply if it is not. A password found in
    /// [`PASSWORD_ENV`] replaces any password from the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read or is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut config = match load_contents(path)? {
            Some(contents) => Self::from_yaml(&contents)?,
            None => {
                debug!("No configuration found, using defaults");
                Self::default()
            }
        };
        if let Ok(password) = env::var(PASSWORD_ENV) {
            debug!("Using cluster password from env var '{PASSWORD_ENV}'");
            config.cluster.password = Some(password);
        }
        Ok(config)
    }
}

fn load_contents(path: Option<&Path>) -> Result<Option<String>, Error> {
    if let Ok(env_var_value) = env::var(CONFIG_ENV) {
        debug!("Using config from env var '{CONFIG_ENV}'");
        return Ok(Some(env_var_value));
    }
    let (path, required) = match path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_PATH), false),
    };
    debug!("Attempting to open configuration file at: {}", path.display());
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound && !required => Ok(None),
        Err(err) => Err(Error::ReadFile {
            path: path.to_path_buf(),
            source: Box::new(err),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;

    #[test]
    fn config_deserializes() -> Result<(), Error> {
        let contents = r#"
cluster:
  url: "https://es.example.com:9200"
  username: "elastic"
  password: "changeme"
  request_timeout_seconds: 10
  include_restored: false
audit:
  max_workers: 8
  max_retries: 0
thresholds:
  stagnant_after_days: 7
  short_lived_below_days: 14
report:
  format: json
  sort: ingest
  exclude_stagnant: true
"#;
        let config = Config::from_yaml(contents)?;
        assert_eq!(
            config,
            Config {
                cluster: collector::Config {
                    url: "https://es.example.com:9200".to_string(),
                    username: Some("elastic".to_string()),
                    password: Some("changeme".to_string()),
                    request_timeout_seconds: 10,
                    timestamp_field: "@timestamp".to_string(),
                    include_restored: false,
                },
                audit: audit::Config {
                    max_workers: NonZeroUsize::new(8).expect("8 is non-zero"),
                    max_retries: 0,
                    retry_backoff_milliseconds: 1_000,
                },
                thresholds: Thresholds {
                    stagnant_after_days: 7.0,
                    short_lived_below_days: 14.0,
                    now_within_days: 0.05,
                },
                report: report::Config {
                    format: report::Format::Json,
                    sort: report::Sort::Ingest,
                    exclude_stagnant: true,
                },
            }
        );
        Ok(())
    }

    #[test]
    fn empty_document_is_all_defaults() -> Result<(), Error> {
        let config = Config::from_yaml("{}")?;
        assert_eq!(config, Config::default());
        assert_eq!(config.cluster.url, "http://localhost:9200");
        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = Config::from_yaml("cluster:\n  hostname: es\n");
        assert!(matches!(result, Err(Error::SerdeYaml(_))));
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let result = Config::from_yaml("thresholds:\n  stagnant_after_days: -3\n");
        assert!(matches!(result, Err(Error::Thresholds(_))));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let result = Config::from_yaml("cluster:\n  url: not a url\n");
        assert!(matches!(result, Err(Error::Cluster(_))));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = load_contents(Some(Path::new("/nonexistent/dsaudit.yaml")));
        assert!(matches!(result, Err(Error::ReadFile { .. })));
    }
}
