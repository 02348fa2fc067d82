//! Configuration loading for the service endpoint CLI.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `AZDO_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::schema::SchemaGeneration;
use crate::secrets::SecretString;

const ENV_PREFIX: &str = "AZDO_";

/// Application configuration derived from `AZDO_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Organization URL, e.g. `https://dev.azure.com/contoso`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_access_token: Option<SecretString>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub schema_generation: SchemaGeneration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            org_service_url: None,
            personal_access_token: None,
            api_version: default_api_version(),
            request_timeout_ms: default_request_timeout_ms(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            schema_generation: SchemaGeneration::default(),
        }
    }
}

/// Everything the REST client needs to reach the organization.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub org_service_url: String,
    pub personal_access_token: SecretString,
    pub api_version: String,
    pub request_timeout: Duration,
}

impl AppConfig {
    /// Connection settings, failing when the organization or token is unset.
    pub fn remote(&self) -> Result<RemoteSettings, ConfigError> {
        let org_service_url = self
            .org_service_url
            .clone()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingOrgServiceUrl)?;
        let personal_access_token = self
            .personal_access_token
            .clone()
            .filter(|token| !token.expose().is_empty())
            .ok_or(ConfigError::MissingPersonalAccessToken)?;

        Ok(RemoteSettings {
            org_service_url,
            personal_access_token,
            api_version: self.api_version.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        })
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Validates bounds and formats of the loaded values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        if !(1_000..=300_000).contains(&self.request_timeout_ms) {
            return Err(ConfigError::InvalidRequestTimeout {
                value: self.request_timeout_ms,
            });
        }

        if self.api_version.trim().is_empty() {
            return Err(ConfigError::EmptyApiVersion);
        }

        if let Some(ref raw) = self.org_service_url {
            let valid = Url::parse(raw)
                .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
                .unwrap_or(false);
            if !valid {
                return Err(ConfigError::InvalidOrgServiceUrl { value: raw.clone() });
            }
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_version() -> String {
    "6.0-preview.4".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("organization URL is missing; set AZDO_ORG_SERVICE_URL environment variable")]
    MissingOrgServiceUrl,
    #[error(
        "personal access token is missing; set AZDO_PERSONAL_ACCESS_TOKEN environment variable"
    )]
    MissingPersonalAccessToken,
    #[error("organization URL must be an absolute http or https URL, got '{value}'")]
    InvalidOrgServiceUrl { value: String },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("request timeout must be between 1000 and 300000 milliseconds, got {value}")]
    InvalidRequestTimeout { value: u64 },
    #[error("api version must not be empty")]
    EmptyApiVersion,
    #[error("invalid schema generation: {reason}")]
    InvalidSchemaGeneration { reason: String },
}

/// Loads configuration using layered `.env` files and `AZDO_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.{profile}`, `.env.{profile}.local`,
    /// then the process environment, later sources winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let org_service_url = layered
            .remove("ORG_SERVICE_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let personal_access_token = layered
            .remove("PERSONAL_ACCESS_TOKEN")
            .filter(|v| !v.is_empty())
            .map(SecretString::from);
        let api_version = layered
            .remove("API_VERSION")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_version);
        let request_timeout_ms = layered
            .remove("REQUEST_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_request_timeout_ms);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let schema_generation = match layered.remove("SCHEMA_GENERATION").filter(|v| !v.is_empty())
        {
            Some(raw) => raw
                .parse()
                .map_err(|reason| ConfigError::InvalidSchemaGeneration { reason })?,
            None => SchemaGeneration::default(),
        };

        let config = AppConfig {
            profile,
            org_service_url,
            personal_access_token,
            api_version,
            request_timeout_ms,
            log_level,
            log_format,
            schema_generation,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("AZDO_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
