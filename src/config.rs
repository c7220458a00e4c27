use std::fmt;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::models::MonitoredIdMap;

pub const TWITCH_AUTH_URL: &str = "https://id.twitch.tv/oauth2/token";
pub const TWITCH_API_BASE: &str = "https://api.twitch.tv";
pub const STEAM_API_BASE: &str = "https://api.steampowered.com";

const DEFAULT_TWITCH_DESTINATION: &str = "/Volumes/workspace/default/my_volume/raw/twitch";
const DEFAULT_STEAM_DESTINATION: &str = "/Volumes/workspace/default/my_volume/raw/steam";

/// A credential value. Formatting never prints the contents.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Clone)]
pub struct TwitchCredentials {
    pub client_id: String,
    pub client_secret: Secret,
}

/// Base paths in the landing area, one per source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    pub twitch: String,
    pub steam: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Self {
            twitch: DEFAULT_TWITCH_DESTINATION.to_string(),
            steam: DEFAULT_STEAM_DESTINATION.to_string(),
        }
    }
}

/// Read-only access to credentials and monitored games.
///
/// Every method is called once per run so that rotated secrets and edited
/// game lists are picked up without restarting anything.
pub trait ConfigProvider: Send + Sync {
    fn twitch_credentials(&self) -> Result<TwitchCredentials>;
    fn steam_api_key(&self) -> Result<Secret>;
    fn twitch_games(&self) -> Result<MonitoredIdMap>;
    fn steam_games(&self) -> Result<MonitoredIdMap>;
    fn destinations(&self) -> Destinations;
}

/// Provider backed by process environment variables.
#[derive(Debug, Default, Clone)]
pub struct EnvConfigProvider;

impl EnvConfigProvider {
    pub fn new() -> Self {
        Self
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn twitch_credentials(&self) -> Result<TwitchCredentials> {
        Ok(TwitchCredentials {
            client_id: required("TWITCH_CLIENT_ID")?,
            client_secret: Secret::new(required("TWITCH_CLIENT_SECRET")?),
        })
    }

    fn steam_api_key(&self) -> Result<Secret> {
        required("STEAM_API_KEY").map(Secret::new)
    }

    fn twitch_games(&self) -> Result<MonitoredIdMap> {
        MonitoredIdMap::from_json(&required("JOGOS_PARA_MONITORAR_TWITCH")?)
    }

    fn steam_games(&self) -> Result<MonitoredIdMap> {
        MonitoredIdMap::from_json(&required("JOGOS_PARA_MONITORAR_STEAM")?)
    }

    fn destinations(&self) -> Destinations {
        let defaults = Destinations::default();
        Destinations {
            twitch: optional("TWITCH_DESTINATION").unwrap_or(defaults.twitch),
            steam: optional("STEAM_DESTINATION").unwrap_or(defaults.steam),
        }
    }
}

/// What to do when writing an artifact fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailurePolicy {
    /// Fail the source path so the scheduler sees it
    Propagate,
    /// Log the failure and report the path as done
    LogAndContinue,
}

impl UploadFailurePolicy {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "propagate" => Ok(Self::Propagate),
            "log" | "log_and_continue" => Ok(Self::LogAndContinue),
            other => Err(PipelineError::config(format!(
                "PIPELINE_UPLOAD_FAILURE must be 'propagate' or 'log', got '{}'",
                other
            ))),
        }
    }
}

/// Task-level retry, applied to a whole source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retries: 1, delay: Duration::from_secs(120) }
    }
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub twitch_auth_url: String,
    pub twitch_api_base: String,
    pub steam_api_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            twitch_auth_url: TWITCH_AUTH_URL.to_string(),
            twitch_api_base: TWITCH_API_BASE.to_string(),
            steam_api_base: STEAM_API_BASE.to_string(),
        }
    }
}

/// Process-level knobs. Loaded once at startup, unlike credentials.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub endpoints: Endpoints,
    pub http_timeout: Duration,
    pub player_count_concurrency: usize,
    pub retry: RetryPolicy,
    pub upload_failure: UploadFailurePolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            http_timeout: Duration::from_secs(30),
            player_count_concurrency: 4,
            retry: RetryPolicy::default(),
            upload_failure: UploadFailurePolicy::Propagate,
        }
    }
}

impl PipelineSettings {
    /// Load settings from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Some(secs) = parsed::<u64>("PIPELINE_HTTP_TIMEOUT_SECS")? {
            settings.http_timeout = Duration::from_secs(secs);
        }
        if let Some(width) = parsed::<usize>("PIPELINE_STEAM_CONCURRENCY")? {
            settings.player_count_concurrency = width.max(1);
        }
        if let Some(retries) = parsed::<u32>("PIPELINE_TASK_RETRIES")? {
            settings.retry.retries = retries;
        }
        if let Some(secs) = parsed::<u64>("PIPELINE_RETRY_DELAY_SECS")? {
            settings.retry.delay = Duration::from_secs(secs);
        }
        if let Some(policy) = optional("PIPELINE_UPLOAD_FAILURE") {
            settings.upload_failure = UploadFailurePolicy::parse(&policy)?;
        }

        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub bucket: String,
    pub region: String,
    /// Endpoint override for S3-compatible stores (e.g. MinIO)
    pub endpoint: Option<String>,
    pub access_key_id: Option<Secret>,
    pub secret_access_key: Option<Secret>,
    pub local_root: String,
}

impl StorageSettings {
    pub fn from_env() -> Result<Self> {
        let backend = match optional("STORAGE_BACKEND").as_deref().map(str::to_ascii_lowercase) {
            None => StorageBackend::S3,
            Some(b) if b == "s3" => StorageBackend::S3,
            Some(b) if b == "local" => StorageBackend::Local,
            Some(other) => {
                return Err(PipelineError::config(format!(
                    "STORAGE_BACKEND must be 's3' or 'local', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            backend,
            bucket: optional("STORAGE_BUCKET").unwrap_or_else(|| "raw-data".to_string()),
            region: optional("STORAGE_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            endpoint: optional("STORAGE_ENDPOINT"),
            access_key_id: optional("STORAGE_ACCESS_KEY_ID").map(Secret::new),
            secret_access_key: optional("STORAGE_SECRET_ACCESS_KEY").map(Secret::new),
            local_root: optional("STORAGE_LOCAL_ROOT").unwrap_or_else(|| "./landing".to_string()),
        })
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &str) -> Result<String> {
    optional(name).ok_or_else(|| PipelineError::config(format!("{} is not set", name)))
}

fn parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match optional(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| PipelineError::config(format!("{} has invalid value '{}'", name, raw))),
    }
}

/// Fixed provider for tests.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    pub twitch: TwitchCredentials,
    pub steam_key: Secret,
    pub twitch_games: MonitoredIdMap,
    pub steam_games: MonitoredIdMap,
    pub destinations: Destinations,
}

#[cfg(test)]
impl ConfigProvider for StaticConfigProvider {
    fn twitch_credentials(&self) -> Result<TwitchCredentials> {
        Ok(self.twitch.clone())
    }

    fn steam_api_key(&self) -> Result<Secret> {
        Ok(self.steam_key.clone())
    }

    fn twitch_games(&self) -> Result<MonitoredIdMap> {
        Ok(self.twitch_games.clone())
    }

    fn steam_games(&self) -> Result<MonitoredIdMap> {
        Ok(self.steam_games.clone())
    }

    fn destinations(&self) -> Destinations {
        self.destinations.clone()
    }
}
