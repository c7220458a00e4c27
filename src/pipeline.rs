use std::future::Future;
use std::sync::Arc;

use log::{debug, error, info, warn};
use reqwest::Client;

use crate::config::{ConfigProvider, PipelineSettings, RetryPolicy};
use crate::error::{PipelineError, Result};
use crate::models::{RunTimestamp, StreamBatchRecord};
use crate::serializer::to_compact_bytes;
use crate::steam::SteamClient;
use crate::twitch::TwitchClient;
use crate::uploader::{ObjectStore, Uploader};
use crate::utilities::ingestion_timestamp;

pub const TWITCH_PREFIX: &str = "twitch";
pub const STEAM_PREFIX: &str = "steam";

/// Outcome of one run. Each path carries the written artifact path, `None`
/// if an upload failure was absorbed, or the error that failed it.
#[derive(Debug)]
pub struct RunReport {
    pub run_ts: RunTimestamp,
    pub twitch: Result<Option<String>>,
    pub steam: Result<Option<String>>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.twitch.is_ok() && self.steam.is_ok()
    }

    pub fn failures(&self) -> Vec<(&'static str, &PipelineError)> {
        let mut failures = Vec::new();
        if let Err(e) = &self.twitch {
            failures.push((TWITCH_PREFIX, e));
        }
        if let Err(e) = &self.steam {
            failures.push((STEAM_PREFIX, e));
        }
        failures
    }
}

/// Drives the stream path and the player-count path for a run.
///
/// The two paths share only immutable handles (HTTP client, store), so a
/// failure in one never affects the other.
pub struct Pipeline {
    provider: Arc<dyn ConfigProvider>,
    uploader: Uploader,
    http: Client,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn ConfigProvider>,
        store: Arc<dyn ObjectStore>,
        settings: PipelineSettings,
    ) -> Result<Self> {
        let http = Client::builder().timeout(settings.http_timeout).build()?;
        let uploader = Uploader::new(store, settings.upload_failure);

        Ok(Self { provider, uploader, http, settings })
    }

    /// Run both source paths concurrently, each under the task retry policy.
    pub async fn run(&self, run_ts: RunTimestamp) -> RunReport {
        info!("Starting run {}", run_ts);

        let (twitch, steam) = tokio::join!(
            with_retry(&self.settings.retry, TWITCH_PREFIX, || self.run_stream_path(&run_ts)),
            with_retry(&self.settings.retry, STEAM_PREFIX, || self.run_player_count_path(&run_ts)),
        );

        let report = RunReport { run_ts, twitch, steam };
        if report.is_success() {
            info!("Run {} finished", run_ts);
        } else {
            for (path, e) in report.failures() {
                error!("Run {}: {} path failed: {}", run_ts, path, e);
            }
        }
        report
    }

    /// Authenticate, fetch live streams for the monitored games, and land them.
    pub async fn run_stream_path(&self, run_ts: &RunTimestamp) -> Result<Option<String>> {
        let credentials = self.provider.twitch_credentials()?;
        let games = self.provider.twitch_games()?;
        let destination = self.provider.destinations().twitch;
        let game_ids = games.active_ids();

        let endpoints = &self.settings.endpoints;
        let twitch = TwitchClient::new(&self.http, &endpoints.twitch_auth_url, &endpoints.twitch_api_base);

        debug!("[{}] {}: authenticating", TWITCH_PREFIX, run_ts);
        let token = twitch
            .obtain_token(&credentials.client_id, &credentials.client_secret)
            .await?;

        debug!(
            "[{}] {}: extracting {} of {} monitored games",
            TWITCH_PREFIX,
            run_ts,
            game_ids.len(),
            games.len()
        );
        let payload = twitch
            .fetch_live_streams(&credentials.client_id, &token, &game_ids)
            .await?;

        debug!("[{}] {}: serializing", TWITCH_PREFIX, run_ts);
        let record = StreamBatchRecord {
            ingestion_timestamp_utc: ingestion_timestamp(),
            twitch_data: payload,
        };
        let content = to_compact_bytes(&record)?;

        debug!("[{}] {}: uploading", TWITCH_PREFIX, run_ts);
        self.uploader.upload(content, &destination, run_ts, TWITCH_PREFIX).await
    }

    /// Look up the player count of every monitored game and land the records.
    pub async fn run_player_count_path(&self, run_ts: &RunTimestamp) -> Result<Option<String>> {
        let api_key = self.provider.steam_api_key()?;
        let games = self.provider.steam_games()?;
        let destination = self.provider.destinations().steam;
        let entries = games.entries();

        debug!("[{}] {}: extracting {} monitored games", STEAM_PREFIX, run_ts, entries.len());
        let steam = SteamClient::new(&self.http, &self.settings.endpoints.steam_api_base);
        let records = steam
            .collect_player_counts(&api_key, entries, self.settings.player_count_concurrency)
            .await;

        debug!("[{}] {}: serializing {} records", STEAM_PREFIX, run_ts, records.len());
        let content = to_compact_bytes(&records)?;

        debug!("[{}] {}: uploading", STEAM_PREFIX, run_ts);
        self.uploader.upload(content, &destination, run_ts, STEAM_PREFIX).await
    }
}

/// Run `task` and retry the whole task on failure, as a scheduler would.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, name: &str, mut task: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match task().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.retries => {
                attempt += 1;
                warn!(
                    "{} path failed ({}), retry {}/{} in {:?}",
                    name, e, attempt, policy.retries, policy.delay
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
