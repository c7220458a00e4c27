use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::Value;

use crate::config::Secret;
use crate::models::{PlatformId, PlayerCountRecord};
use crate::utilities::ingestion_timestamp;

const PLAYER_COUNT_PATH: &str = "/ISteamUserStats/GetNumberOfCurrentPlayers/v1/";

pub struct SteamClient<'a> {
    client: &'a Client,
    api_base: &'a str,
}

impl<'a> SteamClient<'a> {
    pub fn new(client: &'a Client, api_base: &'a str) -> Self {
        Self { client, api_base }
    }

    /// Current player count for one app, or `None` if it could not be read.
    ///
    /// Never fails: transport errors, error statuses, bad bodies and
    /// `result != 1` all come back as `None`.
    pub async fn fetch_player_count(&self, api_key: &Secret, app_id: &str) -> Option<u64> {
        let url = format!("{}{}", self.api_base.trim_end_matches('/'), PLAYER_COUNT_PATH);

        let response = match self
            .client
            .get(&url)
            .query(&[("key", api_key.expose()), ("appid", app_id), ("format", "json")])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // the request URL carries the API key
                warn!("Player count request for app {} failed: {}", app_id, e.without_url());
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Player count for app {} returned status {}", app_id, status);
            return None;
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Player count for app {} has an unreadable body: {}", app_id, e.without_url());
                return None;
            }
        };

        let inner = &body["response"];
        if inner["result"].as_i64() != Some(1) {
            debug!("Player count for app {} has result {}", app_id, inner["result"]);
            return None;
        }

        inner["player_count"].as_u64()
    }

    /// One record per `(game, app_id)` entry, in input order.
    ///
    /// Entries marked "N/A" are not looked up and get a `None` count.
    /// Lookups run with at most `concurrency` requests in flight.
    pub async fn collect_player_counts(
        &self,
        api_key: &Secret,
        entries: Vec<(String, PlatformId)>,
        concurrency: usize,
    ) -> Vec<PlayerCountRecord> {
        let total = entries.len();

        let mut records: Vec<(usize, PlayerCountRecord)> = stream::iter(entries.into_iter().enumerate())
            .map(|(index, (game_name, app_id))| async move {
                let player_count = if app_id.is_not_applicable() {
                    debug!("{} has no Steam app id, recording it as absent", game_name);
                    None
                } else {
                    self.fetch_player_count(api_key, &app_id.as_query()).await
                };
                let record = PlayerCountRecord {
                    ingestion_timestamp_utc: ingestion_timestamp(),
                    id: app_id,
                    game_name,
                    player_count,
                };
                (index, record)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        records.sort_by_key(|(index, _)| *index);

        let absent = records.iter().filter(|(_, r)| r.player_count.is_none()).count();
        info!("Collected player counts for {} games ({} absent)", total, absent);

        records.into_iter().map(|(_, record)| record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    async fn mock_app(server: &mut ServerGuard, app_id: &str, status: usize, body: &str) -> mockito::Mock {
        server
            .mock("GET", PLAYER_COUNT_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("key".into(), "steam-key".into()),
                Matcher::UrlEncoded("appid".into(), app_id.into()),
                Matcher::UrlEncoded("format".into(), "json".into()),
            ]))
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_fetch_player_count_success() {
        let mut server = Server::new_async().await;
        let mock = mock_app(&mut server, "570", 200, r#"{"response":{"player_count":612345,"result":1}}"#).await;

        let http = Client::new();
        let base = server.url();
        let steam = SteamClient::new(&http, &base);

        let count = steam.fetch_player_count(&Secret::new("steam-key"), "570").await;
        assert_eq!(count, Some(612_345));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_zero_players_is_not_absent() {
        let mut server = Server::new_async().await;
        let _mock = mock_app(&mut server, "10", 200, r#"{"response":{"player_count":0,"result":1}}"#).await;

        let http = Client::new();
        let base = server.url();
        let steam = SteamClient::new(&http, &base);

        assert_eq!(steam.fetch_player_count(&Secret::new("steam-key"), "10").await, Some(0));
    }

    #[tokio::test]
    async fn test_non_success_result_is_absent() {
        let mut server = Server::new_async().await;
        let _mock = mock_app(&mut server, "999", 200, r#"{"response":{"result":42}}"#).await;

        let http = Client::new();
        let base = server.url();
        let steam = SteamClient::new(&http, &base);

        assert_eq!(steam.fetch_player_count(&Secret::new("steam-key"), "999").await, None);
    }

    #[tokio::test]
    async fn test_error_status_and_bad_body_are_absent() {
        let mut server = Server::new_async().await;
        let _forbidden = mock_app(&mut server, "1", 403, "forbidden").await;
        let _garbage = mock_app(&mut server, "2", 200, "<html>").await;

        let http = Client::new();
        let base = server.url();
        let steam = SteamClient::new(&http, &base);
        let key = Secret::new("steam-key");

        assert_eq!(steam.fetch_player_count(&key, "1").await, None);
        assert_eq!(steam.fetch_player_count(&key, "2").await, None);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_absent() {
        let http = Client::new();
        let steam = SteamClient::new(&http, "http://127.0.0.1:1");

        assert_eq!(steam.fetch_player_count(&Secret::new("steam-key"), "570").await, None);
    }

    #[tokio::test]
    async fn test_collect_yields_one_record_per_game() {
        let mut server = Server::new_async().await;
        let _a = mock_app(&mut server, "570", 200, r#"{"response":{"player_count":100,"result":1}}"#).await;
        let _b = mock_app(&mut server, "999", 200, r#"{"response":{"result":42}}"#).await;
        let _c = mock_app(&mut server, "730", 500, "").await;
        let _d = mock_app(&mut server, "440", 200, r#"{"response":{"player_count":7,"result":1}}"#).await;

        let http = Client::new();
        let base = server.url();
        let steam = SteamClient::new(&http, &base);

        let entries: Vec<(String, PlatformId)> = vec![
            ("Dota 2".to_string(), 570u64.into()),
            ("GameZ".to_string(), "999".into()),
            ("Counter-Strike 2".to_string(), 730u64.into()),
            ("Team Fortress 2".to_string(), "440".into()),
        ];

        let records = steam
            .collect_player_counts(&Secret::new("steam-key"), entries.clone(), 2)
            .await;

        assert_eq!(records.len(), entries.len());
        let seen: Vec<(String, PlatformId)> =
            records.iter().map(|r| (r.game_name.clone(), r.id.clone())).collect();
        assert_eq!(seen, entries);

        let counts: Vec<Option<u64>> = records.iter().map(|r| r.player_count).collect();
        assert_eq!(counts, vec![Some(100), None, None, Some(7)]);
        assert!(records.iter().all(|r| r.ingestion_timestamp_utc.ends_with('Z')));
    }

    #[tokio::test]
    async fn test_collect_records_sentinel_games_without_lookup() {
        let mut server = Server::new_async().await;
        let lookup = mock_app(&mut server, "570", 200, r#"{"response":{"player_count":5,"result":1}}"#).await;
        let sentinel = server
            .mock("GET", PLAYER_COUNT_PATH)
            .match_query(Matcher::UrlEncoded("appid".into(), "N/A".into()))
            .expect(0)
            .create_async()
            .await;

        let http = Client::new();
        let base = server.url();
        let steam = SteamClient::new(&http, &base);

        let entries: Vec<(String, PlatformId)> = vec![
            ("Dota 2".to_string(), 570u64.into()),
            ("NotOnSteam".to_string(), "N/A".into()),
        ];
        let records = steam
            .collect_player_counts(&Secret::new("steam-key"), entries, 4)
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].player_count, Some(5));
        assert_eq!(records[1].game_name, "NotOnSteam");
        assert_eq!(records[1].player_count, None);
        lookup.assert_async().await;
        sentinel.assert_async().await;
    }

    #[tokio::test]
    async fn test_collect_with_no_games_is_empty() {
        let http = Client::new();
        let steam = SteamClient::new(&http, "http://127.0.0.1:1");

        let records = steam.collect_player_counts(&Secret::new("k"), Vec::new(), 4).await;
        assert!(records.is_empty());
    }
}
