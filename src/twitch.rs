use std::fmt;

use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::Secret;
use crate::error::{PipelineError, Result};

/// Helix caps `first` and the number of `game_id` filters at 100.
pub const MAX_IDS_PER_REQUEST: usize = 100;

/// Short-lived app access token. Scoped to a single run.
#[derive(Clone)]
pub struct AuthToken(Secret);

impl AuthToken {
    pub fn value(&self) -> &str {
        self.0.expose()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

pub struct TwitchClient<'a> {
    client: &'a Client,
    auth_url: &'a str,
    api_base: &'a str,
}

impl<'a> TwitchClient<'a> {
    pub fn new(client: &'a Client, auth_url: &'a str, api_base: &'a str) -> Self {
        Self { client, auth_url, api_base }
    }

    /// Exchange client credentials for an app access token.
    pub async fn obtain_token(&self, client_id: &str, client_secret: &Secret) -> Result<AuthToken> {
        debug!("Requesting Twitch app token from {}", self.auth_url);

        let response = self
            .client
            .post(self.auth_url)
            .query(&[
                ("client_id", client_id),
                ("client_secret", client_secret.expose()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| {
                // the request URL carries the client secret
                PipelineError::auth(None, format!("token request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::auth(
                Some(status.as_u16()),
                format!("token endpoint returned {}", status),
            ));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            PipelineError::auth(Some(status.as_u16()), format!("malformed token response: {}", e))
        })?;

        match body.access_token {
            Some(token) if !token.is_empty() => Ok(AuthToken(Secret::new(token))),
            _ => Err(PipelineError::auth(
                Some(status.as_u16()),
                "token response has no access_token",
            )),
        }
    }

    /// Fetch current live streams for `game_ids` in a single Helix call.
    ///
    /// The payload is returned untouched. An empty id list sends no filter.
    pub async fn fetch_live_streams(
        &self,
        client_id: &str,
        token: &AuthToken,
        game_ids: &[String],
    ) -> Result<Value> {
        let ids = if game_ids.len() > MAX_IDS_PER_REQUEST {
            warn!(
                "{} monitored Twitch games exceed the per-request limit of {}; ignoring the last {}",
                game_ids.len(),
                MAX_IDS_PER_REQUEST,
                game_ids.len() - MAX_IDS_PER_REQUEST
            );
            &game_ids[..MAX_IDS_PER_REQUEST]
        } else {
            game_ids
        };

        let mut query: Vec<(&str, &str)> = ids.iter().map(|id| ("game_id", id.as_str())).collect();
        let first = MAX_IDS_PER_REQUEST.to_string();
        query.push(("first", &first));

        let url = format!("{}/helix/streams", self.api_base.trim_end_matches('/'));
        debug!("Fetching live streams for {} game ids from {}", ids.len(), url);

        let response = self
            .client
            .get(&url)
            .header("Client-ID", client_id)
            .bearer_auth(token.value())
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upstream { status: status.as_u16(), body });
        }

        let payload: Value = response.json().await?;
        let count = payload
            .get("data")
            .and_then(Value::as_array)
            .map(|streams| streams.len())
            .unwrap_or(0);
        info!("Fetched {} live streams", count);

        Ok(payload)
    }
}
