use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

/// Marks a game that has no identifier on a given platform.
pub const NOT_APPLICABLE: &str = "N/A";

const TS_NODASH_FORMAT: &str = "%Y%m%dT%H%M%S";

/// A configured platform identifier, kept as written (string or number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlatformId {
    Number(serde_json::Number),
    Text(String),
}

impl PlatformId {
    pub fn is_not_applicable(&self) -> bool {
        matches!(self, PlatformId::Text(s) if s.trim() == NOT_APPLICABLE)
    }

    /// Form used in request query strings.
    pub fn as_query(&self) -> String {
        match self {
            PlatformId::Number(n) => n.to_string(),
            PlatformId::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<&str> for PlatformId {
    fn from(value: &str) -> Self {
        PlatformId::Text(value.to_string())
    }
}

impl From<u64> for PlatformId {
    fn from(value: u64) -> Self {
        PlatformId::Number(value.into())
    }
}

/// Game name -> platform identifier, for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoredIdMap {
    entries: BTreeMap<String, PlatformId>,
}

impl MonitoredIdMap {
    #[cfg(test)]
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PlatformId>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Parse a JSON object whose values are string or numeric ids.
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: BTreeMap<String, Value> = serde_json::from_str(raw)
            .map_err(|e| PipelineError::config(format!("monitored games must be a JSON object: {}", e)))?;

        let mut entries = BTreeMap::new();
        for (game, id) in parsed {
            let id = match id {
                Value::String(s) => PlatformId::Text(s),
                Value::Number(n) => PlatformId::Number(n),
                other => {
                    return Err(PipelineError::config(format!(
                        "id for '{}' must be a string or number, got {}",
                        game, other
                    )))
                }
            };
            entries.insert(game, id);
        }
        Ok(Self { entries })
    }

    /// Every (game, id) pair, including those marked "N/A".
    pub fn entries(&self) -> Vec<(String, PlatformId)> {
        self.entries
            .iter()
            .map(|(game, id)| (game.clone(), id.clone()))
            .collect()
    }

    /// Query-ready ids, skipping entries marked "N/A".
    pub fn active_ids(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|id| !id.is_not_applicable())
            .map(PlatformId::as_query)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One run of the stream path: the Helix payload as returned, plus when it was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamBatchRecord {
    pub ingestion_timestamp_utc: String,
    pub twitch_data: Value,
}

/// Player count for one game in one run. `None` means the lookup failed or
/// the game has no Steam id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCountRecord {
    pub ingestion_timestamp_utc: String,
    pub id: PlatformId,
    #[serde(rename = "jogo")]
    pub game_name: String,
    #[serde(rename = "qtd_jogadores")]
    pub player_count: Option<u64>,
}

/// Logical identity of a run, rendered as `YYYYMMDDTHHMMSS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunTimestamp(NaiveDateTime);

impl RunTimestamp {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let naive = at.naive_utc();
        Self(naive.with_nanosecond(0).unwrap_or(naive))
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Accepts the compact form or RFC 3339 (converted to UTC).
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TS_NODASH_FORMAT) {
            return Ok(Self(naive));
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|at| Self::from_datetime(at.with_timezone(&Utc)))
            .map_err(|_| {
                PipelineError::config(format!(
                    "run timestamp '{}' is neither YYYYMMDDTHHMMSS nor RFC 3339",
                    raw
                ))
            })
    }
}

impl fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TS_NODASH_FORMAT))
    }
}
