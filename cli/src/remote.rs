use serde::{Deserialize, Serialize};

use ritual_core::models::{HabitEntry, NewEntry};
use ritual_core::sync::{EntryBackend, SyncError};

/// Client for a remote ritual server (`ritual serve`), the authoritative
/// store when one is configured.
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    rt: tokio::runtime::Handle,
}

#[derive(Serialize)]
struct EntryPayload<'a> {
    habit_id: &'a str,
    date: String,
    completed: bool,
    conditions_met: &'a [bool],
}

#[derive(Deserialize)]
struct EntryResponse {
    entry: HabitEntry,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl RemoteClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "ritual-cli/{} (habit tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            rt: tokio::runtime::Handle::current(),
        }
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Probe the server. This is the connectivity signal: reachable and
    /// healthy means online, anything else means offline.
    pub async fn is_reachable_async(&self) -> bool {
        let url = format!("{}/api/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn upsert_entry_async(&self, entry: &NewEntry) -> Result<HabitEntry, SyncError> {
        let url = format!("{}/api/entries", self.base_url);
        let payload = EntryPayload {
            habit_id: &entry.habit_uuid,
            date: entry.date.format("%Y-%m-%d").to_string(),
            completed: entry.completed,
            conditions_met: &entry.conditions_met,
        };

        let resp = self
            .with_auth(self.client.post(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            let body: EntryResponse = resp
                .json()
                .await
                .map_err(|e| SyncError::Network(format!("bad server response: {e}")))?;
            return Ok(body.entry);
        }

        let message = resp
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| format!("server returned {status}"));

        match status.as_u16() {
            404 => Err(SyncError::NotFound(message)),
            400 => Err(SyncError::Invalid(message)),
            _ => Err(SyncError::Network(message)),
        }
    }
}

impl EntryBackend for RemoteClient {
    fn upsert_entry(&self, entry: &NewEntry) -> Result<HabitEntry, SyncError> {
        self.rt.block_on(self.upsert_entry_async(entry))
    }
}
