use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub fn results_url(&self, delays_ms: &[u64], fail: &[usize]) -> String {
        let join = |items: Vec<String>| items.join(",");
        format!(
            "{}/stream/results?delays_ms={}&fail={}",
            self.base_url,
            join(delays_ms.iter().map(u64::to_string).collect()),
            join(fail.iter().map(usize::to_string).collect()),
        )
    }

    pub fn events_url(&self, mapping: &str) -> String {
        format!("{}/stream/events?map={}", self.base_url, mapping)
    }

    /// Emit an event on the server, returning how many listeners received it.
    pub async fn emit(&self, event: &str, payload: &Value) -> Result<u64> {
        let response = self
            .client
            .post(format!("{}/events/{}", self.base_url, event))
            .json(payload)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        body["listeners"]
            .as_u64()
            .context("No listener count in response")
    }
}
