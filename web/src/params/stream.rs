use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;

/// Upper bound for a single simulated operation.
pub(crate) const MAX_DELAY_MS: u64 = 60_000;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResultsParams {
    /// Comma separated delays, one simulated operation per entry
    pub(crate) delays_ms: Option<String>,
    /// Comma separated indices of operations that should fail
    pub(crate) fail: Option<String>,
}

impl ResultsParams {
    pub(crate) fn delays(&self) -> Result<Vec<u64>> {
        let delays: Vec<u64> = parse_list(self.delays_ms.as_deref(), "delays_ms")?;
        if let Some(delay) = delays.iter().find(|delay| **delay > MAX_DELAY_MS) {
            return Err(Error::InvalidParam(format!(
                "delays_ms entry {delay} exceeds {MAX_DELAY_MS}"
            )));
        }
        Ok(delays)
    }

    pub(crate) fn failing(&self) -> Result<HashSet<usize>> {
        Ok(parse_list(self.fail.as_deref(), "fail")?.into_iter().collect())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventsParams {
    /// Event mapping, e.g. `progress:update,done:finished`
    pub(crate) map: String,
}

fn parse_list<T: std::str::FromStr>(raw: Option<&str>, name: &str) -> Result<Vec<T>> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse()
                .map_err(|_| Error::InvalidParam(format!("invalid {name} entry: {entry}")))
        })
        .collect()
}
