//! Endpoint counter retrieval.
//!
//! The traffic service answers `GET /endp/<name,name,...>?fields=...` with
//! `{"endpoint": [{"<name>": {"rx bytes": N, "rx drop %": F}}, ...]}`. A single
//! requested endpoint comes back as a bare object instead of a list; both
//! shapes are accepted.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::time::Duration;

use dfs_common::error::{Classify, Severity};
use dfs_common::models::EndpointCounters;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("telemetry request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed telemetry response: {0}")]
    Malformed(String),
}

impl Classify for TelemetryError {
    fn severity(&self) -> Severity {
        Severity::Warning
    }
}

/// Source of per-endpoint receive counters.
pub trait TelemetrySource: Send + Sync {
    fn fetch(
        &self,
        names: &[String],
    ) -> impl Future<Output = Result<BTreeMap<String, EndpointCounters>, TelemetryError>> + Send;
}

/// Polls the traffic service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTelemetry {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTelemetry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl TelemetrySource for HttpTelemetry {
    async fn fetch(
        &self,
        names: &[String],
    ) -> Result<BTreeMap<String, EndpointCounters>, TelemetryError> {
        if names.is_empty() {
            return Ok(BTreeMap::new());
        }
        let url = format!(
            "{}/endp/{}?fields=name,rx+bytes,rx+drop+%25",
            self.base_url,
            names.join(",")
        );
        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_endpoint_counters(&body, names)
    }
}

fn counters(fields: &serde_json::Value) -> EndpointCounters {
    let rx_bytes = fields
        .get("rx bytes")
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
        .unwrap_or(0);
    let rx_drop_pct = fields
        .get("rx drop %")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    EndpointCounters {
        rx_bytes,
        rx_drop_pct,
    }
}

/// Extract counters for the requested endpoints; anything else in the
/// response is ignored.
pub fn parse_endpoint_counters(
    body: &serde_json::Value,
    names: &[String],
) -> Result<BTreeMap<String, EndpointCounters>, TelemetryError> {
    let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
    let endpoint = body
        .get("endpoint")
        .ok_or_else(|| TelemetryError::Malformed("missing 'endpoint' key".into()))?;

    let mut out = BTreeMap::new();
    match endpoint {
        serde_json::Value::Array(items) => {
            for item in items {
                let Some(obj) = item.as_object() else {
                    continue;
                };
                for (name, fields) in obj {
                    if wanted.contains(name.as_str()) {
                        out.insert(name.clone(), counters(fields));
                    }
                }
            }
        }
        serde_json::Value::Object(obj) => {
            if let Some(name) = obj.get("name").and_then(|v| v.as_str()) {
                if wanted.contains(name) {
                    out.insert(name.to_string(), counters(endpoint));
                }
            } else {
                for (name, fields) in obj {
                    if wanted.contains(name.as_str()) {
                        out.insert(name.clone(), counters(fields));
                    }
                }
            }
        }
        other => {
            return Err(TelemetryError::Malformed(format!(
                "unexpected 'endpoint' value: {other}"
            )))
        }
    }
    Ok(out)
}
