use std::{io::Write, time::Duration};

use async_trait::async_trait;
use flate2::{Compression, write::GzEncoder};
use nadhi_common::{LogItem, Tier, outgoing};
use reqwest::{Client, header::CONTENT_TYPE};

use crate::{DeliveryError, ProcessorError, Transport};

/// Header carrying the API key on every request to the servers.
pub const API_KEY_HEADER: &str = "datanadhi_api_key";

/// Shared client state for an HTTP tier.
#[derive(Debug, Clone)]
struct Endpoint {
    tier: Tier,
    client: Client,
    base: String,
    api_key: String,
    probe_timeout: Duration,
}

impl Endpoint {
    fn new(
        tier: Tier,
        base: &str,
        api_key: &str,
        timeout: Duration,
        probe_timeout: Duration,
    ) -> Result<Self, ProcessorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProcessorError::Transport {
                tier,
                message: e.to_string(),
            })?;

        Ok(Self {
            tier,
            client,
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            probe_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn probe(&self) -> bool {
        self.client
            .get(self.url("/"))
            .timeout(self.probe_timeout)
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }

    fn classify(&self, result: reqwest::Result<reqwest::Response>) -> Result<(), DeliveryError> {
        match result {
            Ok(response) => DeliveryError::from_status(self.tier, response.status().as_u16()),
            Err(e) if e.is_status() => {
                let status = e.status().map_or(0, |s| s.as_u16());
                DeliveryError::from_status(self.tier, status)
            }
            Err(e) => Err(DeliveryError::connection(self.tier, e.to_string())),
        }
    }
}

/// The primary server: one JSON record per request to `/log`.
#[derive(Debug, Clone)]
pub struct PrimaryTransport {
    endpoint: Endpoint,
}

impl PrimaryTransport {
    /// # Errors
    ///
    /// Returns [`ProcessorError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        base: &str,
        api_key: &str,
        timeout: Duration,
        probe_timeout: Duration,
    ) -> Result<Self, ProcessorError> {
        Ok(Self {
            endpoint: Endpoint::new(Tier::Primary, base, api_key, timeout, probe_timeout)?,
        })
    }
}

#[async_trait]
impl Transport for PrimaryTransport {
    fn tier(&self) -> Tier {
        Tier::Primary
    }

    async fn deliver(&self, items: &[LogItem]) -> Result<(), DeliveryError> {
        let endpoint = &self.endpoint;

        for item in items {
            outgoing!(level = DEBUG, item = %item.id, "POST {}", endpoint.url("/log"));

            let result = endpoint
                .client
                .post(endpoint.url("/log"))
                .header(API_KEY_HEADER, &endpoint.api_key)
                .json(&item.record.wire_body())
                .send()
                .await;

            endpoint.classify(result)?;
        }

        Ok(())
    }

    async fn probe(&self) -> bool {
        self.endpoint.probe().await
    }
}

/// The fallback server: gzip-compressed JSON lines to `/upload`.
#[derive(Debug, Clone)]
pub struct FallbackTransport {
    endpoint: Endpoint,
    max_batch: usize,
}

impl FallbackTransport {
    /// # Errors
    ///
    /// Returns [`ProcessorError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        base: &str,
        api_key: &str,
        timeout: Duration,
        probe_timeout: Duration,
        max_batch: usize,
    ) -> Result<Self, ProcessorError> {
        Ok(Self {
            endpoint: Endpoint::new(Tier::Fallback, base, api_key, timeout, probe_timeout)?,
            max_batch: max_batch.max(1),
        })
    }
}

#[async_trait]
impl Transport for FallbackTransport {
    fn tier(&self) -> Tier {
        Tier::Fallback
    }

    fn max_batch(&self) -> usize {
        self.max_batch
    }

    async fn deliver(&self, items: &[LogItem]) -> Result<(), DeliveryError> {
        let endpoint = &self.endpoint;
        let body = encode_batch(items).map_err(|e| {
            DeliveryError::application(Tier::Fallback, None, format!("encoding batch: {e}"))
        })?;

        outgoing!(
            level = DEBUG,
            items = items.len(),
            bytes = body.len(),
            "POST {}",
            endpoint.url("/upload")
        );

        let result = endpoint
            .client
            .post(endpoint.url("/upload"))
            .header(API_KEY_HEADER, &endpoint.api_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await;

        endpoint.classify(result)
    }

    async fn probe(&self) -> bool {
        self.endpoint.probe().await
    }
}

/// Encode `items` as gzip-compressed JSON lines, one wire body per line.
///
/// # Errors
///
/// Returns an error if a record cannot be serialised or compressed.
pub fn encode_batch(items: &[LogItem]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());

    for item in items {
        serde_json::to_writer(&mut encoder, &item.record.wire_body())?;
        encoder.write_all(b"\n")?;
    }

    encoder.finish()
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;
    use nadhi_common::EvaluatedRecord;
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn test_batch_is_gzipped_json_lines() {
        let items: Vec<LogItem> = (0..3)
            .map(|n| LogItem::new(EvaluatedRecord::new(json!({"message": n}), ["p"])))
            .collect();

        let encoded = encode_batch(&items).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(encoded.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();

        let lines: Vec<Value> = decoded
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2]["log_data"]["message"], 2);
        assert_eq!(lines[0]["pipelines"], json!(["p"]));
    }

    #[test]
    fn test_trailing_slash_is_dropped() {
        let transport = PrimaryTransport::new(
            "http://localhost:5000/",
            "key",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(transport.endpoint.url("/log"), "http://localhost:5000/log");
    }
}
