use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::Value;
use shared_types::Header;

use super::{
    HttpRequest, HttpResponse, NetworkTransport, PerformanceTimeline, ResourceTimingEntry,
    TransportError,
};

/// Network stack backed by a shared reqwest client
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::with_client(reqwest::Client::new())
    }
}

fn map_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Aborted
    } else {
        TransportError::Network(e.to_string())
    }
}

#[async_trait]
impl NetworkTransport for ReqwestTransport {
    async fn send(
        &self,
        request: HttpRequest,
        timeline: &PerformanceTimeline,
    ) -> Result<HttpResponse, TransportError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for header in &request.headers {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }
        builder = match request.body {
            Some(Value::String(raw)) => builder.body(raw),
            Some(Value::Null) | None => builder,
            Some(structured) => builder.body(structured.to_string()),
        };

        let start_time_ms = Utc::now().timestamp_millis();
        let clock = Instant::now();

        let response = builder.send().await.map_err(map_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                Header::new(name.as_str(), String::from_utf8_lossy(value.as_bytes()))
            })
            .collect();
        let body = response.bytes().await.map_err(map_error)?;

        timeline.record(ResourceTimingEntry {
            name: request.url,
            start_time_ms,
            duration_ms: clock.elapsed().as_millis() as u64,
        });

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
