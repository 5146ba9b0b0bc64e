//! Outbound HTTP seam.

use std::time::Duration;

use async_trait::async_trait;

/// One signed POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub endpoint: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the receiver.
///
/// `Err` means no HTTP response was obtained (connect failure, timeout,
/// reset). Any response, whatever its status, is `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, String>;
}

#[cfg(feature = "http")]
pub use self::http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::*;

    /// [`Transport`] over a shared `reqwest` client.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        pub fn new() -> Result<Self, String> {
            let client = reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .user_agent(concat!("content-bridge/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| e.to_string())?;
            Ok(Self { client })
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, String> {
            let mut builder = self
                .client
                .post(&request.endpoint)
                .timeout(request.timeout)
                .header(reqwest::header::CONTENT_TYPE, "application/json");
            for (name, value) in &request.headers {
                builder = builder.header(*name, value);
            }
            let response = builder
                .body(request.body)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Ok(TransportResponse { status, body })
        }
    }
}
