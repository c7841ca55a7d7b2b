//! reqwest-backed transport

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;

use crate::app::models::{Headers, Method};
use crate::errors::{ClientResult, TransportError, TransportResult};

use super::config::{ClientConfig, ClientProfile};
use super::transport::{validate_url, Transport, TransportRequest, TransportResponse};

/// [`Transport`] over a `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport around an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client for `profile` from the shared configuration
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the proxy is invalid or reqwest rejects the settings
    pub fn from_profile(config: &ClientConfig, profile: &ClientProfile) -> ClientResult<Self> {
        Ok(Self::new(config.build_http_client(profile)?))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &TransportRequest) -> TransportResult<TransportResponse> {
        let url = validate_url(&request.url)?;
        let host = url.host_str().unwrap_or_default().to_string();
        let timeout = request.connect_timeout + request.socket_timeout;

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        }
        .timeout(timeout);

        for (name, value) in request.headers.iter() {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransportError::Internal(format!("invalid header name '{name}': {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                TransportError::Internal(format!("invalid value for header '{name}': {e}"))
            })?;
            builder = builder.header(name, value);
        }

        if let Some((content_type, bytes)) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(bytes.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, &host, timeout))?;

        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, &host, timeout))?;

        tracing::debug!(
            "{} {} -> {} ({} bytes)",
            request.method,
            request.url,
            status,
            body.len()
        );
        Ok(TransportResponse::new(status, headers, body.to_vec()))
    }
}
