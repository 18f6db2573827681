//! HTTP transport
//!
//! [`Transport`] is the seam between the pipeline and the network. Any
//! status code is a successful send; the pipeline decides what counts as an
//! error.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::instrument;

use crate::config::ClientConfig;
use crate::request::{PipelineRequest, PipelineResponse, RequestBody};
use crate::ClientError;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PipelineRequest) -> Result<PipelineResponse, ClientError>;
}

/// [`Transport`] over a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .timeout(config.request_timeout())
            .connect_timeout(config.request_timeout().min(Duration::from_secs(10)))
            .build()
            .map_err(|e| ClientError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Wrap an existing client.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn build(&self, request: &PipelineRequest) -> Result<reqwest::RequestBuilder, ClientError> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(upload) => {
                let mut part = Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone());
                if let Some(content_type) = &upload.content_type {
                    part = part.mime_str(content_type).map_err(|e| ClientError::Validation {
                        message: format!("invalid content type {content_type:?}: {e}"),
                        details: None,
                    })?;
                }
                let mut form = Form::new();
                for (name, value) in &upload.fields {
                    form = form.text(name.clone(), value.clone());
                }
                builder.multipart(form.part(upload.field_name.clone(), part))
            }
        };
        Ok(builder)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(request_id = %request.id, method = %request.method, attempt = request.attempt_count), level = "debug")]
    async fn send(&self, request: &PipelineRequest) -> Result<PipelineResponse, ClientError> {
        let response = self.build(request)?.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(PipelineResponse {
            status,
            headers,
            body: decode_body(&bytes),
            from_cache: false,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::timeout(err.to_string())
    } else {
        ClientError::network(err.to_string())
    }
}

/// Empty bodies decode to `Null`; non-JSON bodies are kept as a string.
pub fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(b"  \n"), Value::Null);
        assert_eq!(decode_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(decode_body(b"Bad Gateway"), json!("Bad Gateway"));
    }
}
