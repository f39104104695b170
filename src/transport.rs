use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::types::{ClientConfig, Params};

/// HTTP boundary for outbound requests.
///
/// The default implementation is [`HttpTransport`]; tests and alternative
/// stacks substitute their own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a form-encoded body and parse the JSON reply.
    async fn post_form(&self, url: &str, fields: &Params) -> Result<Value, TransportError>;

    /// POST one file as multipart form data and parse the JSON reply.
    async fn post_multipart(
        &self,
        url: &str,
        field: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<Value, TransportError>;
}

/// reqwest-backed transport with a bounded timeout and a fixed retry
/// budget for transient failures.
///
/// Only connect-level failures are retried: the request is known not to
/// have reached the platform, so replaying it cannot double-apply side
/// effects. A timeout may have been applied remotely and is final.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: std::time::Duration,
    max_attempts: u32,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: config.request_timeout,
            max_attempts: config.max_attempts.max(1),
        }
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<Value, TransportError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            let result = build().timeout(self.timeout).send().await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(TransportError::Status(status.as_u16()));
                    }
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|err| TransportError::InvalidJson(err.to_string()));
                }
                Err(err) => {
                    let classified = classify(&err);
                    let transient = matches!(classified, TransportError::Network(_));
                    if !transient || attempt >= self.max_attempts {
                        return Err(classified);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

fn classify(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_form(&self, url: &str, fields: &Params) -> Result<Value, TransportError> {
        let pairs = form_pairs(fields);
        self.send_with_retry(|| self.client.post(url).form(&pairs)).await
    }

    async fn post_multipart(
        &self,
        url: &str,
        field: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<Value, TransportError> {
        // Multipart bodies are not replayable through the shared retry
        // helper; a single attempt with the same timeout applies.
        let part = reqwest::multipart::Part::bytes(content)
            .file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part(field.to_string(), part);

        let result = self
            .client
            .post(url)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    return Err(TransportError::Status(status.as_u16()));
                }
                response
                    .json::<Value>()
                    .await
                    .map_err(|err| TransportError::InvalidJson(err.to_string()))
            }
            Err(err) => Err(classify(&err)),
        }
    }
}

/// Flatten a parameter map into form fields. Strings pass through as-is;
/// everything else is serialized to its JSON representation.
fn form_pairs(fields: &Params) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}
