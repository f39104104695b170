#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use vk_gateway::{Params, Transport, TransportError};

/// One recorded form POST.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub fields: Params,
}

impl RecordedRequest {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn code(&self) -> Option<&str> {
        self.fields.get("code").and_then(Value::as_str)
    }

    pub fn is_execute(&self) -> bool {
        self.url.ends_with("/execute")
    }
}

/// One recorded multipart POST.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub url: String,
    pub field: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

type Responder = Box<dyn Fn(&RecordedRequest) -> Result<Value, TransportError> + Send + Sync>;

/// Scripted transport double: records every request and answers from a
/// responder function or a queued list of canned replies.
pub struct MockTransport {
    requests: Mutex<Vec<RecordedRequest>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    responses: Mutex<VecDeque<Result<Value, TransportError>>>,
    upload_responses: Mutex<VecDeque<Result<Value, TransportError>>>,
    responder: Mutex<Option<Responder>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            upload_responses: Mutex::new(VecDeque::new()),
            responder: Mutex::new(None),
        })
    }

    pub async fn push_response(&self, response: Result<Value, TransportError>) {
        self.responses.lock().await.push_back(response);
    }

    pub async fn push_upload_response(&self, response: Result<Value, TransportError>) {
        self.upload_responses.lock().await.push_back(response);
    }

    pub async fn respond_with<F>(&self, f: F)
    where
        F: Fn(&RecordedRequest) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        *self.responder.lock().await = Some(Box::new(f));
    }

    /// Answer every execute request successfully with `result` per call.
    pub async fn auto_ok(&self, result: Value) {
        self.respond_with(move |request| {
            let Some(code) = request.code() else {
                return Ok(json!({ "response": Value::Null }));
            };
            Ok(execute_ok(code, result.clone()))
        })
        .await;
    }

    pub async fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn recorded_executes(&self) -> Vec<RecordedRequest> {
        self.recorded()
            .await
            .into_iter()
            .filter(RecordedRequest::is_execute)
            .collect()
    }

    pub async fn recorded_uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().await.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post_form(&self, url: &str, fields: &Params) -> Result<Value, TransportError> {
        let request = RecordedRequest {
            url: url.to_string(),
            fields: fields.clone(),
        };
        self.requests.lock().await.push(request.clone());

        if let Some(responder) = self.responder.lock().await.as_ref() {
            return responder(&request);
        }
        if let Some(response) = self.responses.lock().await.pop_front() {
            return response;
        }
        Ok(json!({ "response": Value::Null }))
    }

    async fn post_multipart(
        &self,
        url: &str,
        field: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<Value, TransportError> {
        self.uploads.lock().await.push(RecordedUpload {
            url: url.to_string(),
            field: field.to_string(),
            file_name: file_name.to_string(),
            content,
        });

        if let Some(response) = self.upload_responses.lock().await.pop_front() {
            return response;
        }
        Ok(json!({}))
    }
}

/// Parse `(correlation_id, method, params)` triples out of an execute
/// script. Good enough for the simple parameter shapes tests submit.
pub fn execute_calls(code: &str) -> Vec<(String, String, Value)> {
    let mut out = Vec::new();
    let mut rest = code;
    while let Some(pos) = rest.find("[\"") {
        rest = &rest[pos + 2..];
        let Some(quote) = rest.find('"') else { break };
        let id = rest[..quote].to_string();
        rest = &rest[quote..];
        let Some(api) = rest.find(",API.") else { break };
        rest = &rest[api + 5..];
        let Some(paren) = rest.find('(') else { break };
        let method = rest[..paren].to_string();
        rest = &rest[paren + 1..];
        let Some(close) = rest.find(")]") else { break };
        let params: Value = serde_json::from_str(&rest[..close]).unwrap_or(Value::Null);
        rest = &rest[close..];
        out.push((id, method, params));
    }
    out
}

/// Correlation IDs in submission order.
pub fn execute_ids(code: &str) -> Vec<String> {
    execute_calls(code).into_iter().map(|(id, _, _)| id).collect()
}

/// A successful execute envelope answering every call with `result`.
pub fn execute_ok(code: &str, result: Value) -> Value {
    let pairs: Vec<Value> = execute_ids(code)
        .into_iter()
        .map(|id| json!([id, result.clone()]))
        .collect();
    json!({ "response": pairs })
}
