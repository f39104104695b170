use std::fmt;

use serde_json::Value;

/// Errors reaching the remote platform at the connection level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request exceeded its time budget.
    Timeout,

    /// Connection-level failure with the underlying cause.
    Network(String),

    /// The platform answered with a non-success HTTP status.
    Status(u16),

    /// The response body was not valid JSON.
    InvalidJson(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout =>
                write!(f, "request timed out"),
            TransportError::Network(cause) =>
                write!(f, "network error: {}", cause),
            TransportError::Status(code) =>
                write!(f, "unexpected http status {}", code),
            TransportError::InvalidJson(cause) =>
                write!(f, "response body is not valid json: {}", cause),
        }
    }
}

impl std::error::Error for TransportError {}

/// A structured error object returned by the platform.
///
/// The payload is surfaced verbatim; `code` and `message` are convenience
/// views into the fields the platform documents.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    payload: Value,
}

impl RemoteError {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// The platform error payload, exactly as returned.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Numeric `error_code`, when present.
    pub fn code(&self) -> Option<i64> {
        self.payload.get("error_code").and_then(Value::as_i64)
    }

    /// Human-readable `error_msg`, when present.
    pub fn message(&self) -> Option<&str> {
        self.payload.get("error_msg").and_then(Value::as_str)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code(), self.message()) {
            (Some(code), Some(message)) =>
                write!(f, "api error {}: {}", code, message),
            _ =>
                write!(f, "api error: {}", self.payload),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Outcome classification for a single outbound call.
///
/// Exactly one of these reaches each pending call, exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// The platform returned a structured error for this call or for the
    /// whole envelope. Never retried automatically.
    Remote(RemoteError),

    /// Connection/timeout failure reaching the platform.
    Transport(TransportError),

    /// The platform reply violated the documented envelope shape.
    Protocol(String),

    /// Invalid use of a convenience operation, surfaced synchronously.
    Misuse(&'static str),

    /// The client has been shut down.
    Closed,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Remote(error) =>
                write!(f, "{}", error),
            CallError::Transport(error) =>
                write!(f, "transport failure: {}", error),
            CallError::Protocol(detail) =>
                write!(f, "protocol violation: {}", detail),
            CallError::Misuse(detail) =>
                write!(f, "invalid call: {}", detail),
            CallError::Closed =>
                write!(f, "client is shut down"),
        }
    }
}

impl std::error::Error for CallError {}

impl From<RemoteError> for CallError {
    fn from(error: RemoteError) -> Self {
        CallError::Remote(error)
    }
}

impl From<TransportError> for CallError {
    fn from(error: TransportError) -> Self {
        CallError::Transport(error)
    }
}

/// Failure of the two-step upload protocol, typed by phase.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadError {
    /// Nothing to upload; failed before any request was made.
    EmptyFile,

    /// Phase one: acquiring the upload URL failed.
    GetServer(CallError),

    /// Phase one: the upload server reply carried no `upload_url`.
    MissingUploadUrl,

    /// Phase two: posting the file failed at the connection level.
    Transfer(TransportError),

    /// Phase two: the upload server rejected the file.
    Rejected(String),

    /// Phase three: saving the uploaded file failed.
    Save(CallError),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::EmptyFile =>
                write!(f, "no file to upload provided"),
            UploadError::GetServer(error) =>
                write!(f, "acquiring upload url failed: {}", error),
            UploadError::MissingUploadUrl =>
                write!(f, "upload server reply carried no upload url"),
            UploadError::Transfer(error) =>
                write!(f, "file transfer failed: {}", error),
            UploadError::Rejected(detail) =>
                write!(f, "upload server rejected the file: {}", detail),
            UploadError::Save(error) =>
                write!(f, "saving uploaded file failed: {}", error),
        }
    }
}

impl std::error::Error for UploadError {}
