use serde_json::{json, Value};

use crate::client::ApiClient;
use crate::error::CallError;
use crate::types::{params, Params};

/// Event types wrapped as message-class events.
const MESSAGE_TYPES: &[&str] = &["message_new", "message_reply"];

/// A wrapped inbound event, selected by the declared type string at one
/// construction boundary.
///
/// Message-class events expose reply/send convenience operations bound to
/// the community's client; everything else is a generic wrapper with
/// field access only. Dispatch never needs to know which variant a type
/// produces.
#[derive(Clone)]
pub enum Event {
    Message(MessageEvent),
    Raw(RawEvent),
}

impl Event {
    /// Wrap a raw payload according to its declared type.
    pub fn from_callback(event_type: &str, object: Value, client: ApiClient) -> Self {
        if MESSAGE_TYPES.contains(&event_type) {
            Event::Message(MessageEvent {
                event_type: event_type.to_string(),
                object,
                client,
            })
        } else {
            Event::Raw(RawEvent {
                event_type: event_type.to_string(),
                object,
                client,
            })
        }
    }

    /// Declared type of the inbound event.
    pub fn event_type(&self) -> &str {
        match self {
            Event::Message(event) => &event.event_type,
            Event::Raw(event) => &event.event_type,
        }
    }

    /// Opaque payload that triggered the event.
    pub fn object(&self) -> &Value {
        match self {
            Event::Message(event) => &event.object,
            Event::Raw(event) => &event.object,
        }
    }

    /// Client of the community the event belongs to.
    pub fn client(&self) -> &ApiClient {
        match self {
            Event::Message(event) => &event.client,
            Event::Raw(event) => &event.client,
        }
    }

    /// The message-class view, when this event has one.
    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            Event::Message(event) => Some(event),
            Event::Raw(_) => None,
        }
    }
}

/// A `message_new` / `message_reply` payload with convenience operations.
#[derive(Clone)]
pub struct MessageEvent {
    event_type: String,
    object: Value,
    client: ApiClient,
}

impl MessageEvent {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn object(&self) -> &Value {
        &self.object
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Sender (and dialog) identifier.
    pub fn user_id(&self) -> Option<i64> {
        self.object.get("user_id").and_then(Value::as_i64)
    }

    /// Message identifier.
    pub fn id(&self) -> Option<i64> {
        self.object.get("id").and_then(Value::as_i64)
    }

    /// Message text.
    pub fn text(&self) -> Option<&str> {
        self.object.get("body").and_then(Value::as_str)
    }

    fn attachments(&self) -> Option<&Vec<Value>> {
        self.object.get("attachments").and_then(Value::as_array)
    }

    fn first_attachment_type(&self) -> Option<&str> {
        self.attachments()?
            .first()?
            .get("type")
            .and_then(Value::as_str)
    }

    fn first_doc_preview(&self) -> Option<&Value> {
        let attachment = self.attachments()?.first()?;
        if attachment.get("type").and_then(Value::as_str) != Some("doc") {
            return None;
        }
        attachment.get("doc")?.get("preview")
    }

    /// Plain text with no attachments, forwards or geodata.
    pub fn is_text(&self) -> bool {
        self.text().map_or(false, |text| !text.is_empty())
            && self.object.get("attachments").is_none()
            && self.object.get("fwd_messages").is_none()
            && self.object.get("geo").is_none()
    }

    pub fn is_photo(&self) -> bool {
        self.first_attachment_type() == Some("photo")
    }

    pub fn is_sticker(&self) -> bool {
        self.first_attachment_type() == Some("sticker")
    }

    pub fn is_audio(&self) -> bool {
        self.first_attachment_type() == Some("audio")
    }

    /// Voice recording, carried as a doc with an `audio_msg` preview.
    pub fn is_audio_message(&self) -> bool {
        self.first_doc_preview()
            .map_or(false, |preview| preview.get("audio_msg").is_some())
    }

    /// Graffiti, carried as a doc with a `graffiti` preview.
    pub fn is_graffiti(&self) -> bool {
        self.first_doc_preview()
            .map_or(false, |preview| preview.get("graffiti").is_some())
    }

    /// Send a text reply into the dialog this message came from.
    ///
    /// Enqueues `messages.send` with the triggering sender's `user_id`.
    pub async fn reply(&self, text: impl Into<String>) -> Result<Value, CallError> {
        let text = text.into();
        if text.is_empty() {
            return Err(CallError::Misuse("there is nothing to send"));
        }
        let Some(user_id) = self.user_id() else {
            return Err(CallError::Misuse("message carries no user id"));
        };

        self.client
            .call(
                "messages.send",
                params(json!({ "user_id": user_id, "message": text })),
            )
            .await
    }

    /// Send a message with caller-controlled parameters.
    pub async fn send(&self, params: Params) -> Result<Value, CallError> {
        self.client.call("messages.send", params).await
    }

    /// Show the typing indicator in this dialog.
    pub async fn set_typing(&self) -> Result<Value, CallError> {
        let Some(user_id) = self.user_id() else {
            return Err(CallError::Misuse("message carries no user id"));
        };

        self.client
            .call(
                "messages.setActivity",
                params(json!({ "type": "typing", "user_id": user_id })),
            )
            .await
    }

    /// Delete this message.
    pub async fn delete(&self) -> Result<Value, CallError> {
        let Some(id) = self.id() else {
            return Err(CallError::Misuse("message carries no id"));
        };
        self.delete_ids(&[id]).await
    }

    /// Delete messages by identifier.
    pub async fn delete_ids(&self, message_ids: &[i64]) -> Result<Value, CallError> {
        if message_ids.is_empty() {
            return Err(CallError::Misuse("no message ids to delete"));
        }
        let rendered = message_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");

        self.client
            .call("messages.delete", params(json!({ "message_ids": rendered })))
            .await
    }

    /// Restore this message after deletion.
    pub async fn restore(&self) -> Result<Value, CallError> {
        let Some(id) = self.id() else {
            return Err(CallError::Misuse("message carries no id"));
        };

        self.client
            .call("messages.restore", params(json!({ "message_id": id })))
            .await
    }
}

/// Any non-message event: field access plus the community's client.
#[derive(Clone)]
pub struct RawEvent {
    event_type: String,
    object: Value,
    client: ApiClient,
}

impl RawEvent {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn object(&self) -> &Value {
        &self.object
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Top-level payload field, when present.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.object.get(name)
    }
}
