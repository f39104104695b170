use serde_json::Value;

use crate::client::ApiClient;
use crate::error::UploadError;
use crate::types::Params;

/// Supported upload targets.
///
/// Each kind fixes the multipart field name, the method acquiring the
/// upload URL, and the method saving the uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Community cover photo.
    Cover,

    /// Document attached to a message. Graffiti and voice recordings
    /// travel this way too.
    Document,

    /// Document stored on the community wall.
    DocumentWall,

    /// Photo attached to a message.
    Photo,
}

impl FileKind {
    fn field_name(self) -> &'static str {
        match self {
            FileKind::Cover | FileKind::Photo => "photo",
            FileKind::Document | FileKind::DocumentWall => "file",
        }
    }

    fn server_method(self) -> &'static str {
        match self {
            FileKind::Cover => "photos.getOwnerCoverPhotoUploadServer",
            FileKind::Document => "docs.getMessagesUploadServer",
            FileKind::DocumentWall => "docs.getWallUploadServer",
            FileKind::Photo => "photos.getMessagesUploadServer",
        }
    }

    fn save_method(self) -> &'static str {
        match self {
            FileKind::Cover => "photos.saveOwnerCoverPhoto",
            FileKind::Document | FileKind::DocumentWall => "docs.save",
            FileKind::Photo => "photos.saveMessagesPhoto",
        }
    }
}

/// File content handed to [`ApiClient::upload`].
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

impl ApiClient {
    /// Upload a file through the platform's two-step protocol.
    ///
    /// Three phases, each with its own typed failure:
    /// 1. acquire the upload URL (`kind`'s server method, with `params`);
    /// 2. POST the file to that URL as multipart form data;
    /// 3. save the upload by merging the server reply with `group_id`
    ///    (when present in `params`) and `after_upload_params`
    ///    (caller-supplied values win), then calling the save method.
    pub async fn upload(
        &self,
        kind: FileKind,
        file: UploadFile,
        params: Params,
        after_upload_params: Params,
    ) -> Result<Value, UploadError> {
        if file.content.is_empty() {
            return Err(UploadError::EmptyFile);
        }

        let server = self
            .call(kind.server_method(), params.clone())
            .await
            .map_err(UploadError::GetServer)?;

        let Some(upload_url) = server.get("upload_url").and_then(Value::as_str) else {
            return Err(UploadError::MissingUploadUrl);
        };

        let reply = self
            .inner
            .transport
            .post_multipart(upload_url, kind.field_name(), &file.name, file.content)
            .await
            .map_err(UploadError::Transfer)?;

        if let Some(error) = reply.get("error") {
            return Err(UploadError::Rejected(error.to_string()));
        }

        let mut save_params = match reply {
            Value::Object(map) => map,
            other => return Err(UploadError::Rejected(other.to_string())),
        };

        if let Some(group_id) = params.get("group_id") {
            save_params.insert("group_id".to_string(), group_id.clone());
        }
        for (key, value) in after_upload_params {
            save_params.insert(key, value);
        }

        self.call(kind.save_method(), save_params)
            .await
            .map_err(UploadError::Save)
    }
}
