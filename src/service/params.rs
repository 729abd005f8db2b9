use serde::{Deserialize, Serialize};

use crate::memorial::types::ImageReference;

/// Body of `lookup-memorial`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LookupParams {
    /// Free-text name; matched as a case-insensitive substring of stored names.
    #[serde(default)]
    pub name: String,
}

/// Body of `persist-images`. A missing list is treated as empty.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistImagesParams {
    #[serde(default)]
    pub images: Option<Vec<ImageReference>>,
}

/// Query of a direct upload; the file itself is the request body.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UploadParams {
    pub file_name: String,
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Query of a signed object read.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignedReadParams {
    pub expires: u64,
    pub token: String,
}

/// `{message}` reply of the cleanup endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
