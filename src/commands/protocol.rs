use crate::errors::PhotoError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One command, as received on the wire: `{"op": "trigger"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CommandRequest {
    SetConfig { param: String, value: String },
    GetConfig { param: String },
    Trigger,
    SetFocus,
    UnlockCamera,
    DownloadPictures { paths: Vec<PathBuf> },
    GetPicturePathList,
    ResetPicturePathList,
    DeletePictures { paths: Vec<String> },
    IsCameraReady,
    Status,
}

impl CommandRequest {
    pub fn name(&self) -> &'static str {
        match self {
            CommandRequest::SetConfig { .. } => "set_config",
            CommandRequest::GetConfig { .. } => "get_config",
            CommandRequest::Trigger => "trigger",
            CommandRequest::SetFocus => "set_focus",
            CommandRequest::UnlockCamera => "unlock_camera",
            CommandRequest::DownloadPictures { .. } => "download_pictures",
            CommandRequest::GetPicturePathList => "get_picture_path_list",
            CommandRequest::ResetPicturePathList => "reset_picture_path_list",
            CommandRequest::DeletePictures { .. } => "delete_pictures",
            CommandRequest::IsCameraReady => "is_camera_ready",
            CommandRequest::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable label from `PhotoError::kind`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn with_value(value: impl Into<serde_json::Value>) -> Self {
        Self {
            success: true,
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_paths(paths: Vec<String>) -> Self {
        Self {
            success: true,
            paths: Some(paths),
            ..Self::default()
        }
    }

    pub fn failed(error: &PhotoError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            ..Self::default()
        }
    }

    /// Failure outside the library error space, such as a bad request line
    pub fn rejected(kind: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            error_kind: Some(kind.to_string()),
            ..Self::default()
        }
    }
}
