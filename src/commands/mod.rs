//! Typed command surface
//!
//! Requests and responses mirror the node's blocking operations one to one.
//! `dispatch` runs a request on the calling thread; `handle_request` moves
//! it onto the tokio blocking pool so async front ends never stall a worker
//! while a download waits for pictures.

pub mod protocol;

pub use protocol::{CommandRequest, CommandResponse};

use crate::node::PhotoNode;
use std::sync::Arc;

/// Run one request against the node and shape the outcome as a response
pub fn dispatch(node: &PhotoNode, request: CommandRequest) -> CommandResponse {
    let name = request.name();
    log::debug!("Handling {} request", name);

    let response = match request {
        CommandRequest::SetConfig { param, value } => match node.set_config(&param, &value) {
            Ok(()) => CommandResponse::ok(),
            Err(e) => CommandResponse::failed(&e),
        },
        CommandRequest::GetConfig { param } => match node.get_config(&param) {
            Ok(value) => CommandResponse::with_value(value),
            Err(e) => CommandResponse::failed(&e),
        },
        CommandRequest::Trigger => match node.trigger() {
            Ok(()) => CommandResponse::ok(),
            Err(e) => CommandResponse::failed(&e),
        },
        CommandRequest::SetFocus => match node.set_focus() {
            Ok(()) => CommandResponse::ok(),
            Err(e) => CommandResponse::failed(&e),
        },
        CommandRequest::UnlockCamera => match node.unlock_camera() {
            Ok(()) => CommandResponse::ok(),
            Err(e) => CommandResponse::failed(&e),
        },
        CommandRequest::DownloadPictures { paths } => match node.download_pictures(&paths) {
            Ok(report) => {
                let mut response = CommandResponse::with_paths(
                    report
                        .downloaded
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect(),
                );
                response.success = report.success();
                if !report.success() {
                    response.error = Some(format!("{} transfer(s) failed", report.failed.len()));
                    response.error_kind = Some("io_error".to_string());
                }
                response
            }
            Err(e) => CommandResponse::failed(&e),
        },
        CommandRequest::GetPicturePathList => match node.get_picture_path_list() {
            Ok(paths) => CommandResponse::with_paths(paths),
            Err(e) => CommandResponse::failed(&e),
        },
        CommandRequest::ResetPicturePathList => match node.reset_picture_path_list() {
            Ok(()) => CommandResponse::ok(),
            Err(e) => CommandResponse::failed(&e),
        },
        CommandRequest::DeletePictures { paths } => match node.delete_pictures(&paths) {
            Ok(report) => CommandResponse::with_paths(report.deleted),
            Err(e) => CommandResponse::failed(&e),
        },
        CommandRequest::IsCameraReady => {
            let ready = node.is_camera_ready();
            CommandResponse {
                success: ready,
                value: Some(ready.into()),
                ..CommandResponse::default()
            }
        }
        CommandRequest::Status => match node.status() {
            Ok(status) => match serde_json::to_value(status) {
                Ok(value) => CommandResponse::with_value(value),
                Err(e) => CommandResponse::rejected("internal", e.to_string()),
            },
            Err(e) => CommandResponse::failed(&e),
        },
    };

    if let Some(error) = &response.error {
        log::error!("Command {} failed: {}", name, error);
    }
    response
}

/// Async entry point: runs `dispatch` on the blocking pool
pub async fn handle_request(node: Arc<PhotoNode>, request: CommandRequest) -> CommandResponse {
    let name = request.name();
    match tokio::task::spawn_blocking(move || dispatch(&node, request)).await {
        Ok(response) => response,
        Err(e) => {
            log::error!("Command {} task failed: {}", name, e);
            CommandResponse::rejected("internal", format!("command task failed: {}", e))
        }
    }
}

/// Parse one JSON request line and handle it
pub async fn handle_line(node: Arc<PhotoNode>, line: &str) -> CommandResponse {
    match serde_json::from_str::<CommandRequest>(line) {
        Ok(request) => handle_request(node, request).await,
        Err(e) => {
            log::warn!("Invalid request line: {}", e);
            CommandResponse::rejected("invalid_request", e.to_string())
        }
    }
}
