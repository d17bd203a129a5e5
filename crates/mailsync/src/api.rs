//! `POST /sync` request handling, independent of the HTTP server

use log::{error, warn};
use serde_json::{Value, json};

use crate::error::SyncError;
use crate::sync::{SyncCoordinator, SyncRequest};

/// Status code and JSON body to send back
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

/// Handle a sync trigger body `{ "accountId": .., "userId": .. }`
///
/// 400 for a malformed body or missing fields, 404 when the account is not
/// the user's, 409 while another sync holds the account, 500 for any other
/// run failure.
pub fn handle_sync_request(coordinator: &SyncCoordinator, body: &[u8]) -> ApiResponse {
    let request = match parse_request(body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match coordinator.sync_account(&request) {
        Ok(report) => ApiResponse {
            status: 200,
            body: json!({ "success": true, "report": report }),
        },
        Err(e) => {
            let status = status_for(&e);
            if status >= 500 {
                error!("Sync failed for account {}: {}", request.account_id, e);
            } else {
                warn!("Sync rejected for account {}: {}", request.account_id, e);
            }
            ApiResponse::error(status, e.to_string())
        }
    }
}

fn parse_request(body: &[u8]) -> Result<SyncRequest, ApiResponse> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiResponse::error(400, format!("Invalid JSON body: {}", e)))?;

    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    match (field("accountId"), field("userId")) {
        (Some(account_id), Some(user_id)) => Ok(SyncRequest {
            account_id,
            user_id,
        }),
        _ => Err(ApiResponse::error(400, "Missing accountId or userId")),
    }
}

fn status_for(error: &SyncError) -> u16 {
    match error {
        SyncError::Authorization { .. } => 404,
        SyncError::SyncInProgress { .. } => 409,
        _ => 500,
    }
}
