//! HTTP client for the provider's sync endpoints
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic. Each method makes a
//! single request; retry decisions belong to the orchestrator.

use std::time::Duration;

use log::debug;

use super::api::{StartSyncResponse, SyncUpdatedResponse};
use super::{FetchCursor, IndexingStatus, SyncProvider, UpdatesPage, decode_records};
use crate::error::TransportError;

const START_SYNC: &str = "start sync";
const FETCH_UPDATES: &str = "fetch updates";

/// Request parameters for the sync-start endpoint
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API root, e.g. `https://api.aurinko.io/v1`
    pub base_url: String,
    /// How far back the indexing job reaches
    pub days_within: u32,
    /// Body rendering requested from the provider (`html` or `text`)
    pub body_type: String,
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: "https://api.aurinko.io/v1".to_string(),
            days_within: 2,
            body_type: "html".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Client for the Aurinko unified email sync API
pub struct AurinkoClient {
    agent: ureq::Agent,
    options: ClientOptions,
}

impl AurinkoClient {
    pub fn new(options: ClientOptions) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(options.request_timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            options,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.options.base_url.trim_end_matches('/'), path)
    }
}

impl SyncProvider for AurinkoClient {
    fn start_indexing(&self, credential: &str) -> Result<IndexingStatus, TransportError> {
        let url = format!(
            "{}?daysWithin={}&bodyType={}",
            self.url("/email/sync"),
            self.options.days_within,
            urlencoding::encode(&self.options.body_type)
        );

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", &format!("Bearer {}", credential))
            .send_empty()
            .map_err(|e| classify(START_SYNC, e))?;

        let body: StartSyncResponse =
            response
                .body_mut()
                .read_json()
                .map_err(|e| TransportError::Decode {
                    operation: START_SYNC,
                    message: e.to_string(),
                })?;

        debug!(
            "Start sync: ready={} deleted_token_present={}",
            body.ready,
            body.sync_deleted_token.is_some()
        );

        Ok(IndexingStatus {
            ready: body.ready,
            delta_token: body.sync_updated_token.filter(|t| !t.is_empty()),
        })
    }

    fn fetch_updates(
        &self,
        credential: &str,
        cursor: &FetchCursor,
    ) -> Result<UpdatesPage, TransportError> {
        let param = match cursor {
            FetchCursor::Delta(_) => "deltaToken",
            FetchCursor::Page(_) => "pageToken",
        };
        let url = format!(
            "{}?{}={}",
            self.url("/email/sync/updated"),
            param,
            urlencoding::encode(cursor.token())
        );

        let result = self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", credential))
            .call();

        let mut response = match result {
            Ok(response) => response,
            // A stale delta cursor comes back as Gone/Not Found
            Err(ureq::Error::StatusCode(status @ (404 | 410)))
                if matches!(cursor, FetchCursor::Delta(_)) =>
            {
                return Err(TransportError::CursorExpired { status });
            }
            Err(e) => return Err(classify(FETCH_UPDATES, e)),
        };

        let body: SyncUpdatedResponse =
            response
                .body_mut()
                .read_json()
                .map_err(|e| TransportError::Decode {
                    operation: FETCH_UPDATES,
                    message: e.to_string(),
                })?;

        let (records, rejected) = decode_records(body.records);
        debug!(
            "Fetched {} records ({} rejected, reported length {:?})",
            records.len(),
            rejected,
            body.length
        );

        Ok(UpdatesPage {
            records,
            next_page_token: body.next_page_token.filter(|t| !t.is_empty()),
            next_delta_token: body.next_delta_token.filter(|t| !t.is_empty()),
            rejected,
        })
    }
}

fn classify(operation: &'static str, error: ureq::Error) -> TransportError {
    match error {
        ureq::Error::StatusCode(status @ (401 | 403)) => TransportError::Unauthorized { status },
        ureq::Error::StatusCode(status) => TransportError::Status { operation, status },
        other => TransportError::Network {
            operation,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = AurinkoClient::new(ClientOptions {
            base_url: "https://api.example.com/v1/".to_string(),
            ..ClientOptions::default()
        });
        assert_eq!(
            client.url("/email/sync"),
            "https://api.example.com/v1/email/sync"
        );
    }

    #[test]
    fn test_classify_status_codes() {
        assert!(matches!(
            classify(FETCH_UPDATES, ureq::Error::StatusCode(401)),
            TransportError::Unauthorized { status: 401 }
        ));
        assert!(matches!(
            classify(FETCH_UPDATES, ureq::Error::StatusCode(503)),
            TransportError::Status { status: 503, .. }
        ));
    }

    #[test]
    fn test_unreachable_host_is_network_error() {
        let client = AurinkoClient::new(ClientOptions {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout: Duration::from_secs(2),
            ..ClientOptions::default()
        });
        let err = client.start_indexing("token").unwrap_err();
        assert!(matches!(err, TransportError::Network { .. }));
    }
}
