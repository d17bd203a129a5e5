//! Mailsync daemon
//!
//! Usage:
//!   syncd                                          serve POST /sync
//!   syncd sync <account-id> <user-id>              run one sync and print the report
//!   syncd link-account <account-id> <user-id> <access-token> [email]
//!   syncd init-config                              write default settings

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{debug, error, info, warn};
use mailsync::{
    Account, AurinkoClient, MailStore, SqliteMailStore, SyncCoordinator, SyncRequest,
    SyncSettings, handle_sync_request,
};
use tiny_http::{Header, Method, Request, Response, Server};

/// Largest request body accepted on /sync
const MAX_BODY_BYTES: u64 = 64 * 1024;

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    if let Err(e) = run(std::env::args().skip(1).collect()) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Vec<String>) -> Result<()> {
    if args.first().map(String::as_str) == Some("init-config") {
        if config::config_exists("sync.json") {
            bail!("Settings file already exists");
        }
        let path = SyncSettings::default().save()?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let settings = SyncSettings::load().context("Failed to load sync settings")?;
    let db_path = settings.database_path()?;
    info!("Using database at {}", db_path.display());
    let store = Arc::new(SqliteMailStore::new(&db_path)?);

    match args.first().map(String::as_str) {
        None | Some("serve") => serve(&settings, store),
        Some("sync") => {
            let [_, account_id, user_id] = args.as_slice() else {
                bail!("usage: syncd sync <account-id> <user-id>");
            };
            let coordinator = build_coordinator(&settings, store);
            let report = coordinator.sync_account(&SyncRequest {
                account_id: account_id.clone(),
                user_id: user_id.clone(),
            })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Some("link-account") => {
            let (account_id, user_id, token, email) = match args.as_slice() {
                [_, a, u, t] => (a, u, t, None),
                [_, a, u, t, e] => (a, u, t, Some(e)),
                _ => bail!("usage: syncd link-account <account-id> <user-id> <access-token> [email]"),
            };
            // Relinking replaces the credential but keeps the cursor
            let existing = store.get_account(account_id)?;
            let mut account = Account::new(account_id.as_str(), user_id.as_str(), token.as_str());
            if let Some(email) = email {
                account = account.with_email_address(email.as_str());
            }
            if let Some(existing) = existing {
                account.next_delta_token = existing.next_delta_token;
                account.last_sync_at = existing.last_sync_at;
                if email.is_none() {
                    account.email_address = existing.email_address;
                }
            }
            store.upsert_account(account)?;
            info!("Linked account {} for user {}", account_id, user_id);
            Ok(())
        }
        Some(other) => bail!("Unknown command {:?}", other),
    }
}

fn build_coordinator(settings: &SyncSettings, store: Arc<dyn MailStore>) -> SyncCoordinator {
    let client = AurinkoClient::new(settings.client_options());
    SyncCoordinator::new(store, Arc::new(client), settings.sync_options())
}

fn serve(settings: &SyncSettings, store: Arc<dyn MailStore>) -> Result<()> {
    let coordinator = Arc::new(build_coordinator(settings, store));
    let server = Server::http(settings.listen_addr.as_str())
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", settings.listen_addr, e))?;

    info!("Listening on http://{}", settings.listen_addr);

    // Runs take minutes; one thread per request keeps other accounts moving
    for request in server.incoming_requests() {
        let coordinator = Arc::clone(&coordinator);
        std::thread::spawn(move || handle(&coordinator, request));
    }
    Ok(())
}

fn handle(coordinator: &SyncCoordinator, mut request: Request) {
    let method = request.method().clone();
    let url = request.url().to_string();
    debug!("{} {}", method, url);

    let (status, body) = match (&method, url.as_str()) {
        (Method::Post, "/sync") => {
            let mut bytes = Vec::new();
            match request
                .as_reader()
                .take(MAX_BODY_BYTES)
                .read_to_end(&mut bytes)
            {
                Ok(_) => {
                    let response = handle_sync_request(coordinator, &bytes);
                    (response.status, response.body)
                }
                Err(e) => (
                    400,
                    serde_json::json!({ "error": format!("Failed to read body: {}", e) }),
                ),
            }
        }
        (_, "/sync") => (405, serde_json::json!({ "error": "Method not allowed" })),
        _ => (404, serde_json::json!({ "error": "Not found" })),
    };

    let mut response = Response::from_string(body.to_string()).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    if let Err(e) = request.respond(response) {
        warn!("Failed to send response: {}", e);
    }
}
