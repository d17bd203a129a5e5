//! SQLite-based mailbox storage

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::{MailStore, ThreadFilter};
use crate::models::{
    Account, AddressEntry, AddressId, Attachment, Email, EmailAddress, EmailId, Folder,
    FolderFlags, Recipients, Thread, ThreadId, ThreadUpsert,
};

/// zstd level for bodies and attachment payloads
const COMPRESSION_LEVEL: i32 = 3;

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        r#"
        CREATE TABLE accounts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            email_address TEXT NOT NULL DEFAULT '',
            name TEXT,
            access_token TEXT NOT NULL,
            next_delta_token TEXT,
            sync_lease_at INTEGER,       -- unix millis, NULL = no run in progress
            last_sync_at TEXT
        );

        CREATE INDEX idx_accounts_user ON accounts(user_id);

        -- One identity per (account, address)
        CREATE TABLE email_addresses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL,
            address TEXT NOT NULL,
            name TEXT,
            raw TEXT,
            UNIQUE (account_id, address),
            FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
        );

        CREATE TABLE threads (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            last_message_date TEXT NOT NULL,
            participant_ids TEXT NOT NULL DEFAULT '[]',  -- JSON array
            inbox_status INTEGER NOT NULL DEFAULT 0,
            draft_status INTEGER NOT NULL DEFAULT 0,
            sent_status INTEGER NOT NULL DEFAULT 0,
            done INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_threads_account_date
            ON threads(account_id, last_message_date DESC);

        CREATE TABLE emails (
            id TEXT PRIMARY KEY,
            thread_id TEXT NOT NULL,
            from_id INTEGER NOT NULL,
            email_label TEXT NOT NULL,
            created_time TEXT NOT NULL,
            last_modified_time TEXT NOT NULL,
            sent_at TEXT NOT NULL,
            received_at TEXT NOT NULL,
            internet_message_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            sys_labels TEXT NOT NULL,
            keywords TEXT NOT NULL,
            sys_classifications TEXT NOT NULL,
            sensitivity TEXT NOT NULL,
            meeting_message_method TEXT,
            has_attachments INTEGER NOT NULL DEFAULT 0,
            body BLOB,                   -- zstd compressed
            body_snippet TEXT,
            in_reply_to TEXT,
            references_header TEXT,
            thread_index TEXT,
            internet_headers TEXT NOT NULL,
            native_properties TEXT NOT NULL,
            folder_id TEXT,
            omitted TEXT NOT NULL,
            FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE,
            FOREIGN KEY (from_id) REFERENCES email_addresses(id)
        );

        CREATE INDEX idx_emails_thread ON emails(thread_id, received_at ASC);

        CREATE TABLE email_recipients (
            email_id TEXT NOT NULL,
            kind TEXT NOT NULL,          -- to, cc, bcc, reply_to
            address_id INTEGER NOT NULL,
            PRIMARY KEY (email_id, kind, address_id),
            FOREIGN KEY (email_id) REFERENCES emails(id) ON DELETE CASCADE,
            FOREIGN KEY (address_id) REFERENCES email_addresses(id)
        );

        CREATE TABLE attachments (
            id TEXT PRIMARY KEY,
            email_id TEXT NOT NULL,
            name TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size INTEGER NOT NULL,
            inline INTEGER NOT NULL DEFAULT 0,
            content_id TEXT,
            content BLOB,                -- zstd compressed
            content_location TEXT,
            FOREIGN KEY (email_id) REFERENCES emails(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_attachments_email ON attachments(email_id);
        "#,
    )])
}

/// SQLite-based mailbox storage
pub struct SqliteMailStore {
    conn: Mutex<Connection>,
}

impl SqliteMailStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::with_connection(conn)
    }

    /// A private in-memory database; handy for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(mut conn: Connection) -> Result<Self> {
        // WAL lets readers proceed during a sync's writes; foreign keys are
        // needed for the cascades.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }
}

// === Row mapping ===

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid stored timestamp {:?}", value))
}

fn compress(text: Option<&str>) -> Result<Option<Vec<u8>>> {
    text.map(|t| zstd::encode_all(t.as_bytes(), COMPRESSION_LEVEL))
        .transpose()
        .context("Failed to compress payload")
}

fn decompress(data: Option<Vec<u8>>) -> Result<Option<String>> {
    let Some(data) = data else {
        return Ok(None);
    };
    let bytes = zstd::decode_all(data.as_slice()).context("Failed to decompress payload")?;
    Ok(Some(String::from_utf8(bytes).context("Stored payload is not UTF-8")?))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to encode JSON column")
}

fn from_json<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    serde_json::from_str(value).context("Failed to decode JSON column")
}

const ACCOUNT_COLUMNS: &str = "id, user_id, email_address, name, access_token, next_delta_token,
     sync_lease_at, last_sync_at";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<(Account, Option<String>)> {
    let lease_ms: Option<i64> = row.get(6)?;
    let account = Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        email_address: row.get(2)?,
        name: row.get(3)?,
        access_token: row.get(4)?,
        next_delta_token: row.get(5)?,
        sync_lease_at: lease_ms.and_then(DateTime::from_timestamp_millis),
        last_sync_at: None,
    };
    Ok((account, row.get(7)?))
}

fn finish_account((mut account, last_sync_at): (Account, Option<String>)) -> Result<Account> {
    account.last_sync_at = last_sync_at.as_deref().map(parse_time).transpose()?;
    Ok(account)
}

const THREAD_COLUMNS: &str = "id, account_id, subject, last_message_date, participant_ids,
     inbox_status, draft_status, sent_status, done";

struct ThreadRow {
    id: String,
    account_id: String,
    subject: String,
    last_message_date: String,
    participant_ids: String,
    inbox_status: bool,
    draft_status: bool,
    sent_status: bool,
    done: bool,
}

impl ThreadRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            subject: row.get(2)?,
            last_message_date: row.get(3)?,
            participant_ids: row.get(4)?,
            inbox_status: row.get(5)?,
            draft_status: row.get(6)?,
            sent_status: row.get(7)?,
            done: row.get(8)?,
        })
    }

    fn into_thread(self) -> Result<Thread> {
        let ids: Vec<i64> = from_json(&self.participant_ids)?;
        Ok(Thread {
            id: ThreadId::new(self.id),
            account_id: self.account_id,
            subject: self.subject,
            last_message_date: parse_time(&self.last_message_date)?,
            participant_ids: ids.into_iter().map(AddressId).collect(),
            inbox_status: self.inbox_status,
            draft_status: self.draft_status,
            sent_status: self.sent_status,
            done: self.done,
        })
    }
}

fn load_thread(conn: &Connection, id: &ThreadId) -> Result<Option<Thread>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM threads WHERE id = ?", THREAD_COLUMNS),
            [id.as_str()],
            ThreadRow::from_row,
        )
        .optional()?;
    row.map(ThreadRow::into_thread).transpose()
}

fn save_thread(conn: &Connection, thread: &Thread) -> Result<()> {
    let participants: Vec<i64> = thread.participant_ids.iter().map(|id| id.0).collect();
    conn.execute(
        "INSERT INTO threads
         (id, account_id, subject, last_message_date, participant_ids,
          inbox_status, draft_status, sent_status, done)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            account_id = excluded.account_id,
            subject = excluded.subject,
            last_message_date = excluded.last_message_date,
            participant_ids = excluded.participant_ids,
            inbox_status = excluded.inbox_status,
            draft_status = excluded.draft_status,
            sent_status = excluded.sent_status,
            done = excluded.done",
        params![
            thread.id.as_str(),
            thread.account_id,
            thread.subject,
            thread.last_message_date.to_rfc3339(),
            to_json(&participants)?,
            thread.inbox_status,
            thread.draft_status,
            thread.sent_status,
            thread.done,
        ],
    )?;
    Ok(())
}

const EMAIL_COLUMNS: &str = "id, thread_id, from_id, email_label, created_time, last_modified_time,
     sent_at, received_at, internet_message_id, subject, sys_labels, keywords,
     sys_classifications, sensitivity, meeting_message_method, has_attachments, body,
     body_snippet, in_reply_to, references_header, thread_index, internet_headers,
     native_properties, folder_id, omitted";

/// Raw column values of an `emails` row, decoded outside the rusqlite closure
struct EmailRow {
    id: String,
    thread_id: String,
    from_id: i64,
    email_label: String,
    created_time: String,
    last_modified_time: String,
    sent_at: String,
    received_at: String,
    internet_message_id: String,
    subject: String,
    sys_labels: String,
    keywords: String,
    sys_classifications: String,
    sensitivity: String,
    meeting_message_method: Option<String>,
    has_attachments: bool,
    body: Option<Vec<u8>>,
    body_snippet: Option<String>,
    in_reply_to: Option<String>,
    references: Option<String>,
    thread_index: Option<String>,
    internet_headers: String,
    native_properties: String,
    folder_id: Option<String>,
    omitted: String,
}

impl EmailRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            thread_id: row.get(1)?,
            from_id: row.get(2)?,
            email_label: row.get(3)?,
            created_time: row.get(4)?,
            last_modified_time: row.get(5)?,
            sent_at: row.get(6)?,
            received_at: row.get(7)?,
            internet_message_id: row.get(8)?,
            subject: row.get(9)?,
            sys_labels: row.get(10)?,
            keywords: row.get(11)?,
            sys_classifications: row.get(12)?,
            sensitivity: row.get(13)?,
            meeting_message_method: row.get(14)?,
            has_attachments: row.get(15)?,
            body: row.get(16)?,
            body_snippet: row.get(17)?,
            in_reply_to: row.get(18)?,
            references: row.get(19)?,
            thread_index: row.get(20)?,
            internet_headers: row.get(21)?,
            native_properties: row.get(22)?,
            folder_id: row.get(23)?,
            omitted: row.get(24)?,
        })
    }

    fn into_email(self, recipients: Recipients) -> Result<Email> {
        let email_label = Folder::parse(&self.email_label)
            .with_context(|| format!("Unknown email label {:?}", self.email_label))?;
        Ok(Email {
            id: EmailId::new(self.id),
            thread_id: ThreadId::new(self.thread_id),
            from_id: AddressId(self.from_id),
            recipients,
            email_label,
            created_time: parse_time(&self.created_time)?,
            last_modified_time: parse_time(&self.last_modified_time)?,
            sent_at: parse_time(&self.sent_at)?,
            received_at: parse_time(&self.received_at)?,
            internet_message_id: self.internet_message_id,
            subject: self.subject,
            sys_labels: from_json(&self.sys_labels)?,
            keywords: from_json(&self.keywords)?,
            sys_classifications: from_json(&self.sys_classifications)?,
            sensitivity: self.sensitivity,
            meeting_message_method: self.meeting_message_method,
            has_attachments: self.has_attachments,
            body: decompress(self.body)?,
            body_snippet: self.body_snippet,
            in_reply_to: self.in_reply_to,
            references: self.references,
            thread_index: self.thread_index,
            internet_headers: from_json(&self.internet_headers)?,
            native_properties: from_json(&self.native_properties)?,
            folder_id: self.folder_id,
            omitted: from_json(&self.omitted)?,
        })
    }
}

fn load_recipients(conn: &Connection, email_id: &str) -> Result<Recipients> {
    let mut stmt = conn.prepare(
        "SELECT kind, address_id FROM email_recipients
         WHERE email_id = ? ORDER BY kind, address_id",
    )?;
    let rows = stmt
        .query_map([email_id], |row| {
            Ok((row.get::<_, String>(0)?, AddressId(row.get(1)?)))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut recipients = Recipients::default();
    for (kind, id) in rows {
        match kind.as_str() {
            "to" => recipients.to.push(id),
            "cc" => recipients.cc.push(id),
            "bcc" => recipients.bcc.push(id),
            "reply_to" => recipients.reply_to.push(id),
            other => return Err(anyhow!("Unknown recipient kind {:?}", other)),
        }
    }
    Ok(recipients)
}

fn load_emails(conn: &Connection, sql: &str, key: &str) -> Result<Vec<Email>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([key], EmailRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|row| {
            let recipients = load_recipients(conn, &row.id)?;
            row.into_email(recipients)
        })
        .collect()
}

const ATTACHMENT_COLUMNS: &str =
    "id, email_id, name, mime_type, size, inline, content_id, content, content_location";

fn attachment_from_row(row: &Row<'_>) -> rusqlite::Result<(Attachment, Option<Vec<u8>>)> {
    let attachment = Attachment {
        id: row.get(0)?,
        email_id: EmailId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        mime_type: row.get(3)?,
        size: row.get(4)?,
        inline: row.get(5)?,
        content_id: row.get(6)?,
        content: None,
        content_location: row.get(8)?,
    };
    Ok((attachment, row.get(7)?))
}

fn filter_clause(filter: &ThreadFilter) -> String {
    let mut clause = String::new();
    if let Some(folder) = filter.folder {
        clause.push_str(match folder {
            Folder::Inbox => " AND inbox_status = 1",
            Folder::Draft => " AND draft_status = 1",
            Folder::Sent => " AND sent_status = 1",
        });
    }
    if let Some(done) = filter.done {
        clause.push_str(if done { " AND done = 1" } else { " AND done = 0" });
    }
    clause
}

impl MailStore for SqliteMailStore {
    fn upsert_account(&self, account: Account) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO accounts
             (id, user_id, email_address, name, access_token, next_delta_token,
              sync_lease_at, last_sync_at)
             VALUES (?, ?, ?, ?, ?, ?, NULL, ?)
             ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                email_address = excluded.email_address,
                name = excluded.name,
                access_token = excluded.access_token,
                next_delta_token = excluded.next_delta_token,
                last_sync_at = excluded.last_sync_at",
            params![
                account.id,
                account.user_id,
                account.email_address,
                account.name,
                account.access_token,
                account.next_delta_token,
                account.last_sync_at.map(|at| at.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS),
                [account_id],
                account_from_row,
            )
            .optional()?;
        row.map(finish_account).transpose()
    }

    fn find_account_for_user(&self, account_id: &str, user_id: &str) -> Result<Option<Account>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM accounts WHERE id = ? AND user_id = ?",
                    ACCOUNT_COLUMNS
                ),
                [account_id, user_id],
                account_from_row,
            )
            .optional()?;
        row.map(finish_account).transpose()
    }

    fn save_delta_token(&self, account_id: &str, delta_token: &str) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE accounts SET next_delta_token = ?, last_sync_at = ? WHERE id = ?",
            params![delta_token, Utc::now().to_rfc3339(), account_id],
        )?;
        if updated == 0 {
            return Err(anyhow!("Account {} not found", account_id));
        }
        Ok(())
    }

    fn try_acquire_sync_lease(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let now_ms = now.timestamp_millis();
        let stale_before = (now - ttl).timestamp_millis();

        let updated = conn.execute(
            "UPDATE accounts SET sync_lease_at = ?1
             WHERE id = ?2 AND (sync_lease_at IS NULL OR sync_lease_at <= ?3)",
            params![now_ms, account_id, stale_before],
        )?;
        if updated == 1 {
            return Ok(true);
        }

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?)",
            [account_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(anyhow!("Account {} not found", account_id));
        }
        Ok(false)
    }

    fn release_sync_lease(&self, account_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE accounts SET sync_lease_at = NULL WHERE id = ?",
            [account_id],
        )?;
        Ok(())
    }

    fn find_or_create_address(
        &self,
        account_id: &str,
        entry: &AddressEntry,
    ) -> Result<EmailAddress> {
        let conn = self.lock()?;

        // The unique key makes a concurrent insert of the same address a no-op
        conn.execute(
            "INSERT INTO email_addresses (account_id, address, name, raw)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(account_id, address) DO NOTHING",
            params![account_id, entry.address, entry.name, entry.raw],
        )?;

        let address = conn.query_row(
            "SELECT id, account_id, address, name, raw FROM email_addresses
             WHERE account_id = ? AND address = ?",
            params![account_id, entry.address],
            |row| {
                Ok(EmailAddress {
                    id: AddressId(row.get(0)?),
                    account_id: row.get(1)?,
                    address: row.get(2)?,
                    name: row.get(3)?,
                    raw: row.get(4)?,
                })
            },
        )?;
        Ok(address)
    }

    fn get_address(&self, id: AddressId) -> Result<Option<EmailAddress>> {
        let conn = self.lock()?;
        let address = conn
            .query_row(
                "SELECT id, account_id, address, name, raw FROM email_addresses WHERE id = ?",
                [id.0],
                |row| {
                    Ok(EmailAddress {
                        id: AddressId(row.get(0)?),
                        account_id: row.get(1)?,
                        address: row.get(2)?,
                        name: row.get(3)?,
                        raw: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(address)
    }

    fn count_addresses(&self, account_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM email_addresses WHERE account_id = ?",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn upsert_thread(&self, upsert: ThreadUpsert) -> Result<Thread> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let existing = load_thread(&tx, &upsert.id)?;
        let thread = upsert.apply(existing)?;
        save_thread(&tx, &thread)?;
        tx.commit()?;
        Ok(thread)
    }

    fn get_thread(&self, id: &ThreadId) -> Result<Option<Thread>> {
        let conn = self.lock()?;
        load_thread(&conn, id)
    }

    fn recompute_thread_folders(&self, id: &ThreadId) -> Result<FolderFlags> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let labels = {
            let mut stmt = tx.prepare(
                "SELECT email_label FROM emails WHERE thread_id = ? ORDER BY received_at ASC",
            )?;
            stmt.query_map([id.as_str()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
        };
        let folders = labels
            .iter()
            .map(|l| Folder::parse(l).with_context(|| format!("Unknown email label {:?}", l)))
            .collect::<Result<Vec<_>>>()?;
        let flags = FolderFlags::from_folders(folders);

        let updated = tx.execute(
            "UPDATE threads SET inbox_status = ?, draft_status = ?, sent_status = ? WHERE id = ?",
            params![flags.inbox, flags.draft, flags.sent, id.as_str()],
        )?;
        if updated == 0 {
            return Err(anyhow!("Thread {} not found", id));
        }
        tx.commit()?;
        Ok(flags)
    }

    fn set_thread_done(&self, id: &ThreadId, done: bool) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE threads SET done = ? WHERE id = ?",
            params![done, id.as_str()],
        )?;
        Ok(updated > 0)
    }

    fn list_threads(
        &self,
        account_id: &str,
        filter: &ThreadFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Thread>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM threads WHERE account_id = ?{}
             ORDER BY last_message_date DESC, id ASC LIMIT ? OFFSET ?",
            THREAD_COLUMNS,
            filter_clause(filter)
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![account_id, limit as i64, offset as i64],
                ThreadRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ThreadRow::into_thread).collect()
    }

    fn count_threads(&self, account_id: &str, filter: &ThreadFilter) -> Result<usize> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT COUNT(*) FROM threads WHERE account_id = ?{}",
            filter_clause(filter)
        );
        let count: i64 = conn.query_row(&sql, [account_id], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn upsert_email(&self, email: Email) -> Result<()> {
        let body = compress(email.body.as_deref())?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        // ON CONFLICT DO UPDATE keeps the row (and its attachments) in place
        tx.execute(
            &format!(
                "INSERT INTO emails ({})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    thread_id = excluded.thread_id,
                    from_id = excluded.from_id,
                    email_label = excluded.email_label,
                    created_time = excluded.created_time,
                    last_modified_time = excluded.last_modified_time,
                    sent_at = excluded.sent_at,
                    received_at = excluded.received_at,
                    internet_message_id = excluded.internet_message_id,
                    subject = excluded.subject,
                    sys_labels = excluded.sys_labels,
                    keywords = excluded.keywords,
                    sys_classifications = excluded.sys_classifications,
                    sensitivity = excluded.sensitivity,
                    meeting_message_method = excluded.meeting_message_method,
                    has_attachments = excluded.has_attachments,
                    body = excluded.body,
                    body_snippet = excluded.body_snippet,
                    in_reply_to = excluded.in_reply_to,
                    references_header = excluded.references_header,
                    thread_index = excluded.thread_index,
                    internet_headers = excluded.internet_headers,
                    native_properties = excluded.native_properties,
                    folder_id = excluded.folder_id,
                    omitted = excluded.omitted",
                EMAIL_COLUMNS
            ),
            params![
                email.id.as_str(),
                email.thread_id.as_str(),
                email.from_id.0,
                email.email_label.as_str(),
                email.created_time.to_rfc3339(),
                email.last_modified_time.to_rfc3339(),
                email.sent_at.to_rfc3339(),
                email.received_at.to_rfc3339(),
                email.internet_message_id,
                email.subject,
                to_json(&email.sys_labels)?,
                to_json(&email.keywords)?,
                to_json(&email.sys_classifications)?,
                email.sensitivity,
                email.meeting_message_method,
                email.has_attachments,
                body,
                email.body_snippet,
                email.in_reply_to,
                email.references,
                email.thread_index,
                to_json(&email.internet_headers)?,
                to_json(&email.native_properties)?,
                email.folder_id,
                to_json(&email.omitted)?,
            ],
        )?;

        tx.execute(
            "DELETE FROM email_recipients WHERE email_id = ?",
            [email.id.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO email_recipients (email_id, kind, address_id)
                 VALUES (?, ?, ?)",
            )?;
            for (kind, address_id) in email.recipients.pairs() {
                stmt.execute(params![email.id.as_str(), kind, address_id.0])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn get_email(&self, id: &EmailId) -> Result<Option<Email>> {
        let conn = self.lock()?;
        let emails = load_emails(
            &conn,
            &format!("SELECT {} FROM emails WHERE id = ?", EMAIL_COLUMNS),
            id.as_str(),
        )?;
        Ok(emails.into_iter().next())
    }

    fn list_emails_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<Email>> {
        let conn = self.lock()?;
        load_emails(
            &conn,
            &format!(
                "SELECT {} FROM emails WHERE thread_id = ? ORDER BY received_at ASC, id ASC",
                EMAIL_COLUMNS
            ),
            thread_id.as_str(),
        )
    }

    fn count_emails(&self, account_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM emails e
             INNER JOIN threads t ON e.thread_id = t.id
             WHERE t.account_id = ?",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn upsert_attachment(&self, attachment: Attachment) -> Result<()> {
        let content = compress(attachment.content.as_deref())?;
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO attachments ({})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    mime_type = excluded.mime_type,
                    size = excluded.size,
                    inline = excluded.inline,
                    content_id = excluded.content_id,
                    content = excluded.content,
                    content_location = excluded.content_location",
                ATTACHMENT_COLUMNS
            ),
            params![
                attachment.id,
                attachment.email_id.as_str(),
                attachment.name,
                attachment.mime_type,
                attachment.size,
                attachment.inline,
                attachment.content_id,
                content,
                attachment.content_location,
            ],
        )?;
        Ok(())
    }

    fn list_attachments_for_email(&self, email_id: &EmailId) -> Result<Vec<Attachment>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM attachments WHERE email_id = ? ORDER BY id",
            ATTACHMENT_COLUMNS
        ))?;
        let rows = stmt
            .query_map([email_id.as_str()], attachment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut attachment, content)| {
                attachment.content = decompress(content)?;
                Ok(attachment)
            })
            .collect()
    }

    fn count_attachments(&self, account_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM attachments a
             INNER JOIN emails e ON a.email_id = e.id
             INNER JOIN threads t ON e.thread_id = t.id
             WHERE t.account_id = ?",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
