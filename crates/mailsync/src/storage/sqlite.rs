//! SQLite-based mailbox storage

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::blob::BlobRef;
use super::traits::MailboxStore;
use crate::models::{Attachment, Checkpoint, Company, Email, EmailAddress, MessageId, Person, ThreadId};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Sync checkpoint per mailbox
            CREATE TABLE checkpoints (
                mailbox_id TEXT PRIMARY KEY,
                last_history_id TEXT,
                last_internal_date TEXT,
                next_page_token TEXT,
                current_label TEXT
            );

            -- Mirrored messages; one row per remote message ID, created once
            CREATE TABLE emails (
                id TEXT PRIMARY KEY,
                mailbox_id TEXT NOT NULL,
                subject TEXT,
                from_name TEXT,
                from_email TEXT,
                snippet TEXT,
                internal_date TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                label_ids TEXT NOT NULL DEFAULT '[]',
                thread_id TEXT,
                message_id_header TEXT,
                in_reply_to TEXT,
                refs TEXT NOT NULL DEFAULT '[]',
                html_ref TEXT,
                body_text TEXT
            );

            CREATE INDEX idx_emails_mailbox ON emails(mailbox_id);
            CREATE INDEX idx_emails_thread ON emails(thread_id);

            -- Offloaded attachment metadata, owned by one email
            CREATE TABLE attachments (
                id TEXT PRIMARY KEY,
                email_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                content_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                content_ref TEXT NOT NULL,
                content_id TEXT,
                FOREIGN KEY (email_id) REFERENCES emails(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_attachments_email ON attachments(email_id);

            -- Interaction graph: people keyed by (mailbox, address)
            CREATE TABLE people (
                mailbox_id TEXT NOT NULL,
                email TEXT NOT NULL,
                name TEXT,
                company_domain TEXT,
                last_interacted TEXT NOT NULL,
                interaction_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (mailbox_id, email)
            );

            -- Interaction graph: companies matched by domain membership
            CREATE TABLE companies (
                id INTEGER PRIMARY KEY,
                mailbox_id TEXT NOT NULL,
                name TEXT NOT NULL,
                last_interacted TEXT NOT NULL,
                interaction_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE company_domains (
                mailbox_id TEXT NOT NULL,
                domain TEXT NOT NULL,
                company_id INTEGER NOT NULL,
                PRIMARY KEY (mailbox_id, domain),
                FOREIGN KEY (company_id) REFERENCES companies(id) ON DELETE CASCADE
            );
            "#,
        ),
    ])
}

/// SQLite-based mailbox storage
///
/// Stores email/attachment metadata and the interaction graph. Large
/// content (HTML bodies, attachment bytes) lives in a BlobStore; only the
/// blob references are kept here.
pub struct SqliteMailboxStore {
    conn: Mutex<Connection>,
}

impl SqliteMailboxStore {
    /// Create a new SQLite mailbox store at the given database path
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL for concurrent readers and crash recovery; NORMAL sync is
        // safe under WAL. foreign_keys is required for ON DELETE CASCADE.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        info!("[STORE] Opened mailbox database at {:?}", db_path.as_ref());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load_email_row(conn: &Connection, id: &str) -> Result<Option<Email>> {
        let row: Option<(
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            bool,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            String,
            Option<String>,
            Option<String>,
        )> = conn
            .query_row(
                "SELECT id, mailbox_id, subject, from_name, from_email, snippet,
                        internal_date, is_read, label_ids, thread_id,
                        message_id_header, in_reply_to, refs, html_ref, body_text
                 FROM emails WHERE id = ?",
                [id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                        row.get(10)?,
                        row.get(11)?,
                        row.get(12)?,
                        row.get(13)?,
                        row.get(14)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            id,
            mailbox_id,
            subject,
            from_name,
            from_email,
            snippet,
            internal_date_str,
            is_read,
            label_ids_json,
            thread_id,
            message_id_header,
            in_reply_to,
            refs_json,
            html_ref,
            body_text,
        )) = row
        else {
            return Ok(None);
        };

        let from = from_email.map(|email| EmailAddress {
            name: from_name,
            email,
        });
        let label_ids: Vec<String> = serde_json::from_str(&label_ids_json).unwrap_or_default();
        let references: Vec<String> = serde_json::from_str(&refs_json).unwrap_or_default();

        Ok(Some(Email {
            id: MessageId::new(id),
            mailbox_id,
            subject,
            from,
            snippet,
            internal_date: internal_date_str.and_then(parse_timestamp),
            is_read,
            label_ids,
            thread_id: thread_id.map(ThreadId::new),
            message_id_header,
            in_reply_to,
            references,
            html_ref: html_ref.map(BlobRef::new),
            text: body_text,
        }))
    }
}

fn parse_timestamp(s: String) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl MailboxStore for SqliteMailboxStore {
    fn has_email(&self, id: &MessageId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM emails WHERE id = ?",
            [id.as_str()],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn insert_email(&self, email: Email, attachments: Vec<Attachment>) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let label_ids_json = serde_json::to_string(&email.label_ids)?;
        let refs_json = serde_json::to_string(&email.references)?;

        // Emails are create-once; a duplicate ID leaves the existing row
        // and its attachments untouched.
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO emails
             (id, mailbox_id, subject, from_name, from_email, snippet,
              internal_date, is_read, label_ids, thread_id,
              message_id_header, in_reply_to, refs, html_ref, body_text)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                email.id.as_str(),
                email.mailbox_id,
                email.subject,
                email.from.as_ref().and_then(|f| f.name.clone()),
                email.from.as_ref().map(|f| f.email.clone()),
                email.snippet,
                email.internal_date.map(|dt| dt.to_rfc3339()),
                email.is_read,
                label_ids_json,
                email.thread_id.as_ref().map(|t| t.as_str().to_string()),
                email.message_id_header,
                email.in_reply_to,
                refs_json,
                email.html_ref.as_ref().map(|r| r.as_str().to_string()),
                email.text,
            ],
        )?;

        if inserted > 0 {
            let mut stmt = tx.prepare(
                "INSERT INTO attachments
                 (id, email_id, filename, content_type, size, content_ref, content_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;
            for attachment in &attachments {
                stmt.execute(params![
                    attachment.id,
                    attachment.email_id.as_str(),
                    attachment.filename,
                    attachment.content_type,
                    attachment.size as i64,
                    attachment.content_ref.as_str(),
                    attachment.content_id,
                ])?;
            }
            drop(stmt);
        }

        tx.commit()?;
        Ok(())
    }

    fn get_email(&self, id: &MessageId) -> Result<Option<Email>> {
        let conn = self.conn.lock().unwrap();
        Self::load_email_row(&conn, id.as_str())
    }

    fn list_attachments(&self, email_id: &MessageId) -> Result<Vec<Attachment>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, filename, content_type, size, content_ref, content_id
             FROM attachments WHERE email_id = ? ORDER BY filename",
        )?;

        let attachments = stmt
            .query_map([email_id.as_str()], |row| {
                Ok(Attachment {
                    id: row.get(0)?,
                    email_id: email_id.clone(),
                    filename: row.get(1)?,
                    content_type: row.get(2)?,
                    size: row.get::<_, i64>(3)? as u64,
                    content_ref: BlobRef::new(row.get::<_, String>(4)?),
                    content_id: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(attachments)
    }

    fn count_emails(&self, mailbox_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM emails WHERE mailbox_id = ?",
            [mailbox_id],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    fn record_person_interaction(
        &self,
        mailbox_id: &str,
        address: &str,
        name: Option<&str>,
        company_domain: Option<&str>,
        interacted_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        // RFC 3339 UTC strings compare lexically in timestamp order, so
        // MAX() keeps last_interacted from moving backward.
        conn.execute(
            "INSERT INTO people
             (mailbox_id, email, name, company_domain, last_interacted, interaction_count)
             VALUES (?, ?, ?, ?, ?, 1)
             ON CONFLICT(mailbox_id, email) DO UPDATE SET
                interaction_count = interaction_count + 1,
                last_interacted = MAX(last_interacted, excluded.last_interacted),
                name = COALESCE(name, excluded.name)",
            params![
                mailbox_id,
                address,
                name,
                company_domain,
                interacted_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn record_company_interaction(
        &self,
        mailbox_id: &str,
        domain: &str,
        interacted_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let company_id: Option<i64> = tx
            .query_row(
                "SELECT company_id FROM company_domains WHERE mailbox_id = ? AND domain = ?",
                params![mailbox_id, domain],
                |row| row.get(0),
            )
            .optional()?;

        match company_id {
            Some(company_id) => {
                tx.execute(
                    "UPDATE companies SET
                        interaction_count = interaction_count + 1,
                        last_interacted = MAX(last_interacted, ?)
                     WHERE id = ?",
                    params![interacted_at.to_rfc3339(), company_id],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO companies (mailbox_id, name, last_interacted, interaction_count)
                     VALUES (?, ?, ?, 1)",
                    params![mailbox_id, domain, interacted_at.to_rfc3339()],
                )?;
                let company_id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO company_domains (mailbox_id, domain, company_id)
                     VALUES (?, ?, ?)",
                    params![mailbox_id, domain, company_id],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn get_person(&self, mailbox_id: &str, address: &str) -> Result<Option<Person>> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(Option<String>, Option<String>, String, i64)> = conn
            .query_row(
                "SELECT name, company_domain, last_interacted, interaction_count
                 FROM people WHERE mailbox_id = ? AND email = ?",
                params![mailbox_id, address],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((name, company_domain, last_interacted_str, interaction_count)) = row else {
            return Ok(None);
        };

        Ok(Some(Person {
            mailbox_id: mailbox_id.to_string(),
            email: address.to_string(),
            name,
            company_domain,
            last_interacted: parse_timestamp(last_interacted_str).unwrap_or_else(Utc::now),
            interaction_count: interaction_count as u64,
        }))
    }

    fn find_company_by_domain(&self, mailbox_id: &str, domain: &str) -> Result<Option<Company>> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(i64, String, String, i64)> = conn
            .query_row(
                "SELECT c.id, c.name, c.last_interacted, c.interaction_count
                 FROM companies c
                 INNER JOIN company_domains cd ON c.id = cd.company_id
                 WHERE cd.mailbox_id = ? AND cd.domain = ?",
                params![mailbox_id, domain],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((company_id, name, last_interacted_str, interaction_count)) = row else {
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT domain FROM company_domains WHERE company_id = ?")?;
        let domains: BTreeSet<String> = stmt
            .query_map([company_id], |row| row.get(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Some(Company {
            mailbox_id: mailbox_id.to_string(),
            name,
            domains,
            last_interacted: parse_timestamp(last_interacted_str).unwrap_or_else(Utc::now),
            interaction_count: interaction_count as u64,
        }))
    }

    fn get_checkpoint(&self, mailbox_id: &str) -> Result<Option<Checkpoint>> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(Option<String>, Option<String>, Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT last_history_id, last_internal_date, next_page_token, current_label
                 FROM checkpoints WHERE mailbox_id = ?",
                [mailbox_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((last_history_id, last_internal_date_str, next_page_token, current_label)) = row
        else {
            return Ok(None);
        };

        Ok(Some(Checkpoint {
            mailbox_id: mailbox_id.to_string(),
            last_history_id,
            last_internal_date: last_internal_date_str.and_then(parse_timestamp),
            next_page_token,
            current_label,
        }))
    }

    fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT OR REPLACE INTO checkpoints
             (mailbox_id, last_history_id, last_internal_date, next_page_token, current_label)
             VALUES (?, ?, ?, ?, ?)",
            params![
                checkpoint.mailbox_id,
                checkpoint.last_history_id,
                checkpoint.last_internal_date.map(|dt| dt.to_rfc3339()),
                checkpoint.next_page_token,
                checkpoint.current_label,
            ],
        )?;

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            "DELETE FROM attachments;
             DELETE FROM emails;
             DELETE FROM people;
             DELETE FROM company_domains;
             DELETE FROM companies;
             DELETE FROM checkpoints;",
        )?;

        Ok(())
    }
}
