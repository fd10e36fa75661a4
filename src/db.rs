use crate::models::{FinancialStatement, UserRecord};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("could not create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database connection lock poisoned")]
    Poisoned,
}

pub struct Db {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS financial_statements (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        file_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        statement_type TEXT NOT NULL,
        upload_date TEXT NOT NULL,
        file_type TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        parsed_data TEXT,
        metadata TEXT,
        FOREIGN KEY (user_id) REFERENCES users(id)
    );
    CREATE INDEX IF NOT EXISTS idx_statements_user ON financial_statements(user_id);
";

const STATEMENT_COLUMNS: &str = "id, user_id, file_name, file_path, statement_type, upload_date, \
     file_type, file_size, parsed_data, metadata";

impl Db {
    pub fn open(db_path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(db_path)?)
    }

    /// Private database that lives as long as this handle.
    pub fn in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    pub fn insert_user(&self, id: &str, email: &str) -> Result<(), DbError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn()?.execute(
            "INSERT INTO users (id, email, is_active, created_at, updated_at) VALUES (?1, ?2, 1, ?3, ?3)",
            params![id, email, now],
        )?;
        Ok(())
    }

    pub fn user_by_id(&self, id: &str) -> Result<Option<UserRecord>, DbError> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT id, email, is_active FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()?)
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DbError> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT id, email, is_active FROM users WHERE email = ?1",
                params![email],
                user_from_row,
            )
            .optional()?)
    }

    pub fn insert_statement(&self, s: &FinancialStatement) -> Result<(), DbError> {
        let parsed = s.parsed_data.as_ref().map(serde_json::to_string).transpose()?;
        let metadata = s.metadata.as_ref().map(serde_json::to_string).transpose()?;
        self.conn()?.execute(
            &format!("INSERT INTO financial_statements ({STATEMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            params![
                s.id,
                s.user_id,
                s.file_name,
                s.file_path,
                s.statement_type,
                s.upload_date,
                s.file_type,
                s.file_size,
                parsed,
                metadata
            ],
        )?;
        Ok(())
    }

    /// Newest first.
    pub fn statements_for_user(&self, user_id: &str) -> Result<Vec<FinancialStatement>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {STATEMENT_COLUMNS} FROM financial_statements WHERE user_id = ?1 ORDER BY upload_date DESC, id"
        ))?;
        let rows = stmt.query_map(params![user_id], raw_statement)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.decode()?);
        }
        Ok(out)
    }

    /// A statement owned by someone else reads as absent.
    pub fn statement_for_user(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<FinancialStatement>, DbError> {
        let raw = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {STATEMENT_COLUMNS} FROM financial_statements WHERE id = ?1 AND user_id = ?2"
                ),
                params![id, user_id],
                raw_statement,
            )
            .optional()?;
        raw.map(RawStatement::decode).transpose()
    }

    pub fn set_parsed_data(&self, id: &str, parsed: &Value) -> Result<bool, DbError> {
        let text = serde_json::to_string(parsed)?;
        let changed = self.conn()?.execute(
            "UPDATE financial_statements SET parsed_data = ?1 WHERE id = ?2",
            params![text, id],
        )?;
        Ok(changed > 0)
    }

    /// Cheap liveness query for health reporting.
    pub fn ping(&self) -> Result<(), DbError> {
        self.conn()?.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        email: row.get(1)?,
        is_active: row.get::<_, i64>(2)? != 0,
    })
}

/// Row with the JSON columns still as text.
struct RawStatement {
    statement: FinancialStatement,
    parsed_data: Option<String>,
    metadata: Option<String>,
}

impl RawStatement {
    fn decode(self) -> Result<FinancialStatement, DbError> {
        let parse = |text: Option<String>| -> Result<Option<Value>, DbError> {
            Ok(text.map(|t| serde_json::from_str(&t)).transpose()?)
        };
        Ok(FinancialStatement {
            parsed_data: parse(self.parsed_data)?,
            metadata: parse(self.metadata)?,
            ..self.statement
        })
    }
}

fn raw_statement(row: &Row<'_>) -> rusqlite::Result<RawStatement> {
    Ok(RawStatement {
        statement: FinancialStatement {
            id: row.get(0)?,
            user_id: row.get(1)?,
            file_name: row.get(2)?,
            file_path: row.get(3)?,
            statement_type: row.get(4)?,
            upload_date: row.get(5)?,
            file_type: row.get(6)?,
            file_size: row.get(7)?,
            parsed_data: None,
            metadata: None,
        },
        parsed_data: row.get(8)?,
        metadata: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn statement(id: &str, user: &str, uploaded: &str) -> FinancialStatement {
        FinancialStatement {
            id: id.into(),
            user_id: user.into(),
            file_name: "pnl.pdf".into(),
            file_path: format!("uploads/{user}/pnl.pdf"),
            statement_type: "unknown".into(),
            upload_date: uploaded.into(),
            file_type: "pdf".into(),
            file_size: 1024,
            parsed_data: None,
            metadata: Some(json!({"content_type": "application/pdf"})),
        }
    }

    #[test]
    fn users_are_unique_by_email() {
        let db = Db::in_memory().unwrap();
        db.insert_user("u1", "cfo@example.com").unwrap();
        assert!(db.insert_user("u2", "cfo@example.com").is_err());
        let user = db.user_by_email("cfo@example.com").unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert!(user.is_active);
        assert_eq!(db.user_by_id("u2").unwrap(), None);
    }

    #[test]
    fn statements_are_scoped_to_their_owner() {
        let db = Db::in_memory().unwrap();
        db.insert_user("u1", "a@example.com").unwrap();
        db.insert_user("u2", "b@example.com").unwrap();
        db.insert_statement(&statement("s1", "u1", "2025-01-01T00:00:00Z")).unwrap();
        db.insert_statement(&statement("s2", "u1", "2025-02-01T00:00:00Z")).unwrap();
        db.insert_statement(&statement("s3", "u2", "2025-03-01T00:00:00Z")).unwrap();

        let ids: Vec<String> = db
            .statements_for_user("u1")
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["s2", "s1"]);
        assert_eq!(db.statement_for_user("s3", "u1").unwrap(), None);
        assert_eq!(
            db.statement_for_user("s1", "u1").unwrap().unwrap().metadata,
            Some(json!({"content_type": "application/pdf"}))
        );
    }

    #[test]
    fn parsed_data_round_trips() {
        let db = Db::in_memory().unwrap();
        db.insert_user("u1", "a@example.com").unwrap();
        db.insert_statement(&statement("s1", "u1", "2025-01-01T00:00:00Z")).unwrap();
        let parsed = json!({"status": "parsed", "fields": {"pnl_total_revenue": 1.0}});
        assert!(db.set_parsed_data("s1", &parsed).unwrap());
        assert!(!db.set_parsed_data("missing", &parsed).unwrap());
        let stored = db.statement_for_user("s1", "u1").unwrap().unwrap();
        assert_eq!(stored.parsed_data, Some(parsed));
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gateway.db");
        let db = Db::open(&path).unwrap();
        db.ping().unwrap();
        assert!(path.exists());
    }
}
