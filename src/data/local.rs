use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::Connection;

use crate::config::DEFAULT_BUCKET;
use crate::data::gateway::{ListQuery, PutOptions, RemoteGateway};
use crate::data::{migrations, repository};
use crate::error::{AppError, Result};
use crate::models::item::Table;
use crate::models::row::Row;
use crate::models::session::Session;

/// SQLite-backed backend with the same contract as the hosted one. Objects
/// live in the `objects` table, keyed by their storage path.
pub struct LocalGateway {
    db: Mutex<Connection>,
    public_base: String,
}

impl LocalGateway {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migrations::run_migrations(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Wraps an existing connection as-is; no migrations are run.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
            public_base: format!("local://{DEFAULT_BUCKET}"),
        }
    }

    pub fn with_public_base(mut self, base: impl Into<String>) -> Self {
        self.public_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| AppError::General(e.to_string()))
    }
}

#[async_trait]
impl RemoteGateway for LocalGateway {
    async fn list(&self, session: &Session, table: Table, query: &ListQuery) -> Result<Vec<Row>> {
        let conn = self.conn()?;
        match repository::list_rows(&conn, &session.owner_id, table, query) {
            Err(AppError::MissingTable(name)) => {
                tracing::warn!(relation = %name, "table missing; treating as empty");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    async fn update(&self, session: &Session, table: Table, id: &str, fields: &Row) -> Result<()> {
        let conn = self.conn()?;
        repository::update_row(&conn, &session.owner_id, table, id, fields)
    }

    async fn insert(&self, session: &Session, table: Table, fields: &Row) -> Result<Row> {
        let conn = self.conn()?;
        repository::insert_row(&conn, &session.owner_id, table, fields)
    }

    async fn put_object(
        &self,
        session: &Session,
        path: &str,
        bytes: Vec<u8>,
        options: &PutOptions,
    ) -> Result<()> {
        if !path.starts_with(&format!("{}/", session.owner_id)) {
            return Err(AppError::Backend {
                status: 403,
                code: None,
                message: format!("path {path} is outside the owner's folder"),
            });
        }
        let conn = self.conn()?;
        if !options.upsert && repository::object_exists(&conn, path)? {
            return Err(AppError::Backend {
                status: 409,
                code: Some("Duplicate".to_string()),
                message: "The resource already exists".to_string(),
            });
        }
        repository::put_object(
            &conn,
            path,
            &bytes,
            options.content_type.as_deref(),
            &options.cache_control,
        )
    }

    async fn get_object(&self, _session: &Session, path: &str) -> Result<Vec<u8>> {
        let conn = self.conn()?;
        repository::get_object(&conn, path)?
            .ok_or_else(|| AppError::NotFound(format!("object {path}")))
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base, path.trim_start_matches('/'))
    }
}
