use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::item::Table;
use crate::models::row::Row;
use crate::models::session::Session;

/// Row query. Rows are always scoped to `session.owner_id`; every other
/// filter is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Matched against the table's parent column (`folder_path` / `parent_path`).
    pub parent_path: Option<String>,
    pub deleted: Option<bool>,
    pub starred: Option<bool>,
    pub shared: Option<bool>,
    pub newest_first: bool,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn deleted(deleted: bool) -> Self {
        Self {
            deleted: Some(deleted),
            ..Self::default()
        }
    }

    pub fn in_folder(mut self, parent_path: impl Into<String>) -> Self {
        self.parent_path = Some(parent_path.into());
        self
    }

    pub fn starred(mut self) -> Self {
        self.starred = Some(true);
        self
    }

    pub fn shared(mut self) -> Self {
        self.shared = Some(true);
        self
    }

    pub fn newest_first(mut self, limit: usize) -> Self {
        self.newest_first = true;
        self.limit = Some(limit);
        self
    }

    /// Column/value equality filters besides the owner, in a stable order.
    pub fn filters(&self, table: Table) -> Vec<(&'static str, FilterValue)> {
        let mut filters = Vec::new();
        if let Some(parent) = &self.parent_path {
            filters.push((table.parent_column(), FilterValue::Text(parent.clone())));
        }
        if let Some(deleted) = self.deleted {
            filters.push(("is_deleted", FilterValue::Bool(deleted)));
        }
        if let Some(starred) = self.starred {
            filters.push(("is_starred", FilterValue::Bool(starred)));
        }
        if let Some(shared) = self.shared {
            filters.push(("is_shared", FilterValue::Bool(shared)));
        }
        filters
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
}

impl std::fmt::Display for FilterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub cache_control: String,
    pub upsert: bool,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            content_type: None,
            cache_control: "3600".to_string(),
            upsert: false,
        }
    }
}

/// The hosted backend: owner-scoped tables plus one object bucket.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Lists rows. An absent table is reported as an empty result.
    async fn list(&self, session: &Session, table: Table, query: &ListQuery) -> Result<Vec<Row>>;

    async fn update(&self, session: &Session, table: Table, id: &str, fields: &Row) -> Result<()>;

    async fn insert(&self, session: &Session, table: Table, fields: &Row) -> Result<Row>;

    async fn put_object(
        &self,
        session: &Session,
        path: &str,
        bytes: Vec<u8>,
        options: &PutOptions,
    ) -> Result<()>;

    async fn get_object(&self, session: &Session, path: &str) -> Result<Vec<u8>>;

    fn public_url(&self, path: &str) -> String;
}

/// Stand-in used when no backend is configured. Every call fails with
/// `NotConfigured`, which readers degrade to an empty dataset.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredGateway;

#[async_trait]
impl RemoteGateway for UnconfiguredGateway {
    async fn list(&self, _: &Session, _: Table, _: &ListQuery) -> Result<Vec<Row>> {
        Err(AppError::NotConfigured)
    }

    async fn update(&self, _: &Session, _: Table, _: &str, _: &Row) -> Result<()> {
        Err(AppError::NotConfigured)
    }

    async fn insert(&self, _: &Session, _: Table, _: &Row) -> Result<Row> {
        Err(AppError::NotConfigured)
    }

    async fn put_object(&self, _: &Session, _: &str, _: Vec<u8>, _: &PutOptions) -> Result<()> {
        Err(AppError::NotConfigured)
    }

    async fn get_object(&self, _: &Session, _: &str) -> Result<Vec<u8>> {
        Err(AppError::NotConfigured)
    }

    fn public_url(&self, path: &str) -> String {
        path.to_string()
    }
}

/// Converts a JSON object into a `Row`, rejecting anything else.
pub fn into_row(value: serde_json::Value) -> Result<Row> {
    match value {
        serde_json::Value::Object(row) => Ok(row),
        other => Err(AppError::General(format!("expected a JSON object, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_use_the_tables_parent_column() {
        let query = ListQuery::deleted(false).in_folder("Documents").starred();

        let files = query.filters(Table::Files);
        assert_eq!(files[0], ("folder_path", FilterValue::Text("Documents".into())));
        assert_eq!(files[1], ("is_deleted", FilterValue::Bool(false)));
        assert_eq!(files[2], ("is_starred", FilterValue::Bool(true)));

        let folders = query.filters(Table::Folders);
        assert_eq!(folders[0].0, "parent_path");
    }

    #[tokio::test]
    async fn unconfigured_gateway_reports_not_configured() {
        let gateway = UnconfiguredGateway;
        let session = Session::new("u1");
        let err = gateway
            .list(&session, Table::Files, &ListQuery::default())
            .await
            .unwrap_err();
        assert!(err.is_degraded());
    }
}
