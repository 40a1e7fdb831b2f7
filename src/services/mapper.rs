use serde::de::DeserializeOwned;

use crate::data::gateway::{ListQuery, RemoteGateway};
use crate::error::AppError;
use crate::models::item::{Item, ItemKind, Table};
use crate::models::row::{FileRow, FolderRow, Row};
use crate::models::session::Session;

/// Why a fetch came back short. The items are still usable; this only feeds
/// a notice in the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchNotice {
    NotConfigured,
    SchemaMissing(Table),
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub items: Vec<Item>,
    pub notices: Vec<FetchNotice>,
}

pub fn map_folder(row: FolderRow) -> Item {
    Item {
        id: row.id,
        name: row.name,
        kind: ItemKind::Folder { path: row.path },
        created_at: row.created_at,
        updated_at: row.updated_at,
        deleted_at: row.deleted_at,
        starred: row.is_starred.unwrap_or(false),
        shared: row.is_shared.unwrap_or(false),
        deleted: row.is_deleted.unwrap_or(false),
        parent_path: row.parent_path.unwrap_or_default(),
    }
}

pub fn map_file(row: FileRow) -> Item {
    Item {
        id: row.id,
        name: row.name,
        kind: ItemKind::File {
            size_bytes: row.size.unwrap_or(0),
            mime_type: row.mime_type,
            storage_path: row.storage_path,
        },
        created_at: row.created_at,
        updated_at: row.updated_at,
        deleted_at: row.deleted_at,
        starred: row.is_starred.unwrap_or(false),
        shared: row.is_shared.unwrap_or(false),
        deleted: row.is_deleted.unwrap_or(false),
        parent_path: row.folder_path.unwrap_or_default(),
    }
}

fn decode<T: DeserializeOwned>(table: Table, rows: Vec<Row>) -> impl Iterator<Item = T> {
    rows.into_iter().filter_map(move |row| {
        let id = row.get("id").cloned();
        match serde_json::from_value(serde_json::Value::Object(row)) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(%table, id = ?id, error = %e, "skipping undecodable row");
                None
            }
        }
    })
}

/// Folders first, then files, each in source order.
pub fn map_rows(folder_rows: Vec<Row>, file_rows: Vec<Row>) -> Vec<Item> {
    decode::<FolderRow>(Table::Folders, folder_rows)
        .map(map_folder)
        .chain(decode::<FileRow>(Table::Files, file_rows).map(map_file))
        .collect()
}

fn rows_or_empty(
    table: Table,
    result: Result<Vec<Row>, AppError>,
    notices: &mut Vec<FetchNotice>,
) -> Vec<Row> {
    match result {
        Ok(rows) => rows,
        Err(AppError::NotConfigured) => {
            tracing::debug!(%table, "backend not configured; showing empty listing");
            if !notices.contains(&FetchNotice::NotConfigured) {
                notices.push(FetchNotice::NotConfigured);
            }
            Vec::new()
        }
        Err(AppError::MissingTable(_)) => {
            tracing::warn!(%table, "table missing; showing empty listing");
            notices.push(FetchNotice::SchemaMissing(table));
            Vec::new()
        }
        Err(e) => {
            tracing::error!(%table, error = %e, "failed to fetch rows");
            notices.push(FetchNotice::Failed(e.to_string()));
            Vec::new()
        }
    }
}

/// Queries both tables and maps them. Never fails: a table that cannot be
/// read contributes no items.
pub async fn fetch_items(
    gateway: &dyn RemoteGateway,
    session: &Session,
    query: &ListQuery,
) -> FetchReport {
    let (folders, files) = tokio::join!(
        gateway.list(session, Table::Folders, query),
        gateway.list(session, Table::Files, query),
    );

    let mut notices = Vec::new();
    let folder_rows = rows_or_empty(Table::Folders, folders, &mut notices);
    let file_rows = rows_or_empty(Table::Files, files, &mut notices);

    FetchReport {
        items: map_rows(folder_rows, file_rows),
        notices,
    }
}
