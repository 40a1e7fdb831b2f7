use chrono::Utc;
use serde_json::Value;

use crate::data::gateway::{PutOptions, RemoteGateway};
use crate::error::AppError;
use crate::format::{child_path, format_file_size, storage_path};
use crate::models::item::{Item, Table};
use crate::models::row::{FileRow, FolderRow, Row};
use crate::models::session::Session;
use crate::services::mapper::{map_file, map_folder};

fn validate_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::General("name must not be empty".to_string()));
    }
    if name.contains('/') {
        return Err(AppError::General(format!("name must not contain '/': {name}")));
    }
    Ok(name)
}

fn decode<T: serde::de::DeserializeOwned>(row: Row) -> Result<T, AppError> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Stores `bytes` in the bucket and records a file row under `folder_path`.
/// The object is written first; a failed insert leaves an orphan object,
/// never a row without content.
pub async fn upload_file(
    gateway: &dyn RemoteGateway,
    session: &Session,
    folder_path: &str,
    name: &str,
    bytes: Vec<u8>,
    content_type: Option<&str>,
) -> Result<Item, AppError> {
    let name = validate_name(name)?;
    let content_type = content_type
        .map(str::to_string)
        .unwrap_or_else(|| mime_guess::from_path(name).first_or_octet_stream().to_string());
    let path = storage_path(&session.owner_id, folder_path, name, Utc::now());
    let size = bytes.len() as i64;

    let options = PutOptions {
        content_type: Some(content_type.clone()),
        ..PutOptions::default()
    };
    gateway.put_object(session, &path, bytes, &options).await?;
    tracing::info!(path = %path, size = %format_file_size(size), "uploaded object");

    let mut fields = Row::new();
    fields.insert("name".to_string(), name.into());
    fields.insert("size".to_string(), size.into());
    fields.insert("type".to_string(), content_type.into());
    fields.insert("folder_path".to_string(), folder_path.into());
    fields.insert("storage_path".to_string(), path.into());
    fields.insert("is_deleted".to_string(), false.into());

    let row = gateway.insert(session, Table::Files, &fields).await?;
    Ok(map_file(decode::<FileRow>(row)?))
}

pub async fn create_folder(
    gateway: &dyn RemoteGateway,
    session: &Session,
    parent_path: &str,
    name: &str,
) -> Result<Item, AppError> {
    let name = validate_name(name)?;

    let mut fields = Row::new();
    fields.insert("name".to_string(), name.into());
    fields.insert("path".to_string(), child_path(parent_path, name).into());
    fields.insert("parent_path".to_string(), parent_path.into());
    fields.insert("is_deleted".to_string(), false.into());

    let row = gateway.insert(session, Table::Folders, &fields).await?;
    let folder = map_folder(decode::<FolderRow>(row)?);
    tracing::info!(id = %folder.id, name, parent_path, "created folder");
    Ok(folder)
}

pub async fn download_file(
    gateway: &dyn RemoteGateway,
    session: &Session,
    item: &Item,
) -> Result<Vec<u8>, AppError> {
    let path = item
        .storage_path()
        .ok_or_else(|| AppError::NotFound(format!("no stored content for {}", item.name)))?;
    gateway.get_object(session, path).await
}

pub fn public_url(gateway: &dyn RemoteGateway, item: &Item) -> Option<String> {
    item.storage_path().map(|path| gateway.public_url(path))
}
