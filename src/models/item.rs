use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::row::Row;

/// Backend table an item lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Files,
    Folders,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Folders => "folders",
        }
    }

    /// Column holding the virtual parent path. Files and folders disagree.
    pub fn parent_column(self) -> &'static str {
        match self {
            Self::Files => "folder_path",
            Self::Folders => "parent_path",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "files" => Ok(Self::Files),
            "folders" => Ok(Self::Folders),
            _ => Err(format!("unknown table: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemKind {
    File {
        size_bytes: i64,
        mime_type: Option<String>,
        storage_path: Option<String>,
    },
    Folder {
        path: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub starred: bool,
    pub shared: bool,
    pub deleted: bool,
    pub parent_path: String,
}

impl Item {
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ItemKind::Folder { .. })
    }

    pub fn size_bytes(&self) -> Option<i64> {
        match self.kind {
            ItemKind::File { size_bytes, .. } => Some(size_bytes),
            ItemKind::Folder { .. } => None,
        }
    }

    pub fn storage_path(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::File { storage_path, .. } => storage_path.as_deref(),
            ItemKind::Folder { .. } => None,
        }
    }

    pub fn table(&self) -> Table {
        match self.kind {
            ItemKind::File { .. } => Table::Files,
            ItemKind::Folder { .. } => Table::Folders,
        }
    }

    pub fn field(&self, field: ItemField) -> bool {
        match field {
            ItemField::Starred => self.starred,
            ItemField::Shared => self.shared,
            ItemField::Deleted => self.deleted,
        }
    }

    /// Writes a flag locally. Flipping `deleted` also stamps or clears
    /// `deleted_at` so the trash view can order by it.
    pub fn set_field(&mut self, field: ItemField, value: bool, now: DateTime<Utc>) {
        match field {
            ItemField::Starred => self.starred = value,
            ItemField::Shared => self.shared = value,
            ItemField::Deleted => {
                self.deleted = value;
                self.deleted_at = value.then_some(now);
            }
        }
    }

    /// When the trash entry would expire under a retention window. Nothing is
    /// purged at that point; the date is informational.
    pub fn trash_expires_at(&self, retention_days: i64) -> Option<DateTime<Utc>> {
        if !self.deleted {
            return None;
        }
        let deleted_at = self.deleted_at.unwrap_or(self.created_at);
        Some(deleted_at + chrono::Duration::days(retention_days))
    }
}

/// Flags the mutation protocol is allowed to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemField {
    Starred,
    Shared,
    Deleted,
}

impl ItemField {
    pub fn column(self) -> &'static str {
        match self {
            Self::Starred => "is_starred",
            Self::Shared => "is_shared",
            Self::Deleted => "is_deleted",
        }
    }

    /// Remote payload for a single-field update.
    pub fn update_payload(self, value: bool, now: DateTime<Utc>) -> Row {
        let mut fields = Row::new();
        fields.insert(self.column().to_string(), serde_json::Value::Bool(value));
        if self == Self::Deleted {
            let deleted_at = if value {
                serde_json::Value::String(now.to_rfc3339())
            } else {
                serde_json::Value::Null
            };
            fields.insert("deleted_at".to_string(), deleted_at);
        }
        fields
    }
}

impl std::fmt::Display for ItemField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starred => write!(f, "starred"),
            Self::Shared => write!(f, "shared"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}
