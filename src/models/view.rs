use serde::{Deserialize, Serialize};

use crate::data::gateway::ListQuery;
use crate::models::item::Item;

pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// One dashboard listing screen, described by the predicate it shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum ListingView {
    All { parent_path: String },
    Recent { limit: usize },
    Starred,
    Shared,
    Trash,
}

impl ListingView {
    pub fn all(parent_path: impl Into<String>) -> Self {
        Self::All {
            parent_path: parent_path.into(),
        }
    }

    pub fn recent() -> Self {
        Self::Recent {
            limit: DEFAULT_RECENT_LIMIT,
        }
    }

    pub fn query(&self) -> ListQuery {
        match self {
            Self::All { parent_path } => ListQuery::deleted(false).in_folder(parent_path.clone()),
            Self::Recent { limit } => ListQuery::deleted(false).newest_first(*limit),
            Self::Starred => ListQuery::deleted(false).starred(),
            Self::Shared => ListQuery::deleted(false).shared(),
            Self::Trash => ListQuery::deleted(true),
        }
    }

    /// Whether an item belongs on this screen. Applied again after every
    /// local write so items leave and re-enter the list as their flags move.
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Self::All { parent_path } => !item.deleted && item.parent_path == *parent_path,
            Self::Recent { .. } => !item.deleted,
            Self::Starred => item.starred && !item.deleted,
            Self::Shared => item.shared && !item.deleted,
            Self::Trash => item.deleted,
        }
    }

    /// Final ordering of freshly fetched items.
    pub fn arrange(&self, items: &mut Vec<Item>) {
        match self {
            Self::Recent { limit } => {
                items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                items.truncate(*limit);
            }
            Self::Trash => {
                items.sort_by(|a, b| {
                    b.deleted_at
                        .unwrap_or(b.created_at)
                        .cmp(&a.deleted_at.unwrap_or(a.created_at))
                });
            }
            _ => {}
        }
    }
}

impl std::fmt::Display for ListingView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All { parent_path } if parent_path.is_empty() => write!(f, "all"),
            Self::All { parent_path } => write!(f, "all:{parent_path}"),
            Self::Recent { .. } => write!(f, "recent"),
            Self::Starred => write!(f, "starred"),
            Self::Shared => write!(f, "shared"),
            Self::Trash => write!(f, "trash"),
        }
    }
}
