use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::data::gateway::{FilterValue, ListQuery};
use crate::error::AppError;
use crate::models::item::Table;
use crate::models::row::Row;

const FILE_COLUMNS: &[&str] = &[
    "id",
    "name",
    "size",
    "type",
    "folder_path",
    "storage_path",
    "user_id",
    "created_at",
    "updated_at",
    "is_starred",
    "is_shared",
    "is_deleted",
    "deleted_at",
    "permanently_deleted",
];

const FOLDER_COLUMNS: &[&str] = &[
    "id",
    "name",
    "path",
    "parent_path",
    "user_id",
    "created_at",
    "updated_at",
    "is_starred",
    "is_shared",
    "is_deleted",
    "deleted_at",
    "permanently_deleted",
];

/// Columns the owner may not rewrite through an update.
const IMMUTABLE_COLUMNS: &[&str] = &["id", "user_id"];

fn columns(table: Table) -> &'static [&'static str] {
    match table {
        Table::Files => FILE_COLUMNS,
        Table::Folders => FOLDER_COLUMNS,
    }
}

fn is_bool_column(column: &str) -> bool {
    column.starts_with("is_") || column == "permanently_deleted"
}

fn check_column(table: Table, column: &str) -> Result<(), AppError> {
    if columns(table).contains(&column) {
        Ok(())
    } else {
        Err(AppError::General(format!("unknown column {table}.{column}")))
    }
}

/// SQLite reports an absent table as a generic failure; pull it out so the
/// caller can degrade.
fn missing_table(table: Table) -> impl FnOnce(rusqlite::Error) -> AppError {
    move |e| {
        if e.to_string().contains("no such table") {
            AppError::MissingTable(table.to_string())
        } else {
            AppError::Database(e)
        }
    }
}

fn json_to_sql(column: &str, value: &serde_json::Value) -> Result<Value, AppError> {
    let sql = match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => {
            return Err(AppError::General(format!(
                "unsupported value for column {column}: {other}"
            )))
        }
    };
    Ok(sql)
}

fn sql_to_json(column: &str, value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) if is_bool_column(column) => serde_json::Value::Bool(i != 0),
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(bytes) => {
            serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Blob(_) => serde_json::Value::Null,
    }
}

fn read_row(table: Table, row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (index, column) in columns(table).iter().enumerate() {
        out.insert(column.to_string(), sql_to_json(column, row.get_ref(index)?));
    }
    Ok(out)
}

pub fn list_rows(
    conn: &Connection,
    owner_id: &str,
    table: Table,
    query: &ListQuery,
) -> Result<Vec<Row>, AppError> {
    let mut sql = format!(
        "SELECT {} FROM {table} WHERE user_id = ?1 AND COALESCE(permanently_deleted, 0) = 0",
        columns(table).join(", ")
    );
    let mut values = vec![Value::Text(owner_id.to_string())];
    for (column, value) in query.filters(table) {
        values.push(match value {
            FilterValue::Text(text) => Value::Text(text),
            FilterValue::Bool(b) => Value::Integer(i64::from(b)),
        });
        // Flags written by older clients may be NULL; treat NULL as false.
        if is_bool_column(column) {
            sql.push_str(&format!(" AND COALESCE({column}, 0) = ?{}", values.len()));
        } else {
            sql.push_str(&format!(" AND {column} = ?{}", values.len()));
        }
    }
    if query.newest_first {
        sql.push_str(" ORDER BY created_at DESC");
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql).map_err(missing_table(table))?;
    let rows = stmt.query_map(params_from_iter(values), |row| read_row(table, row))?;
    Ok(readable_rows(table, rows))
}

/// Keeps the rows that could be read; the rest are logged and dropped.
fn readable_rows<I>(table: Table, rows: I) -> Vec<Row>
where
    I: IntoIterator<Item = rusqlite::Result<Row>>,
{
    rows.into_iter()
        .filter_map(|r| match r {
            Ok(row) => Some(row),
            Err(e) => {
                tracing::warn!(%table, error = %e, "skipping unreadable row");
                None
            }
        })
        .collect()
}

pub fn get_row(
    conn: &Connection,
    owner_id: &str,
    table: Table,
    id: &str,
) -> Result<Option<Row>, AppError> {
    let sql = format!(
        "SELECT {} FROM {table} WHERE id = ?1 AND user_id = ?2",
        columns(table).join(", ")
    );
    let mut stmt = conn.prepare(&sql).map_err(missing_table(table))?;
    let row = stmt
        .query_row(params![id, owner_id], |row| read_row(table, row))
        .optional()?;
    Ok(row)
}

pub fn update_row(
    conn: &Connection,
    owner_id: &str,
    table: Table,
    id: &str,
    fields: &Row,
) -> Result<(), AppError> {
    if fields.is_empty() {
        return Ok(());
    }

    let mut assignments = Vec::with_capacity(fields.len());
    let mut values = Vec::with_capacity(fields.len() + 2);
    for (column, value) in fields {
        check_column(table, column)?;
        if IMMUTABLE_COLUMNS.contains(&column.as_str()) {
            return Err(AppError::General(format!("column {column} cannot be updated")));
        }
        values.push(json_to_sql(column, value)?);
        assignments.push(format!("{column} = ?{}", values.len()));
    }
    values.push(Value::Text(id.to_string()));
    let id_param = values.len();
    values.push(Value::Text(owner_id.to_string()));
    let owner_param = values.len();

    let sql = format!(
        "UPDATE {table} SET {} WHERE id = ?{id_param} AND user_id = ?{owner_param}",
        assignments.join(", ")
    );
    let count = conn
        .execute(&sql, params_from_iter(values))
        .map_err(missing_table(table))?;
    if count == 0 {
        return Err(AppError::NotFound(format!("{table} row {id}")));
    }
    Ok(())
}

/// Inserts a row owned by `owner_id`, filling in `id` and `created_at` when
/// the caller leaves them out. Returns the stored row.
pub fn insert_row(
    conn: &Connection,
    owner_id: &str,
    table: Table,
    fields: &Row,
) -> Result<Row, AppError> {
    let mut row = fields.clone();
    row.insert("user_id".to_string(), owner_id.into());
    let id = match row.get("id").and_then(|v| v.as_str()) {
        Some(id) => id.to_string(),
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            row.insert("id".to_string(), id.clone().into());
            id
        }
    };
    row.entry("created_at".to_string())
        .or_insert_with(|| chrono::Utc::now().to_rfc3339().into());

    let mut names = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (column, value) in &row {
        check_column(table, column)?;
        names.push(column.as_str());
        values.push(json_to_sql(column, value)?);
    }
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, params_from_iter(values))
        .map_err(missing_table(table))?;

    get_row(conn, owner_id, table, &id)?
        .ok_or_else(|| AppError::NotFound(format!("{table} row {id}")))
}

pub fn object_exists(conn: &Connection, path: &str) -> Result<bool, AppError> {
    let exists = conn
        .query_row("SELECT 1 FROM objects WHERE path = ?1", params![path], |_| Ok(()))
        .optional()?
        .is_some();
    Ok(exists)
}

pub fn put_object(
    conn: &Connection,
    path: &str,
    bytes: &[u8],
    content_type: Option<&str>,
    cache_control: &str,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT OR REPLACE INTO objects (path, bytes, content_type, cache_control)
         VALUES (?1, ?2, ?3, ?4)",
        params![path, bytes, content_type, cache_control],
    )?;
    Ok(())
}

pub fn get_object(conn: &Connection, path: &str) -> Result<Option<Vec<u8>>, AppError> {
    let bytes = conn
        .query_row(
            "SELECT bytes FROM objects WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )
        .optional()?;
    Ok(bytes)
}
