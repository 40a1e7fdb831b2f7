use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;

use crate::config::RestConfig;
use crate::data::gateway::{into_row, ListQuery, PutOptions, RemoteGateway};
use crate::error::{AppError, Result};
use crate::models::item::Table;
use crate::models::row::Row;
use crate::models::session::Session;

/// PostgREST codes meaning the relation is not there.
const MISSING_TABLE_CODES: &[&str] = &["42P01", "PGRST205"];

/// Gateway for a Supabase-style backend: PostgREST tables under `/rest/v1`
/// and object storage under `/storage/v1`.
pub struct RestGateway {
    client: Client,
    base: Url,
    config: RestConfig,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, alias = "error")]
    message: Option<String>,
}

trait WithSession {
    fn with_session(self, config: &RestConfig, session: &Session) -> Self;
}

impl WithSession for RequestBuilder {
    fn with_session(self, config: &RestConfig, session: &Session) -> Self {
        let token = session.access_token.as_deref().unwrap_or(&config.anon_key);
        self.header("apikey", &config.anon_key)
            .header("authorization", format!("Bearer {token}"))
    }
}

impl RestGateway {
    pub fn new(config: RestConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| AppError::General(format!("invalid backend url {}: {e}", config.url)))?;
        if base.cannot_be_a_base() {
            return Err(AppError::General(format!(
                "backend url cannot be a base: {}",
                config.url
            )));
        }
        Ok(Self {
            client: Client::new(),
            base,
            config,
        })
    }

    fn endpoint<'a, I>(&self, segments: I) -> Url
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn table_url(&self, table: Table) -> Url {
        self.endpoint(["rest", "v1", table.as_str()])
    }

    fn object_url(&self, prefix: &[&str], path: &str) -> Url {
        let segments = ["storage", "v1", "object"]
            .into_iter()
            .chain(prefix.iter().copied())
            .chain([self.config.bucket.as_str()])
            .chain(path.split('/').filter(|s| !s.is_empty()));
        self.endpoint(segments)
    }

    pub(crate) fn list_request(
        &self,
        session: &Session,
        table: Table,
        query: &ListQuery,
    ) -> Result<reqwest::Request> {
        let mut params: Vec<(String, String)> = vec![
            ("select".to_string(), "*".to_string()),
            ("user_id".to_string(), format!("eq.{}", session.owner_id)),
        ];
        for (column, value) in query.filters(table) {
            params.push((column.to_string(), format!("eq.{value}")));
        }
        if query.newest_first {
            params.push(("order".to_string(), "created_at.desc".to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        Ok(self
            .client
            .get(self.table_url(table))
            .with_session(&self.config, session)
            .query(&params)
            .build()?)
    }

    pub(crate) fn update_request(
        &self,
        session: &Session,
        table: Table,
        id: &str,
        fields: &Row,
    ) -> Result<reqwest::Request> {
        Ok(self
            .client
            .request(Method::PATCH, self.table_url(table))
            .with_session(&self.config, session)
            .header("prefer", "return=minimal")
            .query(&[
                ("id", format!("eq.{id}")),
                ("user_id", format!("eq.{}", session.owner_id)),
            ])
            .json(fields)
            .build()?)
    }

    async fn send(&self, request: reqwest::Request) -> Result<Response> {
        let method = request.method().clone();
        let url = request.url().path().to_string();
        let response = self.client.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(%method, %url, %status, body = %body, "backend request failed");
        Err(classify_error(status, &body))
    }
}

/// Maps a failed response to an error. Missing relations and missing objects
/// get their own variants so callers can degrade.
pub(crate) fn classify_error(status: StatusCode, body: &str) -> AppError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .clone()
        .unwrap_or_else(|| body.trim().to_string());

    let missing_relation = parsed
        .code
        .as_deref()
        .is_some_and(|code| MISSING_TABLE_CODES.contains(&code))
        || (message.contains("relation") && message.contains("does not exist"));
    if missing_relation {
        let table = message
            .split('"')
            .nth(1)
            .map(|name| name.trim_start_matches("public.").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        return AppError::MissingTable(table);
    }

    if status == StatusCode::NOT_FOUND {
        return AppError::NotFound(message);
    }

    AppError::Backend {
        status: status.as_u16(),
        code: parsed.code,
        message,
    }
}

#[async_trait]
impl RemoteGateway for RestGateway {
    async fn list(&self, session: &Session, table: Table, query: &ListQuery) -> Result<Vec<Row>> {
        let request = self.list_request(session, table, query)?;
        match self.send(request).await {
            Ok(response) => {
                let rows: Vec<serde_json::Value> = response.json().await?;
                rows.into_iter().map(into_row).collect()
            }
            Err(AppError::MissingTable(name)) => {
                tracing::warn!(%table, relation = %name, "table missing; treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, session: &Session, table: Table, id: &str, fields: &Row) -> Result<()> {
        let request = self.update_request(session, table, id, fields)?;
        self.send(request).await?;
        Ok(())
    }

    async fn insert(&self, session: &Session, table: Table, fields: &Row) -> Result<Row> {
        let request = self
            .client
            .post(self.table_url(table))
            .with_session(&self.config, session)
            .header("prefer", "return=representation")
            .json(fields)
            .build()?;
        let rows: Vec<serde_json::Value> = self.send(request).await?.json().await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::General(format!("insert into {table} returned no row")))?;
        into_row(row)
    }

    async fn put_object(
        &self,
        session: &Session,
        path: &str,
        bytes: Vec<u8>,
        options: &PutOptions,
    ) -> Result<()> {
        let content_type = options
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let request = self
            .client
            .post(self.object_url(&[], path))
            .with_session(&self.config, session)
            .header("content-type", content_type)
            .header("cache-control", format!("max-age={}", options.cache_control))
            .header("x-upsert", options.upsert.to_string())
            .body(bytes)
            .build()?;
        self.send(request).await?;
        Ok(())
    }

    async fn get_object(&self, session: &Session, path: &str) -> Result<Vec<u8>> {
        let request = self
            .client
            .get(self.object_url(&[], path))
            .with_session(&self.config, session)
            .build()?;
        let bytes = self.send(request).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    fn public_url(&self, path: &str) -> String {
        self.object_url(&["public"], path).to_string()
    }
}
