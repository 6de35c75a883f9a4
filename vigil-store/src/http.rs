//! HTTP backend speaking the Elasticsearch-compatible REST API

use crate::api::DocStore;
use crate::conn::Conn;
use crate::error::{Result, StoreError};
use crate::search::{Query, SearchOptions, SearchPage, Hit};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};

/// `DocStore` implementation over an Elasticsearch-compatible REST endpoint
#[derive(Debug, Clone)]
pub struct HttpStore {
    conn: Conn,
}

impl HttpStore {
    /// Wrap an existing connection
    pub fn new(conn: Conn) -> Self {
        Self { conn }
    }

    /// The underlying connection
    pub fn conn(&self) -> &Conn {
        &self.conn
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.conn.endpoint().trim_end_matches('/'), path)
    }

    async fn unexpected(url: String, resp: reqwest::Response) -> StoreError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        StoreError::UnexpectedStatus { status, url, body }
    }
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    total: TotalHits,
    hits: Vec<RawHit>,
}

/// Total-hit count; newer API versions wrap it in an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Legacy(u64),
    Object { value: u64 },
}

impl Default for TotalHits {
    fn default() -> Self {
        TotalHits::Legacy(0)
    }
}

impl TotalHits {
    fn value(&self) -> u64 {
        match self {
            TotalHits::Legacy(n) => *n,
            TotalHits::Object { value } => *value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: JsonValue,
    #[serde(default)]
    sort: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<JsonValue>,
}

fn bulk_item_error(item: &JsonValue) -> Option<String> {
    let (_op, body) = item.as_object()?.iter().next()?;
    let error = body.get("error")?;
    Some(error.to_string())
}

#[async_trait]
impl DocStore for HttpStore {
    async fn count(&self, index: &str) -> Result<u64> {
        let url = self.url(&format!("{index}/_count"));
        let resp = self.conn.authed(self.conn.http().get(&url)).send().await?;
        match resp.status().as_u16() {
            200 => Ok(resp.json::<CountResponse>().await?.count),
            404 => Err(StoreError::index_not_found(index)),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn search(
        &self,
        index: &str,
        query: &Query,
        options: &SearchOptions,
    ) -> Result<SearchPage> {
        let url = self.url(&format!("{index}/_search"));
        let mut body = Map::new();
        body.insert("query".into(), query.to_dsl());
        body.insert("size".into(), json!(options.size));
        body.insert("track_total_hits".into(), json!(true));
        if !options.sort.is_unsorted() {
            body.insert("sort".into(), options.sort.to_dsl());
        }
        match &options.search_after {
            // A cursor supersedes any numeric offset.
            Some(cursor) => {
                body.insert("search_after".into(), JsonValue::Array(cursor.clone()));
            }
            None => {
                if let Some(from) = options.from {
                    body.insert("from".into(), json!(from));
                }
            }
        }

        let resp = self
            .conn
            .authed(self.conn.http().post(&url))
            .json(&JsonValue::Object(body))
            .send()
            .await?;
        match resp.status().as_u16() {
            200 => {
                let parsed: SearchResponse = resp.json().await?;
                Ok(SearchPage {
                    total: parsed.hits.total.value(),
                    hits: parsed
                        .hits
                        .hits
                        .into_iter()
                        .map(|h| Hit {
                            id: h.id,
                            source: h.source,
                            sort: h.sort,
                        })
                        .collect(),
                })
            }
            404 => Err(StoreError::index_not_found(index)),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn bulk_create(
        &self,
        index: &str,
        _doc_type: &str,
        docs: &[(String, JsonValue)],
    ) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let url = self.url("_bulk");
        let mut ndjson = String::new();
        for (id, doc) in docs {
            // Explicit-id index actions: re-writing an id overwrites in place,
            // which keeps resumed pages idempotent.
            let action = json!({ "index": { "_index": index, "_id": id } });
            ndjson.push_str(&serde_json::to_string(&action)?);
            ndjson.push('\n');
            ndjson.push_str(&serde_json::to_string(doc)?);
            ndjson.push('\n');
        }

        let resp = self
            .conn
            .authed(self.conn.http().post(&url))
            .header("Content-Type", "application/x-ndjson")
            .body(ndjson)
            .send()
            .await?;
        match resp.status().as_u16() {
            200 => {
                let parsed: BulkResponse = resp.json().await?;
                if parsed.errors {
                    let failures: Vec<String> =
                        parsed.items.iter().filter_map(bulk_item_error).collect();
                    return Err(StoreError::BulkRejected {
                        failed: failures.len(),
                        total: docs.len(),
                        first_reason: failures.first().cloned().unwrap_or_default(),
                    });
                }
                Ok(())
            }
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn delete_doc(&self, index: &str, id: &str) -> Result<bool> {
        let url = self.url(&format!("{index}/_doc/{id}"));
        let resp = self.conn.authed(self.conn.http().delete(&url)).send().await?;
        match resp.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn get_doc(&self, index: &str, id: &str) -> Result<JsonValue> {
        let url = self.url(&format!("{index}/_doc/{id}"));
        let resp = self.conn.authed(self.conn.http().get(&url)).send().await?;
        match resp.status().as_u16() {
            200 => {
                let body: JsonValue = resp.json().await?;
                body.get("_source")
                    .cloned()
                    .ok_or_else(|| StoreError::not_found(format!("{index}/{id} has no source")))
            }
            404 => Err(StoreError::not_found(format!("{index}/{id}"))),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn create_doc(&self, index: &str, id: &str, doc: &JsonValue) -> Result<()> {
        let url = self.url(&format!("{index}/_doc/{id}"));
        let resp = self
            .conn
            .authed(self.conn.http().put(&url))
            .json(doc)
            .send()
            .await?;
        match resp.status().as_u16() {
            200 | 201 => Ok(()),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn update_doc(&self, index: &str, id: &str, partial: &JsonValue) -> Result<()> {
        let url = self.url(&format!("{index}/_update/{id}"));
        let resp = self
            .conn
            .authed(self.conn.http().post(&url))
            .json(&json!({ "doc": partial }))
            .send()
            .await?;
        match resp.status().as_u16() {
            200 | 201 => Ok(()),
            404 => Err(StoreError::not_found(format!("{index}/{id}"))),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let url = self.url(index);
        let resp = self.conn.authed(self.conn.http().head(&url)).send().await?;
        match resp.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn create_index(&self, index: &str, settings: &JsonValue) -> Result<()> {
        let url = self.url(index);
        let resp = self
            .conn
            .authed(self.conn.http().put(&url))
            .json(settings)
            .send()
            .await?;
        match resp.status().as_u16() {
            200 => Ok(()),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let url = self.url(index);
        let resp = self.conn.authed(self.conn.http().delete(&url)).send().await?;
        match resp.status().as_u16() {
            // Deleting an absent index is a no-op, same as document deletes.
            200 | 404 => Ok(()),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn put_template(&self, name: &str, template: &JsonValue) -> Result<()> {
        let url = self.url(&format!("_template/{name}"));
        let resp = self
            .conn
            .authed(self.conn.http().put(&url))
            .json(template)
            .send()
            .await?;
        match resp.status().as_u16() {
            200 => Ok(()),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn update_settings(&self, index: &str, settings: &JsonValue) -> Result<()> {
        let url = self.url(&format!("{index}/_settings"));
        let resp = self
            .conn
            .authed(self.conn.http().put(&url))
            .json(settings)
            .send()
            .await?;
        match resp.status().as_u16() {
            200 => Ok(()),
            404 => Err(StoreError::index_not_found(index)),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn get_settings(&self, index: &str) -> Result<JsonValue> {
        let url = self.url(&format!("{index}/_settings"));
        let resp = self.conn.authed(self.conn.http().get(&url)).send().await?;
        match resp.status().as_u16() {
            200 => {
                let body: JsonValue = resp.json().await?;
                // Response is keyed by concrete index name; unwrap one level.
                let settings = body
                    .as_object()
                    .and_then(|m| m.values().next())
                    .and_then(|v| v.get("settings"))
                    .cloned();
                settings.ok_or_else(|| StoreError::index_not_found(index))
            }
            404 => Err(StoreError::index_not_found(index)),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        let url = self.url(&format!("{index}/_refresh"));
        let resp = self.conn.authed(self.conn.http().post(&url)).send().await?;
        match resp.status().as_u16() {
            200 => Ok(()),
            404 => Err(StoreError::index_not_found(index)),
            _ => Err(Self::unexpected(url, resp).await),
        }
    }
}
