//! Per-cell fetching from the remote source
//!
//! [`CellFetcher`] is the port the crawler calls for every cell in a batch.
//! [`HttpCellFetcher`] is the reqwest implementation: it renders the request
//! URL through a [`RequestBuilder`], retries with backoff via
//! [`with_backoff`](crate::retry::with_backoff), and turns the body into
//! sanitized [`FetchedItem`]s.

use crate::config::{QueryParam, RetryConfig, SourceConfig};
use crate::error::{Error, Result};
use crate::grid::GridCell;
use crate::item::FetchedItem;
use crate::retry::{IsRetryable, parse_retry_after, with_backoff};
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

/// Field of the response object holding the result entries
pub const RESULT_LIST_FIELD: &str = "resultList";

/// Fetches the items of one grid cell
#[async_trait]
pub trait CellFetcher: Send + Sync {
    /// Fetch every item the source reports for `cell`
    async fn fetch(&self, cell: &GridCell) -> Result<Vec<FetchedItem>>;
}

/// Builds the request URL for a cell
///
/// This is the seam for source-specific query construction.
pub trait RequestBuilder: Send + Sync {
    /// URL to request for `cell`
    fn build_url(&self, cell: &GridCell) -> Result<Url>;
}

/// Renders configured query parameter templates against a base URL
///
/// `{lat}` and `{lon}` in each template are replaced by the cell coordinates.
#[derive(Clone, Debug)]
pub struct TemplateRequestBuilder {
    base_url: Url,
    query: Vec<QueryParam>,
}

impl TemplateRequestBuilder {
    /// Create a builder from a base URL and query templates
    pub fn new(base_url: &str, query: Vec<QueryParam>) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            Error::config("source.base_url", format!("invalid URL '{}': {}", base_url, e))
        })?;
        Ok(Self { base_url, query })
    }

    /// Create a builder from the source configuration
    pub fn from_config(source: &SourceConfig) -> Result<Self> {
        Self::new(&source.base_url, source.query.clone())
    }
}

impl RequestBuilder for TemplateRequestBuilder {
    fn build_url(&self, cell: &GridCell) -> Result<Url> {
        let mut url = self.base_url.clone();
        if !self.query.is_empty() {
            let lat = cell.lat.to_string();
            let lon = cell.lon.to_string();
            let mut pairs = url.query_pairs_mut();
            for param in &self.query {
                let value = param.value.replace("{lat}", &lat).replace("{lon}", &lon);
                pairs.append_pair(&param.name, &value);
            }
        }
        Ok(url)
    }
}

/// HTTP implementation of [`CellFetcher`]
pub struct HttpCellFetcher {
    client: reqwest::Client,
    request_builder: Box<dyn RequestBuilder>,
    retry: RetryConfig,
}

impl HttpCellFetcher {
    /// Create a fetcher with its own HTTP client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(
        source: &SourceConfig,
        retry: RetryConfig,
        request_builder: Box<dyn RequestBuilder>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(retry.request_timeout)
            .user_agent(source.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            request_builder,
            retry,
        })
    }

    /// Create a fetcher that renders URLs from the configured query templates
    pub fn from_config(source: &SourceConfig, retry: RetryConfig) -> Result<Self> {
        let builder = TemplateRequestBuilder::from_config(source)?;
        Self::new(source, retry, Box::new(builder))
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<FetchedItem>> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = if honors_retry_after(status.as_u16()) {
                response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after)
            } else {
                None
            };
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                retry_after,
            });
        }

        let body = response.text().await?;
        parse_result_list(&body)
    }
}

#[async_trait]
impl CellFetcher for HttpCellFetcher {
    async fn fetch(&self, cell: &GridCell) -> Result<Vec<FetchedItem>> {
        let url = self.request_builder.build_url(cell)?;
        tracing::debug!(%cell, %url, "Fetching cell");

        with_backoff(&self.retry, || self.fetch_once(&url))
            .await
            .map_err(|e| {
                if e.is_retryable() {
                    Error::RetriesExhausted {
                        attempts: self.retry.max_retries + 1,
                        source: Box::new(e),
                    }
                } else {
                    e
                }
            })
    }
}

/// Statuses whose `Retry-After` header is honored
fn honors_retry_after(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Parse a response body into sanitized items
///
/// The body may be the JSON object itself or a JSON string containing it.
/// A body without a `resultList` array yields no items.
pub fn parse_result_list(body: &str) -> Result<Vec<FetchedItem>> {
    let mut parsed: Value = serde_json::from_str(body.trim_start_matches('\u{feff}'))
        .map_err(|e| Error::Parse(format!("response is not JSON: {}", e)))?;

    if let Value::String(inner) = parsed {
        parsed = serde_json::from_str(&inner)
            .map_err(|e| Error::Parse(format!("embedded response is not JSON: {}", e)))?;
    }

    let entries = match parsed {
        Value::Object(mut object) => match object.remove(RESULT_LIST_FIELD) {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    Ok(entries.into_iter().filter_map(FetchedItem::sanitize).collect())
}
