use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::config::Settings;
use crate::pagination::{Page, PageCursor};

const API_PREFIX: &str = "api/v4";
const NEXT_PAGE_HEADER: &str = "x-next-page";

/// Thin authenticated wrapper around the GitLab REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    api_url: String,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut token = HeaderValue::from_str(&settings.token)
            .context("access token contains characters that cannot be sent in a header")?;
        token.set_sensitive(true);
        headers.insert("PRIVATE-TOKEN", token);

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("lab/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            api_url: format!("{}/{API_PREFIX}", settings.base_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self.send(path, query).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to parse response from {path}"))
    }

    pub async fn get_text(&self, path: &str) -> Result<String> {
        let response = self.send(path, &[]).await?;
        response
            .text()
            .await
            .with_context(|| format!("failed to read response body from {path}"))
    }

    /// Fetch one page of a list endpoint; the next page comes from `X-Next-Page`.
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        cursor: PageCursor,
    ) -> Result<Page<T>> {
        let mut query = query.to_vec();
        query.push(("page", cursor.page.to_string()));
        query.push(("per_page", cursor.per_page.to_string()));

        let response = self.send(path, &query).await?;
        let next_page = parse_next_page(
            response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        let items = response
            .json::<Vec<T>>()
            .await
            .with_context(|| format!("failed to parse page {} of {path}", cursor.page))?;

        Ok(Page { items, next_page })
    }

    async fn send(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(anyhow!("GET {path} failed ({status}): {}", body.trim()))
    }
}

/// An empty or `0` header is the "no more pages" sentinel.
pub fn parse_next_page(header: Option<&str>) -> Option<u32> {
    header
        .map(str::trim)
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|page| *page > 0)
}
