//! Hosted table adapter: bookmarks over the REST row API.

use std::sync::Arc;

use crate::api::{AuthApi, BookmarkTable};
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::http;
use crate::types::{Bookmark, NewBookmark};

pub struct HostedTable {
    http: reqwest::Client,
    config: BackendConfig,
    auth: Arc<dyn AuthApi>,
}

impl HostedTable {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: BackendConfig, auth: Arc<dyn AuthApi>) -> Result<Self, BackendError> {
        let http = http::build_client(config.timeouts)?;
        Ok(Self { http, config, auth })
    }

    /// Session token when signed in, else the public key. Row access policy
    /// decides what either one can see.
    async fn bearer(&self) -> String {
        match self.auth.session().await {
            Ok(Some(session)) => session.access_token,
            Ok(None) => self.config.anon_key.clone(),
            Err(e) => {
                tracing::debug!(error = %e, "session lookup failed; using anon key");
                self.config.anon_key.clone()
            }
        }
    }

    async fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let token = self.bearer().await;
        self.http
            .request(method, self.config.rest_url(&self.config.table))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
    }
}

#[async_trait::async_trait]
impl BookmarkTable for HostedTable {
    async fn list(&self) -> Result<Vec<Bookmark>, BackendError> {
        let request = self
            .request(reqwest::Method::GET)
            .await
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        let text = http::send(request).await?;
        let rows: Vec<Bookmark> = http::parse_json(&text)?;
        tracing::debug!(count = rows.len(), "bookmarks fetched");
        Ok(rows)
    }

    async fn insert(&self, bookmark: &NewBookmark) -> Result<Vec<Bookmark>, BackendError> {
        let request = self
            .request(reqwest::Method::POST)
            .await
            .header("Prefer", "return=representation")
            .json(&[bookmark]);
        let text = http::send(request).await?;
        http::parse_json(&text)
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        let filter = format!("eq.{id}");
        let request = self
            .request(reqwest::Method::DELETE)
            .await
            .query(&[("id", filter.as_str())]);
        http::send(request).await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
