//! GitHub starred-repositories catalog.
//!
//! Fetches `GET {api_base}/users/{username}/starred?sort=updated&per_page=100`
//! (one page, GitHub's maximum size) and turns the response into
//! [`CatalogEntry`]s. Upstream nulls (`homepage`,
//! `description`) and a missing `topics` array normalize to empty values
//! here, so nothing downstream has to reason about absence.
//!
//! # Configuration
//!
//! ```toml
//! [catalog]
//! username = "moojigc"
//! api_base = "https://api.github.com"
//! timeout_secs = 15
//! token_env = "GITHUB_TOKEN"   # optional
//! ```

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::models::CatalogEntry;
use crate::traits::CatalogFetcher;

/// Raw repository object as returned by the GitHub REST API.
#[derive(Debug, Deserialize)]
struct GitHubRepo {
    id: i64,
    name: String,
    html_url: String,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    topics: Option<Vec<String>>,
}

impl From<GitHubRepo> for CatalogEntry {
    fn from(repo: GitHubRepo) -> Self {
        Self {
            external_id: repo.id,
            name: repo.name,
            url: repo.html_url,
            homepage: repo.homepage.unwrap_or_default(),
            description: repo.description.unwrap_or_default(),
            topics: repo.topics.unwrap_or_default(),
        }
    }
}

/// [`CatalogFetcher`] backed by the GitHub REST API.
pub struct GitHubStarredFetcher {
    label: String,
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl GitHubStarredFetcher {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("starlog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::fetch)?;

        let token = config
            .token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty());

        Ok(Self {
            label: format!("github:{}", config.username),
            url: format!(
                "{}/users/{}/starred?sort=updated&per_page=100",
                config.api_base.trim_end_matches('/'),
                config.username
            ),
            token,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CatalogFetcher for GitHubStarredFetcher {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self) -> Result<Vec<CatalogEntry>> {
        tracing::debug!(url = %self.url, "fetching catalog");

        let mut request = self
            .client
            .get(&self.url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(Error::fetch)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!(
                "{} returned HTTP {}",
                self.url,
                status.as_u16()
            )));
        }

        let body = response.text().await.map_err(Error::fetch)?;
        let entries = parse_starred(&body)?;
        tracing::info!(fetcher = %self.label, count = entries.len(), "fetched catalog");
        Ok(entries)
    }
}

/// Decode a starred-repositories JSON body, preserving upstream order.
pub fn parse_starred(body: &str) -> Result<Vec<CatalogEntry>> {
    let repos: Vec<GitHubRepo> = serde_json::from_str(body)
        .map_err(|e| Error::Fetch(format!("malformed catalog response: {}", e)))?;
    Ok(repos.into_iter().map(CatalogEntry::from).collect())
}
