//! Registry search
//!
//! Looks for extension packages on the npm registry (by keyword) and on
//! GitHub (by repository topic). Both queries run concurrently and each can
//! fail without hiding the other's results.

use crate::config::SearchConfig;
use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

type Result<T> = std::result::Result<T, SearchError>;

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Npm,
    GitHub,
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npm => f.write_str("npm"),
            Self::GitHub => f.write_str("github"),
        }
    }
}

/// One package or repository
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub name: String,
    pub description: String,
    pub version: Option<String>,
    pub url: String,
    pub source: SearchSource,
}

/// Results from every source that answered, plus the failures
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub failures: Vec<(SearchSource, SearchError)>,
}

// npm registry response

#[derive(Debug, Deserialize)]
struct NpmSearchResponse {
    #[serde(default)]
    objects: Vec<NpmObject>,
}

#[derive(Debug, Deserialize)]
struct NpmObject {
    package: NpmPackage,
}

#[derive(Debug, Deserialize)]
struct NpmPackage {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    links: NpmLinks,
}

#[derive(Debug, Default, Deserialize)]
struct NpmLinks {
    #[serde(default)]
    npm: Option<String>,
}

// GitHub response

#[derive(Debug, Deserialize)]
struct GitHubSearchResponse {
    #[serde(default)]
    items: Vec<GitHubRepository>,
}

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    html_url: String,
}

/// Client for both registries
pub struct RegistrySearch {
    config: SearchConfig,
    client: reqwest::Client,
}

impl RegistrySearch {
    /// Create a new registry search client
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(concat!("extpack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Query npm and GitHub concurrently
    pub async fn search(&self, query: &str, limit: u32) -> SearchOutcome {
        let (npm, github) = tokio::join!(self.search_npm(query, limit), self.search_github(query, limit));

        let mut outcome = SearchOutcome::default();
        for (source, result) in [(SearchSource::Npm, npm), (SearchSource::GitHub, github)] {
            match result {
                Ok(results) => {
                    debug!("{} returned {} result(s)", source, results.len());
                    outcome.results.extend(results);
                }
                Err(e) => {
                    warn!("{} search failed: {}", source, e);
                    outcome.failures.push((source, e));
                }
            }
        }
        outcome
    }

    /// Packages tagged with the configured keyword
    pub async fn search_npm(&self, query: &str, limit: u32) -> Result<Vec<SearchResult>> {
        let url = format!("{}/-/v1/search", self.config.npm_url.trim_end_matches('/'));
        let text = format!("keywords:{} {}", self.config.keyword, query);
        let response: NpmSearchResponse = self
            .get_json(&url, &[("text", text), ("size", limit.to_string())])
            .await?;

        Ok(response
            .objects
            .into_iter()
            .map(|object| {
                let package = object.package;
                let url = package
                    .links
                    .npm
                    .unwrap_or_else(|| format!("https://www.npmjs.com/package/{}", package.name));
                SearchResult {
                    name: package.name,
                    description: package.description.unwrap_or_default(),
                    version: package.version,
                    url,
                    source: SearchSource::Npm,
                }
            })
            .collect())
    }

    /// Repositories with the configured topic
    pub async fn search_github(&self, query: &str, limit: u32) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}/search/repositories",
            self.config.github_url.trim_end_matches('/')
        );
        let q = format!("{} topic:{}", query, self.config.keyword);
        let response: GitHubSearchResponse = self
            .get_json(&url, &[("q", q), ("per_page", limit.to_string())])
            .await?;

        Ok(response
            .items
            .into_iter()
            .map(|repo| SearchResult {
                name: repo.full_name,
                description: repo.description.unwrap_or_default(),
                version: None,
                url: repo.html_url,
                source: SearchSource::GitHub,
            })
            .collect())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        response
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))
    }
}
