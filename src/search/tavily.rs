use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{SearchHit, SearchOptions, SearchResponse, WebSearcher};
use crate::config::SearchConfig;
use crate::errors::CollaboratorError;

/// 基于Tavily Search API的搜索实现
pub struct TavilySearcher {
    api_key: String,
    api_base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    query: String,
    #[serde(default)]
    results: Vec<SearchHit>,
}

impl TavilySearcher {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client for Tavily")?;

        Ok(Self {
            api_key: config.api_key.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl WebSearcher for TavilySearcher {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, CollaboratorError> {
        debug!(query, max_results = options.max_results, "Tavily search");

        let body = serde_json::json!({
            "query": query,
            "max_results": options.max_results,
            "search_depth": options.search_depth,
            "include_raw_content": options.include_raw_content,
        });

        let resp = self
            .client
            .post(format!("{}/search", self.api_base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CollaboratorError::Search(format!("Tavily request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CollaboratorError::Search(format!(
                "Tavily returned {}: {}",
                status, text
            )));
        }

        let data: TavilyResponse = resp.json().await.map_err(|e| {
            CollaboratorError::Search(format!("Failed to parse Tavily response: {}", e))
        })?;

        info!(query, count = data.results.len(), "Tavily search complete");

        let query = if data.query.is_empty() {
            query.to_string()
        } else {
            data.query
        };
        Ok(SearchResponse::new(query, data.results))
    }
}
