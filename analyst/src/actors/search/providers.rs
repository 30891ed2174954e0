use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::{SearchCitation, SearchCollaborator};
use crate::actors::collaborator::CollaboratorError;

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
const TAVILY_API_KEY_ENV: &str = "TAVILY_API_KEY";
const PROVIDER: &str = "tavily";

/// Web search over the Tavily REST API.
#[derive(Debug, Clone)]
pub struct TavilySearch {
    http: reqwest::Client,
    max_results: u32,
}

impl TavilySearch {
    pub fn new(max_results: u32) -> Result<Self, CollaboratorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CollaboratorError::ProviderRequest(PROVIDER.to_string(), e.to_string()))?;
        Ok(Self {
            http,
            max_results: max_results.clamp(1, 20),
        })
    }

    pub(crate) fn request_body(&self, query: &str) -> Value {
        serde_json::json!({
            "query": query,
            "search_depth": "basic",
            "max_results": self.max_results,
            "include_answer": false,
            "include_raw_content": false
        })
    }
}

#[async_trait]
impl SearchCollaborator for TavilySearch {
    async fn search(&self, query: &str) -> Result<String, CollaboratorError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CollaboratorError::Validation(
                "search query cannot be empty".to_string(),
            ));
        }

        let api_key = std::env::var(TAVILY_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CollaboratorError::MissingApiKey(TAVILY_API_KEY_ENV.to_string()))?;

        let response = self
            .http
            .post(TAVILY_SEARCH_URL)
            .bearer_auth(api_key)
            .json(&self.request_body(query))
            .send()
            .await
            .map_err(|e| CollaboratorError::ProviderRequest(PROVIDER.to_string(), e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::ProviderRequest(
                PROVIDER.to_string(),
                format!("status {}: {}", status, body),
            ));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError::ProviderParse(PROVIDER.to_string(), e.to_string()))?;
        let citations = parse_tavily_results(&payload)?;

        tracing::debug!(
            provider = PROVIDER,
            results = citations.len(),
            "Web search completed"
        );
        Ok(render_citations(query, &citations))
    }
}

pub(crate) fn parse_tavily_results(payload: &Value) -> Result<Vec<SearchCitation>, CollaboratorError> {
    let results = payload
        .get("results")
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            CollaboratorError::ProviderParse(
                PROVIDER.to_string(),
                "missing results array".to_string(),
            )
        })?;

    let mut citations = Vec::new();
    for row in results {
        let url = row
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if url.is_empty() {
            continue;
        }
        citations.push(SearchCitation {
            title: row
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("Untitled")
                .to_string(),
            url,
            snippet: row
                .get("content")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .trim()
                .to_string(),
            published_at: row
                .get("published_date")
                .and_then(|v| v.as_str())
                .map(ToString::to_string),
        });
    }

    Ok(citations)
}

/// Renders citations as numbered blocks the model can cite by URL.
pub(crate) fn render_citations(query: &str, citations: &[SearchCitation]) -> String {
    if citations.is_empty() {
        return format!("No web results found for \"{query}\".");
    }

    let mut out = format!("Web results for \"{query}\":\n");
    for (idx, citation) in citations.iter().enumerate() {
        out.push_str(&format!("\n{}. {} ({})", idx + 1, citation.title, citation.url));
        if let Some(published) = citation.published_at.as_deref() {
            out.push_str(&format!("\n   Published: {published}"));
        }
        if !citation.snippet.is_empty() {
            out.push_str(&format!("\n   {}", citation.snippet));
        }
        out.push('\n');
    }
    out
}
