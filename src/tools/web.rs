//! Web search tool (DuckDuckGo instant answers)

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::Tool;
use crate::error::Error;
use crate::Result;

const DDG_API_URL: &str = "https://api.duckduckgo.com/";
const DEFAULT_MAX_RESULTS: u64 = 5;
const SNIPPET_CHARS: usize = 200;

/// Keys accepted as the search query, in priority order.
const QUERY_KEYS: [&str; 6] = ["query", "key", "q", "keywords", "text", "prompt"];

/// Search the web via the DuckDuckGo API
pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self::with_endpoint(DDG_API_URL)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("localagents/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// The query from its usual keys, else the first non-empty string argument.
fn resolve_query(args: &Map<String, Value>) -> Option<String> {
    QUERY_KEYS
        .iter()
        .find_map(|key| args.get(*key).and_then(non_empty))
        .or_else(|| args.values().find_map(non_empty))
        .map(str::to_string)
}

/// `max_results` clamped to 1..=10; numeric strings are accepted.
fn resolve_max_results(args: &Map<String, Value>) -> usize {
    let raw = match args.get("max_results") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    raw.unwrap_or(DEFAULT_MAX_RESULTS).clamp(1, 10) as usize
}

/// `kp` parameter for the safesearch level.
fn resolve_safesearch(args: &Map<String, Value>) -> &'static str {
    match args
        .get("safesearch")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .as_deref()
    {
        Some("on") => "1",
        Some("off") => "-2",
        _ => "-1",
    }
}

struct Hit {
    title: String,
    url: String,
    snippet: String,
}

/// Collect hits from an instant-answer reply: the abstract first, then
/// `Results`, then `RelatedTopics` (including grouped topics).
fn collect_hits(reply: &Value, max: usize) -> Vec<Hit> {
    let mut hits = Vec::new();

    if let Some(text) = reply.get("AbstractText").and_then(non_empty) {
        hits.push(Hit {
            title: reply
                .get("Heading")
                .and_then(non_empty)
                .unwrap_or("No title")
                .to_string(),
            url: reply
                .get("AbstractURL")
                .and_then(non_empty)
                .unwrap_or("No URL")
                .to_string(),
            snippet: text.to_string(),
        });
    }

    fn push_topic(topic: &Value, hits: &mut Vec<Hit>) {
        if let Some(nested) = topic.get("Topics").and_then(Value::as_array) {
            for t in nested {
                push_topic(t, hits);
            }
            return;
        }
        let Some(text) = topic.get("Text").and_then(non_empty) else {
            return;
        };
        let title = text.split(" - ").next().unwrap_or(text).to_string();
        hits.push(Hit {
            title,
            url: topic
                .get("FirstURL")
                .and_then(non_empty)
                .unwrap_or("No URL")
                .to_string(),
            snippet: text.to_string(),
        });
    }

    for key in ["Results", "RelatedTopics"] {
        for topic in reply.get(key).and_then(Value::as_array).into_iter().flatten() {
            push_topic(topic, &mut hits);
        }
    }

    hits.truncate(max);
    hits
}

fn format_hits(hits: &[Hit]) -> String {
    let results: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let snippet: String = hit.snippet.chars().take(SNIPPET_CHARS).collect();
            format!("{}. {}\n   URL: {}\n   {}", i + 1, hit.title, hit.url, snippet)
        })
        .collect();
    format!("Search Results:\n\n{}", results.join("\n\n"))
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web using DuckDuckGo and return titles, URLs and snippets"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "max_results": {
                    "type": "number",
                    "description": "Number of results, 1-10 (default 5)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let args = params.as_object().cloned().unwrap_or_default();
        let query = resolve_query(&args).ok_or_else(|| {
            Error::Tool("search query is required (use 'query' or 'key')".to_string())
        })?;
        let max_results = resolve_max_results(&args);
        let region = args
            .get("region")
            .and_then(non_empty)
            .map(str::to_lowercase)
            .unwrap_or_else(|| "us-en".to_string());

        debug!("Searching '{}' (max {}, region {})", query, max_results, region);
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query.as_str()),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
                ("kl", region.as_str()),
                ("kp", resolve_safesearch(&args)),
            ])
            .send()
            .await
            .map_err(|e| Error::Tool(format!("Search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Tool(format!("Search HTTP error: {}", status)));
        }
        // The API answers with `application/x-javascript`, so decode by hand.
        let body = response.text().await?;
        let reply: Value = serde_json::from_str(&body)?;

        let hits = collect_hits(&reply, max_results);
        if hits.is_empty() {
            return Ok(format!("No results found for: {query}"));
        }
        Ok(format_hits(&hits))
    }
}
