//! Browser and tab discovery through the DevTools HTTP endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A page target the recorder can attach to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: String,
    pub title: String,
    pub url: String,
}

fn endpoint_url(endpoint: &str, path: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), path)
}

/// Resolve the browser-level WebSocket URL from `/json/version`.
pub async fn browser_ws_url(endpoint: &str) -> Result<String, String> {
    let url = endpoint_url(endpoint, "json/version");
    let body: Value = reqwest::get(&url)
        .await
        .map_err(|e| format!("Browser not reachable at {}: {}", url, e))?
        .json()
        .await
        .map_err(|e| format!("Invalid /json/version response: {}", e))?;

    body.get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| "No webSocketDebuggerUrl in /json/version".to_string())
}

/// List open page targets from `/json/list`.
pub async fn list_tabs(endpoint: &str) -> Result<Vec<TabInfo>, String> {
    let url = endpoint_url(endpoint, "json/list");
    let targets: Vec<Value> = reqwest::get(&url)
        .await
        .map_err(|e| format!("Browser not reachable at {}: {}", url, e))?
        .json()
        .await
        .map_err(|e| format!("Invalid /json/list response: {}", e))?;

    Ok(pages_from_targets(&targets))
}

fn pages_from_targets(targets: &[Value]) -> Vec<TabInfo> {
    targets
        .iter()
        .filter(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
        .filter_map(|t| {
            let id = t.get("id").and_then(|v| v.as_str())?;
            Some(TabInfo {
                id: id.to_string(),
                title: t.get("title").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                url: t.get("url").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pages_from_targets_skips_workers() {
        let targets = vec![
            json!({"id": "A", "type": "page", "title": "Shop", "url": "https://shop.example.com/"}),
            json!({"id": "B", "type": "service_worker", "url": "https://shop.example.com/sw.js"}),
            json!({"id": "C", "type": "page"}),
            json!({"type": "page", "title": "no id"}),
        ];
        let tabs = pages_from_targets(&targets);
        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs[0].title, "Shop");
        assert_eq!(tabs[1].id, "C");
        assert_eq!(tabs[1].url, "");
    }

    #[test]
    fn test_endpoint_url_trailing_slash() {
        assert_eq!(
            endpoint_url("http://127.0.0.1:9222/", "json/list"),
            "http://127.0.0.1:9222/json/list"
        );
    }
}
