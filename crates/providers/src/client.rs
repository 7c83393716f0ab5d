use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::{info, warn};

/// Effective proxy setting for the LLM endpoint.
#[derive(Debug, PartialEq)]
enum ProxyResolution {
    UseProxy(String),
    /// `proxy = ""` in the config: ignore environment proxies too.
    ForceDirectConnect,
    /// Not configured; reqwest reads HTTPS_PROXY / HTTP_PROXY itself.
    None,
}

fn resolve_proxy(proxy: Option<&str>) -> ProxyResolution {
    match proxy.map(str::trim) {
        Some("") => ProxyResolution::ForceDirectConnect,
        Some(p) => ProxyResolution::UseProxy(p.to_string()),
        None => ProxyResolution::None,
    }
}

/// Build the reqwest client used for chat-completion calls.
///
/// - `proxy`: `None` follows the environment, `Some("")` forces a direct
///   connection, anything else is used as the proxy URL
/// - `endpoint`: only used for logging
pub fn build_http_client(proxy: Option<&str>, endpoint: &str, timeout: Duration) -> Client {
    let mut builder = Client::builder().timeout(timeout);

    match resolve_proxy(proxy) {
        ProxyResolution::UseProxy(proxy_url) => match Proxy::all(&proxy_url) {
            Ok(p) => {
                info!(proxy = %proxy_url, endpoint = %endpoint, "LLM client using proxy");
                builder = builder.proxy(p);
            }
            Err(e) => {
                warn!(error = %e, proxy = %proxy_url, "Invalid proxy URL, falling back to direct connect");
            }
        },
        ProxyResolution::ForceDirectConnect => {
            info!(endpoint = %endpoint, "LLM client forced to direct connect (proxy disabled)");
            builder = builder.no_proxy();
        }
        ProxyResolution::None => {}
    }

    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client with proxy, using default");
        Client::new()
    })
}
