//! HTTP Client Factory
//!
//! Provides a factory function for building reqwest clients with proxy and
//! timeout settings taken from the provider configuration.

use std::time::Duration;

use crate::types::{LlmError, LlmResult, ProviderConfig};

/// Transport options shared by the HTTP-based providers.
#[derive(Debug, Clone, Default)]
pub struct HttpClientOptions {
    /// Proxy URL (`http://`, `https://` or `socks5://`)
    pub proxy_url: Option<String>,
    /// Whole-request timeout
    pub request_timeout: Option<Duration>,
}

impl HttpClientOptions {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            proxy_url: config.proxy_url.clone(),
            request_timeout: config.request_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Build a `reqwest::Client` with the resolved transport options.
///
/// - `proxy_url: Some(url)` -> route all traffic through the proxy
/// - `proxy_url: None` -> explicitly disable proxy (`no_proxy`), ignoring env vars
pub fn build_http_client(options: &HttpClientOptions) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    match options.proxy_url.as_deref() {
        Some(url) => {
            let proxy = reqwest::Proxy::all(url).map_err(|e| LlmError::InvalidRequest {
                message: format!("invalid proxy URL {}: {}", url, e),
            })?;
            builder = builder.proxy(proxy);
        }
        None => {
            builder = builder.no_proxy();
        }
    }
    if let Some(timeout) = options.request_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| LlmError::Other {
        message: format!("failed to build HTTP client: {}", e),
    })
}
