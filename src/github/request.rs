// API request description and cache key derivation.

use reqwest::Method;
use sha2::{Digest, Sha256};

/// One call against the API: method, endpoint (path plus encoded query) and
/// an optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            endpoint: path.into(),
            body: None,
        }
    }

    /// GET with query parameters appended in the given order.
    pub fn get_with_params(path: &str, params: &[(&str, String)]) -> Self {
        Self::get(with_query(path, params))
    }

    /// Deterministic cache key: `METHOD:base_url+endpoint`, plus a body
    /// digest when there is a body. The host keeps payloads from different
    /// API servers apart; the endpoint stays readable so substring
    /// invalidation can target it.
    pub fn cache_key(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match &self.body {
            Some(body) => {
                let digest = Sha256::digest(body.to_string().as_bytes());
                format!("{}:{}{}:{:x}", self.method, base, self.endpoint, digest)
            }
            None => format!("{}:{}{}", self.method, base, self.endpoint),
        }
    }
}

/// Append percent-encoded query parameters to `path`.
pub fn with_query(path: &str, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }

    let query = params
        .iter()
        .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", path, query)
}

/// Percent-encode a repository path segment by segment, keeping `/`.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
