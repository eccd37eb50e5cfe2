// GitHub API HTTP client.
// Handles authentication, quota tracking, caching, conditional requests and retries.

use std::future::Future;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use reqwest::{
    Client, Response, StatusCode,
    header::{
        ACCEPT, AUTHORIZATION, ETAG, HeaderMap, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH,
        LAST_MODIFIED, RETRY_AFTER, USER_AGENT,
    },
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::cache::{CacheRecord, CacheStore, ConditionalHeaders, Validators};
use crate::config::ClientConfig;
use crate::error::{Error, Result};

use super::request::ApiRequest;
use super::types::RateLimitState;

const GITHUB_API_VERSION: &str = "2022-11-28";

/// GitHub API client with caching and per-instance rate limit tracking.
pub struct GitHubClient {
    client: Client,
    config: ClientConfig,
    cache: CacheStore,
    rate_limit: RwLock<RateLimitState>,
}

impl GitHubClient {
    /// Create a new client. The token, if any, is baked into the default
    /// headers here and never read again.
    pub fn new(config: ClientConfig, cache: CacheStore) -> Result<Self> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
                .map_err(|_| Error::Config("API token contains invalid characters".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|_| Error::Config("Invalid user agent".to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            cache,
            rate_limit: RwLock::new(RateLimitState::default()),
        })
    }

    /// Latest quota snapshot parsed from response headers.
    pub fn rate_limit(&self) -> RateLimitState {
        *self
            .rate_limit
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Drop cached responses whose key contains `pattern`.
    pub fn invalidate(&self, pattern: &str) -> usize {
        self.cache.invalidate(pattern)
    }

    /// Key under which `request` is cached for this client's API server.
    pub fn cache_key(&self, request: &ApiRequest) -> String {
        request.cache_key(&self.config.api_base_url)
    }

    /// Execute `request`, serving from cache where possible.
    pub async fn fetch<T>(&self, request: &ApiRequest) -> Result<T>
    where
        T: DeserializeOwned + Serialize + Clone,
    {
        let key = self.cache_key(request);
        let cached = self.cache.lookup::<T>(&key);

        if let Some(record) = &cached
            && !record.is_expired()
        {
            debug!("Cache hit: {}", key);
            return Ok(record.data.clone());
        }

        let state = self.rate_limit();
        if state.is_exhausted_at(now_secs()) {
            return match cached {
                Some(record) => {
                    debug!("Quota exhausted, serving cached {}", key);
                    Ok(record.data)
                }
                None => Err(Error::RateLimited {
                    reset_epoch: state.reset,
                }),
            };
        }

        let key = key.as_str();
        let stale = cached.as_ref();
        self.with_retry(request, move || self.execute(request, key, stale))
            .await
    }

    /// Execute `request` without the cache or the quota gate. Status mapping
    /// and retries are the same as for [`GitHubClient::fetch`].
    pub(crate) async fn fetch_uncached<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T> {
        self.with_retry(request, move || self.execute_uncached(request))
            .await
    }

    /// Run `call` until it succeeds or the retry policy gives up.
    async fn with_retry<T, F, Fut>(&self, request: &ApiRequest, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) => match self.config.retry.delay_for(attempt, &e) {
                    Some(delay) => {
                        warn!(
                            "Request {} failed (attempt {}): {}. Retrying in {:?}",
                            request.endpoint, attempt, e, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    /// One cached round trip for `request`.
    async fn execute<T>(
        &self,
        request: &ApiRequest,
        key: &str,
        stale: Option<&CacheRecord<T>>,
    ) -> Result<T>
    where
        T: DeserializeOwned + Serialize + Clone,
    {
        // Validators are only worth sending when there is a payload to
        // fall back on for a 304.
        let conditional = match stale {
            Some(_) => self.cache.conditional_headers(key),
            None => ConditionalHeaders::default(),
        };

        let response = self.send(request, &conditional).await?;
        let etag = header_string(response.headers(), ETAG);
        let last_modified = header_string(response.headers(), LAST_MODIFIED);

        match classify(response).await? {
            Disposition::Success(response) => {
                let value: T = decode(response).await?;
                self.cache.set_validated(
                    key,
                    &value,
                    self.config.default_ttl,
                    Validators {
                        etag: etag.as_deref(),
                        last_modified: last_modified.as_deref(),
                    },
                );
                Ok(value)
            }
            Disposition::NotModified => {
                let Some(record) = stale else {
                    return Err(not_modified_without_payload());
                };
                debug!("Not modified, refreshing cached {}", key);

                self.cache.set_validated(
                    key,
                    &record.data,
                    self.config.default_ttl,
                    Validators {
                        etag: etag.as_deref().or(record.etag.as_deref()),
                        last_modified: last_modified
                            .as_deref()
                            .or(record.last_modified.as_deref()),
                    },
                );
                Ok(record.data.clone())
            }
            Disposition::QuotaExhausted => match stale {
                Some(record) => {
                    warn!("Rate limited, serving cached {}", key);
                    Ok(record.data.clone())
                }
                None => Err(Error::RateLimited {
                    reset_epoch: self.rate_limit().reset,
                }),
            },
        }
    }

    /// One round trip for `request` with no cache involvement.
    async fn execute_uncached<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let response = self.send(request, &ConditionalHeaders::default()).await?;

        match classify(response).await? {
            Disposition::Success(response) => decode(response).await,
            Disposition::NotModified => Err(not_modified_without_payload()),
            Disposition::QuotaExhausted => Err(Error::RateLimited {
                reset_epoch: self.rate_limit().reset,
            }),
        }
    }

    /// Issue the request and record the quota headers of whatever comes back.
    async fn send(
        &self,
        request: &ApiRequest,
        conditional: &ConditionalHeaders,
    ) -> Result<Response> {
        debug!("GitHub API request: {} {}", request.method, request.endpoint);

        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.endpoint));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(etag) = &conditional.if_none_match {
            builder = builder.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &conditional.if_modified_since {
            builder = builder.header(IF_MODIFIED_SINCE, last_modified);
        }

        let response = builder.send().await?;
        self.update_rate_limit(response.headers());
        Ok(response)
    }

    /// Replace the quota snapshot if the response carries quota headers.
    fn update_rate_limit(&self, headers: &HeaderMap) {
        if let Some(state) = parse_rate_limit(headers) {
            debug!(
                "Rate limit updated: {}/{} (resets at {})",
                state.remaining, state.limit, state.reset
            );
            *self
                .rate_limit
                .write()
                .unwrap_or_else(PoisonError::into_inner) = state;
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.api_base_url, endpoint)
    }
}

/// What a non-error response means for the caller.
enum Disposition {
    Success(Response),
    NotModified,
    /// 403/429 without Retry-After: the primary quota ran out.
    QuotaExhausted,
}

/// Map a response status onto the error taxonomy.
///
/// Retry-After presence is what separates the abuse cooldown from plain
/// quota exhaustion on 403 and 429. A Retry-After that cannot be parsed
/// still marks a cooldown, of zero seconds.
async fn classify(response: Response) -> Result<Disposition> {
    let status = response.status();
    match status {
        s if s.is_success() => Ok(Disposition::Success(response)),
        StatusCode::NOT_MODIFIED => Ok(Disposition::NotModified),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            match retry_after_secs(response.headers()) {
                Some(retry_after_secs) => {
                    warn!("Secondary rate limit, retry after {}s", retry_after_secs);
                    Err(Error::SecondaryRateLimited { retry_after_secs })
                }
                None => Ok(Disposition::QuotaExhausted),
            }
        }
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(Error::network(Some(status.as_u16()), error_message(status, &body)))
        }
    }
}

/// Decode a 2xx body. Failures keep the status so they are not retried.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| Error::network(Some(status), format!("Invalid response body: {}", e)))
}

fn not_modified_without_payload() -> Error {
    Error::network(Some(304), "Not Modified without a cached payload")
}

/// Parse the `x-ratelimit-*` headers into a full snapshot.
fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitState> {
    let limit = header_u64(headers, "x-ratelimit-limit")?;
    let remaining = header_u64(headers, "x-ratelimit-remaining")?;
    let reset = header_u64(headers, "x-ratelimit-reset")?;
    let used =
        header_u64(headers, "x-ratelimit-used").unwrap_or_else(|| limit.saturating_sub(remaining));

    Some(RateLimitState {
        limit,
        remaining,
        reset,
        used,
    })
}

/// Retry-After as seconds; accepts delta-seconds or an HTTP date. `None`
/// only when the header is absent; an unparsable value counts as zero.
fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    let value = header_string(headers, RETRY_AFTER)?;
    let value = value.trim();

    if let Ok(secs) = value.parse() {
        return Some(secs);
    }

    match DateTime::parse_from_rfc2822(value) {
        Ok(at) => {
            let delta = at.with_timezone(&Utc).signed_duration_since(Utc::now());
            Some(u64::try_from(delta.num_seconds()).unwrap_or(0))
        }
        Err(_) => {
            debug!("Unparsable Retry-After {:?}, treating as 0s", value);
            Some(0)
        }
    }
}

fn header_string(headers: &HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Prefer the API's `message` field over the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unexpected status").to_string())
}

fn now_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}
