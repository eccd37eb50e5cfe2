// Integration tests for the GitHub client against a local mock server.

use std::net::TcpListener;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use mdroulette::{
    CacheStore, Error, GitHubClient,
    config::ClientConfig,
    github::{ApiRequest, ContentKind, Repository, RetryPolicy},
};
use mockito::{Matcher, Server, ServerGuard};
use tempfile::TempDir;

const REPO_JSON: &str = r#"{
    "id": 1,
    "name": "docs",
    "owner": {"login": "octo", "id": 7, "type": "User"},
    "description": "Documentation",
    "default_branch": "main",
    "stargazers_count": 42,
    "forks_count": 3,
    "language": "Rust",
    "pushed_at": "2024-05-01T00:00:00Z",
    "html_url": "https://github.com/octo/docs"
}"#;

fn client_with(server: &ServerGuard, dir: &TempDir, ttl: Duration) -> GitHubClient {
    let config = ClientConfig::default()
        .with_base_url(server.url())
        .with_default_ttl(ttl)
        .with_retry(RetryPolicy {
            max_retries: 2,
            delay: Duration::ZERO,
        });
    GitHubClient::new(config, CacheStore::open(dir.path())).unwrap()
}

fn client(server: &ServerGuard, dir: &TempDir) -> GitHubClient {
    client_with(server, dir, Duration::from_secs(3600))
}

fn future_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 3600
}

#[tokio::test]
async fn test_cache_hit_skips_network() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let mock = server
        .mock("GET", "/repos/octo/docs")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(REPO_JSON)
        .expect(1)
        .create_async()
        .await;

    let client = client(&server, &dir);
    let first = client.get_repository("octo", "docs").await.unwrap();
    let second = client.get_repository("octo", "docs").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.stars, 42);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_headers_update_state() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let _mock = server
        .mock("GET", "/repos/octo/docs")
        .with_status(200)
        .with_header("x-ratelimit-limit", "60")
        .with_header("x-ratelimit-remaining", "59")
        .with_header("x-ratelimit-reset", "1900000000")
        .with_header("x-ratelimit-used", "1")
        .with_body(REPO_JSON)
        .create_async()
        .await;

    let client = client(&server, &dir);
    client.get_repository("octo", "docs").await.unwrap();

    let state = client.rate_limit();
    assert_eq!(state.limit, 60);
    assert_eq!(state.remaining, 59);
    assert_eq!(state.reset, 1_900_000_000);
    assert_eq!(state.used, 1);
}

#[tokio::test]
async fn test_exhausted_quota_blocks_uncached_request() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let reset = future_epoch();

    let _first = server
        .mock("GET", "/repos/octo/docs")
        .with_status(200)
        .with_header("x-ratelimit-limit", "60")
        .with_header("x-ratelimit-remaining", "0")
        .with_header("x-ratelimit-reset", &reset.to_string())
        .with_body(REPO_JSON)
        .create_async()
        .await;
    let blocked = server
        .mock("GET", "/repos/octo/other")
        .with_status(200)
        .with_body(REPO_JSON)
        .expect(0)
        .create_async()
        .await;

    let client = client(&server, &dir);
    client.get_repository("octo", "docs").await.unwrap();

    match client.get_repository("octo", "other").await {
        Err(Error::RateLimited { reset_epoch }) => assert_eq!(reset_epoch, reset),
        other => panic!("expected RateLimited, got {:?}", other),
    }
    blocked.assert_async().await;

    // Fresh cached data is still served while the quota is exhausted.
    assert!(client.get_repository("octo", "docs").await.is_ok());
}

#[tokio::test]
async fn test_forbidden_with_retry_after_is_secondary() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let mock = server
        .mock("GET", "/repos/octo/docs")
        .with_status(403)
        .with_header("retry-after", "60")
        .with_body(r#"{"message":"You have exceeded a secondary rate limit"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client(&server, &dir);
    match client.get_repository("octo", "docs").await {
        Err(Error::SecondaryRateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 60),
        other => panic!("expected SecondaryRateLimited, got {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_too_many_requests_with_retry_after_is_secondary() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let _mock = server
        .mock("GET", "/repos/octo/docs")
        .with_status(429)
        .with_header("retry-after", "17")
        .create_async()
        .await;

    let client = client(&server, &dir);
    let err = client.get_repository("octo", "docs").await.unwrap_err();
    assert!(matches!(
        err,
        Error::SecondaryRateLimited {
            retry_after_secs: 17
        }
    ));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_forbidden_without_retry_after_serves_stale_cache() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let _mock = server
        .mock("GET", "/repos/octo/docs")
        .with_status(403)
        .with_header("x-ratelimit-limit", "60")
        .with_header("x-ratelimit-remaining", "0")
        .with_header("x-ratelimit-reset", "1900000000")
        .with_body(r#"{"message":"API rate limit exceeded"}"#)
        .create_async()
        .await;

    let client = client(&server, &dir);
    let cached: Repository = serde_json::from_str(REPO_JSON).unwrap();
    let key = client.cache_key(&ApiRequest::get("/repos/octo/docs"));
    client.cache().set(&key, &cached, Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let served = client.get_repository("octo", "docs").await.unwrap();
    assert_eq!(served, cached);
}

#[tokio::test]
async fn test_forbidden_without_retry_after_or_cache_is_rate_limited() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let _mock = server
        .mock("GET", "/repos/octo/docs")
        .with_status(403)
        .with_header("x-ratelimit-limit", "60")
        .with_header("x-ratelimit-remaining", "0")
        .with_header("x-ratelimit-reset", "1900000000")
        .create_async()
        .await;

    let client = client(&server, &dir);
    match client.get_repository("octo", "docs").await {
        Err(Error::RateLimited { reset_epoch }) => assert_eq!(reset_epoch, 1_900_000_000),
        other => panic!("expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_retried_then_surfaced() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let mock = server
        .mock("GET", "/repos/octo/docs")
        .with_status(500)
        .expect(3)
        .create_async()
        .await;

    let client = client(&server, &dir);
    let err = client.get_repository("octo", "docs").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let mock = server
        .mock("GET", "/repos/octo/missing")
        .with_status(404)
        .with_body(r#"{"message":"Not Found"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client(&server, &dir);
    let err = client.get_repository("octo", "missing").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Network {
            status: Some(404),
            ..
        }
    ));
    assert!(err.to_string().contains("Not Found"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_etag_revalidation_serves_cached_body() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let first = server
        .mock("GET", "/repos/octo/docs")
        .with_status(200)
        .with_header("etag", "\"abc\"")
        .with_body(REPO_JSON)
        .expect(1)
        .create_async()
        .await;

    let client = client_with(&server, &dir, Duration::ZERO);
    let original = client.get_repository("octo", "docs").await.unwrap();
    first.assert_async().await;
    first.remove_async().await;

    let revalidated = server
        .mock("GET", "/repos/octo/docs")
        .match_header("if-none-match", "\"abc\"")
        .with_status(304)
        .expect(1)
        .create_async()
        .await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    let again = client.get_repository("octo", "docs").await.unwrap();

    assert_eq!(original, again);
    revalidated.assert_async().await;
}

#[tokio::test]
async fn test_search_query_is_encoded() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let mock = server
        .mock("GET", "/search/repositories")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "stars:>=1 language:Rust".into()),
            Matcher::UrlEncoded("sort".into(), "stars".into()),
            Matcher::UrlEncoded("page".into(), "2".into()),
        ]))
        .with_status(200)
        .with_body(format!(
            r#"{{"total_count": 1, "incomplete_results": false, "items": [{}]}}"#,
            REPO_JSON
        ))
        .expect(1)
        .create_async()
        .await;

    let client = client(&server, &dir);
    let results = client
        .search_repositories("stars:>=1 language:Rust", Some("stars"), 2, 30)
        .await
        .unwrap();

    assert_eq!(results.total_count, 1);
    assert_eq!(results.items[0].full_name(), "octo/docs");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_list_directory_at_ref() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let mock = server
        .mock("GET", "/repos/octo/docs/contents/guides")
        .match_query(Matcher::UrlEncoded("ref".into(), "v1".into()))
        .with_status(200)
        .with_body(
            r#"[
                {"name": "intro.md", "path": "guides/intro.md", "sha": "a", "size": 10, "type": "file"},
                {"name": "img", "path": "guides/img", "sha": "b", "size": 0, "type": "dir"}
            ]"#,
        )
        .expect(1)
        .create_async()
        .await;

    let client = client(&server, &dir);
    let entries = client
        .list_directory("octo", "docs", "guides", Some("v1"))
        .await
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, ContentKind::File);
    assert_eq!(entries[1].kind, ContentKind::Dir);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_probe_rate_limit_bypasses_cache() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let mock = server
        .mock("GET", "/rate_limit")
        .with_status(200)
        .with_header("x-ratelimit-limit", "5000")
        .with_header("x-ratelimit-remaining", "4990")
        .with_header("x-ratelimit-reset", "1900000000")
        .with_body(
            r#"{"resources": {}, "rate": {"limit": 5000, "remaining": 4990, "reset": 1900000000, "used": 10}}"#,
        )
        .expect(2)
        .create_async()
        .await;

    let client = client(&server, &dir);
    let state = client.probe_rate_limit().await.unwrap();
    client.probe_rate_limit().await.unwrap();

    assert_eq!(state.remaining, 4990);
    assert_eq!(state.used, 10);
    assert_eq!(client.rate_limit().limit, 5000);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_invalid_body_is_not_retried() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let mock = server
        .mock("GET", "/repos/octo/docs")
        .with_status(200)
        .with_body("not json")
        .expect(1)
        .create_async()
        .await;

    let client = client(&server, &dir);
    let err = client.get_repository("octo", "docs").await.unwrap_err();
    assert_eq!(err.status(), Some(200));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_forbidden_with_unparsable_retry_after_is_secondary() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let mock = server
        .mock("GET", "/repos/octo/docs")
        .with_status(403)
        .with_header("retry-after", "garbage")
        .expect(1)
        .create_async()
        .await;

    let client = client(&server, &dir);
    let err = client.get_repository("octo", "docs").await.unwrap_err();
    assert!(matches!(
        err,
        Error::SecondaryRateLimited {
            retry_after_secs: 0
        }
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_secondary_limit_is_raised_despite_stale_cache() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let first = server
        .mock("GET", "/repos/octo/docs")
        .with_status(200)
        .with_body(REPO_JSON)
        .expect(1)
        .create_async()
        .await;

    let client = client_with(&server, &dir, Duration::ZERO);
    client.get_repository("octo", "docs").await.unwrap();
    first.assert_async().await;
    first.remove_async().await;

    let limited = server
        .mock("GET", "/repos/octo/docs")
        .with_status(403)
        .with_header("retry-after", "5")
        .expect(1)
        .create_async()
        .await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    let err = client.get_repository("octo", "docs").await.unwrap_err();
    assert!(matches!(
        err,
        Error::SecondaryRateLimited {
            retry_after_secs: 5
        }
    ));
    limited.assert_async().await;
}

#[tokio::test]
async fn test_exhausted_quota_serves_expired_cache_without_network() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let reset = future_epoch();
    let mock = server
        .mock("GET", "/repos/octo/docs")
        .with_status(200)
        .with_header("x-ratelimit-limit", "60")
        .with_header("x-ratelimit-remaining", "0")
        .with_header("x-ratelimit-reset", &reset.to_string())
        .with_body(REPO_JSON)
        .expect(1)
        .create_async()
        .await;

    let client = client_with(&server, &dir, Duration::ZERO);
    let original = client.get_repository("octo", "docs").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let served = client.get_repository("octo", "docs").await.unwrap();
    assert_eq!(original, served);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_last_modified_revalidation_serves_cached_body() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let stamp = "Wed, 01 May 2024 00:00:00 GMT";
    let first = server
        .mock("GET", "/repos/octo/docs")
        .with_status(200)
        .with_header("last-modified", stamp)
        .with_body(REPO_JSON)
        .expect(1)
        .create_async()
        .await;

    let client = client_with(&server, &dir, Duration::ZERO);
    let original = client.get_repository("octo", "docs").await.unwrap();
    first.assert_async().await;
    first.remove_async().await;

    let revalidated = server
        .mock("GET", "/repos/octo/docs")
        .match_header("if-modified-since", stamp)
        .with_status(304)
        .expect(1)
        .create_async()
        .await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    let again = client.get_repository("octo", "docs").await.unwrap();

    assert_eq!(original, again);
    revalidated.assert_async().await;

    let key = client.cache_key(&ApiRequest::get("/repos/octo/docs"));
    let headers = client.cache().conditional_headers(&key);
    assert_eq!(headers.if_modified_since.as_deref(), Some(stamp));
}

#[tokio::test]
async fn test_request_timeout_is_retried() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let mock = server
        .mock("GET", "/repos/octo/docs")
        .with_status(408)
        .expect(3)
        .create_async()
        .await;

    let client = client(&server, &dir);
    let err = client.get_repository("octo", "docs").await.unwrap_err();
    assert_eq!(err.status(), Some(408));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_transport_failure_is_retried() {
    let dir = TempDir::new().unwrap();
    // Bind and release a port so nothing is listening on it.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = ClientConfig::default()
        .with_base_url(format!("http://127.0.0.1:{}", port))
        .with_retry(RetryPolicy {
            max_retries: 2,
            delay: Duration::from_millis(50),
        });
    let client = GitHubClient::new(config, CacheStore::open(dir.path())).unwrap();

    let started = Instant::now();
    let err = client.get_repository("octo", "docs").await.unwrap_err();

    assert!(matches!(err, Error::Network { status: None, .. }));
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_cache_is_separate_per_api_host() {
    let mut first_server = Server::new_async().await;
    let mut second_server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let _first = first_server
        .mock("GET", "/repos/octo/docs")
        .with_status(200)
        .with_body(REPO_JSON)
        .create_async()
        .await;
    let second = second_server
        .mock("GET", "/repos/octo/docs")
        .with_status(200)
        .with_body(REPO_JSON.replace("\"stargazers_count\": 42", "\"stargazers_count\": 7"))
        .expect(1)
        .create_async()
        .await;

    let first_client = client(&first_server, &dir);
    let second_client = client(&second_server, &dir);

    assert_eq!(first_client.get_repository("octo", "docs").await.unwrap().stars, 42);
    assert_eq!(second_client.get_repository("octo", "docs").await.unwrap().stars, 7);
    second.assert_async().await;
}

#[tokio::test]
async fn test_probe_rate_limit_secondary_limit() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let mock = server
        .mock("GET", "/rate_limit")
        .with_status(429)
        .with_header("retry-after", "30")
        .expect(1)
        .create_async()
        .await;

    let client = client(&server, &dir);
    let err = client.probe_rate_limit().await.unwrap_err();
    assert!(matches!(
        err,
        Error::SecondaryRateLimited {
            retry_after_secs: 30
        }
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_probe_rate_limit_retries_server_errors() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let mock = server
        .mock("GET", "/rate_limit")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let client = client(&server, &dir);
    let err = client.probe_rate_limit().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    mock.assert_async().await;
}
