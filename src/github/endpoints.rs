// GitHub API endpoint functions.
// Provides typed methods for fetching repositories, documents, trees and users.

use crate::error::Result;

use super::client::GitHubClient;
use super::request::{ApiRequest, encode_path};
use super::types::{
    ContentEntry, FileContent, Owner, RateLimitResponse, RateLimitState, Repository,
    SearchResponse, Tree,
};

impl GitHubClient {
    /// Get a specific repository.
    pub async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository> {
        self.fetch(&ApiRequest::get(format!("/repos/{}/{}", owner, repo)))
            .await
    }

    /// Get the repository's designated readme.
    pub async fn get_readme(&self, owner: &str, repo: &str) -> Result<FileContent> {
        self.fetch(&ApiRequest::get(format!("/repos/{}/{}/readme", owner, repo)))
            .await
    }

    /// Get a single file, optionally pinned to a branch, tag or commit.
    pub async fn get_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_name: Option<&str>,
    ) -> Result<FileContent> {
        self.fetch(&contents_request(owner, repo, path, ref_name))
            .await
    }

    /// List a directory. An empty `path` lists the repository root.
    pub async fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_name: Option<&str>,
    ) -> Result<Vec<ContentEntry>> {
        self.fetch(&contents_request(owner, repo, path, ref_name))
            .await
    }

    /// Get the full recursive tree at `ref_name` in one call.
    pub async fn get_tree(&self, owner: &str, repo: &str, ref_name: &str) -> Result<Tree> {
        let request = ApiRequest::get_with_params(
            &format!("/repos/{}/{}/git/trees/{}", owner, repo, encode_path(ref_name)),
            &[("recursive", "1".to_string())],
        );
        self.fetch(&request).await
    }

    /// Search repositories. `sort` is one of the API's sort keys
    /// (`stars`, `forks`, `updated`); `None` keeps best-match order.
    pub async fn search_repositories(
        &self,
        query: &str,
        sort: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<SearchResponse<Repository>> {
        let mut params = vec![("q", query.to_string())];
        if let Some(sort) = sort {
            params.push(("sort", sort.to_string()));
            params.push(("order", "desc".to_string()));
        }
        params.push(("page", page.to_string()));
        params.push(("per_page", per_page.to_string()));

        self.fetch(&ApiRequest::get_with_params("/search/repositories", &params))
            .await
    }

    /// Users whose id is greater than `since`, in id order.
    pub async fn search_users(&self, since: u64, per_page: u32) -> Result<Vec<Owner>> {
        let params = [
            ("since", since.to_string()),
            ("per_page", per_page.to_string()),
        ];
        self.fetch(&ApiRequest::get_with_params("/users", &params))
            .await
    }

    /// Public repositories owned by `login`.
    pub async fn get_user_repos(
        &self,
        login: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Repository>> {
        let params = [
            ("type", "owner".to_string()),
            ("sort", "pushed".to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        self.fetch(&ApiRequest::get_with_params(
            &format!("/users/{}/repos", login),
            &params,
        ))
        .await
    }

    /// Ask the API for the current quota. Always hits the network and does
    /// not count against the quota.
    pub async fn probe_rate_limit(&self) -> Result<RateLimitState> {
        let response: RateLimitResponse = self
            .fetch_uncached(&ApiRequest::get("/rate_limit"))
            .await?;
        Ok(response.rate)
    }
}

fn contents_request(owner: &str, repo: &str, path: &str, ref_name: Option<&str>) -> ApiRequest {
    let path = path.trim_matches('/');
    let endpoint = if path.is_empty() {
        format!("/repos/{}/{}/contents", owner, repo)
    } else {
        format!("/repos/{}/{}/contents/{}", owner, repo, encode_path(path))
    };

    match ref_name {
        Some(r) => ApiRequest::get_with_params(&endpoint, &[("ref", r.to_string())]),
        None => ApiRequest::get(endpoint),
    }
}
