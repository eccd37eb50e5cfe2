// Random repository and document discovery.
// Ordered strategies pick a repository; a readme or random markdown file is
// picked from it; link trails hop to neighbouring documents.

pub mod links;
pub mod query;

use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::github::{FileContent, GitHubClient, Repository, TreeItem};

pub use links::{extract_markdown_links, is_markdown_path, resolve_relative};
pub use query::{SearchFilters, SearchSort};

/// Tunables for the discovery engine.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Attempts made by the user-anchored strategy before giving up.
    pub fallback_attempts: u32,
    pub fallback_delay: Duration,
    /// Search pages are drawn uniformly from `1..=max_search_page`.
    pub max_search_page: u32,
    pub search_per_page: u32,
    /// Users sampled per user-anchored attempt.
    pub user_sample: u32,
    /// Upper bound of the random starting user id.
    pub max_user_id: u64,
    pub user_repos_per_page: u32,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            fallback_attempts: 5,
            fallback_delay: Duration::from_secs(1),
            max_search_page: 10,
            search_per_page: 30,
            user_sample: 10,
            max_user_id: 1_000_000,
            user_repos_per_page: 100,
        }
    }
}

/// Repository selection strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    FilteredSearch,
    UserAnchored,
}

impl Strategy {
    pub const ORDER: [Strategy; 2] = [Strategy::FilteredSearch, Strategy::UserAnchored];
}

/// A repository and one markdown document from it.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub repository: Repository,
    pub document: FileContent,
}

/// Picks random repositories and documents through a [`GitHubClient`].
pub struct DiscoveryEngine<'a> {
    client: &'a GitHubClient,
    settings: DiscoverySettings,
    rng: StdRng,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(client: &'a GitHubClient, settings: DiscoverySettings) -> Self {
        Self {
            client,
            settings,
            rng: StdRng::from_entropy(),
        }
    }

    /// Engine with a fixed seed, for reproducible selection.
    pub fn with_seed(client: &'a GitHubClient, settings: DiscoverySettings, seed: u64) -> Self {
        Self {
            client,
            settings,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Pick a repository, then a markdown document from it.
    pub async fn discover(&mut self, filters: &SearchFilters) -> Result<Discovery> {
        let repository = self.random_repository(filters).await?;
        let document = self.random_markdown(&repository).await?;
        info!("Discovered {}:{}", repository.full_name(), document.path);

        Ok(Discovery {
            repository,
            document,
        })
    }

    /// Try each strategy in [`Strategy::ORDER`] until one yields a repository.
    pub async fn random_repository(&mut self, filters: &SearchFilters) -> Result<Repository> {
        let mut last_error = None;

        for strategy in Strategy::ORDER {
            let result = match strategy {
                Strategy::FilteredSearch => self.filtered_search(filters).await,
                Strategy::UserAnchored => self.user_anchored().await,
            };

            match result {
                Ok(repository) => {
                    debug!("{:?} picked {}", strategy, repository.full_name());
                    return Ok(repository);
                }
                Err(e) => {
                    debug!("{:?} failed: {}", strategy, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(Error::NoRepository { attempts: 0 }))
    }

    /// One random page of filtered search results, one random result.
    async fn filtered_search(&mut self, filters: &SearchFilters) -> Result<Repository> {
        let page = self.rng.gen_range(1..=self.settings.max_search_page.max(1));
        let results = self
            .client
            .search_repositories(
                &filters.query(),
                filters.sort.api_key(),
                page,
                self.settings.search_per_page,
            )
            .await?;

        results
            .items
            .choose(&mut self.rng)
            .cloned()
            .ok_or(Error::NoRepository { attempts: 1 })
    }

    /// Random user past a random id, then one of their repositories.
    ///
    /// Stops early on rate-limit errors: further attempts could not succeed
    /// before the cooldown or reset.
    async fn user_anchored(&mut self) -> Result<Repository> {
        let attempts = self.settings.fallback_attempts;

        for attempt in 1..=attempts {
            match self.user_anchored_once().await {
                Ok(repository) => return Ok(repository),
                Err(e) if e.is_recoverable() => return Err(e),
                Err(e) => debug!("User-anchored attempt {}/{} failed: {}", attempt, attempts, e),
            }

            if attempt < attempts {
                tokio::time::sleep(self.settings.fallback_delay).await;
            }
        }

        Err(Error::NoRepository { attempts })
    }

    async fn user_anchored_once(&mut self) -> Result<Repository> {
        let since = self.rng.gen_range(1..=self.settings.max_user_id.max(1));
        let users = self
            .client
            .search_users(since, self.settings.user_sample)
            .await?;
        let user = users
            .choose(&mut self.rng)
            .ok_or(Error::NoRepository { attempts: 1 })?;

        let repositories = self
            .client
            .get_user_repos(&user.login, 1, self.settings.user_repos_per_page)
            .await?;
        repositories
            .choose(&mut self.rng)
            .cloned()
            .ok_or(Error::NoRepository { attempts: 1 })
    }

    /// The repository's readme, or a random markdown file from its tree.
    pub async fn random_markdown(&mut self, repository: &Repository) -> Result<FileContent> {
        let owner = &repository.owner.login;
        let name = &repository.name;

        match self.client.get_readme(owner, name).await {
            Ok(readme) => return Ok(readme),
            Err(e) if e.is_recoverable() => return Err(e),
            Err(e) => debug!("No readme for {}: {}", repository.full_name(), e),
        }

        let tree = self
            .client
            .get_tree(owner, name, &repository.default_branch)
            .await?;
        let candidates: Vec<&TreeItem> = tree
            .tree
            .iter()
            .filter(|item| item.is_blob() && is_markdown_path(&item.path))
            .collect();

        let Some(item) = candidates.choose(&mut self.rng) else {
            return Err(Error::NoMarkdown {
                owner: owner.clone(),
                repo: name.clone(),
            });
        };

        self.client
            .get_content(owner, name, &item.path, Some(&repository.default_branch))
            .await
    }

    /// Follow a random relative markdown link found in `content`, the
    /// decoded text of the document at `current_path`.
    ///
    /// Returns `None` when there is no usable link or the fetch fails.
    pub async fn follow_link(
        &mut self,
        owner: &str,
        repo: &str,
        ref_name: Option<&str>,
        current_path: &str,
        content: &str,
    ) -> Option<FileContent> {
        let candidates: Vec<String> = extract_markdown_links(content)
            .iter()
            .filter_map(|link| resolve_relative(current_path, link))
            .filter(|path| path != current_path.trim_start_matches('/'))
            .collect();

        let next = candidates.choose(&mut self.rng)?;
        debug!("Following link from {} to {}", current_path, next);

        match self.client.get_content(owner, repo, next, ref_name).await {
            Ok(document) => Some(document),
            Err(e) => {
                debug!("Link target {} unavailable: {}", next, e);
                None
            }
        }
    }
}
