use std::path::PathBuf;

use clap::Parser;
use mdroulette::{
    CacheStore, Config, DiscoveryEngine, GitHubClient, Result,
    cache::ReadingHistoryEntry,
    cli::{CacheAction, Cli, Commands},
    discovery::{SearchFilters, SearchSort},
    github::FileContent,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mdroulette=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(url) = cli.api_url {
        config.client = config.client.with_base_url(url);
    }
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = Some(dir);
    }
    config.validate()?;

    let cache = open_cache(&config);

    match cli.command {
        Commands::Discover {
            language,
            min_stars,
            years,
            sort,
            docs,
        } => {
            let client = GitHubClient::new(config.client.clone(), cache)?;
            discover(&client, &config, language, min_stars, years, sort, docs).await?;
        }
        Commands::Next {
            owner,
            repo,
            path,
            ref_name,
            file,
        } => {
            let client = GitHubClient::new(config.client.clone(), cache)?;
            next(&client, &config, &owner, &repo, &path, ref_name, file).await?;
        }
        Commands::RateLimit => {
            let client = GitHubClient::new(config.client.clone(), cache)?;
            let state = client.probe_rate_limit().await?;
            println!("Limit:     {}", state.limit);
            println!("Remaining: {}", state.remaining);
            println!("Used:      {}", state.used);
            match state.reset_at() {
                Some(at) => println!("Resets at: {}", at.to_rfc3339()),
                None => println!("Resets at: {}", state.reset),
            }
        }
        Commands::History { clear } => {
            if clear {
                cache.clear_reading_history();
                println!("Reading history cleared");
            } else {
                for entry in cache.reading_history() {
                    println!(
                        "{}/{}:{}@{}  {}",
                        entry.owner, entry.repo, entry.path, entry.ref_name, entry.title
                    );
                }
            }
        }
        Commands::Cache { action } => match action {
            CacheAction::Clear => {
                let removed = cache.clear();
                println!("Removed {} cached responses", removed);
            }
            CacheAction::Invalidate { pattern } => {
                let removed = cache.invalidate(&pattern);
                println!("Removed {} cached responses matching {}", removed, pattern);
            }
            CacheAction::Stats => {
                let stats = cache.stats();
                println!("Location:   {}", cache.root().display());
                println!("Entries:    {}", stats.entries);
                println!("Fast tier:  {} bytes", stats.fast_bytes);
                println!("Bulk tier:  {} bytes", stats.bulk_bytes);
            }
        },
    }

    Ok(())
}

/// Cache at the configured directory, the platform cache directory, or a
/// throwaway directory under the system temp dir.
fn open_cache(config: &Config) -> CacheStore {
    if let Some(dir) = &config.cache_dir {
        return CacheStore::open(dir.clone());
    }

    CacheStore::open_default().unwrap_or_else(|| {
        let fallback = std::env::temp_dir().join("mdroulette");
        warn!(
            "No platform cache directory, using {}",
            fallback.display()
        );
        CacheStore::open(fallback)
    })
}

async fn discover(
    client: &GitHubClient,
    config: &Config,
    language: Option<String>,
    min_stars: u64,
    years: u32,
    sort: SearchSort,
    docs: bool,
) -> Result<()> {
    let mut filters = SearchFilters::recent(years.saturating_mul(12))
        .with_min_stars(min_stars)
        .with_sort(sort)
        .with_docs(docs);
    if let Some(language) = language {
        filters = filters.with_language(language);
    }

    let mut engine = DiscoveryEngine::new(client, config.discovery.clone());
    let found = engine.discover(&filters).await?;
    let repository = &found.repository;

    println!("Repository: {}", repository.full_name());
    if let Some(description) = &repository.description {
        println!("            {}", description);
    }
    println!("Stars:      {}", repository.stars);
    print_document(&found.document);

    client.cache().record_reading(ReadingHistoryEntry::new(
        &repository.owner.login,
        &repository.name,
        &found.document.path,
        &repository.default_branch,
        &found.document.name,
    ));
    Ok(())
}

async fn next(
    client: &GitHubClient,
    config: &Config,
    owner: &str,
    repo: &str,
    path: &str,
    ref_name: Option<String>,
    file: PathBuf,
) -> Result<()> {
    let content = tokio::fs::read_to_string(&file).await?;

    let mut engine = DiscoveryEngine::new(client, config.discovery.clone());
    let Some(document) = engine
        .follow_link(owner, repo, ref_name.as_deref(), path, &content)
        .await
    else {
        info!("No followable link in {}", path);
        println!("No next document");
        return Ok(());
    };

    println!("Repository: {}/{}", owner, repo);
    print_document(&document);

    client.cache().record_reading(ReadingHistoryEntry::new(
        owner,
        repo,
        &document.path,
        ref_name.as_deref().unwrap_or("HEAD"),
        &document.name,
    ));
    Ok(())
}

fn print_document(document: &FileContent) {
    println!("Document:   {}", document.path);
    if let Some(url) = &document.html_url {
        println!("URL:        {}", url);
    }
    println!();

    match document.text() {
        Some(text) => println!("{}", text),
        None => warn!("Could not decode {}", document.path),
    }
}
