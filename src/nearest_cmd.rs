//! `splice nearest` and `splice cache`: nearest-file retrieval over the
//! configured corpus, and maintenance of its embedding cache.

use anyhow::Result;
use std::collections::HashSet;

use context_splice_core::cache::EmbeddingCache;
use context_splice_core::corpus::CorpusProvider;
use context_splice_core::nearest::{build_context, NearestFileIndex};
use context_splice_core::store::{KeyValueStore, MemoryStore};

use crate::config::Config;
use crate::corpus_fs::FsCorpus;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate, providers};

/// Open the SQLite key-value store, creating its schema if needed.
pub async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    Ok(SqliteStore::new(pool))
}

/// Find the files nearest to `query` and print them.
///
/// Prints the budgeted context string, or with `list` one
/// `distance  path` line per file.
pub async fn run_nearest(
    config: &Config,
    query: &str,
    k: Option<usize>,
    exclude: Option<&str>,
    list: bool,
) -> Result<()> {
    let provider = providers::create_provider(&config.embedding)?;
    // Fail before touching the database or the filesystem.
    provider.check_credentials()?;

    // An unusable cache database degrades to a run without persistence.
    let sqlite = match open_store(config).await {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::warn!(
                path = %config.db.path.display(),
                error = %e,
                "cache database unavailable, using an in-memory cache"
            );
            None
        }
    };
    let memory = MemoryStore::new();
    let store: &dyn KeyValueStore = match &sqlite {
        Some(store) => store,
        None => &memory,
    };

    let files = FsCorpus::new(config.corpus.clone()).files().await?;
    let params = config.nearest_params();
    let max_chars = params.max_context_chars;
    let exclude = exclude.map(normalize_exclude);

    let index = NearestFileIndex::new(provider.as_ref(), store, config.namespace())
        .with_params(params);
    let result = index
        .find_nearest_files(query, &files, k, exclude.as_deref())
        .await?;

    tracing::info!(
        corpus = files.len(),
        reused = result.stats.reused,
        embedded = result.stats.embedded,
        failed = result.stats.failed,
        "nearest files"
    );

    if list {
        for file in &result.files {
            println!("{:>10.4}  {}", file.distance, file.path);
        }
    } else {
        print!("{}", build_context(&result.files, max_chars));
    }

    if let Some(store) = sqlite {
        store.pool().close().await;
    }
    Ok(())
}

/// Bring a user-supplied path into the corpus form: root-relative,
/// `/`-separated, no leading `./`.
fn normalize_exclude(path: &str) -> String {
    let mut path = path.replace('\\', "/");
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    path
}

/// Print how many files the workspace cache holds.
pub async fn run_cache_stats(config: &Config) -> Result<()> {
    let provider = providers::create_provider(&config.embedding)?;
    let store = open_store(config).await?;
    let namespace = config.namespace();

    let cache = EmbeddingCache::load(&store, &namespace, provider.model_name()).await;

    println!("cache stats");
    println!("  namespace: {}", namespace);
    println!("  model: {}", cache.model());
    println!("  entries: {}", cache.len());

    store.pool().close().await;
    Ok(())
}

/// Drop cache entries for files that are no longer in the corpus.
pub async fn run_cache_prune(config: &Config) -> Result<()> {
    let provider = providers::create_provider(&config.embedding)?;
    let store = open_store(config).await?;
    let namespace = config.namespace();

    let files = FsCorpus::new(config.corpus.clone()).files().await?;
    let keep: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();

    let mut cache = EmbeddingCache::load(&store, &namespace, provider.model_name()).await;
    let removed = cache.retain_paths(&keep);
    if removed > 0 {
        cache.save(&store, &namespace).await?;
    }

    println!("cache prune");
    println!("  removed: {}", removed);
    println!("  remaining: {}", cache.len());

    store.pool().close().await;
    Ok(())
}

/// Delete the workspace cache.
pub async fn run_cache_clear(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let namespace = config.namespace();

    EmbeddingCache::clear(&store, &namespace).await?;
    println!("cache clear");
    println!("  namespace: {}", namespace);

    store.pool().close().await;
    Ok(())
}
