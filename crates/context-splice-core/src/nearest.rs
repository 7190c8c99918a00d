//! Nearest-file retrieval over a content-hash keyed embedding cache.
//!
//! The pipeline operates entirely through the [`EmbeddingProvider`] and
//! [`KeyValueStore`] traits. The calling application enumerates candidate
//! files and supplies concrete collaborators.
//!
//! # Pipeline
//!
//! 1. Fail fast if the provider reports missing credentials.
//! 2. Load the workspace's [`EmbeddingCache`] (missing or corrupt → empty).
//! 3. Hash every candidate file; files whose hash matches their cache entry
//!    are reused, the rest are re-embedded.
//! 4. Embed stale files in sequential batches of `batch_size`. Each
//!    successful batch is written to the cache and persisted immediately,
//!    so an abandoned query only loses the batches it never reached. A
//!    failed batch is logged and its files keep their old vectors.
//! 5. Embed the query.
//! 6. Rank every candidate that has a vector by Euclidean distance
//!    (ascending, stable), keep the top `k`.
//! 7. Optionally concatenate the winners into a context string hard-capped
//!    at `max_context_chars` characters ([`build_context`]).

use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::cache::EmbeddingCache;
use crate::corpus::FileRecord;
use crate::embedding::{euclidean_distance, EmbedRole, EmbeddingProvider};
use crate::store::KeyValueStore;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 30_000;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearestParams {
    /// Number of files returned when the caller does not pass `k`.
    pub top_k: usize,
    /// Maximum texts per embedding request.
    pub batch_size: usize,
    /// Hard cap on the length of [`build_context`] output, in characters.
    pub max_context_chars: usize,
}

impl Default for NearestParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            batch_size: DEFAULT_BATCH_SIZE,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}

/// Distance from the query to one file's cached vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceRecord {
    pub file_path: String,
    pub distance: f32,
}

/// A retrieved file, nearest first.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedFile {
    pub path: String,
    pub content: String,
    pub distance: f32,
}

/// What the cache refresh did during one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Files whose cached vector matched their current content.
    pub reused: usize,
    /// Files embedded during this query.
    pub embedded: usize,
    /// Files in failed batches; their cache entries were left untouched.
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct NearestResult {
    pub files: Vec<RankedFile>,
    pub stats: RefreshStats,
}

/// Embedding-backed nearest-file search for one workspace.
pub struct NearestFileIndex<'a> {
    provider: &'a dyn EmbeddingProvider,
    store: &'a dyn KeyValueStore,
    namespace: String,
    params: NearestParams,
}

impl<'a> NearestFileIndex<'a> {
    /// Create an index whose cache lives under `namespace` in `store`.
    pub fn new(
        provider: &'a dyn EmbeddingProvider,
        store: &'a dyn KeyValueStore,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            namespace: namespace.into(),
            params: NearestParams::default(),
        }
    }

    pub fn with_params(mut self, params: NearestParams) -> Self {
        self.params = params;
        self
    }

    pub fn params(&self) -> &NearestParams {
        &self.params
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Return the `k` files of `corpus` nearest to `query`.
    ///
    /// `k` defaults to [`NearestParams::top_k`]. `exclude_path` removes the
    /// file the query originated from before anything is embedded or scored.
    ///
    /// # Errors
    ///
    /// Only a provider credential failure or a failure to embed the query
    /// itself is returned. Batch failures and cache I/O failures are logged
    /// and degrade to stale or missing vectors.
    pub async fn find_nearest_files(
        &self,
        query: &str,
        corpus: &[FileRecord],
        k: Option<usize>,
        exclude_path: Option<&str>,
    ) -> Result<NearestResult> {
        self.provider.check_credentials()?;

        if query.trim().is_empty() {
            return Ok(NearestResult::default());
        }

        let candidates: Vec<&FileRecord> = corpus
            .iter()
            .filter(|file| Some(file.path.as_str()) != exclude_path)
            .collect();

        let (cache, stats) = self.refresh(&candidates).await;

        let query_vec = self
            .provider
            .embed_one(query, EmbedRole::Query)
            .await
            .context("Failed to embed query")?;

        let vectors: Vec<(&str, &[f32])> = candidates
            .iter()
            .filter_map(|file| {
                cache
                    .get(&file.path)
                    .map(|entry| (file.path.as_str(), entry.embedding.as_slice()))
            })
            .collect();

        let by_path: HashMap<&str, &FileRecord> = candidates
            .iter()
            .map(|file| (file.path.as_str(), *file))
            .collect();

        let files: Vec<RankedFile> = rank_by_distance(&query_vec, &vectors)
            .into_iter()
            .take(k.unwrap_or(self.params.top_k))
            .filter_map(|record| {
                by_path.get(record.file_path.as_str()).map(|file| RankedFile {
                    path: file.path.clone(),
                    content: file.content.clone(),
                    distance: record.distance,
                })
            })
            .collect();

        tracing::debug!(
            namespace = %self.namespace,
            returned = files.len(),
            candidates = candidates.len(),
            "nearest files ranked"
        );

        Ok(NearestResult { files, stats })
    }

    /// Like [`find_nearest_files`](Self::find_nearest_files) with the
    /// default `k`, rendered through [`build_context`].
    pub async fn find_nearest_context(
        &self,
        query: &str,
        corpus: &[FileRecord],
        exclude_path: Option<&str>,
    ) -> Result<String> {
        let result = self
            .find_nearest_files(query, corpus, None, exclude_path)
            .await?;
        Ok(build_context(&result.files, self.params.max_context_chars))
    }

    /// Bring the cache up to date for `files`, embedding only stale ones.
    async fn refresh(&self, files: &[&FileRecord]) -> (EmbeddingCache, RefreshStats) {
        let mut cache =
            EmbeddingCache::load(self.store, &self.namespace, self.provider.model_name()).await;

        let (unchanged, to_embed): (Vec<&FileRecord>, Vec<&FileRecord>) = files
            .iter()
            .copied()
            .partition(|file| cache.is_fresh(&file.path, &file.content_hash));

        let mut stats = RefreshStats {
            reused: unchanged.len(),
            ..RefreshStats::default()
        };

        if to_embed.is_empty() {
            return (cache, stats);
        }

        tracing::info!(
            namespace = %self.namespace,
            stale = to_embed.len(),
            reused = stats.reused,
            "embedding changed files"
        );

        for batch in to_embed.chunks(self.params.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|file| file.content.clone()).collect();

            match self.provider.embed_batch(&texts, EmbedRole::Document).await {
                Ok(vectors) if vectors.len() == batch.len() => {
                    for (file, vector) in batch.iter().zip(vectors) {
                        cache.insert(file.path.as_str(), file.content_hash.as_str(), vector);
                    }
                    stats.embedded += batch.len();

                    if let Err(e) = cache.save(self.store, &self.namespace).await {
                        tracing::warn!(
                            namespace = %self.namespace,
                            error = %e,
                            "failed to persist embedding cache"
                        );
                    }
                }
                Ok(vectors) => {
                    tracing::warn!(
                        expected = batch.len(),
                        received = vectors.len(),
                        "embedding batch returned the wrong number of vectors"
                    );
                    stats.failed += batch.len();
                }
                Err(e) => {
                    tracing::warn!(files = batch.len(), error = %e, "embedding batch failed");
                    stats.failed += batch.len();
                }
            }
        }

        (cache, stats)
    }
}

/// Score each `(path, vector)` against `query_vec`, nearest first.
///
/// The sort is stable: equal distances keep their input order.
pub fn rank_by_distance(query_vec: &[f32], vectors: &[(&str, &[f32])]) -> Vec<DistanceRecord> {
    let mut records: Vec<DistanceRecord> = vectors
        .iter()
        .map(|(path, vector)| DistanceRecord {
            file_path: path.to_string(),
            distance: euclidean_distance(query_vec, vector),
        })
        .collect();

    records.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    records
}

/// Concatenate ranked files into a prompt context string.
///
/// Each file is rendered as `// File: {path}` followed by its content. When
/// the whole string exceeds `max_chars` characters it is cut at exactly
/// `max_chars`, even mid-file.
pub fn build_context(files: &[RankedFile], max_chars: usize) -> String {
    let mut context = String::new();
    for file in files {
        context.push_str("// File: ");
        context.push_str(&file.path);
        context.push('\n');
        context.push_str(&file.content);
        context.push_str("\n\n");
    }

    if let Some((cut, _)) = context.char_indices().nth(max_chars) {
        context.truncate(cut);
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Provider that maps known texts to fixed vectors and records calls.
    struct MockProvider {
        vectors: HashMap<String, Vec<f32>>,
        calls: Mutex<Vec<(EmbedRole, usize)>>,
        fail_document_call: Mutex<Option<usize>>,
        has_credentials: bool,
    }

    impl MockProvider {
        fn new(pairs: &[(&str, &[f32])]) -> Self {
            Self {
                vectors: pairs
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.to_vec()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
                fail_document_call: Mutex::new(None),
                has_credentials: true,
            }
        }

        fn document_calls(&self) -> Vec<usize> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(role, _)| *role == EmbedRole::Document)
                .map(|(_, n)| *n)
                .collect()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn fail_next_run_document_call(&self, index: usize) {
            let already = self.document_calls().len();
            *self.fail_document_call.lock().unwrap() = Some(already + index);
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockProvider {
        fn model_name(&self) -> &str {
            "mock"
        }

        fn check_credentials(&self) -> Result<()> {
            if !self.has_credentials {
                bail!("MOCK_API_KEY environment variable not set");
            }
            Ok(())
        }

        async fn embed_batch(&self, texts: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>> {
            let doc_index = self.document_calls().len();
            self.calls.lock().unwrap().push((role, texts.len()));
            if role == EmbedRole::Document && *self.fail_document_call.lock().unwrap() == Some(doc_index)
            {
                bail!("provider unavailable");
            }
            Ok(texts
                .iter()
                .map(|t| {
                    self.vectors
                        .get(t)
                        .cloned()
                        .unwrap_or_else(|| vec![t.len() as f32, 0.0])
                })
                .collect())
        }
    }

    fn corpus() -> Vec<FileRecord> {
        vec![
            FileRecord::new("a.rs", "alpha"),
            FileRecord::new("b.rs", "beta"),
            FileRecord::new("c.rs", "gamma"),
            FileRecord::new("d.rs", "delta"),
        ]
    }

    fn provider() -> MockProvider {
        MockProvider::new(&[
            ("alpha", &[1.0, 0.0]),
            ("beta", &[0.0, 0.0]),
            ("gamma", &[3.0, 4.0]),
            ("delta", &[1.0, 0.0]),
            ("query", &[0.0, 0.0]),
        ])
    }

    fn paths(result: &NearestResult) -> Vec<&str> {
        result.files.iter().map(|f| f.path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_ranks_by_ascending_distance_with_stable_ties() {
        let provider = provider();
        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&provider, &store, "ws");

        let result = index
            .find_nearest_files("query", &corpus(), None, None)
            .await
            .unwrap();

        assert_eq!(paths(&result), vec!["b.rs", "a.rs", "d.rs", "c.rs"]);
        assert_eq!(result.files[0].distance, 0.0);
        assert!((result.files[3].distance - 5.0).abs() < 1e-6);
        assert_eq!(result.stats.embedded, 4);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_document_embedding() {
        let provider = provider();
        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&provider, &store, "ws");
        let files = corpus();

        index.find_nearest_files("query", &files, None, None).await.unwrap();
        assert_eq!(provider.document_calls(), vec![4]);

        let result = index.find_nearest_files("query", &files, None, None).await.unwrap();
        assert_eq!(provider.document_calls(), vec![4]);
        assert_eq!(provider.total_calls(), 3);
        assert_eq!(result.stats.reused, 4);
        assert_eq!(result.stats.embedded, 0);
    }

    #[tokio::test]
    async fn test_edit_reembeds_only_changed_file() {
        let provider = provider();
        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&provider, &store, "ws");
        let mut files = corpus();

        index.find_nearest_files("query", &files, None, None).await.unwrap();

        files[2] = FileRecord::new("c.rs", "gamma2");
        let result = index.find_nearest_files("query", &files, None, None).await.unwrap();

        assert_eq!(provider.document_calls(), vec![4, 1]);
        assert_eq!(result.stats.reused, 3);
        assert_eq!(result.stats.embedded, 1);
    }

    #[tokio::test]
    async fn test_reindent_does_not_reembed() {
        let provider = provider();
        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&provider, &store, "ws");
        let mut files = corpus();

        index.find_nearest_files("query", &files, None, None).await.unwrap();
        files[0] = FileRecord::new("a.rs", "  alpha\n");
        index.find_nearest_files("query", &files, None, None).await.unwrap();

        assert_eq!(provider.document_calls(), vec![4]);
    }

    #[tokio::test]
    async fn test_batches_respect_batch_size() {
        let provider = provider();
        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&provider, &store, "ws").with_params(NearestParams {
            batch_size: 3,
            ..NearestParams::default()
        });

        let mut files = corpus();
        files.push(FileRecord::new("e.rs", "epsilon"));
        index.find_nearest_files("query", &files, None, None).await.unwrap();

        assert_eq!(provider.document_calls(), vec![3, 2]);
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_stale_vectors_and_commits_others() {
        let provider = provider();
        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&provider, &store, "ws").with_params(NearestParams {
            batch_size: 2,
            ..NearestParams::default()
        });
        let mut files = corpus();
        index.find_nearest_files("query", &files, None, None).await.unwrap();

        // Edit every file; the first batch (a, b) fails, the second (c, d) succeeds.
        files = files
            .iter()
            .map(|f| FileRecord::new(f.path.clone(), format!("{} v2", f.content)))
            .collect();
        provider.fail_next_run_document_call(0);
        let result = index.find_nearest_files("query", &files, None, None).await.unwrap();

        assert_eq!(result.stats.failed, 2);
        assert_eq!(result.stats.embedded, 2);
        // a and b are still ranked with their old vectors.
        assert_eq!(result.files.len(), 4);
        assert_eq!(result.files[0].path, "b.rs");
        assert_eq!(result.files[0].content, "beta v2");

        let cache = EmbeddingCache::load(&store, "ws", "mock").await;
        assert!(cache.is_fresh("c.rs", &files[2].content_hash));
        assert!(!cache.is_fresh("a.rs", &files[0].content_hash));

        // The failed files are retried next time.
        index.find_nearest_files("query", &files, None, None).await.unwrap();
        assert_eq!(provider.document_calls(), vec![2, 2, 2, 2, 2]);
    }

    #[tokio::test]
    async fn test_never_embedded_files_are_skipped() {
        let provider = provider();
        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&provider, &store, "ws");
        provider.fail_next_run_document_call(0);

        let result = index.find_nearest_files("query", &corpus(), None, None).await.unwrap();
        assert!(result.files.is_empty());
        assert_eq!(result.stats.failed, 4);
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_not_fatal() {
        let provider = provider();
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let index = NearestFileIndex::new(&provider, &store, "ws");

        let result = index.find_nearest_files("query", &corpus(), None, None).await.unwrap();
        assert_eq!(result.files.len(), 4);

        // Nothing was persisted, so the next run embeds everything again.
        index.find_nearest_files("query", &corpus(), None, None).await.unwrap();
        assert_eq!(provider.document_calls(), vec![4, 4]);
    }

    #[tokio::test]
    async fn test_corrupt_cache_triggers_full_reembed() {
        let provider = provider();
        let store = MemoryStore::new();
        store.set("ws/embedding-cache", "garbage").await.unwrap();
        let index = NearestFileIndex::new(&provider, &store, "ws");

        let result = index.find_nearest_files("query", &corpus(), None, None).await.unwrap();
        assert_eq!(result.stats.embedded, 4);
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_any_call() {
        let mut provider = provider();
        provider.has_credentials = false;
        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&provider, &store, "ws");

        let err = index
            .find_nearest_files("query", &corpus(), None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("MOCK_API_KEY"));
        assert_eq!(provider.total_calls(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_blank_query_returns_nothing() {
        let provider = provider();
        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&provider, &store, "ws");

        let result = index.find_nearest_files("   ", &corpus(), None, None).await.unwrap();
        assert!(result.files.is_empty());
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_exclude_path_and_k() {
        let provider = provider();
        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&provider, &store, "ws");

        let result = index
            .find_nearest_files("query", &corpus(), Some(2), Some("b.rs"))
            .await
            .unwrap();
        assert_eq!(paths(&result), vec!["a.rs", "d.rs"]);
        assert_eq!(provider.document_calls(), vec![3]);
    }

    #[tokio::test]
    async fn test_default_top_k_limits_results() {
        let provider = provider();
        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&provider, &store, "ws");
        let files: Vec<FileRecord> = (0..8)
            .map(|i| FileRecord::new(format!("f{i}.rs"), "x".repeat(i + 1)))
            .collect();

        let result = index.find_nearest_files("query", &files, None, None).await.unwrap();
        assert_eq!(result.files.len(), DEFAULT_TOP_K);
        assert_eq!(result.files[0].path, "f0.rs");
    }

    #[tokio::test]
    async fn test_query_embedding_failure_propagates() {
        struct BrokenQuery;

        #[async_trait]
        impl EmbeddingProvider for BrokenQuery {
            fn model_name(&self) -> &str {
                "broken"
            }

            async fn embed_batch(&self, texts: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>> {
                match role {
                    EmbedRole::Document => Ok(texts.iter().map(|_| vec![0.0]).collect()),
                    EmbedRole::Query => bail!("rate limited"),
                }
            }
        }

        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&BrokenQuery, &store, "ws");
        let err = index
            .find_nearest_files("query", &corpus(), None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to embed query"));
    }

    #[tokio::test]
    async fn test_find_nearest_context_respects_budget() {
        let provider = provider();
        let store = MemoryStore::new();
        let index = NearestFileIndex::new(&provider, &store, "ws").with_params(NearestParams {
            max_context_chars: 25,
            ..NearestParams::default()
        });

        let context = index
            .find_nearest_context("query", &corpus(), None)
            .await
            .unwrap();
        assert_eq!(context.chars().count(), 25);
        assert!(context.starts_with("// File: b.rs\nbeta\n\n"));
    }

    #[test]
    fn test_rank_by_distance() {
        let a: &[f32] = &[2.0];
        let b: &[f32] = &[1.0];
        let c: &[f32] = &[1.0];
        let ranked = rank_by_distance(&[0.0], &[("a", a), ("b", b), ("c", c)]);
        let order: Vec<&str> = ranked.iter().map(|r| r.file_path.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_rank_mismatched_dims_sort_last() {
        let good: &[f32] = &[5.0, 5.0];
        let bad: &[f32] = &[0.0];
        let ranked = rank_by_distance(&[0.0, 0.0], &[("bad", bad), ("good", good)]);
        assert_eq!(ranked[0].file_path, "good");
        assert_eq!(ranked[1].distance, f32::INFINITY);
    }

    #[test]
    fn test_rank_non_finite_vectors_sort_last() {
        let far: &[f32] = &[9.0];
        let broken: &[f32] = &[f32::NAN];
        let overflow: &[f32] = &[f32::INFINITY];
        let near: &[f32] = &[1.0];
        let ranked = rank_by_distance(
            &[0.0],
            &[("far", far), ("nan", broken), ("inf", overflow), ("near", near)],
        );
        let order: Vec<&str> = ranked.iter().map(|r| r.file_path.as_str()).collect();
        assert_eq!(order, vec!["near", "far", "nan", "inf"]);
        assert!(ranked.iter().all(|r| !r.distance.is_nan()));
    }

    fn ranked(path: &str, content: &str) -> RankedFile {
        RankedFile {
            path: path.to_string(),
            content: content.to_string(),
            distance: 0.0,
        }
    }

    #[test]
    fn test_build_context_under_budget() {
        let files = vec![ranked("a.rs", "fn a() {}"), ranked("b.rs", "fn b() {}")];
        assert_eq!(
            build_context(&files, 1_000),
            "// File: a.rs\nfn a() {}\n\n// File: b.rs\nfn b() {}\n\n"
        );
    }

    #[test]
    fn test_build_context_hard_cutoff() {
        let files = vec![ranked("a.rs", &"x".repeat(100)), ranked("b.rs", &"y".repeat(100))];
        let context = build_context(&files, 150);
        assert_eq!(context.len(), 150);
        assert!(context.contains("// File: b.rs"));
    }

    #[test]
    fn test_build_context_cuts_on_char_boundary() {
        let files = vec![ranked("é.rs", "ééééé")];
        let context = build_context(&files, 12);
        assert_eq!(context.chars().count(), 12);
    }
}
