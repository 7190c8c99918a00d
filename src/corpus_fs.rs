//! Filesystem corpus for nearest-file retrieval.
//!
//! Walks the configured root, applies include/exclude globs, and reads
//! each matching UTF-8 file into a [`FileRecord`] keyed by its path
//! relative to the root.

use anyhow::{bail, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use context_splice_core::corpus::{CorpusProvider, FileRecord};

use crate::config::CorpusConfig;

pub struct FsCorpus {
    config: CorpusConfig,
}

impl FsCorpus {
    pub fn new(config: CorpusConfig) -> Self {
        Self { config }
    }

    pub fn scan(&self) -> Result<Vec<FileRecord>> {
        let root = &self.config.root;
        if !root.exists() {
            bail!("Corpus root does not exist: {}", root.display());
        }

        let include_set = build_globset(&self.config.include_globs)?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(self.config.exclude_globs.clone());
        let exclude_set = build_globset(&default_excludes)?;

        let mut files = Vec::new();

        let walker = WalkDir::new(root).follow_links(self.config.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > self.config.max_file_bytes {
                tracing::debug!(path = %rel_str, size, "skipping oversized file");
                continue;
            }

            match std::fs::read_to_string(path) {
                Ok(content) => files.push(FileRecord::new(rel_str, content)),
                Err(e) => tracing::debug!(path = %rel_str, error = %e, "skipping unreadable file"),
            }
        }

        // Sort for deterministic ordering
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(files)
    }
}

#[async_trait]
impl CorpusProvider for FsCorpus {
    async fn files(&self) -> Result<Vec<FileRecord>> {
        self.scan()
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
