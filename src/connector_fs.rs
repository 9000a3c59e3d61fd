//! Filesystem [`ContentProvider`]: one item per file under a root directory.
//!
//! Files are selected with `include_globs` / `exclude_globs` (plus default
//! excludes for `.git`, `target` and `node_modules`). An item's reference is
//! its path relative to the root, using `/` separators.
//!
//! Supplementary docs live in a sidecar next to the item: for `a/b.yaml`
//! with the default suffix, the sidecar is `a/b.docs.md`. Sidecars are never
//! listed as items themselves.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use groundwork_core::content::ContentProvider;
use groundwork_core::error::{RagError, Result};
use groundwork_core::models::ContentItem;
use walkdir::WalkDir;

use crate::config::FilesystemContentConfig;

pub struct FilesystemProvider {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    docs_suffix: String,
    follow_symlinks: bool,
}

impl FilesystemProvider {
    pub fn new(config: &FilesystemContentConfig) -> Result<Self> {
        if !config.root.is_dir() {
            return Err(RagError::config(format!(
                "content.filesystem.root does not exist: {}",
                config.root.display()
            )));
        }
        if config.docs_suffix.is_empty() {
            return Err(RagError::config("content.filesystem.docs_suffix must not be empty"));
        }

        let mut excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        excludes.extend(config.exclude_globs.iter().cloned());

        Ok(Self {
            root: config.root.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&excludes)?,
            docs_suffix: config.docs_suffix.clone(),
            follow_symlinks: config.follow_symlinks,
        })
    }

    fn is_sidecar(&self, reference: &str) -> bool {
        reference.ends_with(&self.docs_suffix)
    }

    fn is_item(&self, reference: &str) -> bool {
        !self.is_sidecar(reference)
            && !self.exclude.is_match(reference)
            && self.include.is_match(reference)
    }

    /// Relative sidecar path for an item reference.
    fn sidecar_ref(&self, reference: &str) -> String {
        let stem = Path::new(reference).with_extension("");
        format!("{}{}", to_reference(&stem), self.docs_suffix)
    }

    /// Map a reference to a path under the root, refusing anything that
    /// could escape it.
    fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let relative = Path::new(reference);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if reference.is_empty() || !plain {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn load(&self, path: &Path, reference: &str) -> Result<ContentItem> {
        let body = std::fs::read_to_string(path).map_err(|e| {
            RagError::ContentProvider(format!("failed to read {}: {}", path.display(), e))
        })?;
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| reference.to_string());

        Ok(ContentItem {
            reference: reference.to_string(),
            name,
            body,
            metadata: serde_json::json!({
                "path": reference,
                "modified": modified,
            }),
        })
    }

    fn scan(&self) -> Result<Vec<ContentItem>> {
        let mut items = Vec::new();

        let walker = WalkDir::new(&self.root).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = entry.map_err(|e| RagError::ContentProvider(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let reference = to_reference(relative);
            if !self.is_item(&reference) {
                continue;
            }

            match self.load(path, &reference) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!(item = %reference, error = %e, "skipping unreadable file"),
            }
        }

        // Sort for deterministic ordering
        items.sort_by(|a, b| a.reference.cmp(&b.reference));

        Ok(items)
    }
}

#[async_trait]
impl ContentProvider for FilesystemProvider {
    async fn fetch_all_items(&self) -> Result<Vec<ContentItem>> {
        let items = self.scan()?;
        tracing::debug!(root = %self.root.display(), items = items.len(), "scanned filesystem");
        Ok(items)
    }

    async fn fetch_item(&self, reference: &str) -> Result<ContentItem> {
        let path = self
            .resolve(reference)
            .filter(|p| p.is_file() && self.is_item(reference))
            .ok_or_else(|| RagError::NotFound(reference.to_string()))?;
        self.load(&path, reference)
    }

    async fn has_supplementary_docs(&self, reference: &str) -> Result<bool> {
        Ok(self
            .resolve(&self.sidecar_ref(reference))
            .is_some_and(|p| p.is_file()))
    }

    async fn fetch_supplementary_docs(&self, reference: &str) -> Result<Option<String>> {
        let Some(path) = self.resolve(&self.sidecar_ref(reference)) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| RagError::ContentProvider(format!("failed to read {}: {}", path.display(), e)))
    }
}

fn to_reference(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| RagError::config(e.to_string()))
}
