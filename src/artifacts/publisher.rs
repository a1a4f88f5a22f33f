// src/artifacts/publisher.rs

//! Uploads a finished build's output tree to the object store.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::artifacts::content_type::content_type_for;
use crate::artifacts::store::ObjectStore;
use crate::config::UploadSection;
use crate::engine::CancelSignal;
use crate::errors::{BuildcastError, Result};
use crate::fabric::LogPublisher;
use crate::types::Slug;

/// Upload behaviour from `[upload]`.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Stop after the first failed file.
    pub fail_fast: bool,
    /// Relative paths matching this set are not uploaded.
    pub exclude: GlobSet,
}

impl UploadOptions {
    pub fn from_config(section: &UploadSection) -> anyhow::Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in section.exclude.iter() {
            let glob = Glob::new(pattern)
                .with_context(|| format!("invalid upload exclude pattern {:?}", pattern))?;
            builder.add(glob);
        }
        Ok(Self {
            fail_fast: section.fail_fast,
            exclude: builder.build().context("building upload exclude set")?,
        })
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            fail_fast: false,
            exclude: GlobSet::empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    /// Storage key, or the offending path when the walk itself failed.
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub files_uploaded: usize,
    pub failures: Vec<UploadFailure>,
    /// Files matched by an exclude pattern.
    pub skipped: usize,
    /// Set when the walk stopped early, by fail-fast or cancellation.
    pub aborted: bool,
    /// Set when cancellation stopped the walk.
    pub cancelled: bool,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.aborted
    }
}

/// One file found under the output directory.
#[derive(Debug)]
struct Entry {
    path: PathBuf,
    relative: String,
}

#[derive(Clone)]
pub struct ArtifactPublisher {
    store: Arc<dyn ObjectStore>,
    publisher: LogPublisher,
    options: UploadOptions,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn ObjectStore>, publisher: LogPublisher, options: UploadOptions) -> Self {
        Self {
            store,
            publisher,
            options,
        }
    }

    /// Upload every regular file under `root_dir` as `{slug}/{relative path}`.
    ///
    /// Individual failures are collected in the report; only a missing
    /// `root_dir` is an error. `cancel` is checked before every file; files
    /// already stored stay stored.
    pub async fn upload(
        &self,
        root_dir: &Path,
        slug: &Slug,
        cancel: &CancelSignal,
    ) -> Result<UploadReport> {
        if !root_dir.is_dir() {
            return Err(BuildcastError::OutputMissing(root_dir.to_path_buf()));
        }

        let root = root_dir.to_path_buf();
        let (entries, walk_failures) = tokio::task::spawn_blocking(move || collect_files(&root))
            .await
            .map_err(|e| anyhow!("output directory walk panicked: {e}"))?;

        info!(slug = %slug, root = ?root_dir, files = entries.len(), "uploading artifacts");

        let mut report = UploadReport::default();
        for failure in walk_failures {
            self.publisher
                .system(slug, format!("Upload failed: {}: {}", failure.key, failure.error));
            report.failures.push(failure);
            if self.options.fail_fast {
                report.aborted = true;
            }
        }

        if !report.aborted {
            for entry in entries {
                if cancel.is_cancelled() {
                    info!(slug = %slug, uploaded = report.files_uploaded, "artifact upload cancelled");
                    report.aborted = true;
                    report.cancelled = true;
                    break;
                }
                if self.options.exclude.is_match(&entry.relative) {
                    debug!(slug = %slug, path = %entry.relative, "excluded from upload");
                    report.skipped += 1;
                    continue;
                }

                let key = format!("{slug}/{}", entry.relative);
                match self.upload_file(&entry.path, key.clone()).await {
                    Ok(()) => {
                        report.files_uploaded += 1;
                        self.publisher.system(slug, format!("Uploaded: {key}"));
                    }
                    Err(e) => {
                        warn!(slug = %slug, key = %key, error = %e, "artifact upload failed");
                        self.publisher
                            .system(slug, format!("Upload failed: {key}: {e}"));
                        report.failures.push(UploadFailure {
                            key,
                            error: e.to_string(),
                        });
                        if self.options.fail_fast {
                            report.aborted = true;
                            break;
                        }
                    }
                }
            }
        }

        self.publisher.system(slug, summary_line(&report));
        info!(
            slug = %slug,
            uploaded = report.files_uploaded,
            failed = report.failures.len(),
            skipped = report.skipped,
            aborted = report.aborted,
            cancelled = report.cancelled,
            "artifact upload finished"
        );
        Ok(report)
    }

    async fn upload_file(&self, path: &Path, key: String) -> Result<()> {
        let body = tokio::fs::read(path).await?;
        let content_type = content_type_for(path);
        self.store.put(key, body, content_type).await?;
        Ok(())
    }
}

fn summary_line(report: &UploadReport) -> String {
    let mut line = format!("Uploaded {} files", report.files_uploaded);
    if !report.failures.is_empty() {
        line.push_str(&format!(", {} failed", report.failures.len()));
    }
    if report.cancelled {
        line.push_str(" (cancelled)");
    } else if report.aborted {
        line.push_str(" (aborted after first failure)");
    }
    line
}

/// Relative path with `/` separators, whatever the platform.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn collect_files(root: &Path) -> (Vec<Entry>, Vec<UploadFailure>) {
    let mut entries = Vec::new();
    let mut failures = Vec::new();

    for item in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        match item {
            Ok(entry) if entry.file_type().is_file() => {
                match relative_key(root, entry.path()) {
                    Some(relative) => entries.push(Entry {
                        path: entry.into_path(),
                        relative,
                    }),
                    None => failures.push(UploadFailure {
                        key: entry.path().display().to_string(),
                        error: "path is not below the output directory".to_string(),
                    }),
                }
            }
            Ok(_) => {}
            Err(e) => {
                let key = e
                    .path()
                    .and_then(|p| relative_key(root, p))
                    .unwrap_or_else(|| root.display().to_string());
                failures.push(UploadFailure {
                    key,
                    error: e.to_string(),
                });
            }
        }
    }

    (entries, failures)
}
