//! High-level pipeline: URL → resolved ref → tree → filter → fetch → tree → Markdown.
//!
//! This module provides the top-level orchestration of one conversion run:
//!   - Parses the URL and compiles the path filter before any network access
//!   - Picks the provider for the host once and resolves the ref
//!   - Lists the full tree and keeps the file entries that pass the filter
//!   - Fetches contents with bounded concurrency, reporting progress per file
//!   - Builds the ordered tree and renders the document
//!
//! # Major Types
//! - [`ConvertRequest`]: the plain values a front end hands in
//! - [`ConversionReport`]: the document plus included/skipped accounting
//!
//! # Concurrency
//! Fetches run concurrently (at most [`FETCH_CONCURRENCY`] in flight) on a
//! single stream. Results are consumed by one loop, which owns the progress
//! counter and the result slots, so progress calls never overlap and each
//! result lands in the slot of the entry it was fetched for regardless of
//! completion order. Tree building starts only once every fetch is done.
//!
//! # Error Handling
//! Failures while resolving the ref, listing the tree or building the tree
//! abort the run with no document. A failed fetch of a single file is
//! recorded as [`SkipReason::FetchError`] and the run continues.
//! Cancellation aborts with [`ConvertError::Cancelled`].

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::cancel::CancellationToken;
use crate::config::{ConvertOptions, FETCH_CONCURRENCY};
use crate::contract::{
    ConversionReport, Credential, Progress, Provider, RepositoryRef, RetrievedFile, SkipReason,
    SkippedFile, TreeEntry,
};
use crate::error::ConvertError;
use crate::filter::FilterSpec;
use crate::http::{HttpTransport, ReqwestTransport, RetryPolicy};
use crate::{provider, render, tree, url_parser};

/// Everything one run needs; no host-specific knowledge.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub url: String,
    pub credential: Option<Credential>,
    pub options: ConvertOptions,
}

/// Entrypoint: convert the repository at `request.url` into one document.
pub async fn convert<F>(
    request: &ConvertRequest,
    progress: F,
    cancel: &CancellationToken,
) -> Result<ConversionReport, ConvertError>
where
    F: FnMut(Progress) + Send,
{
    info!(url = %request.url, "[CONVERT] Starting conversion");
    request.options.trace_loaded();

    let repository = url_parser::parse(&request.url)?;
    let filter = FilterSpec::compile(&request.options.filter)?;
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);
    let provider = provider::for_repository(
        &repository,
        request.credential.clone(),
        transport,
        RetryPolicy::default(),
        cancel.clone(),
    );

    convert_with_provider(
        provider.as_ref(),
        &repository,
        &filter,
        request.options.max_file_size,
        progress,
        cancel,
    )
    .await
}

/// Blocking wrapper around [`convert`] for callers without an async runtime.
pub fn convert_blocking<F>(
    request: &ConvertRequest,
    progress: F,
    cancel: &CancellationToken,
) -> Result<ConversionReport, ConvertError>
where
    F: FnMut(Progress) + Send,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(convert(request, progress, cancel))
}

/// The pipeline after URL parsing, against any [`Provider`].
pub async fn convert_with_provider<P, F>(
    provider: &P,
    repository: &RepositoryRef,
    filter: &FilterSpec,
    max_file_size: u64,
    mut progress: F,
    cancel: &CancellationToken,
) -> Result<ConversionReport, ConvertError>
where
    P: Provider + ?Sized,
    F: FnMut(Progress) + Send,
{
    let repo_name = repository.display_name();

    ensure_active(cancel)?;
    let resolved = until_cancelled(cancel, provider.resolve_ref(repository))
        .await
        .map_err(|e| {
            error!(repo = %repo_name, error = %e, "[CONVERT][ERROR] Resolving ref failed");
            e
        })?;
    info!(repo = %repo_name, reference = %resolved.reference.name, "[CONVERT] Resolved ref");

    ensure_active(cancel)?;
    let entries = until_cancelled(cancel, provider.list_tree(&resolved))
        .await
        .map_err(|e| {
            error!(repo = %repo_name, error = %e, "[CONVERT][ERROR] Listing tree failed");
            e
        })?;
    let listed = entries.iter().filter(|e| e.is_file()).count();
    let files: Vec<TreeEntry> = entries
        .into_iter()
        .filter(|e| e.is_file() && filter.matches(&e.path))
        .collect();
    info!(
        repo = %repo_name,
        listed,
        selected = files.len(),
        "[CONVERT] Applied path filter"
    );

    let total = files.len();
    let mut slots: Vec<Option<RetrievedFile>> = vec![None; total];
    let resolved_ref = &resolved;
    let mut fetches = stream::iter(files.iter().enumerate())
        .map(|(index, entry)| async move {
            let result = provider
                .fetch_content(entry, resolved_ref, max_file_size)
                .await;
            (index, result)
        })
        .buffer_unordered(FETCH_CONCURRENCY);

    let mut completed = 0;
    loop {
        let next = tokio::select! {
            next = fetches.next() => next,
            _ = cancel.cancelled() => {
                warn!(repo = %repo_name, completed, total, "[CONVERT] Cancelled during fetch");
                return Err(ConvertError::Cancelled);
            }
        };
        let Some((index, result)) = next else {
            break;
        };

        let entry = &files[index];
        let file = match result {
            Ok(file) => file,
            Err(ConvertError::Cancelled) => return Err(ConvertError::Cancelled),
            Err(e) => {
                warn!(path = %entry.path, error = %e, "[FETCH] Fetch failed, recording skip");
                RetrievedFile::skipped(
                    entry.clone(),
                    SkipReason::FetchError {
                        message: e.to_string(),
                    },
                )
            }
        };
        completed += 1;
        progress(Progress {
            completed,
            total,
            path: entry.path.clone(),
        });
        slots[index] = Some(file);
    }
    drop(fetches);
    ensure_active(cancel)?;

    let retrieved: Vec<RetrievedFile> = slots.into_iter().flatten().collect();
    let root = tree::build(retrieved).map_err(|e| {
        error!(repo = %repo_name, error = %e, "[CONVERT][ERROR] Building tree failed");
        e
    })?;

    let ordered = root.files();
    let files_skipped: Vec<SkippedFile> = ordered
        .iter()
        .filter_map(|file| {
            file.skip_reason.clone().map(|reason| SkippedFile {
                path: file.path().to_string(),
                reason,
            })
        })
        .collect();
    let files_included = ordered.len() - files_skipped.len();
    let document = render::render(&repo_name, &root);

    info!(
        repo = %repo_name,
        included = files_included,
        skipped = files_skipped.len(),
        bytes = document.len(),
        "[CONVERT] Conversion complete"
    );

    Ok(ConversionReport {
        document,
        repository: repo_name,
        reference: resolved.reference.name.clone(),
        files_total: total,
        files_included,
        files_skipped,
    })
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), ConvertError> {
    if cancel.is_cancelled() {
        return Err(ConvertError::Cancelled);
    }
    Ok(())
}

async fn until_cancelled<T, Fut>(cancel: &CancellationToken, future: Fut) -> Result<T, ConvertError>
where
    Fut: Future<Output = Result<T, ConvertError>>,
{
    tokio::select! {
        result = future => result,
        _ = cancel.cancelled() => Err(ConvertError::Cancelled),
    }
}
