//! Host implementations of [`Provider`].
//!
//! The variant is chosen once, from the parsed URL, by [`for_repository`];
//! nothing downstream branches on the host again.

pub mod azure_devops;
pub mod github;

use std::sync::Arc;

use reqwest::Url;
use tracing::debug;

pub use azure_devops::AzureDevOpsProvider;
pub use github::GitHubProvider;

use crate::cancel::CancellationToken;
use crate::contract::{Credential, HostKind, Provider, RepositoryRef, RetrievedFile, SkipReason, TreeEntry};
use crate::error::ConvertError;
use crate::http::{HttpTransport, RetryPolicy};
use crate::language::{is_binary_extension, looks_binary};

/// Build the provider matching `repository.host`.
pub fn for_repository(
    repository: &RepositoryRef,
    credential: Option<Credential>,
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
    cancel: CancellationToken,
) -> Box<dyn Provider> {
    match repository.host {
        HostKind::GitHub => Box::new(
            GitHubProvider::new(transport, credential)
                .with_retry_policy(retry)
                .with_cancellation(cancel),
        ),
        HostKind::AzureDevOps => Box::new(
            AzureDevOpsProvider::new(transport, credential)
                .with_retry_policy(retry)
                .with_cancellation(cancel),
        ),
    }
}

/// `base` with each of `segments` appended as one percent-encoded path segment.
pub(crate) fn endpoint<'a, I>(base: &str, segments: I) -> Result<Url, ConvertError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut url = Url::parse(base).map_err(|e| ConvertError::InvalidUrl(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ConvertError::InvalidUrl(format!("{base} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Decide a file's fate from listing metadata alone, before any download.
/// A `max_file_size` of zero disables the size limit.
pub(crate) fn skip_before_download(entry: &TreeEntry, max_file_size: u64) -> Option<RetrievedFile> {
    if entry.binary_hint || is_binary_extension(&entry.path) {
        debug!(path = %entry.path, "Skipping binary file without download");
        return Some(RetrievedFile::binary(entry.clone()));
    }
    match entry.size {
        Some(size) if max_file_size > 0 && size > max_file_size => {
            debug!(path = %entry.path, size, limit = max_file_size, "Skipping oversized file without download");
            Some(RetrievedFile::skipped(
                entry.clone(),
                SkipReason::TooLarge {
                    size,
                    limit: max_file_size,
                },
            ))
        }
        _ => None,
    }
}

/// Classify a downloaded payload; the buffer is dropped unless it is kept as text.
pub(crate) fn classify_download(entry: &TreeEntry, body: Vec<u8>, max_file_size: u64) -> RetrievedFile {
    let size = body.len() as u64;
    if max_file_size > 0 && size > max_file_size {
        return RetrievedFile::skipped(
            entry.clone(),
            SkipReason::TooLarge {
                size,
                limit: max_file_size,
            },
        );
    }
    if looks_binary(&body) || std::str::from_utf8(&body).is_err() {
        return RetrievedFile::binary(entry.clone());
    }
    RetrievedFile::text(entry.clone(), body)
}
