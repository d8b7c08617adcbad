//! GitHub REST provider.
//!
//! - default branch: `GET /repos/{owner}/{repo}`
//! - tree: `GET /repos/{owner}/{repo}/git/trees/{ref}?recursive=1`, falling back
//!   to a breadth-first walk of non-recursive tree calls when GitHub reports the
//!   recursive listing as truncated
//! - content: `raw.githubusercontent.com` first (no API quota), then
//!   `GET /repos/{owner}/{repo}/git/blobs/{sha}` for private repositories

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{classify_download, endpoint, skip_before_download};
use crate::cancel::CancellationToken;
use crate::contract::{
    Credential, GitRef, Provider, RepositoryRef, ResolvedRef, RetrievedFile, TreeEntry,
};
use crate::error::ConvertError;
use crate::http::{
    retry_after, send_with_retry, HttpRequest, HttpResponse, HttpTransport, RateLimited,
    RetryPolicy,
};

pub const API_BASE: &str = "https://api.github.com";
pub const RAW_BASE: &str = "https://raw.githubusercontent.com";
const API_VERSION: &str = "2022-11-28";
const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw+json";

pub struct GitHubProvider {
    transport: Arc<dyn HttpTransport>,
    credential: Option<Credential>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

#[derive(Debug, Deserialize)]
struct RepositoryMetadata {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    sha: String,
    #[serde(default)]
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    size: Option<u64>,
}

impl TreeItem {
    fn into_entry(self, prefix: &str) -> Option<TreeEntry> {
        let path = if prefix.is_empty() {
            self.path
        } else {
            format!("{prefix}/{}", self.path)
        };
        match self.kind.as_str() {
            "blob" => Some(TreeEntry::file(path, self.sha, self.size)),
            "tree" => Some(TreeEntry::directory(path, self.sha)),
            // submodules ("commit") have no content in this repository
            other => {
                debug!(path = %path, kind = other, "Ignoring tree item");
                None
            }
        }
    }
}

impl GitHubProvider {
    pub fn new(transport: Arc<dyn HttpTransport>, credential: Option<Credential>) -> Self {
        Self {
            transport,
            credential,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn request(&self, url: reqwest::Url, accept: &str) -> HttpRequest {
        let request = HttpRequest::get(url)
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.credential {
            Some(token) => request.header("Authorization", format!("Bearer {}", token.expose())),
            None => request,
        }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ConvertError> {
        send_with_retry(
            self.transport.as_ref(),
            &request,
            &self.retry,
            &self.cancel,
            github_rate_limit,
        )
        .await
    }

    fn check_status(
        &self,
        response: &HttpResponse,
        repository: &RepositoryRef,
        what: &str,
    ) -> Result<(), ConvertError> {
        match response.status {
            status if (200..300).contains(&status) => Ok(()),
            404 => Err(ConvertError::RepositoryNotFound(format!(
                "{} ({what} not found; check the URL, or provide a token for private repositories)",
                repository.display_name()
            ))),
            401 | 403 => Err(ConvertError::AuthRequired(match self.credential {
                Some(_) => format!(
                    "GitHub rejected the supplied token for {}; check its scopes",
                    repository.display_name()
                ),
                None => format!(
                    "{} requires a GitHub token",
                    repository.display_name()
                ),
            })),
            status => Err(ConvertError::Upstream {
                status,
                url: format!("{API_BASE} ({what})"),
            }),
        }
    }

    async fn get_tree(
        &self,
        repository: &RepositoryRef,
        tree: &str,
        recursive: bool,
    ) -> Result<TreeResponse, ConvertError> {
        // branch names with slashes stay literal path segments
        let segments = [
            "repos",
            repository.owner.as_str(),
            repository.repository.as_str(),
            "git",
            "trees",
        ]
        .into_iter()
        .chain(tree.split('/'));
        let mut url = endpoint(API_BASE, segments)?;
        if recursive {
            url.query_pairs_mut().append_pair("recursive", "1");
        }
        let response = self.send(self.request(url, ACCEPT_JSON)).await?;
        self.check_status(&response, repository, "tree")?;
        response.json()
    }

    // Breadth-first walk with one non-recursive call per directory.
    async fn walk_tree(
        &self,
        repository: &RepositoryRef,
        root_sha: &str,
    ) -> Result<Vec<TreeEntry>, ConvertError> {
        let mut entries = Vec::new();
        let mut pending = VecDeque::from([(String::new(), root_sha.to_string())]);
        while let Some((prefix, sha)) = pending.pop_front() {
            let listing = self.get_tree(repository, &sha, false).await?;
            if listing.truncated {
                warn!(
                    repo = %repository.display_name(),
                    directory = %prefix,
                    "Directory listing truncated by GitHub; some entries may be missing"
                );
            }
            for item in listing.tree {
                if let Some(entry) = item.into_entry(&prefix) {
                    if !entry.is_file() {
                        pending.push_back((entry.path.clone(), entry.id.clone()));
                    }
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    fn raw_url(&self, resolved: &ResolvedRef, path: &str) -> Result<reqwest::Url, ConvertError> {
        let repository = &resolved.repository;
        let segments = [repository.owner.as_str(), repository.repository.as_str()]
            .into_iter()
            .chain(resolved.reference.name.split('/'))
            .chain(path.split('/'));
        endpoint(RAW_BASE, segments)
    }
}

#[async_trait]
impl Provider for GitHubProvider {
    async fn resolve_ref(&self, repository: &RepositoryRef) -> Result<ResolvedRef, ConvertError> {
        if let Some(reference) = &repository.reference {
            return Ok(ResolvedRef {
                repository: repository.clone(),
                reference: reference.clone(),
            });
        }

        let url = endpoint(
            API_BASE,
            ["repos", repository.owner.as_str(), repository.repository.as_str()],
        )?;
        let response = self.send(self.request(url, ACCEPT_JSON)).await?;
        self.check_status(&response, repository, "repository")?;
        let metadata: RepositoryMetadata = response.json()?;
        info!(
            repo = %repository.display_name(),
            branch = %metadata.default_branch,
            "[LIST] Resolved default branch"
        );
        Ok(ResolvedRef {
            repository: repository.clone(),
            reference: GitRef::branch(metadata.default_branch),
        })
    }

    async fn list_tree(&self, resolved: &ResolvedRef) -> Result<Vec<TreeEntry>, ConvertError> {
        let repository = &resolved.repository;
        let listing = self
            .get_tree(repository, &resolved.reference.name, true)
            .await?;

        if !listing.truncated {
            let entries: Vec<TreeEntry> = listing
                .tree
                .into_iter()
                .filter_map(|item| item.into_entry(""))
                .collect();
            info!(repo = %repository.display_name(), entries = entries.len(), "[LIST] Listed tree");
            return Ok(entries);
        }

        warn!(
            repo = %repository.display_name(),
            "[LIST] Recursive tree truncated, walking directories individually"
        );
        let entries = self.walk_tree(repository, &listing.sha).await?;
        info!(repo = %repository.display_name(), entries = entries.len(), "[LIST] Listed tree by walking");
        Ok(entries)
    }

    async fn fetch_content(
        &self,
        entry: &TreeEntry,
        resolved: &ResolvedRef,
        max_file_size: u64,
    ) -> Result<RetrievedFile, ConvertError> {
        if let Some(skipped) = skip_before_download(entry, max_file_size) {
            return Ok(skipped);
        }

        let raw = self
            .send(self.request(self.raw_url(resolved, &entry.path)?, "*/*"))
            .await?;
        if raw.is_success() {
            return Ok(classify_download(entry, raw.body, max_file_size));
        }
        if !matches!(raw.status, 401 | 403 | 404) {
            return Err(ConvertError::Upstream {
                status: raw.status,
                url: RAW_BASE.to_string(),
            });
        }

        debug!(path = %entry.path, status = raw.status, "[FETCH] Raw host refused, using blobs API");
        let repository = &resolved.repository;
        let url = endpoint(
            API_BASE,
            [
                "repos",
                repository.owner.as_str(),
                repository.repository.as_str(),
                "git",
                "blobs",
                entry.id.as_str(),
            ],
        )?;
        let blob = self.send(self.request(url, ACCEPT_RAW)).await?;
        self.check_status(&blob, repository, "blob")?;
        Ok(classify_download(entry, blob.body, max_file_size))
    }
}

/// 429, or 403 carrying GitHub's primary/secondary rate-limit markers.
fn github_rate_limit(response: &HttpResponse, now: SystemTime) -> Option<RateLimited> {
    let limited = match response.status {
        429 => true,
        403 => {
            response.header("x-ratelimit-remaining") == Some("0")
                || response.header("retry-after").is_some()
                || String::from_utf8_lossy(&response.body)
                    .to_ascii_lowercase()
                    .contains("rate limit")
        }
        _ => false,
    };
    if !limited {
        return None;
    }
    let wait = retry_after(response).or_else(|| {
        let reset = response.header("x-ratelimit-reset")?.trim().parse::<u64>().ok()?;
        let reset_at = UNIX_EPOCH + Duration::from_secs(reset);
        Some(reset_at.duration_since(now).unwrap_or(Duration::ZERO))
    });
    Some(RateLimited { wait })
}
