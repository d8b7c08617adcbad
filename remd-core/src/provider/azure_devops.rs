//! Azure DevOps REST provider.
//!
//! All calls go to `https://dev.azure.com/{org}/{project}/_apis/git/repositories/{repo}`,
//! which also serves organizations still reachable under `{org}.visualstudio.com`.
//! The items listing is paginated with the `x-ms-continuationtoken` response
//! header; content is fetched per blob object id.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Url;
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

pub const API_BASE: &str = "https://dev.azure.com";
const API_VERSION: &str = "7.1";
const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";
const FALLBACK_BRANCH: &str = "main";

pub struct AzureDevOpsProvider {
    transport: Arc<dyn HttpTransport>,
    credential: Option<Credential>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryMetadata {
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemsPage {
    #[serde(default)]
    value: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    object_id: String,
    path: String,
    #[serde(default)]
    is_folder: bool,
    size: Option<u64>,
    content_metadata: Option<ContentMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentMetadata {
    #[serde(default)]
    is_binary: bool,
}

impl Item {
    fn into_entry(self) -> Option<TreeEntry> {
        let path = self.path.trim_start_matches('/');
        if path.is_empty() {
            return None;
        }
        if self.is_folder {
            return Some(TreeEntry::directory(path, self.object_id));
        }
        let mut entry = TreeEntry::file(path, self.object_id, self.size);
        entry.binary_hint = self.content_metadata.map(|m| m.is_binary).unwrap_or(false);
        Some(entry)
    }
}

impl AzureDevOpsProvider {
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

    fn repository_url(
        &self,
        repository: &RepositoryRef,
        rest: &[&str],
    ) -> Result<Url, ConvertError> {
        let project = repository.project.as_deref().ok_or_else(|| {
            ConvertError::InvalidUrl(format!(
                "Azure DevOps repository {} has no project",
                repository.display_name()
            ))
        })?;
        let segments = [
            repository.owner.as_str(),
            project,
            "_apis",
            "git",
            "repositories",
            repository.repository.as_str(),
        ]
        .into_iter()
        .chain(rest.iter().copied());
        let mut url = endpoint(API_BASE, segments)?;
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        Ok(url)
    }

    fn request(&self, url: Url, accept: &str) -> HttpRequest {
        let request = HttpRequest::get(url).header("Accept", accept);
        match &self.credential {
            // PATs go in as the password of an empty user name.
            Some(pat) => request.header(
                "Authorization",
                format!("Basic {}", STANDARD.encode(format!(":{}", pat.expose()))),
            ),
            None => request,
        }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ConvertError> {
        send_with_retry(
            self.transport.as_ref(),
            &request,
            &self.retry,
            &self.cancel,
            azure_rate_limit,
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
            // 203 is the sign-in page served to anonymous callers
            203 | 401 | 403 => Err(ConvertError::AuthRequired(match self.credential {
                Some(_) => format!(
                    "Azure DevOps rejected the supplied PAT for {}; check that it grants Code (Read)",
                    repository.display_name()
                ),
                None => format!(
                    "{} requires an Azure DevOps personal access token",
                    repository.display_name()
                ),
            })),
            status if (200..300).contains(&status) => Ok(()),
            404 => Err(ConvertError::RepositoryNotFound(format!(
                "{} ({what} not found; check the URL, or provide a PAT for private repositories)",
                repository.display_name()
            ))),
            status => Err(ConvertError::Upstream {
                status,
                url: format!("{API_BASE} ({what})"),
            }),
        }
    }
}

#[async_trait]
impl Provider for AzureDevOpsProvider {
    async fn resolve_ref(&self, repository: &RepositoryRef) -> Result<ResolvedRef, ConvertError> {
        if let Some(reference) = &repository.reference {
            return Ok(ResolvedRef {
                repository: repository.clone(),
                reference: reference.clone(),
            });
        }

        let url = self.repository_url(repository, &[])?;
        let response = self.send(self.request(url, "application/json")).await?;
        self.check_status(&response, repository, "repository")?;
        let metadata: RepositoryMetadata = response.json()?;
        let branch = metadata
            .default_branch
            .as_deref()
            .map(|b| b.trim_start_matches("refs/heads/"))
            .filter(|b| !b.is_empty())
            .unwrap_or(FALLBACK_BRANCH)
            .to_string();
        info!(repo = %repository.display_name(), branch = %branch, "[LIST] Resolved default branch");
        Ok(ResolvedRef {
            repository: repository.clone(),
            reference: GitRef::branch(branch),
        })
    }

    async fn list_tree(&self, resolved: &ResolvedRef) -> Result<Vec<TreeEntry>, ConvertError> {
        let repository = &resolved.repository;
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut url = self.repository_url(repository, &["items"])?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("scopePath", "/")
                    .append_pair("recursionLevel", "Full")
                    .append_pair("includeContentMetadata", "true")
                    .append_pair("versionDescriptor.version", &resolved.reference.name)
                    .append_pair(
                        "versionDescriptor.versionType",
                        resolved.reference.kind.as_version_type(),
                    );
                if let Some(token) = &continuation {
                    query.append_pair("continuationToken", token);
                }
            }

            let response = self.send(self.request(url, "application/json")).await?;
            self.check_status(&response, repository, "items")?;
            let page: ItemsPage = response.json()?;
            pages += 1;
            debug!(page = pages, items = page.value.len(), "[LIST] Received items page");
            entries.extend(page.value.into_iter().filter_map(Item::into_entry));

            let next = response
                .header(CONTINUATION_HEADER)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            match next {
                Some(token) if continuation.as_deref() == Some(token.as_str()) => {
                    warn!(repo = %repository.display_name(), "[LIST] Continuation token repeated, stopping pagination");
                    break;
                }
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        info!(repo = %repository.display_name(), entries = entries.len(), pages, "[LIST] Listed items");
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

        let mut url = self.repository_url(&resolved.repository, &["blobs", entry.id.as_str()])?;
        url.query_pairs_mut().append_pair("$format", "octetstream");
        let response = self
            .send(self.request(url, "application/octet-stream"))
            .await?;
        self.check_status(&response, &resolved.repository, "blob")?;
        Ok(classify_download(entry, response.body, max_file_size))
    }
}

fn azure_rate_limit(response: &HttpResponse, _now: SystemTime) -> Option<RateLimited> {
    (response.status == 429).then(|| RateLimited {
        wait: retry_after(response),
    })
}
