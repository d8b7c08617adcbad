//! # contract: data model and the provider interface
//!
//! This module defines the values that flow through a conversion run and the
//! single capability interface ([`Provider`]) that hides the two hosting APIs.
//!
//! ## Interface & Extensibility
//! - Implement [`Provider`] to support another host. The orchestrator only ever
//!   talks to `dyn Provider`; host differences (pagination, auth header shape,
//!   tree truncation) stay inside the implementation.
//! - All provider methods are async and return [`ConvertError`] on failure.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall` so the pipeline can be exercised with
//!   canned trees and file payloads (`MockProvider`).
//!
//! ## Lifecycle
//! - [`RepositoryRef`] is produced by the URL parser and never mutated.
//! - [`TreeEntry`] values come from [`Provider::list_tree`] and are read-only downstream.
//! - [`RetrievedFile`] values come from [`Provider::fetch_content`] and are consumed
//!   by the tree builder and renderer.

use std::fmt;

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;

use crate::error::ConvertError;

/// The hosting platform a repository lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    GitHub,
    AzureDevOps,
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKind::GitHub => f.write_str("GitHub"),
            HostKind::AzureDevOps => f.write_str("Azure DevOps"),
        }
    }
}

/// What a ref name points at. Azure DevOps needs this to build its version
/// descriptor; GitHub resolves any name and always uses `Branch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Branch,
    Tag,
    Commit,
}

impl RefKind {
    /// Value for Azure DevOps' `versionDescriptor.versionType`.
    pub fn as_version_type(&self) -> &'static str {
        match self {
            RefKind::Branch => "branch",
            RefKind::Tag => "tag",
            RefKind::Commit => "commit",
        }
    }
}

/// A branch, tag or commit selecting a repository snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitRef {
    pub name: String,
    pub kind: RefKind,
}

impl GitRef {
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RefKind::Branch,
        }
    }
}

/// Structured coordinates of a repository, as parsed from its URL.
///
/// `project` is `Some` exactly when `host` is [`HostKind::AzureDevOps`]; the
/// constructors are the only way the parser builds one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryRef {
    pub host: HostKind,
    /// GitHub owner or Azure DevOps organization.
    pub owner: String,
    pub project: Option<String>,
    pub repository: String,
    /// `None` means "the repository's default branch".
    pub reference: Option<GitRef>,
}

impl RepositoryRef {
    pub fn github(owner: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            host: HostKind::GitHub,
            owner: owner.into(),
            project: None,
            repository: repository.into(),
            reference: None,
        }
    }

    pub fn azure_devops(
        organization: impl Into<String>,
        project: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            host: HostKind::AzureDevOps,
            owner: organization.into(),
            project: Some(project.into()),
            repository: repository.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: GitRef) -> Self {
        self.reference = Some(reference);
        self
    }

    /// `owner/repo`, used as the document title and in log fields.
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }
}

/// A bearer token (GitHub) or personal access token (Azure DevOps).
///
/// Supplied per invocation and never persisted or logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for blank input so an empty env var means "anonymous".
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// A repository reference whose ref has been pinned to a concrete name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub repository: RepositoryRef,
    pub reference: GitRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One path of the listed tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    /// Forward-slash separated, relative to the repository root.
    pub path: String,
    pub kind: EntryKind,
    /// Byte size when the listing exposes it.
    pub size: Option<u64>,
    /// Content-addressed object id (git sha) used to fetch the blob.
    pub id: String,
    /// The host already flagged this blob as binary.
    pub binary_hint: bool,
}

impl TreeEntry {
    pub fn file(path: impl Into<String>, id: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size,
            id: id.into(),
            binary_hint: false,
        }
    }

    pub fn directory(path: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size: None,
            id: id.into(),
            binary_hint: false,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Text,
    Binary,
    Skipped,
}

/// Why a file's content is absent from the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge { size: u64, limit: u64 },
    BinaryDetected,
    FetchError { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooLarge { size, limit } => {
                write!(f, "file too large ({size} bytes, limit {limit} bytes)")
            }
            SkipReason::BinaryDetected => f.write_str("binary content"),
            SkipReason::FetchError { message } => write!(f, "fetch failed: {message}"),
        }
    }
}

/// A tree entry together with its fetched content (or the reason there is none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedFile {
    pub entry: TreeEntry,
    /// UTF-8 bytes for `Text`; always empty otherwise.
    pub content: Vec<u8>,
    pub encoding: Encoding,
    pub skip_reason: Option<SkipReason>,
}

impl RetrievedFile {
    pub fn text(entry: TreeEntry, content: Vec<u8>) -> Self {
        Self {
            entry,
            content,
            encoding: Encoding::Text,
            skip_reason: None,
        }
    }

    pub fn binary(entry: TreeEntry) -> Self {
        Self {
            entry,
            content: Vec::new(),
            encoding: Encoding::Binary,
            skip_reason: Some(SkipReason::BinaryDetected),
        }
    }

    pub fn skipped(entry: TreeEntry, reason: SkipReason) -> Self {
        if reason == SkipReason::BinaryDetected {
            return Self::binary(entry);
        }
        Self {
            entry,
            content: Vec::new(),
            encoding: Encoding::Skipped,
            skip_reason: Some(reason),
        }
    }

    pub fn path(&self) -> &str {
        &self.entry.path
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }

    /// The content as text; `None` unless the file is `Text`.
    pub fn text_content(&self) -> Option<&str> {
        match self.encoding {
            Encoding::Text => std::str::from_utf8(&self.content).ok(),
            Encoding::Binary | Encoding::Skipped => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Terminal artifact of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    #[serde(skip)]
    pub document: String,
    pub repository: String,
    pub reference: String,
    /// File entries that passed the filter.
    pub files_total: usize,
    pub files_included: usize,
    pub files_skipped: Vec<SkippedFile>,
}

/// One progress notification; `completed` never decreases and never exceeds `total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub path: String,
}

/// Capability interface over a repository host.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Pin the repository's ref, looking up the default branch when absent.
    async fn resolve_ref(&self, repository: &RepositoryRef) -> Result<ResolvedRef, ConvertError>;

    /// Every file and directory of the snapshot, following host pagination.
    async fn list_tree(&self, resolved: &ResolvedRef) -> Result<Vec<TreeEntry>, ConvertError>;

    /// Fetch one file. Oversized and binary files come back as skipped
    /// [`RetrievedFile`]s; `Err` means the call itself failed.
    async fn fetch_content(
        &self,
        entry: &TreeEntry,
        resolved: &ResolvedRef,
        max_file_size: u64,
    ) -> Result<RetrievedFile, ConvertError>;
}
