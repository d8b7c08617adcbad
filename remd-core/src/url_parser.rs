//! Classifies a repository URL into a host kind plus coordinates.
//!
//! Accepted shapes:
//! - `https://github.com/{owner}/{repo}`
//! - `https://github.com/{owner}/{repo}/tree/{ref...}` (ref may contain slashes)
//! - `https://dev.azure.com/{org}/{project}/_git/{repo}[?version=GB{branch}]`
//! - `https://{org}.visualstudio.com/[DefaultCollection/]{project}/_git/{repo}[?version=GB{branch}]`
//!
//! Trailing slashes and a `.git` suffix on the repository are ignored. No
//! network access happens here.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use reqwest::Url;
use tracing::debug;

use crate::contract::{GitRef, RefKind, RepositoryRef};
use crate::error::ConvertError;

const GITHUB_HOSTS: [&str; 2] = ["github.com", "www.github.com"];
const AZURE_HOST: &str = "dev.azure.com";
const VISUALSTUDIO_SUFFIX: &str = ".visualstudio.com";

pub fn parse(url: &str) -> Result<RepositoryRef, ConvertError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(ConvertError::InvalidUrl("URL is empty".to_string()));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|e| ConvertError::InvalidUrl(format!("{trimmed}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConvertError::InvalidUrl(format!(
            "unsupported scheme `{}` in {trimmed}",
            parsed.scheme()
        )));
    }

    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let segments: Vec<String> = match parsed.path_segments() {
        Some(segments) => segments
            .filter(|p| !p.is_empty())
            .map(|p| decode_segment(p, trimmed))
            .collect::<Result<_, _>>()?,
        None => Vec::new(),
    };

    let repository = if GITHUB_HOSTS.contains(&host.as_str()) {
        parse_github(&segments, trimmed)?
    } else if host == AZURE_HOST {
        parse_azure_devops(&segments, &parsed, trimmed)?
    } else if let Some(org) = host.strip_suffix(VISUALSTUDIO_SUFFIX) {
        if org.is_empty() || org.contains('.') {
            return Err(ConvertError::InvalidUrl(format!("unsupported host: {host}")));
        }
        let mut path = vec![org.to_string()];
        let rest = match segments.first() {
            Some(first) if first.eq_ignore_ascii_case("DefaultCollection") => &segments[1..],
            _ => &segments[..],
        };
        path.extend(rest.iter().cloned());
        parse_azure_devops(&path, &parsed, trimmed)?
    } else {
        return Err(ConvertError::InvalidUrl(format!("unsupported host: {host}")));
    };

    debug!(url = trimmed, repository = ?repository, "Parsed repository URL");
    Ok(repository)
}

// owner/repo[/tree/ref...]
fn parse_github(segments: &[String], raw: &str) -> Result<RepositoryRef, ConvertError> {
    let (owner, repo) = match segments {
        [owner, repo, ..] => (owner, strip_git_suffix(repo)),
        _ => {
            return Err(ConvertError::InvalidUrl(format!(
                "GitHub URL must include owner/repo: {raw}"
            )))
        }
    };
    if repo.is_empty() {
        return Err(ConvertError::InvalidUrl(format!(
            "GitHub URL has an empty repository name: {raw}"
        )));
    }

    let repository = RepositoryRef::github(owner.as_str(), repo);
    match &segments[2..] {
        [] => Ok(repository),
        [tree, reference @ ..] if tree == "tree" && !reference.is_empty() => {
            Ok(repository.with_reference(GitRef::branch(reference.join("/"))))
        }
        _ => Err(ConvertError::InvalidUrl(format!(
            "GitHub URL must be owner/repo or owner/repo/tree/<ref>: {raw}"
        ))),
    }
}

// org/project/_git/repo
fn parse_azure_devops(
    segments: &[String],
    url: &Url,
    raw: &str,
) -> Result<RepositoryRef, ConvertError> {
    let [org, project, marker, repo] = segments else {
        return Err(ConvertError::InvalidUrl(format!(
            "Azure DevOps URL must match org/project/_git/repo: {raw}"
        )));
    };
    let repo = strip_git_suffix(repo);
    if marker != "_git" || repo.is_empty() {
        return Err(ConvertError::InvalidUrl(format!(
            "Azure DevOps URL must match org/project/_git/repo: {raw}"
        )));
    }

    let repository = RepositoryRef::azure_devops(org.as_str(), project.as_str(), repo);
    Ok(match version_from_query(url) {
        Some(reference) => repository.with_reference(reference),
        None => repository,
    })
}

// `version=GBmain`, `version=GTv1.0`, `version=GC<sha>`
fn version_from_query(url: &Url) -> Option<GitRef> {
    let (_, version) = url.query_pairs().find(|(key, _)| key == "version")?;
    let kind = match version.get(..2)? {
        "GB" => RefKind::Branch,
        "GT" => RefKind::Tag,
        "GC" => RefKind::Commit,
        _ => return None,
    };
    let name = &version[2..];
    if name.is_empty() {
        return None;
    }
    Some(GitRef {
        name: name.to_string(),
        kind,
    })
}

fn strip_git_suffix(repo: &str) -> &str {
    repo.strip_suffix(".git").unwrap_or(repo)
}

fn decode_segment(segment: &str, raw: &str) -> Result<String, ConvertError> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|e| ConvertError::InvalidUrl(format!("{raw}: path segment `{segment}` is not UTF-8: {e}")))
}
