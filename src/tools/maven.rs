//! Maven repository resolution
//!
//! Resolves a single artifact (no transitive POM walk) against a Maven 2
//! layout repository. Version ranges use Maven syntax and are matched
//! against the versions listed in `maven-metadata.xml`.

use crate::error::{GristError, GristResult};
use crate::stage::ArtifactConstraint;
use crate::tools::{ArtifactResolver, Fetcher, HttpFetcher};
use async_trait::async_trait;
use regex::Regex;
use semver::{Version, VersionReq};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};
use url::Url;

static VERSION_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<version>\s*([^<\s]+)\s*</version>").expect("version tag pattern is valid")
});

/// Resolver backed by a remote (or `file://`) Maven repository and a local
/// download directory
pub struct MavenResolver {
    repository: Url,
    local_repo: PathBuf,
    fetcher: Arc<HttpFetcher>,
}

impl MavenResolver {
    pub fn new(repository: &str, local_repo: PathBuf, fetcher: Arc<HttpFetcher>) -> GristResult<Self> {
        // Url::join replaces the last segment unless the base ends with '/'
        let normalized = if repository.ends_with('/') {
            repository.to_string()
        } else {
            format!("{}/", repository)
        };
        let repository = Url::parse(&normalized).map_err(|e| GristError::InvalidUrl {
            url: repository.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            repository,
            local_repo,
            fetcher,
        })
    }

    fn artifact_base(&self, constraint: &ArtifactConstraint) -> String {
        format!(
            "{}/{}",
            constraint.group.replace('.', "/"),
            constraint.artifact
        )
    }

    fn join(&self, constraint: &ArtifactConstraint, path: &str) -> GristResult<Url> {
        self.repository
            .join(path)
            .map_err(|e| resolution_failure(constraint, e))
    }

    /// Pick the concrete version satisfying the constraint
    async fn select_version(&self, constraint: &ArtifactConstraint) -> GristResult<String> {
        let Some(requirement) = parse_range(&constraint.version)
            .map_err(|reason| resolution_failure(constraint, reason))?
        else {
            return Ok(constraint.version.trim().to_string());
        };

        let metadata_url = self.join(
            constraint,
            &format!("{}/maven-metadata.xml", self.artifact_base(constraint)),
        )?;
        debug!("Reading {}", metadata_url);

        let metadata = self
            .fetcher
            .get_text(&metadata_url)
            .await
            .map_err(|e| resolution_failure(constraint, e))?;

        let versions = list_versions(&metadata);
        if versions.is_empty() {
            return Err(resolution_failure(
                constraint,
                format!("{} lists no versions", metadata_url),
            ));
        }

        newest_matching(&versions, &requirement).ok_or_else(|| {
            resolution_failure(
                constraint,
                format!("no published version satisfies {}", requirement),
            )
        })
    }
}

#[async_trait]
impl ArtifactResolver for MavenResolver {
    async fn resolve(&self, constraint: &ArtifactConstraint) -> GristResult<Vec<PathBuf>> {
        let version = self.select_version(constraint).await?;
        let file_name = match &constraint.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                constraint.artifact, version, classifier, constraint.extension
            ),
            None => format!("{}-{}.{}", constraint.artifact, version, constraint.extension),
        };
        let relative = format!("{}/{}/{}", self.artifact_base(constraint), version, file_name);

        let local = self.local_repo.join(&relative);
        if local.is_file() {
            debug!("Using local copy {}", local.display());
            return Ok(vec![local]);
        }

        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| resolution_failure(constraint, e))?;
        }

        let remote = self.join(constraint, &relative)?;
        info!("Downloading {}", remote);
        self.fetcher
            .fetch(&remote, &local, None)
            .await
            .map_err(|e| resolution_failure(constraint, e))?;

        Ok(vec![local])
    }
}

/// All `<version>` values listed in a metadata document
fn list_versions(metadata: &str) -> Vec<String> {
    VERSION_TAG
        .captures_iter(metadata)
        .map(|c| c[1].to_string())
        .collect()
}

fn newest_matching(versions: &[String], requirement: &VersionReq) -> Option<String> {
    versions
        .iter()
        .filter_map(|raw| to_semver(raw).map(|v| (v, raw)))
        .filter(|(v, _)| requirement.matches(v))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, raw)| raw.clone())
}

/// Interpret a Maven version as semver, padding missing components
///
/// `4.0` becomes `4.0.0`; a qualifier (`4.0-rc-1`) becomes a pre-release.
/// Versions with more than three numeric components are not comparable.
fn to_semver(raw: &str) -> Option<Version> {
    let (core, qualifier) = match raw.split_once('-') {
        Some((core, qualifier)) => (core, Some(qualifier)),
        None => (raw, None),
    };

    let mut parts: Vec<u64> = Vec::new();
    for part in core.split('.') {
        parts.push(part.parse().ok()?);
    }
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    parts.resize(3, 0);

    let text = match qualifier {
        Some(q) => format!("{}.{}.{}-{}", parts[0], parts[1], parts[2], q),
        None => format!("{}.{}.{}", parts[0], parts[1], parts[2]),
    };
    Version::parse(&text).ok()
}

/// Translate a Maven version spec into a requirement
///
/// Returns `Ok(None)` for a plain version, which is used verbatim.
fn parse_range(spec: &str) -> Result<Option<VersionReq>, String> {
    let spec = spec.trim();
    if !spec.starts_with('[') && !spec.starts_with('(') {
        if spec.is_empty() {
            return Err("empty version".to_string());
        }
        return Ok(None);
    }

    let lower_inclusive = spec.starts_with('[');
    let upper_inclusive = match spec.chars().last() {
        Some(']') => true,
        Some(')') => false,
        _ => return Err(format!("unterminated version range '{}'", spec)),
    };
    let inner = &spec[1..spec.len() - 1];
    if inner.contains(['[', ']', '(', ')']) {
        return Err(format!("multiple version ranges are not supported: '{}'", spec));
    }

    let padded = |v: &str| {
        to_semver(v.trim()).ok_or_else(|| format!("unsupported version '{}'", v.trim()))
    };

    let comparators = match inner.split_once(',') {
        None => {
            if !(lower_inclusive && upper_inclusive) {
                return Err(format!("invalid exact version range '{}'", spec));
            }
            vec![format!("={}", padded(inner)?)]
        }
        Some((lower, upper)) => {
            let mut comparators = Vec::new();
            if !lower.trim().is_empty() {
                let op = if lower_inclusive { ">=" } else { ">" };
                comparators.push(format!("{}{}", op, padded(lower)?));
            }
            if !upper.trim().is_empty() {
                let op = if upper_inclusive { "<=" } else { "<" };
                comparators.push(format!("{}{}", op, padded(upper)?));
            }
            comparators
        }
    };

    if comparators.is_empty() {
        return Ok(Some(VersionReq::STAR));
    }
    VersionReq::parse(&comparators.join(", "))
        .map(Some)
        .map_err(|e| e.to_string())
}

fn resolution_failure(constraint: &ArtifactConstraint, reason: impl ToString) -> GristError {
    GristError::ResolutionFailure {
        constraint: constraint.to_string(),
        reason: reason.to_string(),
    }
}
