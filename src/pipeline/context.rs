//! Per-request execution context

use crate::error::{GristError, GristResult};
use crate::store::{sanitize_component, short_hash};
use std::path::{Path, PathBuf};
use url::Url;

/// Scope and working directory of one top-level build request
///
/// Both derive only from (language, grammar URL, parser package), so
/// repeating a request lands in the same directory and finds its earlier
/// results, while requests that would generate different sources never
/// share files. The directory is kept after the build since it also holds
/// the default outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    language: String,
    scope: String,
    work_dir: PathBuf,
}

impl ExecutionContext {
    pub fn new(work_root: &Path, language: &str, grammar_url: &Url, package: &str) -> Self {
        let language = sanitize_component(language.trim());
        let identity = format!("{}\n{}", grammar_url, package);
        let scope = format!("{}-{}", language, short_hash(&identity));
        let work_dir = work_root.join(&scope);

        Self {
            language,
            scope,
            work_dir,
        }
    }

    /// Language name, safe for use in file names
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Store namespace for request-bound stages
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Where a fetched resource is placed: its URL path under the work dir
    pub fn download_path(&self, url: &Url) -> PathBuf {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty() && *s != "." && *s != "..")
                    .collect()
            })
            .unwrap_or_default();

        if segments.is_empty() {
            return self.work_dir.join("download");
        }
        segments
            .iter()
            .fold(self.work_dir.clone(), |path, segment| path.join(segment))
    }

    /// Root of generated sources
    pub fn source_dir(&self) -> PathBuf {
        self.work_dir.join("src")
    }

    /// Directory for sources of a Java package (the source root when empty)
    pub fn package_dir(&self, package: &str) -> PathBuf {
        package
            .split('.')
            .filter(|part| !part.is_empty())
            .fold(self.source_dir(), |path, part| path.join(part))
    }

    /// Default class output directory
    pub fn default_target_dir(&self) -> PathBuf {
        self.work_dir.join("bin")
    }

    /// Default archive location
    pub fn default_archive(&self, extension: &str) -> PathBuf {
        self.work_dir
            .join(format!("parse-{}.{}", self.language, extension))
    }
}

/// Accept an empty package or dot-separated Java identifiers
pub fn check_package(package: &str) -> GristResult<()> {
    if package.is_empty() || package.split('.').all(is_java_identifier) {
        return Ok(());
    }
    Err(GristError::User(format!(
        "invalid parser package '{}': expected dot-separated Java identifiers",
        package
    )))
}

fn is_java_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
