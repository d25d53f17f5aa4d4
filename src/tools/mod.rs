//! External collaborators
//!
//! The build core only talks to the outside world through these traits:
//!
//! | Trait | Default implementation | Used by |
//! |-------|------------------------|---------|
//! | [`ArtifactResolver`] | [`MavenResolver`] | resolve stage |
//! | [`Fetcher`] | [`HttpFetcher`] | fetch stage |
//! | [`ProgramRunner`] | [`JavaToolchain`] | generate stage |
//! | [`Compiler`] | [`JavaToolchain`] | compile stage |
//! | [`Archiver`] | [`JarTool`] / [`TarArchiver`] | package stage |

pub mod archive;
pub mod http;
pub mod java;
pub mod maven;

pub use archive::{JarTool, TarArchiver};
pub use http::HttpFetcher;
pub use java::JavaToolchain;
pub use maven::MavenResolver;

use crate::config::schema::{ArchiveFormat, Config};
use crate::error::GristResult;
use crate::stage::{ArchiveMode, ArtifactConstraint, FileSet};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Maps an artifact constraint to local file paths
#[async_trait]
pub trait ArtifactResolver: Send + Sync {
    async fn resolve(&self, constraint: &ArtifactConstraint) -> GristResult<Vec<PathBuf>>;
}

/// HTTP cache validators remembered from the previous download
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Result of a (conditional) fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The destination was (re)written
    Downloaded { validators: Validators, bytes: u64 },
    /// The resource did not change; the destination was left alone
    NotModified,
}

/// Materializes a URL into a local file
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` to `dest`. When `validators` are given and the remote
    /// is unchanged, returns [`FetchOutcome::NotModified`].
    async fn fetch(
        &self,
        url: &Url,
        dest: &Path,
        validators: Option<&Validators>,
    ) -> GristResult<FetchOutcome>;
}

/// Exit status and diagnostics of an external tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stderr: String,
}

impl ToolStatus {
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// "exit code N: <last stderr line>" style summary
    pub fn describe(&self) -> String {
        let code = match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        match self.stderr.trim() {
            "" => code,
            stderr => format!("{}: {}", code, stderr),
        }
    }
}

/// Runs a JVM main class
#[async_trait]
pub trait ProgramRunner: Send + Sync {
    async fn run(
        &self,
        working_dir: &Path,
        classpath: &[PathBuf],
        main_class: &str,
        args: &[String],
    ) -> GristResult<ToolStatus>;
}

/// Compiles source files into an output directory
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(
        &self,
        sources: &[PathBuf],
        classpath: &[PathBuf],
        source_roots: &[PathBuf],
        output_dir: &Path,
    ) -> GristResult<ToolStatus>;
}

/// Bundles files into an archive
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Archive every file of `files` (root → files under that root) into
    /// `dest`, entries named relative to their root.
    async fn archive(&self, mode: ArchiveMode, dest: &Path, files: &FileSet)
        -> GristResult<PathBuf>;

    /// File extension of produced archives
    fn extension(&self) -> &'static str;
}

/// The set of collaborators the standard stages are wired with
#[derive(Clone)]
pub struct Toolbox {
    pub resolver: Arc<dyn ArtifactResolver>,
    pub fetcher: Arc<dyn Fetcher>,
    pub runner: Arc<dyn ProgramRunner>,
    pub compiler: Arc<dyn Compiler>,
    pub archiver: Arc<dyn Archiver>,
}

impl Toolbox {
    /// Real collaborators, configured from `config`
    pub fn from_config(config: &Config, repository_dir: &Path) -> GristResult<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.general.http_timeout_secs));
        let resolver = Arc::new(MavenResolver::new(
            &config.maven.repository,
            repository_dir.to_path_buf(),
            fetcher.clone(),
        )?);
        let java = Arc::new(JavaToolchain::from_config(&config.java));
        let archiver: Arc<dyn Archiver> = match config.packaging.format {
            ArchiveFormat::Jar => Arc::new(JarTool::new(config.java.jar.clone())),
            ArchiveFormat::Tar => Arc::new(TarArchiver::new(false)),
            ArchiveFormat::TarGz => Arc::new(TarArchiver::new(true)),
        };

        Ok(Self {
            resolver,
            fetcher,
            runner: java.clone(),
            compiler: java,
            archiver,
        })
    }
}

/// Join paths with the platform's classpath separator
pub(crate) fn join_classpath(paths: &[PathBuf]) -> String {
    let separator = if cfg!(windows) { ";" } else { ":" };
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(separator)
}
