//! Build stages
//!
//! A stage has a declared, serializable input, an action, and a cacheable
//! output. Stages are written against the typed [`Stage`] trait; the
//! executor and registry see them through the type-erased [`StageBuilder`]
//! so that a persisted entry can be re-dispatched by its [`StageKind`]
//! alone.

pub mod compile;
pub mod fetch;
pub mod generate;
pub mod package;
pub mod resolve;

pub use compile::{CompileInput, CompileSources, CompiledUnits};
pub use fetch::{FetchInput, FetchResource, FetchedResource};
pub use generate::{GenerateInput, GenerateSources, GeneratedSources};
pub use package::{ArchiveMode, FileSet, PackageArchive, PackageInput, PackagedArchive};
pub use resolve::{ArtifactConstraint, ResolveArtifacts, ResolveInput, ResolvedArtifacts};

use crate::error::{GristError, GristResult};
use crate::origin::{Origin, OriginToken};
use crate::staleness::StalenessWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Stage types known to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    /// Map an artifact constraint to local jar paths
    ResolveArtifacts,
    /// Materialize a URL into a local file
    FetchResource,
    /// Run a code generator on the JVM
    GenerateSources,
    /// Compile generated sources
    CompileSources,
    /// Bundle compiled outputs into an archive
    PackageArchive,
}

impl StageKind {
    /// Stable identifier used in cache keys and store paths
    pub fn id(&self) -> &'static str {
        match self {
            Self::ResolveArtifacts => "resolve-artifacts",
            Self::FetchResource => "fetch-resource",
            Self::GenerateSources => "generate-sources",
            Self::CompileSources => "compile-sources",
            Self::PackageArchive => "package-archive",
        }
    }

    /// All stage kinds in pipeline order
    pub fn all() -> &'static [Self] {
        &[
            Self::ResolveArtifacts,
            Self::FetchResource,
            Self::GenerateSources,
            Self::CompileSources,
            Self::PackageArchive,
        ]
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// A typed build stage
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    /// Everything the stage needs; equal inputs must yield equivalent outputs
    type Input: Serialize + DeserializeOwned + Send + Sync;

    /// What the stage produces
    type Output: Serialize + DeserializeOwned + Send + Sync;

    const KIND: StageKind;

    /// Whether outputs are artifacts at a stable, caller-visible location
    const PERSISTED: bool = false;

    /// Store namespace; defaults to the request scope
    fn namespace(&self, _input: &Self::Input, scope: &str) -> String {
        scope.to_string()
    }

    /// How long a result may be reused without re-running
    fn window(&self, _input: &Self::Input) -> StalenessWindow {
        StalenessWindow::Never
    }

    /// Upstream origin tokens embedded in the input
    fn upstream(&self, _input: &Self::Input) -> Origin {
        Origin::none()
    }

    /// One-line summary for logs and errors
    fn describe(&self, input: &Self::Input) -> String;

    /// Whether a cached output is still usable (e.g. its files still exist)
    fn is_intact(&self, _output: &Self::Output) -> bool {
        true
    }

    /// Run the stage. `previous` is the last recorded output for the same
    /// input, if any, for conditional re-validation.
    async fn build(
        &self,
        input: &Self::Input,
        previous: Option<&Self::Output>,
    ) -> GristResult<Self::Output>;
}

/// Type-erased stage, as stored in the registry
#[async_trait]
pub trait StageBuilder: Send + Sync {
    fn kind(&self) -> StageKind;

    fn persisted(&self) -> bool;

    fn namespace(&self, input: &Value, scope: &str) -> GristResult<String>;

    fn window(&self, input: &Value) -> GristResult<StalenessWindow>;

    fn upstream(&self, input: &Value) -> GristResult<Origin>;

    fn describe(&self, input: &Value) -> String;

    fn is_intact(&self, output: &Value) -> bool;

    async fn build(&self, input: &Value, previous: Option<&Value>) -> GristResult<Value>;
}

/// Adapter exposing a typed [`Stage`] as a [`StageBuilder`]
pub struct Erased<S>(pub S);

#[async_trait]
impl<S: Stage> StageBuilder for Erased<S> {
    fn kind(&self) -> StageKind {
        S::KIND
    }

    fn persisted(&self) -> bool {
        S::PERSISTED
    }

    fn namespace(&self, input: &Value, scope: &str) -> GristResult<String> {
        let input: S::Input = serde_json::from_value(input.clone())?;
        Ok(self.0.namespace(&input, scope))
    }

    fn window(&self, input: &Value) -> GristResult<StalenessWindow> {
        let input: S::Input = serde_json::from_value(input.clone())?;
        Ok(self.0.window(&input))
    }

    fn upstream(&self, input: &Value) -> GristResult<Origin> {
        let input: S::Input = serde_json::from_value(input.clone())?;
        Ok(self.0.upstream(&input))
    }

    fn describe(&self, input: &Value) -> String {
        match serde_json::from_value::<S::Input>(input.clone()) {
            Ok(input) => self.0.describe(&input),
            Err(_) => format!("{} (undecodable input)", S::KIND),
        }
    }

    fn is_intact(&self, output: &Value) -> bool {
        serde_json::from_value::<S::Output>(output.clone())
            .map(|output| self.0.is_intact(&output))
            .unwrap_or(false)
    }

    async fn build(&self, input: &Value, previous: Option<&Value>) -> GristResult<Value> {
        let input: S::Input = serde_json::from_value(input.clone())?;
        // A previous output that no longer decodes is simply ignored
        let previous: Option<S::Output> =
            previous.and_then(|value| serde_json::from_value(value.clone()).ok());

        let output = self.0.build(&input, previous.as_ref()).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// A stage result together with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Built<T> {
    pub value: T,

    /// Token of the execution that produced `value`
    pub origin: OriginToken,

    pub produced_at: DateTime<Utc>,

    /// True when served from the store without running the stage
    pub cached: bool,

    /// True when `value` refers to an artifact that outlives the process
    pub persisted: bool,
}

impl<T> Built<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Built<U> {
        Built {
            value: f(self.value),
            origin: self.origin,
            produced_at: self.produced_at,
            cached: self.cached,
            persisted: self.persisted,
        }
    }

    /// This result's token as an origin for a downstream input
    pub fn as_origin(&self) -> Origin {
        Origin::of(self.origin)
    }
}

/// All files under `root` whose name ends with `suffix`, sorted
pub(crate) fn list_files_with_suffix(root: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().ends_with(suffix))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Delete the files under `root` whose name ends with `suffix`
///
/// Clears what an earlier run left behind before a stage writes into a
/// directory it shares with that run.
pub(crate) async fn remove_files_with_suffix(root: &Path, suffix: &str) -> GristResult<usize> {
    let stale = list_files_with_suffix(root, suffix);
    for file in &stale {
        match tokio::fs::remove_file(file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(GristError::io(format!("removing {}", file.display()), e)),
        }
    }
    Ok(stale.len())
}
