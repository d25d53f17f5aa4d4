//! Parser build pipeline
//!
//! Builds a packaged parser for a language from a remote grammar:
//!
//! ```text
//! resolve generator jars ──┐
//!                          ├─> generate sources ─> compile ─> package
//! fetch grammar ───────────┘
//! ```
//!
//! Each step is a required build through the [`Executor`]: it is reused when
//! its recorded result is fresh and re-run otherwise. Every step's input
//! embeds the origin tokens of the results it consumed, so re-running an
//! upstream step invalidates everything downstream of it. The first failure
//! aborts the request.

pub mod context;

pub use context::{check_package, ExecutionContext};

use crate::config::Config;
use crate::error::{GristError, GristResult};
use crate::executor::Executor;
use crate::stage::{
    list_files_with_suffix, ArchiveMode, ArtifactConstraint, Built, CompileInput, CompileSources,
    FetchInput, FetchResource, FileSet, GenerateInput, GenerateSources, PackageArchive,
    PackageInput, ResolveArtifacts, ResolveInput,
};
use crate::staleness::StalenessWindow;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// One "build a parser" request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserRequest {
    /// Language name; also names the grammar and the archive
    pub language: String,
    pub grammar_url: Url,
    /// Java package of the generated parser; empty for the default package
    pub package: String,
    /// Class output directory (default: `<work>/bin`)
    pub target_dir: Option<PathBuf>,
    /// Archive path (default: `<work>/parse-<language>.<ext>`)
    pub target_archive: Option<PathBuf>,
}

impl ParserRequest {
    pub fn new(language: impl Into<String>, grammar_url: Url) -> Self {
        Self {
            language: language.into(),
            grammar_url,
            package: String::new(),
            target_dir: None,
            target_archive: None,
        }
    }

    /// Build a request from a URL string, rejecting relative or malformed URLs
    pub fn parse(language: impl Into<String>, grammar_url: &str) -> GristResult<Self> {
        let url = Url::parse(grammar_url).map_err(|e| GristError::InvalidUrl {
            url: grammar_url.to_string(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(GristError::InvalidUrl {
                url: grammar_url.to_string(),
                reason: "URL has no path".to_string(),
            });
        }
        Ok(Self::new(language, url))
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn with_target_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.target_dir = dir;
        self
    }

    pub fn with_target_archive(mut self, archive: Option<PathBuf>) -> Self {
        self.target_archive = archive;
        self
    }
}

/// Deployment-wide pipeline parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Parser generator artifact
    pub generator: ArtifactConstraint,
    pub main_class: String,
    pub resolve_window: StalenessWindow,
    pub fetch_window: StalenessWindow,
    /// Parent of every request's working directory
    pub work_root: PathBuf,
    /// Extension of produced archives
    pub archive_extension: String,
}

impl PipelineSettings {
    pub fn from_config(config: &Config, work_root: PathBuf, archive_extension: &str) -> Self {
        Self {
            generator: config.antlr.constraint(),
            main_class: config.antlr.main_class.clone(),
            resolve_window: config.freshness.resolve_window(),
            fetch_window: config.freshness.fetch_window(),
            work_root,
            archive_extension: archive_extension.to_string(),
        }
    }
}

/// Builds parsers; cheap to share across concurrent requests
pub struct Pipeline {
    executor: Arc<Executor>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(executor: Arc<Executor>, settings: PipelineSettings) -> Self {
        Self { executor, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Build (or reuse) the parser archive for a request
    pub async fn build(&self, request: &ParserRequest) -> GristResult<Built<PathBuf>> {
        if request.language.trim().is_empty() {
            return Err(GristError::User("language name must not be empty".to_string()));
        }
        check_package(&request.package)?;

        let context = ExecutionContext::new(
            &self.settings.work_root,
            &request.language,
            &request.grammar_url,
            &request.package,
        );
        let scope = context.scope();
        info!(
            "Compile parser for {} from {} in {}",
            request.language,
            request.grammar_url,
            context.work_dir().display()
        );

        // 1) generator jars
        let jars = self
            .executor
            .require::<ResolveArtifacts>(
                scope,
                &ResolveInput {
                    constraints: vec![self.settings.generator.clone()],
                    revalidate: self.settings.resolve_window,
                },
            )
            .await?;

        // 2) grammar
        let grammar_file = context.download_path(&request.grammar_url);
        let grammar = self
            .executor
            .require::<FetchResource>(
                scope,
                &FetchInput {
                    url: request.grammar_url.clone(),
                    dest: grammar_file.clone(),
                    revalidate: self.settings.fetch_window,
                },
            )
            .await?;

        // 3) grammar -> Java sources -> classes
        let source_dir = context.source_dir();
        let parser_dir = context.package_dir(&request.package);

        let mut args = vec!["-o".to_string(), parser_dir.display().to_string()];
        if !request.package.is_empty() {
            args.push("-package".to_string());
            args.push(request.package.clone());
        }
        args.push(grammar.value.path.display().to_string());

        let sources = self
            .executor
            .require::<GenerateSources>(
                scope,
                &GenerateInput {
                    working_dir: source_dir.clone(),
                    classpath: jars.value.jars.clone(),
                    classpath_origin: jars.as_origin(),
                    main_class: self.settings.main_class.clone(),
                    args,
                    grammar_origin: grammar.as_origin(),
                    output_dir: parser_dir,
                    source_suffix: ".java".to_string(),
                },
            )
            .await?;

        let target_dir = request
            .target_dir
            .clone()
            .unwrap_or_else(|| context.default_target_dir());
        let classes = self
            .executor
            .require::<CompileSources>(
                scope,
                &CompileInput {
                    sources: sources.value.sources.clone(),
                    classpath: jars.value.jars.clone(),
                    classpath_origin: jars.as_origin(),
                    source_roots: vec![source_dir],
                    source_origin: sources.as_origin(),
                    target_dir: target_dir.clone(),
                    unit_suffix: ".class".to_string(),
                },
            )
            .await?;

        // 4) classes -> archive
        let files: BTreeSet<PathBuf> = list_files_with_suffix(&target_dir, ".class")
            .into_iter()
            .collect();
        if files.is_empty() {
            return Err(GristError::CompilationFailure {
                summary: format!("packaging {}", request.language),
                reason: format!("could not find any class files in {}", target_dir.display()),
            });
        }

        // An archive the caller names may hold other entries and is updated;
        // the default one belongs to this request and is rewritten
        let (archive, mode) = match &request.target_archive {
            Some(archive) => (archive.clone(), ArchiveMode::CreateOrUpdate),
            None => (
                context.default_archive(&self.settings.archive_extension),
                ArchiveMode::Create,
            ),
        };
        let packaged = self
            .executor
            .require::<PackageArchive>(
                scope,
                &PackageInput {
                    mode,
                    archive,
                    files: FileSet::from([(target_dir, files)]),
                    origin: classes.as_origin(),
                },
            )
            .await?;

        info!(
            "Parser for {} is at {}{}",
            request.language,
            packaged.value.archive.display(),
            if packaged.cached { " (up to date)" } else { "" }
        );
        Ok(packaged.map(|p| p.archive))
    }
}
