//! Error types for Grist
//!
//! All modules use `GristResult<T>` as their return type.

use crate::stage::StageKind;
use std::path::PathBuf;
use thiserror::Error;

/// Prefix of stage failures caused by a tool that could not be started
const LAUNCH_FAILED: &str = "could not run";

const JDK_HINT: &str =
    "Install a JDK and make sure java, javac and jar are on PATH (or set [java] in the config)";

/// Result type alias for Grist operations
pub type GristResult<T> = Result<T, GristError>;

/// All errors that can occur in Grist
#[derive(Error, Debug)]
pub enum GristError {
    // Stage failures
    #[error("Dependency resolution failed for {constraint}: {reason}")]
    ResolutionFailure { constraint: String, reason: String },

    #[error("Fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("Source generation failed ({summary}): {reason}")]
    GenerationFailure { summary: String, reason: String },

    #[error("Compilation failed ({summary}): {reason}")]
    CompilationFailure { summary: String, reason: String },

    #[error("Packaging failed for {}: {reason}", archive.display())]
    PackagingFailure { archive: PathBuf, reason: String },

    // Result store
    #[error("Result store unavailable at {}: {reason}", path.display())]
    StoreUnavailable { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {}: {reason}", path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid grammar URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl GristError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a store unavailable error
    pub fn store(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::StoreUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Attribute a collaborator error to the stage whose action raised it
    ///
    /// Spawn and filesystem errors become `fail(reason)`; every other error,
    /// stage failures included, is returned as is.
    pub fn into_stage_failure(self, fail: impl FnOnce(String) -> GristError) -> Self {
        match self {
            Self::CommandFailed { command, source } => {
                fail(format!("{} {}: {}", LAUNCH_FAILED, command, source))
            }
            Self::Io { context, source } => fail(format!("{}: {}", context, source)),
            other => other,
        }
    }

    /// The pipeline stage this error belongs to, if it is a stage failure
    pub fn stage_failure(&self) -> Option<StageKind> {
        match self {
            Self::ResolutionFailure { .. } => Some(StageKind::ResolveArtifacts),
            Self::FetchFailure { .. } => Some(StageKind::FetchResource),
            Self::GenerationFailure { .. } => Some(StageKind::GenerateSources),
            Self::CompilationFailure { .. } => Some(StageKind::CompileSources),
            Self::PackagingFailure { .. } => Some(StageKind::PackageArchive),
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CommandFailed { .. } => Some(JDK_HINT),
            Self::GenerationFailure { reason, .. }
            | Self::CompilationFailure { reason, .. }
            | Self::PackagingFailure { reason, .. }
                if reason.starts_with(LAUNCH_FAILED) =>
            {
                Some(JDK_HINT)
            }
            Self::FetchFailure { .. } | Self::ResolutionFailure { .. } => {
                Some("Check network access; cached results are reused on the next run")
            }
            Self::StoreUnavailable { .. } => {
                Some("Check permissions of the state directory, or set store.strict = false")
            }
            Self::InvalidUrl { .. } => Some("Pass an absolute URL, e.g. https://host/path/Grammar.g4"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = GristError::FetchFailure {
            url: "https://example.com/Java.g4".to_string(),
            reason: "404 Not Found".to_string(),
        };
        assert!(err.to_string().contains("Fetch failed"));
        assert!(err.to_string().contains("Java.g4"));
    }

    #[test]
    fn error_hint() {
        let err = GristError::command_failed(
            "javac",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.hint().unwrap().contains("JDK"));
        assert!(GristError::Internal("x".to_string()).hint().is_none());
    }

    #[test]
    fn launch_errors_become_stage_failures() {
        let missing = GristError::command_failed(
            "/opt/jdk/bin/javac",
            std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
        );
        let err = missing.into_stage_failure(|reason| GristError::CompilationFailure {
            summary: "2 source file(s) into bin".to_string(),
            reason,
        });

        assert_eq!(err.stage_failure(), Some(StageKind::CompileSources));
        assert!(err.to_string().contains("2 source file(s)"));
        assert!(err.to_string().contains("/opt/jdk/bin/javac"));
        assert!(err.hint().unwrap().contains("JDK"));
    }

    #[test]
    fn io_errors_become_stage_failures_without_jdk_hint() {
        let io = GristError::io(
            "creating /work/bin",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let err = io.into_stage_failure(|reason| GristError::PackagingFailure {
            archive: PathBuf::from("parse-Java.jar"),
            reason,
        });

        assert_eq!(err.stage_failure(), Some(StageKind::PackageArchive));
        assert!(err.to_string().contains("creating /work/bin"));
        assert!(err.hint().is_none());
    }

    #[test]
    fn stage_failures_pass_through_unchanged() {
        let err = GristError::FetchFailure {
            url: "https://example.com/Java.g4".to_string(),
            reason: "404".to_string(),
        }
        .into_stage_failure(GristError::User);

        assert!(matches!(err, GristError::FetchFailure { .. }));
    }

    #[test]
    fn stage_failure_maps_taxonomy() {
        let err = GristError::PackagingFailure {
            archive: PathBuf::from("parse-Java.jar"),
            reason: "jar exited with 1".to_string(),
        };
        assert_eq!(err.stage_failure(), Some(StageKind::PackageArchive));
        assert_eq!(
            GristError::store("/tmp", "io").stage_failure(),
            None
        );
    }
}
