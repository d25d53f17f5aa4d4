//! Dependency resolution stage

use crate::error::GristResult;
use crate::stage::{Stage, StageKind};
use crate::staleness::StalenessWindow;
use crate::tools::ArtifactResolver;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Maven-style coordinates with a version constraint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactConstraint {
    pub group: String,
    pub artifact: String,
    /// Exact version or Maven range such as `[4.0,)`
    pub version: String,
    pub classifier: Option<String>,
    pub extension: String,
}

impl fmt::Display for ArtifactConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveInput {
    pub constraints: Vec<ArtifactConstraint>,
    /// How long a resolution may be reused; newer releases matching a range
    /// are only picked up after this
    pub revalidate: StalenessWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArtifacts {
    /// Jar paths in constraint order
    pub jars: Vec<PathBuf>,
}

/// Maps artifact constraints to local jars
pub struct ResolveArtifacts {
    resolver: Arc<dyn ArtifactResolver>,
}

impl ResolveArtifacts {
    pub fn new(resolver: Arc<dyn ArtifactResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Stage for ResolveArtifacts {
    type Input = ResolveInput;
    type Output = ResolvedArtifacts;

    const KIND: StageKind = StageKind::ResolveArtifacts;

    /// Resolutions are shared by every request asking for the same artifacts
    fn namespace(&self, input: &ResolveInput, _scope: &str) -> String {
        input
            .constraints
            .iter()
            .map(|c| format!("{}-{}", c.group, c.artifact))
            .collect::<Vec<_>>()
            .join("+")
    }

    fn window(&self, input: &ResolveInput) -> StalenessWindow {
        input.revalidate
    }

    fn describe(&self, input: &ResolveInput) -> String {
        input
            .constraints
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn is_intact(&self, output: &ResolvedArtifacts) -> bool {
        output.jars.iter().all(|jar| jar.is_file())
    }

    async fn build(
        &self,
        input: &ResolveInput,
        _previous: Option<&ResolvedArtifacts>,
    ) -> GristResult<ResolvedArtifacts> {
        let mut jars = Vec::new();
        for constraint in &input.constraints {
            let resolved = self.resolver.resolve(constraint).await?;
            info!("Resolved {} to {} file(s)", constraint, resolved.len());
            jars.extend(resolved);
        }
        Ok(ResolvedArtifacts { jars })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GristError;
    use std::sync::Mutex;

    struct ListResolver {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ArtifactResolver for ListResolver {
        async fn resolve(&self, constraint: &ArtifactConstraint) -> GristResult<Vec<PathBuf>> {
            self.calls.lock().unwrap().push(constraint.artifact.clone());
            if constraint.artifact == "missing" {
                return Err(GristError::ResolutionFailure {
                    constraint: constraint.to_string(),
                    reason: "not found".to_string(),
                });
            }
            Ok(vec![PathBuf::from(format!("/repo/{}.jar", constraint.artifact))])
        }
    }

    fn constraint(artifact: &str) -> ArtifactConstraint {
        ArtifactConstraint {
            group: "org.antlr".to_string(),
            artifact: artifact.to_string(),
            version: "[4.0,)".to_string(),
            classifier: None,
            extension: "jar".to_string(),
        }
    }

    #[test]
    fn display_includes_classifier() {
        let mut c = constraint("antlr4");
        assert_eq!(c.to_string(), "org.antlr:antlr4:[4.0,)");
        c.classifier = Some("complete".to_string());
        assert_eq!(c.to_string(), "org.antlr:antlr4:[4.0,):complete");
    }

    #[tokio::test]
    async fn resolves_in_constraint_order() {
        let resolver = Arc::new(ListResolver {
            calls: Mutex::new(Vec::new()),
        });
        let stage = ResolveArtifacts::new(resolver.clone());
        let input = ResolveInput {
            constraints: vec![constraint("antlr4"), constraint("antlr4-runtime")],
            revalidate: StalenessWindow::days(1),
        };

        let output = stage.build(&input, None).await.unwrap();

        assert_eq!(
            output.jars,
            vec![
                PathBuf::from("/repo/antlr4.jar"),
                PathBuf::from("/repo/antlr4-runtime.jar")
            ]
        );
        assert_eq!(stage.window(&input), StalenessWindow::days(1));
        assert_eq!(
            stage.namespace(&input, "Java-0123"),
            "org.antlr-antlr4+org.antlr-antlr4-runtime"
        );
    }

    #[tokio::test]
    async fn failure_stops_resolution() {
        let resolver = Arc::new(ListResolver {
            calls: Mutex::new(Vec::new()),
        });
        let stage = ResolveArtifacts::new(resolver.clone());
        let input = ResolveInput {
            constraints: vec![constraint("missing"), constraint("antlr4")],
            revalidate: StalenessWindow::ZERO,
        };

        let err = stage.build(&input, None).await.unwrap_err();
        assert!(matches!(err, GristError::ResolutionFailure { .. }));
        assert_eq!(*resolver.calls.lock().unwrap(), vec!["missing"]);
    }
}
