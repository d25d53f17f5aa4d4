//! Builder registry
//!
//! Maps each [`StageKind`] to the builder that executes it. The registry is
//! assembled once at start-up and then shared read-only behind an `Arc`, so
//! a persisted entry can always be re-dispatched from its stage kind alone.

use crate::error::{GristError, GristResult};
use crate::stage::{
    CompileSources, Erased, FetchResource, GenerateSources, PackageArchive, ResolveArtifacts,
    Stage, StageBuilder, StageKind,
};
use crate::tools::Toolbox;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct Registry {
    builders: HashMap<StageKind, Arc<dyn StageBuilder>>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The five built-in stages wired to the given collaborators
    pub fn standard(tools: &Toolbox) -> Self {
        let mut registry = Self::new();
        registry.add(ResolveArtifacts::new(tools.resolver.clone()));
        registry.add(FetchResource::new(tools.fetcher.clone()));
        registry.add(GenerateSources::new(tools.runner.clone()));
        registry.add(CompileSources::new(tools.compiler.clone()));
        registry.add(PackageArchive::new(tools.archiver.clone()));
        registry
    }

    /// Register a builder for `kind`, replacing any previous one
    pub fn register(&mut self, kind: StageKind, builder: Arc<dyn StageBuilder>) -> GristResult<()> {
        if builder.kind() != kind {
            return Err(GristError::Internal(format!(
                "builder for {} registered as {}",
                builder.kind(),
                kind
            )));
        }
        self.builders.insert(kind, builder);
        Ok(())
    }

    /// Register a typed stage under its own kind
    pub fn add<S: Stage>(&mut self, stage: S) {
        self.builders.insert(S::KIND, Arc::new(Erased(stage)));
    }

    pub fn lookup(&self, kind: StageKind) -> GristResult<Arc<dyn StageBuilder>> {
        self.builders
            .get(&kind)
            .cloned()
            .ok_or_else(|| GristError::Internal(format!("no builder registered for {}", kind)))
    }

    /// Registered kinds, in pipeline order
    pub fn kinds(&self) -> Vec<StageKind> {
        let mut kinds: Vec<StageKind> = self.builders.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GristResult;
    use crate::stage::{ArtifactConstraint, ResolveInput, ResolvedArtifacts};
    use crate::staleness::StalenessWindow;
    use crate::tools::ArtifactResolver;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;

    struct StubResolver;

    #[async_trait]
    impl ArtifactResolver for StubResolver {
        async fn resolve(&self, _constraint: &ArtifactConstraint) -> GristResult<Vec<PathBuf>> {
            Ok(vec![PathBuf::from("/repo/antlr4.jar")])
        }
    }

    fn resolve_stage() -> ResolveArtifacts {
        ResolveArtifacts::new(Arc::new(StubResolver))
    }

    #[test]
    fn lookup_missing_kind_fails() {
        let registry = Registry::new();
        let err = registry.lookup(StageKind::FetchResource).err().unwrap();
        assert!(err.to_string().contains("no builder registered for fetch-resource"));
    }

    #[test]
    fn register_rejects_mismatched_kind() {
        let mut registry = Registry::new();
        let builder: Arc<dyn StageBuilder> = Arc::new(Erased(resolve_stage()));

        assert!(registry.register(StageKind::PackageArchive, builder.clone()).is_err());
        assert!(registry.register(StageKind::ResolveArtifacts, builder).is_ok());
        assert_eq!(registry.kinds(), vec![StageKind::ResolveArtifacts]);
    }

    #[tokio::test]
    async fn erased_builder_round_trips_json() {
        let mut registry = Registry::new();
        registry.add(resolve_stage());
        let builder = registry.lookup(StageKind::ResolveArtifacts).unwrap();

        let input = serde_json::to_value(ResolveInput {
            constraints: vec![ArtifactConstraint {
                group: "org.antlr".to_string(),
                artifact: "antlr4".to_string(),
                version: "[4.0,)".to_string(),
                classifier: None,
                extension: "jar".to_string(),
            }],
            revalidate: StalenessWindow::days(1),
        })
        .unwrap();

        assert_eq!(builder.window(&input).unwrap(), StalenessWindow::days(1));
        assert_eq!(builder.namespace(&input, "Java-x").unwrap(), "org.antlr-antlr4");

        let output = builder.build(&input, None).await.unwrap();
        let output: ResolvedArtifacts = serde_json::from_value(output).unwrap();
        assert_eq!(output.jars, vec![PathBuf::from("/repo/antlr4.jar")]);

        assert!(builder.build(&json!({"bogus": true}), None).await.is_err());
    }
}
