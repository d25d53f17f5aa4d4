//! Compilation stage

use crate::error::{GristError, GristResult};
use crate::origin::Origin;
use crate::stage::{list_files_with_suffix, remove_files_with_suffix, Stage, StageKind};
use crate::tools::Compiler;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileInput {
    pub sources: BTreeSet<PathBuf>,
    pub classpath: Vec<PathBuf>,
    pub classpath_origin: Origin,
    pub source_roots: Vec<PathBuf>,
    /// Execution that produced `sources`
    pub source_origin: Origin,
    /// Output directory; units an earlier run left there are removed first
    pub target_dir: PathBuf,
    /// Suffix of compiled units, e.g. `.class`
    pub unit_suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledUnits {
    pub target_dir: PathBuf,
    pub units: BTreeSet<PathBuf>,
}

pub struct CompileSources {
    compiler: Arc<dyn Compiler>,
}

impl CompileSources {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self { compiler }
    }
}

#[async_trait]
impl Stage for CompileSources {
    type Input = CompileInput;
    type Output = CompiledUnits;

    const KIND: StageKind = StageKind::CompileSources;

    fn upstream(&self, input: &CompileInput) -> Origin {
        input.classpath_origin.clone().merge(&input.source_origin)
    }

    fn describe(&self, input: &CompileInput) -> String {
        format!(
            "{} source file(s) into {}",
            input.sources.len(),
            input.target_dir.display()
        )
    }

    fn is_intact(&self, output: &CompiledUnits) -> bool {
        !output.units.is_empty() && output.units.iter().all(|unit| unit.is_file())
    }

    async fn build(
        &self,
        input: &CompileInput,
        _previous: Option<&CompiledUnits>,
    ) -> GristResult<CompiledUnits> {
        let fail = |reason: String| GristError::CompilationFailure {
            summary: self.describe(input),
            reason,
        };

        if input.sources.is_empty() {
            return Err(fail("nothing to compile".to_string()));
        }

        tokio::fs::create_dir_all(&input.target_dir)
            .await
            .map_err(|e| fail(format!("creating {}: {}", input.target_dir.display(), e)))?;
        let stale = remove_files_with_suffix(&input.target_dir, &input.unit_suffix)
            .await
            .map_err(|e| e.into_stage_failure(fail))?;
        if stale > 0 {
            debug!("Removed {} stale unit(s) from {}", stale, input.target_dir.display());
        }

        let sources: Vec<PathBuf> = input.sources.iter().cloned().collect();
        let status = self
            .compiler
            .compile(&sources, &input.classpath, &input.source_roots, &input.target_dir)
            .await
            .map_err(|e| e.into_stage_failure(fail))?;

        if !status.success() {
            return Err(fail(status.describe()));
        }

        let units: BTreeSet<PathBuf> = list_files_with_suffix(&input.target_dir, &input.unit_suffix)
            .into_iter()
            .collect();
        if units.is_empty() {
            return Err(fail(format!(
                "could not find any {} files in {}",
                input.unit_suffix,
                input.target_dir.display()
            )));
        }

        info!("Compiled {} unit(s) into {}", units.len(), input.target_dir.display());
        Ok(CompiledUnits {
            target_dir: input.target_dir.clone(),
            units,
        })
    }
}
