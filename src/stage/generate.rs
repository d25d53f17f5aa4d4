//! Source generation stage
//!
//! Runs a JVM code generator (ANTLR's `Tool` in the standard pipeline) and
//! collects the sources it produced.

use crate::error::{GristError, GristResult};
use crate::origin::Origin;
use crate::stage::{list_files_with_suffix, remove_files_with_suffix, Stage, StageKind};
use crate::tools::ProgramRunner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateInput {
    pub working_dir: PathBuf,
    pub classpath: Vec<PathBuf>,
    /// Execution that produced `classpath`
    pub classpath_origin: Origin,
    pub main_class: String,
    pub args: Vec<String>,
    /// Execution that produced the generator's input file
    pub grammar_origin: Origin,
    /// Directory the generator writes into
    ///
    /// Sources left there by an earlier run are removed first, so the
    /// output lists only what this run produced.
    pub output_dir: PathBuf,
    pub source_suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSources {
    pub sources: BTreeSet<PathBuf>,
}

pub struct GenerateSources {
    runner: Arc<dyn ProgramRunner>,
}

impl GenerateSources {
    pub fn new(runner: Arc<dyn ProgramRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Stage for GenerateSources {
    type Input = GenerateInput;
    type Output = GeneratedSources;

    const KIND: StageKind = StageKind::GenerateSources;

    fn upstream(&self, input: &GenerateInput) -> Origin {
        input.classpath_origin.clone().merge(&input.grammar_origin)
    }

    fn describe(&self, input: &GenerateInput) -> String {
        format!("{} {}", input.main_class, input.args.join(" "))
    }

    fn is_intact(&self, output: &GeneratedSources) -> bool {
        output.sources.iter().all(|source| source.is_file())
    }

    async fn build(
        &self,
        input: &GenerateInput,
        _previous: Option<&GeneratedSources>,
    ) -> GristResult<GeneratedSources> {
        let fail = |reason: String| GristError::GenerationFailure {
            summary: self.describe(input),
            reason,
        };

        for dir in [&input.working_dir, &input.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| fail(format!("creating {}: {}", dir.display(), e)))?;
        }
        let stale = remove_files_with_suffix(&input.output_dir, &input.source_suffix)
            .await
            .map_err(|e| e.into_stage_failure(fail))?;
        if stale > 0 {
            debug!("Removed {} stale source file(s) from {}", stale, input.output_dir.display());
        }

        let status = self
            .runner
            .run(&input.working_dir, &input.classpath, &input.main_class, &input.args)
            .await
            .map_err(|e| e.into_stage_failure(fail))?;

        if !status.success() {
            return Err(fail(status.describe()));
        }

        let sources: BTreeSet<PathBuf> = list_files_with_suffix(&input.output_dir, &input.source_suffix)
            .into_iter()
            .collect();
        if sources.is_empty() {
            return Err(fail(format!(
                "no *{} files were generated in {}",
                input.source_suffix,
                input.output_dir.display()
            )));
        }

        info!("Generated {} source file(s)", sources.len());
        Ok(GeneratedSources { sources })
    }
}
