//! Packaging stage

use crate::error::{GristError, GristResult};
use crate::origin::Origin;
use crate::stage::{Stage, StageKind};
use crate::tools::Archiver;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Files to archive, grouped by the root their entry names are relative to
pub type FileSet = BTreeMap<PathBuf, BTreeSet<PathBuf>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveMode {
    /// Replace any existing archive
    Create,
    /// Merge into an existing archive, replacing entries with the same name
    CreateOrUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageInput {
    pub mode: ArchiveMode,
    pub archive: PathBuf,
    pub files: FileSet,
    /// Execution that produced `files`
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagedArchive {
    pub archive: PathBuf,
    pub entries: usize,
}

pub struct PackageArchive {
    archiver: Arc<dyn Archiver>,
}

impl PackageArchive {
    pub fn new(archiver: Arc<dyn Archiver>) -> Self {
        Self { archiver }
    }
}

#[async_trait]
impl Stage for PackageArchive {
    type Input = PackageInput;
    type Output = PackagedArchive;

    const KIND: StageKind = StageKind::PackageArchive;
    const PERSISTED: bool = true;

    fn upstream(&self, input: &PackageInput) -> Origin {
        input.origin.clone()
    }

    fn describe(&self, input: &PackageInput) -> String {
        input.archive.display().to_string()
    }

    fn is_intact(&self, output: &PackagedArchive) -> bool {
        output.archive.is_file()
    }

    async fn build(
        &self,
        input: &PackageInput,
        _previous: Option<&PackagedArchive>,
    ) -> GristResult<PackagedArchive> {
        let entries = input.files.values().map(BTreeSet::len).sum();
        let archive = self
            .archiver
            .archive(input.mode, &input.archive, &input.files)
            .await
            .map_err(|e| {
                e.into_stage_failure(|reason| GristError::PackagingFailure {
                    archive: input.archive.clone(),
                    reason,
                })
            })?;

        info!("Packaged {} file(s) into {}", entries, archive.display());
        Ok(PackagedArchive { archive, entries })
    }
}
