//! Remote resource fetch stage

use crate::error::{GristError, GristResult};
use crate::stage::{Stage, StageKind};
use crate::staleness::StalenessWindow;
use crate::tools::{FetchOutcome, Fetcher, Validators};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchInput {
    pub url: Url,
    /// Local file the resource is materialized into
    pub dest: PathBuf,
    /// How long a fetched copy may be reused before asking the remote again
    pub revalidate: StalenessWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedResource {
    pub path: PathBuf,
    #[serde(default)]
    pub validators: Validators,
    pub bytes: u64,
}

/// Materializes a URL into a local file
pub struct FetchResource {
    fetcher: Arc<dyn Fetcher>,
}

impl FetchResource {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Stage for FetchResource {
    type Input = FetchInput;
    type Output = FetchedResource;

    const KIND: StageKind = StageKind::FetchResource;

    fn window(&self, input: &FetchInput) -> StalenessWindow {
        input.revalidate
    }

    fn describe(&self, input: &FetchInput) -> String {
        input.url.to_string()
    }

    fn is_intact(&self, output: &FetchedResource) -> bool {
        output.path.is_file()
    }

    async fn build(
        &self,
        input: &FetchInput,
        previous: Option<&FetchedResource>,
    ) -> GristResult<FetchedResource> {
        if let Some(parent) = input.dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GristError::FetchFailure {
                    url: input.url.to_string(),
                    reason: format!("creating {}: {}", parent.display(), e),
                })?;
        }

        // Conditional requests only make sense while the old copy is on disk
        let previous = previous.filter(|p| p.path == input.dest && input.dest.is_file());
        let validators = previous
            .map(|p| &p.validators)
            .filter(|v| !v.is_empty());

        match self.fetcher.fetch(&input.url, &input.dest, validators).await? {
            FetchOutcome::Downloaded { validators, bytes } => {
                info!("Fetched {} ({} bytes)", input.url, bytes);
                Ok(FetchedResource {
                    path: input.dest.clone(),
                    validators,
                    bytes,
                })
            }
            FetchOutcome::NotModified => match previous {
                Some(previous) => {
                    info!("{} not modified", input.url);
                    Ok(previous.clone())
                }
                None => Err(GristError::FetchFailure {
                    url: input.url.to_string(),
                    reason: "remote reported not modified but no local copy exists".to_string(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes fixed content; answers 304 whenever validators are offered
    #[derive(Default)]
    struct ConditionalFetcher {
        offered: Mutex<Vec<Option<Validators>>>,
    }

    #[async_trait]
    impl Fetcher for ConditionalFetcher {
        async fn fetch(
            &self,
            _url: &Url,
            dest: &Path,
            validators: Option<&Validators>,
        ) -> GristResult<FetchOutcome> {
            self.offered.lock().unwrap().push(validators.cloned());
            if validators.is_some() {
                return Ok(FetchOutcome::NotModified);
            }
            std::fs::write(dest, "grammar Java;").unwrap();
            Ok(FetchOutcome::Downloaded {
                validators: Validators {
                    etag: Some("\"v1\"".to_string()),
                    last_modified: None,
                },
                bytes: 13,
            })
        }
    }

    fn input(temp: &TempDir) -> FetchInput {
        FetchInput {
            url: Url::parse("https://example.com/grammars/java/Java.g4").unwrap(),
            dest: temp.path().join("grammars").join("java").join("Java.g4"),
            revalidate: StalenessWindow::hours(1),
        }
    }

    #[tokio::test]
    async fn first_fetch_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let stage = FetchResource::new(Arc::new(ConditionalFetcher::default()));
        let input = input(&temp);

        let output = stage.build(&input, None).await.unwrap();

        assert_eq!(output.path, input.dest);
        assert_eq!(output.bytes, 13);
        assert!(stage.is_intact(&output));
    }

    #[tokio::test]
    async fn refetch_sends_validators_and_keeps_copy() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(ConditionalFetcher::default());
        let stage = FetchResource::new(fetcher.clone());
        let input = input(&temp);

        let first = stage.build(&input, None).await.unwrap();
        let second = stage.build(&input, Some(&first)).await.unwrap();

        assert_eq!(second, first);
        let offered = fetcher.offered.lock().unwrap();
        assert_eq!(offered[0], None);
        assert_eq!(offered[1].as_ref().unwrap().etag.as_deref(), Some("\"v1\""));
    }

    #[tokio::test]
    async fn lost_local_copy_downloads_unconditionally() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(ConditionalFetcher::default());
        let stage = FetchResource::new(fetcher.clone());
        let input = input(&temp);

        let first = stage.build(&input, None).await.unwrap();
        std::fs::remove_file(&input.dest).unwrap();
        assert!(!stage.is_intact(&first));

        stage.build(&input, Some(&first)).await.unwrap();
        assert_eq!(fetcher.offered.lock().unwrap()[1], None);
        assert!(input.dest.is_file());
    }
}
