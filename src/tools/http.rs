//! HTTP(S) and file:// fetching
//!
//! Uses a blocking `ureq` agent on tokio's blocking pool. Downloads go to a
//! temporary sibling of the destination and are renamed into place, so an
//! interrupted transfer never replaces a good file.

use crate::error::{GristError, GristResult};
use crate::tools::{FetchOutcome, Fetcher, Validators};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

const USER_AGENT: &str = concat!("grist/", env!("CARGO_PKG_VERSION"));

/// Fetcher for `http`, `https` and `file` URLs
#[derive(Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout_secs`
    pub fn new(timeout_secs: u64) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(timeout_secs)))
            .http_status_as_error(false)
            .build();

        Self {
            agent: config.into(),
        }
    }

    /// Read a (small) remote text document into memory
    pub async fn get_text(&self, url: &Url) -> GristResult<String> {
        if url.scheme() == "file" {
            let path = local_path(url)?;
            return tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| fetch_failure(url, e));
        }
        check_scheme(url)?;

        let agent = self.agent.clone();
        let target = url.to_string();
        let result = tokio::task::spawn_blocking(move || -> Result<String, String> {
            let mut response = agent
                .get(&target)
                .header("User-Agent", USER_AGENT)
                .call()
                .map_err(|e| e.to_string())?;

            let status = response.status().as_u16();
            if !(200..300).contains(&status) {
                return Err(format!("HTTP {}", status));
            }

            let mut text = String::new();
            response
                .body_mut()
                .as_reader()
                .read_to_string(&mut text)
                .map_err(|e| e.to_string())?;
            Ok(text)
        })
        .await
        .map_err(|e| GristError::Internal(format!("fetch task panicked: {}", e)))?;

        result.map_err(|reason| fetch_failure(url, reason))
    }

    async fn fetch_local(
        &self,
        url: &Url,
        dest: &Path,
        validators: Option<&Validators>,
    ) -> GristResult<FetchOutcome> {
        let source = local_path(url)?;
        let metadata = tokio::fs::metadata(&source)
            .await
            .map_err(|e| fetch_failure(url, e))?;

        let modified = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339());

        if let (Some(previous), Some(current)) =
            (validators.and_then(|v| v.last_modified.as_ref()), modified.as_ref())
        {
            if previous == current && dest.exists() {
                return Ok(FetchOutcome::NotModified);
            }
        }

        let tmp = temp_sibling(dest);
        let bytes = tokio::fs::copy(&source, &tmp)
            .await
            .map_err(|e| fetch_failure(url, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, dest).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(fetch_failure(url, e));
        }

        Ok(FetchOutcome::Downloaded {
            validators: Validators {
                etag: None,
                last_modified: modified,
            },
            bytes,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &Url,
        dest: &Path,
        validators: Option<&Validators>,
    ) -> GristResult<FetchOutcome> {
        if url.scheme() == "file" {
            return self.fetch_local(url, dest, validators).await;
        }
        check_scheme(url)?;

        debug!("Fetching {} -> {}", url, dest.display());

        let agent = self.agent.clone();
        let target = url.to_string();
        let dest = dest.to_path_buf();
        let validators = validators.cloned();

        let result = tokio::task::spawn_blocking(move || {
            download(&agent, &target, &dest, validators.as_ref())
        })
        .await
        .map_err(|e| GristError::Internal(format!("fetch task panicked: {}", e)))?;

        result.map_err(|reason| fetch_failure(url, reason))
    }
}

fn download(
    agent: &ureq::Agent,
    url: &str,
    dest: &Path,
    validators: Option<&Validators>,
) -> Result<FetchOutcome, String> {
    let mut request = agent.get(url).header("User-Agent", USER_AGENT);
    if let Some(validators) = validators {
        if let Some(etag) = &validators.etag {
            request = request.header("If-None-Match", etag.as_str());
        }
        if let Some(last_modified) = &validators.last_modified {
            request = request.header("If-Modified-Since", last_modified.as_str());
        }
    }

    let mut response = request.call().map_err(|e| e.to_string())?;
    let status = response.status().as_u16();

    if status == 304 {
        return Ok(FetchOutcome::NotModified);
    }
    if !(200..300).contains(&status) {
        return Err(format!("HTTP {}", status));
    }

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let validators = Validators {
        etag: header("etag"),
        last_modified: header("last-modified"),
    };

    let tmp = temp_sibling(dest);
    let copied = std::fs::File::create(&tmp).and_then(|mut file| {
        std::io::copy(&mut response.body_mut().as_reader(), &mut file)
    });
    let bytes = match copied {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.to_string());
        }
    };

    if let Err(e) = std::fs::rename(&tmp, dest) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.to_string());
    }

    Ok(FetchOutcome::Downloaded { validators, bytes })
}

fn check_scheme(url: &Url) -> GristResult<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(fetch_failure(url, format!("unsupported scheme '{}'", other))),
    }
}

fn local_path(url: &Url) -> GristResult<PathBuf> {
    url.to_file_path()
        .map_err(|_| fetch_failure(url, "not a local file path"))
}

fn temp_sibling(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());
    dest.with_file_name(format!(".{}.part-{}", name, Uuid::new_v4().simple()))
}

fn fetch_failure(url: &Url, reason: impl ToString) -> GristError {
    GristError::FetchFailure {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
