//! Grist - incremental parser builder
//!
//! Turns a grammar URL into a packaged parser through a cached, multi-stage
//! pipeline: resolve the generator, fetch the grammar, generate and compile
//! sources, and package the classes. Stage results are recorded in a
//! persistent store keyed by their inputs; each re-execution mints an origin
//! token that downstream inputs embed, so only what changed is rebuilt.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod origin;
pub mod pipeline;
pub mod registry;
pub mod stage;
pub mod staleness;
pub mod store;
pub mod tools;

pub use error::{GristError, GristResult};

use config::{Config, StateDirs};
use executor::Executor;
use pipeline::{ParserRequest, Pipeline, PipelineSettings};
use registry::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use store::ResultStore;
use tools::Toolbox;

/// Build the parser archive for `request` with the real collaborators
///
/// Returns the path of the (possibly reused) archive.
pub async fn build(config: &Config, state: &StateDirs, request: &ParserRequest) -> GristResult<PathBuf> {
    state.ensure().await?;

    let toolbox = Toolbox::from_config(config, &state.repository())?;
    let registry = Arc::new(Registry::standard(&toolbox));
    let executor = Executor::new(registry, ResultStore::new(state.store())).strict(config.store.strict);
    let settings = PipelineSettings::from_config(config, state.work(), toolbox.archiver.extension());

    let pipeline = Pipeline::new(Arc::new(executor), settings);
    Ok(pipeline.build(request).await?.value)
}
