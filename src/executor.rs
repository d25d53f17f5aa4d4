//! Stage executor
//!
//! Runs a stage at most once per (stage kind, input) until its result goes
//! stale. For every request the executor:
//!
//! 1. derives the cache key and store slot from the input,
//! 2. takes the slot lock, so concurrent identical requests share one run,
//! 3. reuses the recorded entry when it is fresh and its output intact,
//! 4. otherwise runs the builder, mints an origin token, and records the
//!    result. Failures are never recorded.

use crate::error::{GristError, GristResult};
use crate::registry::Registry;
use crate::stage::{Built, Stage, StageBuilder, StageKind};
use crate::staleness::{self, Freshness, StalenessWindow};
use crate::store::{CacheEntry, CacheKey, KeyLocks, ResultStore};
use chrono::Utc;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of re-validating every recorded entry
#[derive(Debug, Default)]
pub struct Revalidation {
    /// Entries still fresh and intact
    pub reused: usize,
    /// Entries whose stage ran again
    pub rebuilt: usize,
    /// Entries whose stage failed, by slot
    pub failed: Vec<(PathBuf, GristError)>,
}

pub struct Executor {
    registry: Arc<Registry>,
    store: ResultStore,
    locks: KeyLocks,
    strict: bool,
}

impl Executor {
    pub fn new(registry: Arc<Registry>, store: ResultStore) -> Self {
        Self {
            registry,
            store,
            locks: KeyLocks::new(),
            strict: false,
        }
    }

    /// Fail instead of recomputing when the store cannot be read or written
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run (or reuse) the stage of `kind` for `input` within a request scope
    pub async fn run(&self, kind: StageKind, scope: &str, input: Value) -> GristResult<Built<Value>> {
        let builder = self.registry.lookup(kind)?;
        let key = CacheKey::derive(kind, &input)?;
        let namespace = builder.namespace(&input, scope)?;

        self.execute(builder.as_ref(), key, namespace, input).await
    }

    /// Typed form of [`Executor::run`]
    pub async fn require<S: Stage>(&self, scope: &str, input: &S::Input) -> GristResult<Built<S::Output>> {
        let Built {
            value,
            origin,
            produced_at,
            cached,
            persisted,
        } = self.run(S::KIND, scope, serde_json::to_value(input)?).await?;

        Ok(Built {
            value: serde_json::from_value(value)?,
            origin,
            produced_at,
            cached,
            persisted,
        })
    }

    /// Hand a recorded entry back to the builder registered for its kind
    ///
    /// The entry's window still applies, so a fresh entry is simply reused.
    pub async fn revalidate(&self, entry: &CacheEntry) -> GristResult<Built<Value>> {
        let builder = self.registry.lookup(entry.stage)?;
        let key = CacheKey::derive(entry.stage, &entry.input)?;

        self.execute(builder.as_ref(), key, entry.namespace.clone(), entry.input.clone())
            .await
    }

    /// Re-validate every entry in the store, upstream stages first
    pub async fn revalidate_all(&self) -> GristResult<Revalidation> {
        let mut entries = self.store.entries().await?;
        entries.sort_by(|a, b| (a.1.stage, &a.0).cmp(&(b.1.stage, &b.0)));

        let mut report = Revalidation::default();
        for (slot, entry) in entries {
            match self.revalidate(&entry).await {
                Ok(built) if built.cached => report.reused += 1,
                Ok(_) => report.rebuilt += 1,
                Err(e) => {
                    warn!("Re-validating {} failed: {}", slot.display(), e);
                    report.failed.push((slot, e));
                }
            }
        }

        info!(
            "Re-validated store: {} reused, {} rebuilt, {} failed",
            report.reused,
            report.rebuilt,
            report.failed.len()
        );
        Ok(report)
    }

    async fn execute(
        &self,
        builder: &dyn StageBuilder,
        key: CacheKey,
        namespace: String,
        input: Value,
    ) -> GristResult<Built<Value>> {
        let kind = builder.kind();
        let window = builder.window(&input)?;
        let slot = self.store.slot(kind, &namespace, &key);

        let _guard = self.locks.acquire(&slot).await;

        let previous = match self.store.get(&slot).await {
            Ok(entry) => entry,
            Err(e) => {
                self.degrade(e)?;
                None
            }
        };

        if let Some(entry) = &previous {
            if self.reusable(builder, entry, window) {
                debug!("{} {}: cache hit", kind, key.short());
                return Ok(Built {
                    value: entry.output.clone(),
                    origin: entry.origin,
                    produced_at: entry.produced_at,
                    cached: true,
                    persisted: entry.persisted,
                });
            }
        } else {
            debug!("{} {}: no recorded result", kind, key.short());
        }

        info!("Running {}: {}", kind, builder.describe(&input));

        let previous_output = previous
            .as_ref()
            .filter(|entry| entry.is_compatible())
            .map(|entry| &entry.output);
        let output = builder.build(&input, previous_output).await?;

        let depends_on = builder.upstream(&input)?;
        let entry = CacheEntry::new(
            key,
            kind,
            namespace,
            input,
            output,
            builder.persisted(),
            depends_on,
        );

        if let Err(e) = self.store.put(&slot, &entry).await {
            self.degrade(e)?;
        }

        debug!("{} {}: recorded origin {}", kind, entry.key.short(), entry.origin.short());
        Ok(Built {
            value: entry.output,
            origin: entry.origin,
            produced_at: entry.produced_at,
            cached: false,
            persisted: entry.persisted,
        })
    }

    fn reusable(&self, builder: &dyn StageBuilder, entry: &CacheEntry, window: StalenessWindow) -> bool {
        let kind = builder.kind();
        if !entry.is_compatible() {
            debug!("{} {}: record format {} is outdated", kind, entry.key.short(), entry.format);
            return false;
        }
        if let Freshness::Stale(reason) = staleness::check(entry, window, Utc::now()) {
            debug!("{} {}: stale, {}", kind, entry.key.short(), reason);
            return false;
        }
        if !builder.is_intact(&entry.output) {
            debug!("{} {}: recorded output is missing", kind, entry.key.short());
            return false;
        }
        true
    }

    /// Recover from an unusable store unless running strict
    fn degrade(&self, error: GristError) -> GristResult<()> {
        match error {
            GristError::StoreUnavailable { .. } if !self.strict => {
                warn!("{}; recomputing without cache", error);
                Ok(())
            }
            other => Err(other),
        }
    }
}
