//! Emitter registry and the built-in emission targets.
//!
//! The delivery transport is outside this crate's contract; the built-in
//! spool emitter stands in for it by appending each cycle's payload to a
//! local JSONL spool that a shipping process can drain. Custom emitters are
//! resolved by identifier from the registry once at startup — an unknown
//! identifier is a configuration error before any daemonization.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;

use crate::core::config::AgentConfig;
use crate::core::errors::{AgentError, Result};
use crate::logger::{ActivityEvent, ActivityLoggerHandle};

use super::{Emitter, MetricPayload};

type EmitterFactory = Box<dyn Fn(&EmitterContext) -> Box<dyn Emitter> + Send>;

/// Startup context factories may draw on.
#[derive(Debug, Clone)]
pub struct EmitterContext {
    /// Spool destination for disk-backed emitters.
    pub spool_path: PathBuf,
    /// Activity log handle for log-backed emitters.
    pub logger: ActivityLoggerHandle,
}

/// Identifier → factory mapping for emitters.
pub struct EmitterRegistry {
    factories: BTreeMap<String, EmitterFactory>,
}

impl fmt::Debug for EmitterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}

impl Default for EmitterRegistry {
    /// Registry pre-populated with the built-in emitters.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("spool", |ctx| {
            Box::new(SpoolEmitter::new(ctx.spool_path.clone()))
        });
        registry.register("log", |ctx| Box::new(LogEmitter::new(ctx.logger.clone())));
        registry
    }
}

impl EmitterRegistry {
    /// Registry with no entries.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a factory under an identifier, replacing any previous entry.
    pub fn register(
        &mut self,
        identifier: &str,
        factory: impl Fn(&EmitterContext) -> Box<dyn Emitter> + Send + 'static,
    ) {
        self.factories
            .insert(identifier.to_string(), Box::new(factory));
    }

    /// Instantiate the emitter registered under `identifier`.
    pub fn build(&self, identifier: &str, ctx: &EmitterContext) -> Result<Box<dyn Emitter>> {
        self.factories
            .get(identifier)
            .map(|factory| factory(ctx))
            .ok_or_else(|| AgentError::UnknownEmitter {
                name: identifier.to_string(),
            })
    }

    /// Registered identifiers, in stable order.
    #[must_use]
    pub fn identifiers(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

/// Resolve the per-run emitter set: the spool emitter always, plus each
/// configured custom identifier. Resolved once at startup.
pub fn load_emitters(
    config: &AgentConfig,
    registry: &EmitterRegistry,
    ctx: &EmitterContext,
) -> Result<Vec<Box<dyn Emitter>>> {
    let mut emitters = vec![registry.build("spool", ctx)?];
    for name in config.custom_emitter_names() {
        emitters.push(registry.build(&name, ctx)?);
    }
    Ok(emitters)
}

// ---------------------------------------------------------------------------
// Built-in emitters
// ---------------------------------------------------------------------------

/// Appends each payload as one JSONL line to the local spool file.
#[derive(Debug)]
pub struct SpoolEmitter {
    path: PathBuf,
}

impl SpoolEmitter {
    /// Spool emitter for the given destination.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Emitter for SpoolEmitter {
    fn name(&self) -> &str {
        "spool"
    }

    fn emit(&mut self, payload: &MetricPayload) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| AgentError::io(parent, source))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| AgentError::io(&self.path, source))?;
        writeln!(file, "{json}").map_err(|source| AgentError::io(&self.path, source))?;
        Ok(())
    }
}

/// Echoes a one-line summary of each payload into the activity log.
#[derive(Debug)]
pub struct LogEmitter {
    logger: ActivityLoggerHandle,
}

impl LogEmitter {
    /// Log emitter writing through the given handle.
    #[must_use]
    pub fn new(logger: ActivityLoggerHandle) -> Self {
        Self { logger }
    }
}

impl Emitter for LogEmitter {
    fn name(&self) -> &str {
        "log"
    }

    fn emit(&mut self, payload: &MetricPayload) -> Result<()> {
        self.logger.send(ActivityEvent::PayloadEmitted {
            emitter: "log".to_string(),
            host: payload.host.clone(),
            metrics: payload.metrics.len(),
        });
        Ok(())
    }
}
