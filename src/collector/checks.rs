//! Check-module registry and the built-in system checks.
//!
//! Modules are resolved by identifier from an explicit registry populated at
//! startup — no dynamic loading. [`load_check_modules`] builds the full set
//! once per run; the supervision loop passes the same instances to every
//! cycle.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::config::AgentConfig;
use crate::core::errors::{AgentError, Result};

use super::CheckModule;

type CheckFactory = Box<dyn Fn() -> Box<dyn CheckModule> + Send>;

/// Identifier → factory mapping for check modules.
pub struct CheckRegistry {
    factories: BTreeMap<String, CheckFactory>,
}

impl fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}

impl Default for CheckRegistry {
    /// Registry pre-populated with the built-in system checks.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("system.load", || Box::new(LoadAvgCheck));
        registry.register("system.memory", || Box::new(MemoryCheck));
        registry.register("system.uptime", || Box::new(UptimeCheck));
        registry
    }
}

impl CheckRegistry {
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
        factory: impl Fn() -> Box<dyn CheckModule> + Send + 'static,
    ) {
        self.factories
            .insert(identifier.to_string(), Box::new(factory));
    }

    /// Instantiate the module registered under `identifier`.
    pub fn build(&self, identifier: &str) -> Result<Box<dyn CheckModule>> {
        self.factories
            .get(identifier)
            .map(|factory| factory())
            .ok_or_else(|| AgentError::UnknownCheck {
                name: identifier.to_string(),
            })
    }

    /// Registered identifiers, in stable order.
    #[must_use]
    pub fn identifiers(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Instantiate every registered module.
    #[must_use]
    pub fn build_all(&self) -> Vec<Box<dyn CheckModule>> {
        self.factories.values().map(|factory| factory()).collect()
    }
}

/// Resolve the per-run module set. Loaded once at startup, not per cycle.
pub fn load_check_modules(_config: &AgentConfig) -> Result<Vec<Box<dyn CheckModule>>> {
    Ok(CheckRegistry::default().build_all())
}

// ---------------------------------------------------------------------------
// Built-in checks
// ---------------------------------------------------------------------------

/// 1/5/15-minute load averages from /proc/loadavg.
#[derive(Debug, Default)]
pub struct LoadAvgCheck;

impl CheckModule for LoadAvgCheck {
    fn name(&self) -> &str {
        "system.load"
    }

    fn collect(&mut self) -> Result<BTreeMap<String, f64>> {
        let raw = read_proc("/proc/loadavg")?;
        if raw.is_empty() {
            return Ok(BTreeMap::new());
        }
        parse_loadavg(&raw)
    }
}

fn parse_loadavg(raw: &str) -> Result<BTreeMap<String, f64>> {
    let mut fields = raw.split_whitespace();
    let mut metrics = BTreeMap::new();
    for key in ["system.load.1", "system.load.5", "system.load.15"] {
        let value = fields
            .next()
            .and_then(|f| f.parse::<f64>().ok())
            .ok_or_else(|| AgentError::Runtime {
                details: format!("malformed loadavg line: {raw:?}"),
            })?;
        metrics.insert(key.to_string(), value);
    }
    Ok(metrics)
}

/// Total/free/available memory from /proc/meminfo, in bytes.
#[derive(Debug, Default)]
pub struct MemoryCheck;

impl CheckModule for MemoryCheck {
    fn name(&self) -> &str {
        "system.memory"
    }

    fn collect(&mut self) -> Result<BTreeMap<String, f64>> {
        Ok(parse_meminfo(&read_proc("/proc/meminfo")?))
    }
}

fn parse_meminfo(raw: &str) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    for line in raw.lines() {
        let (metric, prefix) = match line {
            l if l.starts_with("MemTotal:") => ("system.mem.total", "MemTotal:"),
            l if l.starts_with("MemFree:") => ("system.mem.free", "MemFree:"),
            l if l.starts_with("MemAvailable:") => ("system.mem.available", "MemAvailable:"),
            _ => continue,
        };
        if let Some(kb) = line
            .trim_start_matches(prefix)
            .split_whitespace()
            .next()
            .and_then(|f| f.parse::<f64>().ok())
        {
            metrics.insert(metric.to_string(), kb * 1024.0);
        }
    }
    metrics
}

/// Seconds since boot from /proc/uptime.
#[derive(Debug, Default)]
pub struct UptimeCheck;

impl CheckModule for UptimeCheck {
    fn name(&self) -> &str {
        "system.uptime"
    }

    fn collect(&mut self) -> Result<BTreeMap<String, f64>> {
        let raw = read_proc("/proc/uptime")?;
        if raw.is_empty() {
            return Ok(BTreeMap::new());
        }
        let uptime = raw
            .split_whitespace()
            .next()
            .and_then(|f| f.parse::<f64>().ok())
            .ok_or_else(|| AgentError::Runtime {
                details: format!("malformed uptime line: {raw:?}"),
            })?;
        Ok(BTreeMap::from([("system.uptime".to_string(), uptime)]))
    }
}

#[cfg(target_os = "linux")]
fn read_proc(path: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| AgentError::io(path, source))
}

/// Non-Linux hosts have no procfs; the built-ins report nothing rather than
/// failing every cycle.
#[cfg(not(target_os = "linux"))]
fn read_proc(_path: &str) -> Result<String> {
    Ok(String::new())
}
