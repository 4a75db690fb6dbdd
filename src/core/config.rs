//! Agent configuration: TOML file loading, validation, and per-run cycle
//! settings.
//!
//! All fields use `#[serde(default)]` so a partial config file (or one written
//! by a newer agent) parses without hard failure. Validation is explicit and
//! runs after parsing, so a bad `check_freq` is reported with its own error
//! code rather than a serde message.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{AgentError, Result};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/telemetry-agent/agent.toml";

/// Safety multiplier applied to the collection interval to derive the
/// watchdog timeout. Generous slack for slow cycles while still bounding
/// total staleness.
pub const WATCHDOG_MULTIPLIER: u32 = 10;

const DEFAULT_CHECK_FREQ_SECS: u64 = 15;

/// Well-known filesystem locations for the agent's persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Single-instance PID file.
    pub pid_file: PathBuf,
    /// Run-status record for out-of-band inspection.
    pub status_file: PathBuf,
    /// Append-only JSONL activity log.
    pub activity_log: PathBuf,
    /// Spool file the built-in emitter appends collected payloads to.
    pub metrics_spool: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let dir = default_run_dir();
        Self {
            pid_file: dir.join("telemetry-agent.pid"),
            status_file: dir.join("telemetry-agent-status.json"),
            activity_log: dir.join("telemetry-agent.jsonl"),
            metrics_spool: dir.join("telemetry-agent-spool.jsonl"),
        }
    }
}

/// Prefer `/var/run` when it is writable; fall back to the system temp
/// directory for unprivileged runs.
fn default_run_dir() -> PathBuf {
    let var_run = PathBuf::from("/var/run");
    if var_run.is_dir()
        && fs::metadata(&var_run)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false)
        && probe_writable(&var_run)
    {
        return var_run;
    }
    std::env::temp_dir()
}

fn probe_writable(dir: &Path) -> bool {
    let probe = dir.join(".telemetry-agent-probe");
    match fs::write(&probe, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

/// Immutable agent configuration, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Collection interval in seconds.
    pub check_freq: u64,
    /// Whether watchdog supervision is enabled.
    pub watchdog: bool,
    /// Comma-separated list of additional emitter identifiers.
    pub custom_emitters: String,
    /// Explicit hostname override.
    pub hostname: Option<String>,
    /// Use the cloud instance id as the hostname when no override is set.
    pub use_instance_id: bool,
    /// Echo activity events to stderr in addition to the JSONL log.
    pub debug_mode: bool,
    /// Persisted-state locations.
    pub paths: PathsConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            check_freq: DEFAULT_CHECK_FREQ_SECS,
            watchdog: true,
            custom_emitters: String::new(),
            hostname: None,
            use_instance_id: false,
            debug_mode: false,
            paths: PathsConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration.
    ///
    /// With an explicit path, the file must exist. With `None`, the default
    /// path is used when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(AgentError::MissingConfig {
                        path: explicit.to_path_buf(),
                    });
                }
                Self::parse_file(explicit)?
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::parse_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| AgentError::io(path, source))?;
        Ok(toml::from_str(&raw)?)
    }

    /// Validate resolved settings.
    pub fn validate(&self) -> Result<()> {
        if self.check_freq == 0 {
            return Err(AgentError::InvalidConfig {
                details: "check_freq must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    /// Custom emitter identifiers, split from the comma-separated setting.
    /// Empty entries are discarded.
    #[must_use]
    pub fn custom_emitter_names(&self) -> Vec<String> {
        self.custom_emitters
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    /// Per-run cycle settings derived from this configuration.
    #[must_use]
    pub fn cycle(&self) -> CycleConfig {
        CycleConfig {
            interval: Duration::from_secs(self.check_freq),
            watchdog: self.watchdog,
        }
    }
}

/// Immutable per-run cycle settings consumed by the supervision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleConfig {
    /// Interval between collection cycles.
    pub interval: Duration,
    /// Whether watchdog supervision is enabled for this run.
    pub watchdog: bool,
}

impl CycleConfig {
    /// Watchdog timeout for this run: interval × safety multiplier.
    #[must_use]
    pub fn watchdog_timeout(&self) -> Duration {
        self.interval * WATCHDOG_MULTIPLIER
    }
}
