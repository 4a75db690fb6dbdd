//! Host identity resolution: explicit override, optional cloud instance id,
//! OS hostname fallback.

use crate::core::config::AgentConfig;

/// Optional cloud-instance identity lookup. The supervisor only consumes
/// this seam; metadata-service probing lives behind it.
pub trait IdentityResolver {
    /// The cloud instance id for this host, when running on a recognized
    /// cloud and the lookup succeeds.
    fn instance_id(&self) -> Option<String>;
}

/// Resolver for hosts with no cloud identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCloud;

impl IdentityResolver for NoCloud {
    fn instance_id(&self) -> Option<String> {
        None
    }
}

/// Resolve the identity stamped on every payload: explicit config override
/// first, then the instance id when enabled, then the OS hostname.
#[must_use]
pub fn resolve_hostname(config: &AgentConfig, resolver: &dyn IdentityResolver) -> String {
    if let Some(hostname) = &config.hostname {
        return hostname.clone();
    }
    if config.use_instance_id
        && let Some(instance_id) = resolver.instance_id()
    {
        return instance_id;
    }
    os_hostname()
}

#[cfg(unix)]
fn os_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(not(unix))]
fn os_hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".to_string())
}
