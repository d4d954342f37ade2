use std::sync::OnceLock;

/// Process-scoped runtime configuration: set once at startup, read-only
/// afterwards.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Iteration cap for the eager fixed-point flush.
    pub max_flush_iterations: usize,
    /// When false the engine installs a no-op diagnostic sink instead of
    /// the logging one.
    pub log_diagnostics: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: 64,
            log_diagnostics: true,
        }
    }
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Install the configuration. Later calls are ignored; the first one wins.
pub fn set_config(config: RuntimeConfig) {
    let _ = CONFIG.set(config);
}

/// Get the configuration, falling back to defaults when nothing was set.
pub fn config() -> RuntimeConfig {
    CONFIG.get().cloned().unwrap_or_default()
}
