//! Runtime configuration.

use serde::Deserialize;

/// Default ceiling on flush passes before giving up with
/// [`Error::FlushDivergence`](crate::Error::FlushDivergence).
pub const DEFAULT_MAX_FLUSH_PASSES: usize = 100;

/// Tunables for a thread's reactive runtime.
///
/// Deserializable so host applications can keep it in their own config
/// files; missing fields fall back to the defaults.
///
/// ```rust,ignore
/// let config: RuntimeConfig = serde_json::from_str(r#"{ "max_flush_passes": 16 }"#)?;
/// Runtime::configure(config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many passes one flush may take before it is considered runaway.
    pub max_flush_passes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: DEFAULT_MAX_FLUSH_PASSES,
        }
    }
}

impl RuntimeConfig {
    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }
}
