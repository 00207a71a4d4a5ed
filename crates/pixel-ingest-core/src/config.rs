use crate::normalize::{GridShape, Truncation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a failing task does to the rest of its batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Every task publishes as soon as it is done; a failure is scoped to its own report.
    #[default]
    Isolate,
    /// Grids are held until the whole batch has finished and delivered only if
    /// every task succeeded. Sinks then fire on the joining thread.
    AllOrNothing,
}

impl FromStr for FailurePolicy {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "all_or_nothing" | "strict" => Ok(Self::AllOrNothing),
            _ => Err(()),
        }
    }
}

/// Decode pipeline configuration.
/// Key notes:
///   - `grid_shape` selects the exact `height x width` grid or the square-by-height layout
///   - `truncation` picks how 16-bit samples narrow to 8 bits
///   - `parallel` only affects `decode_all` when the `parallel` feature is enabled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestConfig {
    #[serde(default)]
    pub grid_shape: GridShape,
    #[serde(default)]
    pub truncation: Truncation,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Largest accepted width or height, checked after the metadata pass.
    #[serde(default = "default_max_side")]
    pub max_side: u32,
    /// Run `decode_all` on the rayon pool when feature "parallel" is on.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Prefix for the names of threads spawned by `dispatch`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            grid_shape: GridShape::default(),
            truncation: Truncation::default(),
            failure_policy: FailurePolicy::default(),
            max_side: default_max_side(),
            parallel: default_parallel(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl IngestConfig {
    /// Validates the configuration parameters.
    ///
    /// Returns an error if `max_side` is zero or the thread name prefix is empty.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::IngestError;

        if self.max_side == 0 {
            return Err(IngestError::InvalidConfig(
                "max_side must be at least 1".into(),
            ));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(IngestError::InvalidConfig(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Create a fluent builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::new()
    }
}

fn default_max_side() -> u32 {
    16384
}
fn default_parallel() -> bool {
    false
}
fn default_thread_name_prefix() -> String {
    "decode-".into()
}

/// Builder for `IngestConfig` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct IngestConfigBuilder {
    cfg: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: IngestConfig::default(),
        }
    }
    pub fn grid_shape(mut self, v: GridShape) -> Self {
        self.cfg.grid_shape = v;
        self
    }
    pub fn truncation(mut self, v: Truncation) -> Self {
        self.cfg.truncation = v;
        self
    }
    pub fn failure_policy(mut self, v: FailurePolicy) -> Self {
        self.cfg.failure_policy = v;
        self
    }
    pub fn max_side(mut self, v: u32) -> Self {
        self.cfg.max_side = v;
        self
    }
    pub fn parallel(mut self, v: bool) -> Self {
        self.cfg.parallel = v;
        self
    }
    pub fn thread_name_prefix(mut self, v: impl Into<String>) -> Self {
        self.cfg.thread_name_prefix = v.into();
        self
    }
    pub fn build(self) -> IngestConfig {
        self.cfg
    }
}
