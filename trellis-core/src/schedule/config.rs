//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// How requests are drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Drain inside the call that made the request.
    #[default]
    Sync,

    /// Drain in bounded steps, one per frame.
    Async,
}

/// How the paint order follows z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sorting {
    /// Views are painted in insertion order.
    None,

    /// Views are inserted at their z position; z changes after insertion
    /// are not re-sorted.
    #[default]
    Approx,

    /// Like `Approx`, and z changes re-sort the whole order.
    Exact,
}

/// Tunables of a [`Scheduler`](super::Scheduler).
///
/// Every field has a default, so a config file only needs to name the ones
/// it changes:
///
/// ```rust
/// use trellis_core::schedule::{RenderMode, SchedulerConfig};
///
/// let config = SchedulerConfig::from_json(r#"{ "mode": "async", "batch_size": 500 }"#)?;
/// assert_eq!(config.mode, RenderMode::Async);
/// assert_eq!(config.batch_size, Some(500));
/// assert_eq!(config.mount_batch_size, 1000);
/// # Ok::<(), trellis_core::ConfigurationError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub mode: RenderMode,

    /// Start frozen.
    pub frozen: bool,

    /// Most views updated per async step. `None` means no limit.
    pub batch_size: Option<usize>,

    /// Most views mounted per visibility check.
    pub mount_batch_size: usize,

    /// Most views unmounted per visibility check.
    pub unmount_batch_size: usize,

    /// In async mode, freeze when there is nothing to do and wake on the
    /// next request.
    pub auto_idle: bool,

    pub sorting: Sorting,

    /// Force a postponed edge by rendering its unmounted endpoints.
    pub resolve_postponed: bool,

    /// Batches that hold back flushing updates until they close.
    pub update_delaying_batches: Vec<String>,

    /// Batches that hold back re-sorting until they close.
    pub sort_delaying_batches: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::Sync,
            frozen: false,
            batch_size: None,
            mount_batch_size: 1000,
            unmount_batch_size: 1000,
            auto_idle: false,
            sorting: Sorting::Approx,
            resolve_postponed: true,
            update_delaying_batches: vec!["translate".into()],
            sort_delaying_batches: vec!["add".into(), "to-back".into(), "to-front".into()],
        }
    }
}

impl SchedulerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Default config in async mode.
    pub fn asynchronous() -> Self {
        Self {
            mode: RenderMode::Async,
            ..Self::default()
        }
    }

    pub fn is_async(&self) -> bool {
        self.mode == RenderMode::Async
    }
}
