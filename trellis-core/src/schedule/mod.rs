//! Update Scheduling
//!
//! This module turns "this entity changed" into "these views re-rendered,
//! in this order". It owns the pending update table, the viewport lists,
//! the batch counters and the registry of live views.
//!
//! # Overview
//!
//! - [`UpdateQueue`]: priority buckets of entity id → dirty bits
//! - [`ViewportController`]: which views are mounted, checked round-robin
//! - [`BatchTracker`]: named batches and the work they hold back
//! - [`Scheduler`]: ties them together and drives the [`View`]s
//!
//! # Priorities
//!
//! Lower priorities drain first. Nodes conventionally use
//! [`NODE_PRIORITY`] and edges [`EDGE_PRIORITY`], so that an edge is drawn
//! after the nodes it connects. A cascade always lands at least one
//! priority after the request that caused it.

mod batch;
mod config;
mod context;
mod events;
mod frame;
mod paint;
mod queue;
mod registry;
mod scheduler;
mod stats;
mod view;
mod viewport;

pub use batch::{BatchTracker, DeferredAction};
pub use config::{RenderMode, SchedulerConfig, Sorting};
pub use context::UpdateContext;
pub use events::{EventBus, SchedulerEvent, SubscriberId};
pub use frame::{FrameClock, FrameId, ManualClock};
pub use paint::PaintOrder;
pub use queue::{Scheduled, UpdateQueue};
pub use registry::{ViewRecord, ViewRegistry};
pub use scheduler::{DrainOptions, Scheduler, SchedulerBuilder, SchedulerState, Visibility};
pub use stats::{DrainStats, RenderStats, VisibilityStats};
pub use view::{ScheduleOptions, View};
pub use viewport::{Transition, ViewportController};

/// Update priority. Lower is more urgent.
pub type Priority = u32;

/// Conventional priority of node views.
pub const NODE_PRIORITY: Priority = 0;

/// Conventional priority of edge views.
pub const EDGE_PRIORITY: Priority = 1;
