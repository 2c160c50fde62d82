//! Trellis Core
//!
//! This crate provides the view-update scheduler of the Trellis diagram
//! editor. It sits between the diagram model and the views that render it.
//! It implements:
//!
//! - Per-class dirty flags merged into one bitmask per entity
//! - Priority-ordered, coalescing update queues
//! - Cascading updates from nodes to the edges attached to them
//! - Viewport virtualization with bounded, round-robin visibility checks
//! - Sync and frame-driven async draining, with keyed freezing and batches
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `flags`: dirty-flag tables of view classes
//! - `graph`: entity snapshots and the topology index
//! - `schedule`: the scheduler, its queue, viewport lists and batches
//!
//! # Example
//!
//! ```rust
//! use trellis_core::flags::{Bits, FlagMapBuilder};
//! use trellis_core::graph::Entity;
//! use trellis_core::schedule::{Scheduler, SchedulerConfig, UpdateContext, View};
//! use trellis_core::{ConfigurationError, ViewError};
//!
//! struct Box2d {
//!     renders: usize,
//! }
//!
//! impl View for Box2d {
//!     fn class(&self) -> &str {
//!         "box"
//!     }
//!
//!     fn declare_flags(&self, flags: &mut FlagMapBuilder) -> Result<(), ConfigurationError> {
//!         flags.declare("position", &["TRANSLATE"])?;
//!         flags.init(&["RENDER"])?;
//!         Ok(())
//!     }
//!
//!     fn confirm_update(&mut self, _bits: Bits, _ctx: &mut UpdateContext<'_>) -> Result<Bits, ViewError> {
//!         self.renders += 1;
//!         Ok(0)
//!     }
//! }
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::default());
//! let node = Entity::node(1u64);
//! scheduler.on_add(node.clone(), Box::new(Box2d { renders: 0 }))?;
//! scheduler.on_attribute_changed(node, &["position"])?;
//!
//! assert!(!scheduler.has_scheduled_updates());
//! assert!(scheduler.viewport().is_mounted(1u64.into()));
//! # Ok::<(), trellis_core::SchedulerError>(())
//! ```

pub mod flags;
pub mod graph;
pub mod schedule;

mod error;

pub use error::{ConfigurationError, Result, SchedulerError, ViewError};
