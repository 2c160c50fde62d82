//! Dirty Flags
//!
//! Every view class declares the aspects of its rendering that can go stale
//! ("labels") and which model attributes dirty them. Each label is given one
//! bit, so the work owed to a view is a single integer that can be merged
//! with `|` and tested with `&`.
//!
//! # Bit layout
//!
//! - bits `0..FLAG_BUDGET` belong to the view class's labels
//! - [`FLAG_INIT`], [`FLAG_REMOVE`], [`FLAG_INSERT`] are reserved for the
//!   scheduler's structural work
//!
//! The scheduler never interprets class labels beyond delivering them. The
//! only labels it names are the ones edges use to learn that an endpoint
//! moved (see [`labels`]).

mod registry;

pub use registry::{FlagMap, FlagMapBuilder, FlagRegistry};

/// A dirty bitmask.
pub type Bits = u32;

/// Maximum number of labels a single view class may declare.
pub const FLAG_BUDGET: u32 = 25;

/// The view must be inserted (mounted) before it is updated.
pub const FLAG_INSERT: Bits = 1 << 30;

/// The view must be removed. Always delivered alone.
pub const FLAG_REMOVE: Bits = 1 << 29;

/// Set together with [`FLAG_INSERT`] the first time a view is rendered.
pub const FLAG_INIT: Bits = 1 << 28;

/// Bits that describe structural work rather than a stale aspect.
pub const STRUCTURAL: Bits = FLAG_INSERT | FLAG_REMOVE | FLAG_INIT;

/// Well-known labels used by the connected-edge cascade.
pub mod labels {
    /// The edge must recompute its geometry.
    pub const UPDATE: &str = "UPDATE";

    /// The edge's source end moved.
    pub const SOURCE: &str = "SOURCE";

    /// The edge's target end moved.
    pub const TARGET: &str = "TARGET";
}
