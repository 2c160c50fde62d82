//! Error types.

use thiserror::Error;

use crate::graph::EntityId;

/// Error type returned by a view's update contract.
pub type ViewError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A fatal setup error. These are caller bugs in the static configuration of
/// view classes or the host, never runtime conditions.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("view class `{class}` declares more than {budget} dirty flags")]
    FlagBudgetExceeded { class: String, budget: u32 },

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

/// Errors surfaced by the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// An update was requested for an entity without a view record.
    #[error("no view registered for entity {0}")]
    MissingView(EntityId),

    /// A view failed inside its update contract. The scheduler does not
    /// isolate view faults; the drain step that hit it is aborted.
    #[error("view for entity {id} failed to update")]
    View {
        id: EntityId,
        #[source]
        source: ViewError,
    },

    #[error("scheduler has been disposed")]
    Disposed,
}

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;
