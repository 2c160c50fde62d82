//! The contract between the scheduler and the views it drives.

use crate::error::{ConfigurationError, ViewError};
use crate::flags::{Bits, FlagMapBuilder};

use super::context::UpdateContext;
use super::Priority;

/// A renderable view of one entity.
///
/// The scheduler decides *when* a view runs; the view decides *what* its
/// dirty bits mean. Views of the same [`class`](View::class) share one flag
/// table, built from [`declare_flags`](View::declare_flags) the first time
/// the class is seen.
pub trait View {
    /// Name of the view class. Views of one class must declare the same
    /// flags.
    fn class(&self) -> &str;

    /// Declare which attributes dirty which labels.
    fn declare_flags(&self, _flags: &mut FlagMapBuilder) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Intrinsic scheduling priority. Lower runs first.
    fn priority(&self) -> Priority {
        0
    }

    /// Whether the view can be unmounted when it leaves the viewport.
    fn detachable(&self) -> bool {
        true
    }

    /// Bring the view up to date for `bits`.
    ///
    /// Returns the bits it could not handle yet. They stay pending and the
    /// view is offered them again later.
    fn confirm_update(&mut self, bits: Bits, ctx: &mut UpdateContext<'_>) -> Result<Bits, ViewError>;

    /// Attach the view to the render surface. `initial` is set on the
    /// first mount.
    fn mount(&mut self, _initial: bool) -> Result<(), ViewError> {
        Ok(())
    }

    /// Detach the view from the render surface, keeping its state.
    fn unmount(&mut self) {}

    /// Tear the view down for good.
    fn remove(&mut self) {}
}

/// Per-request options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleOptions {
    /// The request comes from mounting; do not cascade to edges.
    pub mounting: bool,

    /// Do not cascade to edges.
    pub isolate: bool,

    /// Do not fire render hooks or events for the drain this triggers.
    pub silent: bool,

    /// Override the configured mode for this request. `Some(false)` drains
    /// synchronously even in async mode.
    pub async_update: Option<bool>,
}

impl ScheduleOptions {
    pub fn mounting() -> Self {
        Self {
            mounting: true,
            ..Self::default()
        }
    }

    pub fn isolated() -> Self {
        Self {
            isolate: true,
            ..Self::default()
        }
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Drain synchronously regardless of mode.
    pub fn sync(mut self) -> Self {
        self.async_update = Some(false);
        self
    }

    pub(crate) fn cascades(&self) -> bool {
        !self.mounting && !self.isolate
    }
}
