//! Frame clock used by async rendering.
//!
//! The scheduler never spins its own loop. In async mode it asks the host
//! for a frame and does one bounded drain step when the host calls
//! [`Scheduler::on_frame`](super::Scheduler::on_frame) with that frame.

use std::cell::RefCell;
use std::rc::Rc;

/// Handle of a requested frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

impl FrameId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for FrameId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Source of animation frames.
pub trait FrameClock {
    /// Ask for one callback on the next frame.
    fn request_frame(&mut self) -> FrameId;

    /// Cancel a frame that has not fired yet.
    fn cancel_frame(&mut self, frame: FrameId);
}

#[derive(Debug, Default)]
struct ClockState {
    next: u64,
    pending: Option<FrameId>,
    requested: usize,
    cancelled: usize,
}

/// A clock the host ticks by hand.
///
/// Clones share state, so the host can keep one handle and give another to
/// the scheduler.
///
/// ```rust
/// use trellis_core::schedule::{FrameClock, ManualClock};
///
/// let clock = ManualClock::new();
/// let mut handle = clock.clone();
/// let frame = handle.request_frame();
/// assert_eq!(clock.pending(), Some(frame));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Rc<RefCell<ClockState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The frame waiting to be delivered, if any.
    pub fn pending(&self) -> Option<FrameId> {
        self.state.borrow().pending
    }

    /// Take the pending frame so it can be delivered.
    pub fn tick(&self) -> Option<FrameId> {
        self.state.borrow_mut().pending.take()
    }

    pub fn requested(&self) -> usize {
        self.state.borrow().requested
    }

    pub fn cancelled(&self) -> usize {
        self.state.borrow().cancelled
    }
}

impl FrameClock for ManualClock {
    fn request_frame(&mut self) -> FrameId {
        let mut state = self.state.borrow_mut();
        state.next += 1;
        state.requested += 1;
        let frame = FrameId(state.next);
        state.pending = Some(frame);
        frame
    }

    fn cancel_frame(&mut self, frame: FrameId) {
        let mut state = self.state.borrow_mut();
        if state.pending == Some(frame) {
            state.pending = None;
            state.cancelled += 1;
        }
    }
}
