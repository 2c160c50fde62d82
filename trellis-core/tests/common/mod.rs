//! Probe views shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use trellis_core::flags::{Bits, FlagMapBuilder};
use trellis_core::graph::{Endpoint, Entity, EntityId};
use trellis_core::schedule::{Priority, Scheduler, UpdateContext, View, EDGE_PRIORITY};
use trellis_core::{ConfigurationError, ViewError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Mount { id: EntityId, initial: bool },
    Update { id: EntityId, bits: Bits },
    Unmount(EntityId),
    Remove(EntityId),
}

pub type Log = Rc<RefCell<Vec<Call>>>;

pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

/// Every update delivered, in order.
pub fn updates(log: &Log) -> Vec<(EntityId, Bits)> {
    log.borrow()
        .iter()
        .filter_map(|call| match call {
            Call::Update { id, bits } => Some((*id, *bits)),
            _ => None,
        })
        .collect()
}

pub fn count(log: &Log, pred: impl Fn(&Call) -> bool) -> usize {
    log.borrow().iter().filter(|call| pred(call)).count()
}

pub fn id(raw: u64) -> EntityId {
    EntityId::from(raw)
}

pub fn node(raw: u64) -> Entity {
    Entity::node(raw)
}

pub fn edge(raw: u64, source: u64, target: u64) -> Entity {
    Entity::edge(
        raw,
        Endpoint::Entity(id(source)),
        Endpoint::Entity(id(target)),
    )
}

/// A node view that records every call.
pub struct NodeView {
    pub id: EntityId,
    pub log: Log,
    pub fail: bool,
}

impl NodeView {
    pub fn boxed(raw: u64, log: &Log) -> Box<dyn View> {
        Box::new(Self {
            id: id(raw),
            log: Rc::clone(log),
            fail: false,
        })
    }
}

impl View for NodeView {
    fn class(&self) -> &str {
        "node"
    }

    fn declare_flags(&self, flags: &mut FlagMapBuilder) -> Result<(), ConfigurationError> {
        flags.declare("position", &["TRANSLATE"])?;
        flags.declare("size", &["RESIZE"])?;
        flags.declare("attrs", &["RENDER"])?;
        flags.init(&["RENDER"])?;
        Ok(())
    }

    fn confirm_update(&mut self, bits: Bits, _ctx: &mut UpdateContext<'_>) -> Result<Bits, ViewError> {
        if self.fail {
            return Err("node view exploded".into());
        }
        self.log.borrow_mut().push(Call::Update { id: self.id, bits });
        Ok(0)
    }

    fn mount(&mut self, initial: bool) -> Result<(), ViewError> {
        self.log.borrow_mut().push(Call::Mount { id: self.id, initial });
        Ok(())
    }

    fn unmount(&mut self) {
        self.log.borrow_mut().push(Call::Unmount(self.id));
    }

    fn remove(&mut self) {
        self.log.borrow_mut().push(Call::Remove(self.id));
    }
}

/// An edge view that can refuse to render until both ends are mounted.
pub struct EdgeView {
    pub id: EntityId,
    pub log: Log,
    pub wait_for_ends: bool,
}

impl EdgeView {
    pub fn boxed(raw: u64, log: &Log) -> Box<dyn View> {
        Box::new(Self {
            id: id(raw),
            log: Rc::clone(log),
            wait_for_ends: false,
        })
    }

    pub fn waiting(raw: u64, log: &Log) -> Box<dyn View> {
        Box::new(Self {
            id: id(raw),
            log: Rc::clone(log),
            wait_for_ends: true,
        })
    }
}

impl View for EdgeView {
    fn class(&self) -> &str {
        "edge"
    }

    fn declare_flags(&self, flags: &mut FlagMapBuilder) -> Result<(), ConfigurationError> {
        flags.declare("source", &["SOURCE", "UPDATE"])?;
        flags.declare("target", &["TARGET", "UPDATE"])?;
        flags.declare("labels", &["LABELS"])?;
        flags.init(&["RENDER", "UPDATE"])?;
        Ok(())
    }

    fn priority(&self) -> Priority {
        EDGE_PRIORITY
    }

    fn confirm_update(&mut self, bits: Bits, ctx: &mut UpdateContext<'_>) -> Result<Bits, ViewError> {
        if self.wait_for_ends && !ctx.endpoints_mounted() {
            return Ok(bits);
        }
        self.log.borrow_mut().push(Call::Update { id: self.id, bits });
        Ok(0)
    }

    fn mount(&mut self, initial: bool) -> Result<(), ViewError> {
        self.log.borrow_mut().push(Call::Mount { id: self.id, initial });
        Ok(())
    }

    fn unmount(&mut self) {
        self.log.borrow_mut().push(Call::Unmount(self.id));
    }

    fn remove(&mut self) {
        self.log.borrow_mut().push(Call::Remove(self.id));
    }
}

/// Bits of `labels` in the flag table of `class`.
pub fn bits_of(scheduler: &Scheduler, class: &str, labels: &[&str]) -> Bits {
    scheduler
        .flags()
        .get(class)
        .map(|flags| flags.bits(labels))
        .unwrap_or(0)
}
