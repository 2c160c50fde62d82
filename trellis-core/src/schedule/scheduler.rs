//! Update Scheduler
//!
//! The scheduler decides when each view runs. Model notifications become
//! dirty bits in the [`UpdateQueue`]; draining delivers them to views in
//! ascending priority, mounting and unmounting views on the way according to
//! the host's visibility predicate.
//!
//! # Algorithm
//!
//! 1. A request folds its bits into the entity's single pending entry.
//!    Unless it is structural, mounting or isolated, it also schedules
//!    every edge attached to the entity one priority later, so edges always
//!    see their endpoints' new state.
//!
//! 2. A drain pass walks the buckets from the most urgent. For each entity:
//!    - if the predicate hides it, unmount it and park its bits in the
//!      unmounted ledger
//!    - if it is visible but not mounted, add an insert
//!    - deliver the bits; whatever the view leaves is re-queued, after one
//!      attempt to force the endpoints it waits on
//!
//! 3. In sync mode a drain runs inside the request. In async mode each frame
//!    runs one bounded pass plus one bounded visibility check, and render
//!    hooks fire once per cycle.
//!
//! # Freezing
//!
//! `freeze` stops draining without dropping anything. A keyed freeze lets
//! nested callers cooperate: the first key wins, and unfreezing a keyed
//! freeze that was stacked on a plain one leaves the scheduler frozen.

use smallvec::{smallvec, SmallVec};
use tracing::{debug, debug_span, trace, warn};

use super::batch::{BatchTracker, DeferredAction};
use super::config::{SchedulerConfig, Sorting};
use super::context::UpdateContext;
use super::events::{EventBus, SchedulerEvent, SubscriberId};
use super::frame::{FrameClock, FrameId, ManualClock};
use super::paint::PaintOrder;
use super::queue::{Scheduled, UpdateQueue};
use super::registry::{ViewRecord, ViewRegistry};
use super::stats::{DrainStats, RenderStats, VisibilityStats};
use super::view::{ScheduleOptions, View};
use super::viewport::{Transition, ViewportController};
use super::Priority;
use crate::error::{Result, SchedulerError};
use crate::flags::{labels, Bits, FlagRegistry, FLAG_INIT, FLAG_INSERT, FLAG_REMOVE, STRUCTURAL};
use crate::graph::{ConnectedOptions, EndpointKind, Entity, EntityId, TopologyIndex};

const ADD_BATCH: &str = "add";
const ADD_KEY: &str = "add_entities";
const RESET_KEY: &str = "reset";

type Work = SmallVec<[(EntityId, Bits, Priority); 8]>;

type VisibilityFn = Box<dyn FnMut(&Entity, bool) -> bool>;
type BeforeRenderFn = Box<dyn FnMut(&DrainOptions)>;
type AfterRenderFn = Box<dyn FnMut(&RenderStats, &DrainOptions)>;
type ScheduleFn = Box<dyn FnMut(EntityId, Bits, Priority)>;
type ProgressFn = Box<dyn FnMut(bool, usize, usize)>;

/// Where visibility comes from during a drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    /// Ask the host's predicate. Views are visible when there is none.
    #[default]
    Predicate,

    /// Keep every view mounted or unmounted as it is.
    KeepCurrent,

    /// Treat every view as visible.
    All,
}

/// Options of a drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOptions {
    pub visibility: Visibility,

    /// Skip render hooks and events.
    pub silent: bool,
}

impl From<&ScheduleOptions> for DrainOptions {
    fn from(opts: &ScheduleOptions) -> Self {
        Self {
            visibility: Visibility::Predicate,
            silent: opts.silent,
        }
    }
}

/// Coarse state of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    SyncDraining,
    AsyncDraining,
    Frozen,
}

#[derive(Default)]
struct Hooks {
    visibility: Option<VisibilityFn>,
    before_render: Option<BeforeRenderFn>,
    after_render: Option<AfterRenderFn>,
    on_schedule: Option<ScheduleFn>,
    on_progress: Option<ProgressFn>,
}

#[derive(Debug, Default)]
struct FreezeState {
    frozen: bool,
    key: Option<String>,

    /// The scheduler was already frozen when the current key froze it.
    key_frozen: bool,
}

/// Progress of the current async render cycle.
#[derive(Debug, Default)]
struct Cycle {
    started: bool,
    stats: RenderStats,
    processed: usize,
    checked_mounted: usize,
    checked_unmounted: usize,
}

/// Builds a [`Scheduler`] with host hooks.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<Box<dyn FrameClock>>,
    hooks: Hooks,
}

impl SchedulerBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            clock: None,
            hooks: Hooks::default(),
        }
    }

    /// Visibility predicate, called with the entity and whether its view is
    /// currently mounted.
    pub fn visibility<F>(mut self, predicate: F) -> Self
    where
        F: FnMut(&Entity, bool) -> bool + 'static,
    {
        self.hooks.visibility = Some(Box::new(predicate));
        self
    }

    pub fn before_render<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&DrainOptions) + 'static,
    {
        self.hooks.before_render = Some(Box::new(hook));
        self
    }

    pub fn after_render<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&RenderStats, &DrainOptions) + 'static,
    {
        self.hooks.after_render = Some(Box::new(hook));
        self
    }

    /// Called for every request that changed the queue, cascades included.
    pub fn on_schedule<F>(mut self, hook: F) -> Self
    where
        F: FnMut(EntityId, Bits, Priority) + 'static,
    {
        self.hooks.on_schedule = Some(Box::new(hook));
        self
    }

    /// Called after every async step with `(empty, processed, total)`.
    pub fn on_progress<F>(mut self, hook: F) -> Self
    where
        F: FnMut(bool, usize, usize) + 'static,
    {
        self.hooks.on_progress = Some(Box::new(hook));
        self
    }

    pub fn frame_clock<C>(mut self, clock: C) -> Self
    where
        C: FrameClock + 'static,
    {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn build(self) -> Scheduler {
        let batches = BatchTracker::new()
            .with_category(
                DeferredAction::FlushUpdates,
                self.config.update_delaying_batches.iter().cloned(),
            )
            .with_category(
                DeferredAction::Resort,
                self.config.sort_delaying_batches.iter().cloned(),
            );
        let frozen = self.config.frozen;
        let mut scheduler = Scheduler {
            config: self.config,
            flags: FlagRegistry::new(),
            views: ViewRegistry::new(),
            topology: TopologyIndex::new(),
            queue: UpdateQueue::new(),
            viewport: ViewportController::new(),
            batches,
            paint: PaintOrder::new(),
            events: EventBus::new(),
            clock: self
                .clock
                .unwrap_or_else(|| Box::new(ManualClock::new()) as Box<dyn FrameClock>),
            hooks: self.hooks,
            suspend: FreezeState {
                frozen,
                ..FreezeState::default()
            },
            frame: None,
            frame_options: DrainOptions::default(),
            cycle: Cycle::default(),
            idle: None,
            needs_sort: false,
            fresh_after_reset: false,
            draining: false,
            disposed: false,
        };
        if !frozen && scheduler.is_async() {
            scheduler.request_frame();
        }
        scheduler
    }
}

/// Drives views from dirty bits to up-to-date renders.
pub struct Scheduler {
    config: SchedulerConfig,
    flags: FlagRegistry,
    views: ViewRegistry,
    topology: TopologyIndex,
    queue: UpdateQueue,
    viewport: ViewportController,
    batches: BatchTracker,
    paint: PaintOrder,
    events: EventBus,
    clock: Box<dyn FrameClock>,
    hooks: Hooks,
    suspend: FreezeState,

    /// Frame the async loop is waiting for.
    frame: Option<FrameId>,
    frame_options: DrainOptions,
    cycle: Cycle,

    /// Set while auto-idled, with the options to resume with.
    idle: Option<DrainOptions>,

    needs_sort: bool,
    fresh_after_reset: bool,
    draining: bool,
    disposed: bool,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        SchedulerBuilder::new(config).build()
    }

    pub fn builder(config: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        if self.draining {
            SchedulerState::SyncDraining
        } else if self.is_frozen() {
            SchedulerState::Frozen
        } else if self.is_async() && self.frame.is_some() {
            SchedulerState::AsyncDraining
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_async(&self) -> bool {
        self.config.is_async()
    }

    /// Frozen by a caller. An auto-idled scheduler is not frozen.
    pub fn is_frozen(&self) -> bool {
        self.suspend.frozen && self.idle.is_none()
    }

    pub fn is_idle(&self) -> bool {
        self.idle.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn has_scheduled_updates(&self) -> bool {
        self.queue.has_pending()
    }

    /// Entities dirtied in the current render cycle.
    pub fn pending_count(&self) -> usize {
        self.queue.count()
    }

    pub fn queue(&self) -> &UpdateQueue {
        &self.queue
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn topology(&self) -> &TopologyIndex {
        &self.topology
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    pub fn record(&self, id: EntityId) -> Option<&ViewRecord> {
        self.views.get(id)
    }

    pub fn flags(&self) -> &FlagRegistry {
        &self.flags
    }

    pub fn batches(&self) -> &BatchTracker {
        &self.batches
    }

    pub fn paint_order(&self) -> &PaintOrder {
        &self.paint
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriberId
    where
        F: FnMut(&SchedulerEvent) + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.events.unsubscribe(id)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            Err(SchedulerError::Disposed)
        } else {
            Ok(())
        }
    }

    // ---------------------------------------------------------------------
    // Model notifications
    // ---------------------------------------------------------------------

    /// An entity was added to the model.
    pub fn on_add(&mut self, entity: Entity, view: Box<dyn View>) -> Result<()> {
        self.on_add_with(entity, view, &ScheduleOptions::default())
    }

    pub fn on_add_with(
        &mut self,
        entity: Entity,
        view: Box<dyn View>,
        opts: &ScheduleOptions,
    ) -> Result<()> {
        self.ensure_live()?;
        let id = entity.id();
        if self.topology.is_node(id) || self.topology.is_edge(id) {
            self.topology.on_remove(id);
        }
        self.topology.on_add(&entity);
        self.render_view(entity, view, opts)
    }

    /// Add many entities as one `add` batch. In sync mode they are drained
    /// together once all of them are registered.
    pub fn add_entities<I>(&mut self, entities: I) -> Result<()>
    where
        I: IntoIterator<Item = (Entity, Box<dyn View>)>,
    {
        self.ensure_live()?;
        self.start_batch(ADD_BATCH);
        let freeze = !self.is_async();
        if freeze {
            self.freeze(Some(ADD_KEY));
        }
        let added = entities
            .into_iter()
            .try_for_each(|(entity, view)| self.on_add(entity, view));
        let unfrozen = if freeze {
            self.unfreeze(Some(ADD_KEY))
        } else {
            Ok(())
        };
        let stopped = self.stop_batch(ADD_BATCH);
        added.and(unfrozen).and(stopped)
    }

    /// An entity was removed from the model. Its view is torn down when the
    /// removal drains.
    pub fn on_remove(&mut self, id: EntityId) -> Result<()> {
        self.on_remove_with(id, &ScheduleOptions::default())
    }

    pub fn on_remove_with(&mut self, id: EntityId, opts: &ScheduleOptions) -> Result<()> {
        self.ensure_live()?;
        let priority = self
            .views
            .get(id)
            .map(ViewRecord::priority)
            .ok_or(SchedulerError::MissingView(id))?;
        self.topology.on_remove(id);
        self.request_update(id, FLAG_REMOVE, priority, opts)
    }

    /// The model was replaced wholesale.
    pub fn on_reset<I>(&mut self, entities: I) -> Result<()>
    where
        I: IntoIterator<Item = (Entity, Box<dyn View>)>,
    {
        self.ensure_live()?;
        let entities: Vec<_> = entities.into_iter().collect();
        let _span = debug_span!("reset", entities = entities.len()).entered();

        let key = if self.is_idle() { None } else { Some(RESET_KEY) };
        self.freeze(key);
        self.reset_updates();
        self.topology.on_reset(entities.iter().map(|(entity, _)| entity));

        let added = entities.into_iter().try_for_each(|(entity, view)| {
            self.render_view(entity, view, &ScheduleOptions::default())
        });
        let unfrozen = self.unfreeze(key);
        added.and(unfrozen)?;
        self.sort_views();
        Ok(())
    }

    /// Attributes of an entity changed. `entity` is its new snapshot.
    pub fn on_attribute_changed(&mut self, entity: Entity, changed: &[&str]) -> Result<()> {
        self.on_attribute_changed_with(entity, changed, &ScheduleOptions::default())
    }

    pub fn on_attribute_changed_with(
        &mut self,
        entity: Entity,
        changed: &[&str],
        opts: &ScheduleOptions,
    ) -> Result<()> {
        self.ensure_live()?;
        let id = entity.id();
        let record = self
            .views
            .get_mut(id)
            .ok_or(SchedulerError::MissingView(id))?;
        let previous = std::mem::replace(&mut record.entity, entity);
        let current = &record.entity;

        for kind in [EndpointKind::Source, EndpointKind::Target] {
            if let (Some(old), Some(new)) = (previous.endpoint(kind), current.endpoint(kind)) {
                if old != new {
                    self.topology.on_endpoint_changed(id, kind, &old, &new);
                }
            }
        }
        if previous.parent() != current.parent() {
            self.topology
                .on_parent_changed(id, previous.parent(), current.parent());
        }
        let z_changed = previous.z() != current.z();
        if z_changed {
            self.paint.set_z(id, current.z());
        }

        let bits = record.flags.change_bits(changed.iter().copied());
        let priority = record.priority;
        if bits != 0 {
            self.request_update(id, bits, priority, opts)?;
        }
        if z_changed {
            self.sort_views();
        }
        Ok(())
    }

    fn render_view(&mut self, entity: Entity, view: Box<dyn View>, opts: &ScheduleOptions) -> Result<()> {
        let id = entity.id();
        if let Some(previous) = self.views.unregister(id) {
            debug!(%id, "re-added before removal drained, discarding old view");
            self.discard(previous);
        }
        let flags = self
            .flags
            .flags_for(view.class(), |builder| view.declare_flags(builder))?;
        let init = flags.init_bits();
        let record = ViewRecord::new(entity, view, flags);
        let priority = record.priority();
        self.views.register(record);

        let bits = self.viewport.register_unmounted(id) | FLAG_INIT | init;
        self.request_update(id, bits, priority, opts)
    }

    fn discard(&mut self, mut record: ViewRecord) {
        let id = record.id();
        self.queue.take(id);
        self.viewport.forget(id);
        self.paint.remove(id);
        record.view.remove();
    }

    fn reset_updates(&mut self) {
        self.cancel_frame();
        self.queue.clear();
        self.cycle = Cycle::default();
        self.fresh_after_reset = true;
        self.needs_sort = false;
        for mut record in self.views.drain() {
            record.view.remove();
        }
        self.viewport.clear();
        self.paint.clear();
    }

    // ---------------------------------------------------------------------
    // Scheduling
    // ---------------------------------------------------------------------

    /// Schedule `bits` and drain right away when nothing holds it back.
    pub fn request_update(
        &mut self,
        id: EntityId,
        bits: Bits,
        priority: Priority,
        opts: &ScheduleOptions,
    ) -> Result<()> {
        self.schedule(id, bits, priority, opts)?;
        if self.is_frozen() || self.is_idle() {
            return Ok(());
        }
        if opts.async_update.unwrap_or(self.is_async()) {
            return Ok(());
        }
        if self.batches.defer(DeferredAction::FlushUpdates) {
            trace!(%id, "flush deferred by open batch");
            return Ok(());
        }
        self.drain_sync(&DrainOptions::from(opts)).map(drop)
    }

    /// Add `bits` to the entity's pending work without draining.
    pub fn schedule(
        &mut self,
        id: EntityId,
        bits: Bits,
        priority: Priority,
        opts: &ScheduleOptions,
    ) -> Result<()> {
        self.ensure_live()?;
        if !self.views.contains(id) {
            return Err(SchedulerError::MissingView(id));
        }
        self.wake_up()?;

        let mut work: Work = smallvec![(id, bits, priority)];
        while let Some((id, bits, priority)) = work.pop() {
            if self.queue.schedule(id, bits, priority) == Scheduled::Unchanged {
                continue;
            }
            trace!(%id, bits, priority, "scheduled");
            if let Some(hook) = self.hooks.on_schedule.as_mut() {
                hook(id, bits, priority);
            }
            if opts.cascades() && bits & (FLAG_INSERT | FLAG_REMOVE) == 0 {
                self.cascade(id, priority, &mut work);
            }
        }
        Ok(())
    }

    /// Queue the edges attached to `id` one priority after it.
    fn cascade(&self, id: EntityId, priority: Priority, work: &mut Work) {
        for edge in self.topology.connected_edges(id, ConnectedOptions::all()) {
            let Some(record) = self.views.get(edge) else {
                continue;
            };
            let ends = self.topology.ends(edge).unwrap_or_default();
            let mut names: SmallVec<[&str; 3]> = smallvec![labels::UPDATE];
            if ends.source == Some(id) {
                names.push(labels::SOURCE);
            }
            if ends.target == Some(id) {
                names.push(labels::TARGET);
            }
            let bits = record.flags().bits(&names);
            if bits == 0 {
                continue;
            }
            let next = priority.saturating_add(1).max(record.priority());
            work.push((edge, bits, next));
        }
    }

    fn wake_up(&mut self) -> Result<()> {
        if let Some(opts) = self.idle {
            debug!("waking from idle");
            self.unfreeze_with(None, opts)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Draining
    // ---------------------------------------------------------------------

    /// One pass over the queue, stopping after `max` completed updates.
    pub fn drain_batch(&mut self, max: Option<usize>, visibility: Visibility) -> Result<DrainStats> {
        self.ensure_live()?;
        let limit = max.unwrap_or(usize::MAX);
        let mut stats = DrainStats::default();
        let mut cursor = None;

        'buckets: while let Some(priority) = self.queue.next_priority(cursor) {
            cursor = Some(priority);
            for id in self.queue.snapshot(priority) {
                if stats.updated >= limit {
                    break 'buckets;
                }
                let Some(mut bits) = self.queue.bits_at(priority, id) else {
                    continue;
                };
                if !self.views.contains(id) {
                    warn!(%id, "dropping pending update for entity without a view");
                    self.queue.remove(priority, id);
                    continue;
                }

                if bits & FLAG_REMOVE == 0 {
                    let mounted = !self.viewport.is_unmounted(id);
                    if !self.evaluate_visibility(id, mounted, visibility) {
                        if mounted && self.viewport.register_unmounted(id) != 0 {
                            self.hide_view(id);
                        }
                        self.viewport.merge_unmounted(id, bits);
                        self.queue.remove(priority, id);
                        stats.unmounted += 1;
                        continue;
                    }
                    if !mounted {
                        bits |= FLAG_INSERT;
                        stats.mounted += 1;
                    }
                    bits |= self.viewport.register_mounted(id);
                }

                self.queue.remove(priority, id);
                let leftover = self.run_update(id, bits, priority)?;
                if leftover != 0 {
                    self.queue.store(id, leftover, priority);
                    if !self.resolve_postponed(id)? {
                        stats.postponed += 1;
                        continue;
                    }
                }
                stats.updated += 1;
                stats.record_priority(priority);
            }
        }

        self.queue.prune();
        stats.empty = !self.queue.has_pending();
        debug!(
            updated = stats.updated,
            postponed = stats.postponed,
            mounted = stats.mounted,
            unmounted = stats.unmounted,
            empty = stats.empty,
            "drain pass"
        );
        Ok(stats)
    }

    /// Drain until the queue is empty or a pass makes no progress.
    pub fn drain_sync(&mut self, opts: &DrainOptions) -> Result<RenderStats> {
        self.ensure_live()?;
        let _span = debug_span!("drain_sync").entered();
        self.notify_before_render(opts);

        self.draining = true;
        let mut render = RenderStats::default();
        let result = loop {
            match self.drain_batch(None, opts.visibility) {
                Ok(stats) => {
                    render.absorb(&stats);
                    if stats.empty || !stats.made_progress() {
                        break Ok(());
                    }
                }
                Err(err) => break Err(err),
            }
        };
        self.draining = false;
        result?;

        self.queue.reset_count();
        self.notify_after_render(&render, opts);
        Ok(render)
    }

    /// Deliver `bits` to one view and return what it left undone.
    ///
    /// On failure the bits the view still owes are put back in the queue.
    fn run_update(&mut self, id: EntityId, bits: Bits, priority: Priority) -> Result<Bits> {
        match self.update_view(id, bits) {
            Ok(leftover) => Ok(leftover),
            Err(err) => {
                let inserted = self.views.get(id).is_some_and(ViewRecord::is_inserted);
                let owed = if inserted { bits & !(FLAG_INSERT | FLAG_INIT) } else { bits };
                self.queue.store(id, owed, priority);
                Err(err)
            }
        }
    }

    fn update_view(&mut self, id: EntityId, bits: Bits) -> Result<Bits> {
        if bits & FLAG_REMOVE != 0 {
            self.remove_view(id);
            return Ok(0);
        }
        let Some(mut record) = self.views.unregister(id) else {
            return Ok(0);
        };
        let result = self.deliver(&mut record, bits);
        self.views.register(record);

        let (leftover, requests) = result?;
        for request in requests {
            let priority = match request.priority {
                Some(priority) => priority,
                None => self
                    .views
                    .get(request.id)
                    .map(ViewRecord::priority)
                    .ok_or(SchedulerError::MissingView(request.id))?,
            };
            self.schedule(request.id, request.bits, priority, &ScheduleOptions::default())?;
        }
        Ok(leftover)
    }

    fn deliver(
        &mut self,
        record: &mut ViewRecord,
        mut bits: Bits,
    ) -> Result<(Bits, Vec<super::context::UpdateRequest>)> {
        let id = record.id();
        if bits & FLAG_INSERT != 0 {
            record
                .view
                .mount(bits & FLAG_INIT != 0)
                .map_err(|source| SchedulerError::View { id, source })?;
            record.inserted = true;
            self.paint.insert(id, record.entity.z(), self.config.sorting);
        }
        bits &= !STRUCTURAL;
        if bits == 0 {
            return Ok((0, Vec::new()));
        }

        let ViewRecord {
            entity, view, flags, ..
        } = record;
        let mut ctx = UpdateContext::new(entity, flags, &self.topology, &self.viewport, &self.views);
        let leftover = view
            .confirm_update(bits, &mut ctx)
            .map_err(|source| SchedulerError::View { id, source })?;
        Ok((leftover, ctx.into_requests()))
    }

    fn remove_view(&mut self, id: EntityId) {
        if let Some(mut record) = self.views.unregister(id) {
            trace!(%id, "removing view");
            record.view.remove();
        }
        self.viewport.forget(id);
        self.paint.remove(id);
    }

    fn hide_view(&mut self, id: EntityId) {
        if let Some(record) = self.views.get_mut(id) {
            if record.inserted {
                record.view.unmount();
                record.inserted = false;
            }
        }
        self.paint.remove(id);
    }

    /// Force an edge that waits on unmounted endpoints: render the endpoints
    /// now, then retry the edge once. Returns whether the edge is done.
    fn resolve_postponed(&mut self, id: EntityId) -> Result<bool> {
        if !self.config.resolve_postponed {
            return Ok(false);
        }
        let Some(record) = self.views.get(id) else {
            return Ok(false);
        };
        if !record.entity().is_edge() {
            return Ok(false);
        }
        let ends = [record.entity().source_entity(), record.entity().target_entity()];

        let mut blocked = 0;
        for end in ends.into_iter().flatten() {
            if self.views.contains(end) && !self.viewport.is_mounted(end) {
                blocked |= self.dump_view(end, &DrainOptions { silent: true, ..Default::default() })?;
            }
        }
        if blocked != 0 {
            return Ok(false);
        }
        debug!(%id, "forcing postponed update");
        let leftover = self.dump_view(id, &DrainOptions { silent: true, ..Default::default() })?;
        Ok(leftover == 0)
    }

    /// Run one view's pending update right now, mounting it if needed.
    fn dump_view(&mut self, id: EntityId, opts: &DrainOptions) -> Result<Bits> {
        let Some(priority) = self.views.get(id).map(ViewRecord::priority) else {
            return Ok(0);
        };
        let pending = self.queue.take(id).map_or(0, |(_, bits)| bits);
        let bits = self.viewport.register_mounted(id) | pending;
        if bits == 0 {
            return Ok(0);
        }
        self.notify_before_render(opts);
        let leftover = self.run_update(id, bits, priority)?;
        self.queue.store(id, leftover, priority);

        let mut render = RenderStats::default();
        render.absorb(&DrainStats {
            updated: 1,
            mounted: usize::from(bits & FLAG_INSERT != 0),
            priority: Some(priority),
            ..Default::default()
        });
        self.notify_after_render(&render, opts);
        Ok(leftover)
    }

    /// Bring one entity's view up to date synchronously, mounting it if it
    /// is not mounted. Returns the bits it left undone.
    pub fn require(&mut self, id: EntityId) -> Result<Bits> {
        self.ensure_live()?;
        if !self.views.contains(id) {
            return Err(SchedulerError::MissingView(id));
        }
        self.dump_view(id, &DrainOptions::default())
    }

    fn evaluate_visibility(&mut self, id: EntityId, mounted: bool, visibility: Visibility) -> bool {
        is_visible(&self.views, &mut self.hooks, id, mounted, visibility)
    }

    fn notify_before_render(&mut self, opts: &DrainOptions) {
        if opts.silent {
            return;
        }
        if let Some(hook) = self.hooks.before_render.as_mut() {
            hook(opts);
        }
    }

    fn notify_after_render(&mut self, stats: &RenderStats, opts: &DrainOptions) {
        if opts.silent {
            return;
        }
        if let Some(hook) = self.hooks.after_render.as_mut() {
            hook(stats, opts);
        }
        self.events.emit(&SchedulerEvent::RenderDone(*stats));
    }

    // ---------------------------------------------------------------------
    // Async frames
    // ---------------------------------------------------------------------

    fn request_frame(&mut self) {
        if self.frame.is_none() {
            self.frame = Some(self.clock.request_frame());
        }
    }

    fn cancel_frame(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.clock.cancel_frame(frame);
        }
    }

    /// Run one async step. The host calls this when a frame it was asked
    /// for fires; frames that were cancelled or superseded are ignored.
    pub fn on_frame(&mut self, frame: FrameId) -> Result<()> {
        self.ensure_live()?;
        if self.frame != Some(frame) {
            trace!(frame = frame.raw(), "ignoring stale frame");
            return Ok(());
        }
        self.frame = None;
        let opts = self.frame_options;
        let _span = debug_span!("frame", frame = frame.raw()).entered();

        if self.fresh_after_reset {
            self.fresh_after_reset = false;
            if self.viewport.mounted_len() == 0 && self.viewport.unmounted_len() == 0 {
                self.drain_sync(&opts)?;
                self.request_frame();
                return Ok(());
            }
        }

        if !self.cycle.started && self.queue.has_pending() {
            self.cycle.started = true;
            self.notify_before_render(&opts);
        }
        let stats = self.drain_batch(self.config.batch_size, opts.visibility)?;
        let mount_cap = self.config.mount_batch_size.saturating_sub(stats.mounted);
        let unmount_cap = self.config.unmount_batch_size.saturating_sub(stats.unmounted);
        let check = self.schedule_visibility_update(mount_cap, unmount_cap, opts.visibility)?;
        let total = self.queue.count();

        if self.cycle.started {
            self.cycle.stats.absorb(&stats);
            self.cycle.stats.absorb_visibility(&check);
        }
        let mut processed = self.cycle.processed;
        if stats.made_progress() {
            processed += stats.updated + stats.unmounted;
            self.cycle.processed = processed;
            self.cycle.checked_mounted = 0;
            self.cycle.checked_unmounted = 0;
            if stats.empty && check.mounted == 0 {
                let render = std::mem::take(&mut self.cycle).stats;
                self.queue.reset_count();
                self.notify_after_render(&render, &opts);
            }
        } else {
            // Batch sizes may be `usize::MAX`.
            self.cycle.checked_unmounted = self.cycle.checked_unmounted.saturating_add(mount_cap);
            self.cycle.checked_mounted = self.cycle.checked_mounted.saturating_add(unmount_cap);
            if self.config.auto_idle
                && !self.queue.has_pending()
                && self.cycle.checked_unmounted >= self.viewport.unmounted_len()
                && self.cycle.checked_mounted >= self.viewport.mounted_len()
            {
                self.freeze(None);
                self.idle = Some(opts);
                self.cycle = Cycle::default();
                debug!("render idle");
                self.events.emit(&SchedulerEvent::RenderIdle);
                return Ok(());
            }
        }

        if total > 0 {
            if let Some(hook) = self.hooks.on_progress.as_mut() {
                hook(stats.empty, processed, total);
            }
        }
        self.request_frame();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Freezing
    // ---------------------------------------------------------------------

    /// Stop draining. Pending bits are kept and a pending frame is cancelled.
    pub fn freeze(&mut self, key: Option<&str>) {
        if let Some(key) = key {
            if self.suspend.key.as_deref() != Some(key) {
                if self.suspend.frozen && self.suspend.key.is_some() {
                    trace!(key, "already frozen under another key");
                    return;
                }
                self.suspend.key_frozen = self.is_frozen();
                self.suspend.key = Some(key.to_owned());
            }
        }
        self.suspend.frozen = true;
        self.idle = None;
        self.cancel_frame();
        debug!(key = ?key, "frozen");
    }

    pub fn unfreeze(&mut self, key: Option<&str>) -> Result<()> {
        self.unfreeze_with(key, DrainOptions::default())
    }

    /// Resume draining: flush now in sync mode, restart the frame loop in
    /// async mode.
    pub fn unfreeze_with(&mut self, key: Option<&str>, opts: DrainOptions) -> Result<()> {
        self.ensure_live()?;
        let held = self.suspend.key.take();
        if let Some(key) = key {
            let matches = held.as_deref() == Some(key);
            if held.is_some() && !matches {
                trace!(key, "unfreeze with a different key ignored");
                self.suspend.key = held;
                return Ok(());
            }
            if matches && self.suspend.key_frozen {
                trace!(key, "keyed freeze was stacked on a freeze, staying frozen");
                return Ok(());
            }
        }
        self.idle = None;
        debug!(key = ?key, "unfrozen");

        let result = if self.is_async() {
            self.freeze(None);
            self.frame_options = opts;
            self.cycle = Cycle::default();
            self.request_frame();
            Ok(())
        } else {
            self.drain_sync(&opts).map(drop)
        };
        self.suspend.frozen = false;
        self.suspend.key_frozen = false;
        if self.needs_sort {
            self.needs_sort = false;
            self.sort_views();
        }
        result
    }

    // ---------------------------------------------------------------------
    // Batches and paint order
    // ---------------------------------------------------------------------

    pub fn start_batch(&mut self, name: &str) {
        let depth = self.batches.start(name);
        debug!(batch = name, depth, "batch started");
        self.events.emit(&SchedulerEvent::BatchStart {
            name: name.to_owned(),
        });
    }

    /// Close a batch and run the work it held back.
    pub fn stop_batch(&mut self, name: &str) -> Result<()> {
        let was_active = self.batches.is_active(name);
        let due = self.batches.stop(name);
        if !was_active {
            return Ok(());
        }
        debug!(batch = name, "batch stopped");
        self.events.emit(&SchedulerEvent::BatchStop {
            name: name.to_owned(),
        });
        for action in due {
            match action {
                DeferredAction::FlushUpdates => {
                    if !self.is_frozen() && !self.is_idle() && !self.is_async() {
                        self.drain_sync(&DrainOptions::default())?;
                    }
                }
                DeferredAction::Resort => self.sort_views(),
            }
        }
        Ok(())
    }

    pub fn has_active_batch(&self, names: &[&str]) -> bool {
        self.batches.has_active(names)
    }

    /// Re-sort the paint order by z. Only exact sorting re-sorts; the sort is
    /// postponed while frozen or while a sort-delaying batch is open.
    pub fn sort_views(&mut self) {
        if self.config.sorting != Sorting::Exact {
            return;
        }
        if self.is_frozen() || self.is_idle() {
            self.needs_sort = true;
            return;
        }
        if self.batches.defer(DeferredAction::Resort) {
            return;
        }
        self.paint.sort();
        trace!(views = self.paint.len(), "paint order sorted");
        self.events.emit(&SchedulerEvent::Sorted);
    }

    // ---------------------------------------------------------------------
    // Viewport
    // ---------------------------------------------------------------------

    /// Recheck up to `batch` mounted views, unmounting the ones that are no
    /// longer visible. Returns how many were unmounted.
    pub fn check_mounted(&mut self, batch: usize) -> usize {
        self.check_mounted_with(batch, Visibility::Predicate)
    }

    fn check_mounted_with(&mut self, batch: usize, visibility: Visibility) -> usize {
        if visibility != Visibility::Predicate || self.hooks.visibility.is_none() {
            return 0;
        }
        let Self {
            viewport,
            views,
            hooks,
            ..
        } = self;
        let hidden = viewport.check_mounted(batch, |id, mounted| {
            is_visible(views, hooks, id, mounted, visibility)
        });
        for id in &hidden {
            self.hide_view(*id);
        }
        hidden.len()
    }

    /// Recheck up to `batch` unmounted views, scheduling the owed work of
    /// the ones that became visible. Returns how many were mounted.
    pub fn check_unmounted(&mut self, batch: usize) -> Result<usize> {
        self.check_unmounted_with(batch, Visibility::Predicate)
    }

    fn check_unmounted_with(&mut self, batch: usize, visibility: Visibility) -> Result<usize> {
        let Self {
            viewport,
            views,
            hooks,
            ..
        } = self;
        let shown = viewport.check_unmounted(batch, |id, mounted| {
            is_visible(views, hooks, id, mounted, visibility)
        });
        for (id, bits) in &shown {
            self.schedule_owed(*id, *bits)?;
        }
        Ok(shown.len())
    }

    fn schedule_owed(&mut self, id: EntityId, bits: Bits) -> Result<()> {
        if bits == 0 {
            return Ok(());
        }
        let priority = self
            .views
            .get(id)
            .map(ViewRecord::priority)
            .ok_or(SchedulerError::MissingView(id))?;
        self.schedule(id, bits, priority, &ScheduleOptions::mounting())
    }

    fn schedule_visibility_update(
        &mut self,
        mount_batch: usize,
        unmount_batch: usize,
        visibility: Visibility,
    ) -> Result<VisibilityStats> {
        let unmounted = self.check_mounted_with(unmount_batch, visibility);
        let mut mount_batch = mount_batch;
        if unmounted > 0 {
            // Skip the views that were just unmounted.
            mount_batch = mount_batch.min(self.viewport.unmounted_len() - unmounted);
        }
        let mounted = self.check_unmounted_with(mount_batch, visibility)?;
        Ok(VisibilityStats { mounted, unmounted })
    }

    /// One bounded visibility check in both directions, using the configured
    /// batch sizes.
    pub fn check_viewport(&mut self) -> Result<VisibilityStats> {
        self.ensure_live()?;
        let (mount, unmount) = (self.config.mount_batch_size, self.config.unmount_batch_size);
        self.schedule_visibility_update(mount, unmount, Visibility::Predicate)
    }

    /// Recheck every view, then drain keeping the visibility just computed.
    pub fn update_visibility(&mut self) -> Result<RenderStats> {
        self.ensure_live()?;
        let check = self.schedule_visibility_update(usize::MAX, usize::MAX, Visibility::Predicate)?;
        let mut render = self.drain_sync(&DrainOptions {
            visibility: Visibility::KeepCurrent,
            silent: false,
        })?;
        render.absorb_visibility(&check);
        Ok(render)
    }

    /// Re-evaluate one entity now. A view that becomes visible is brought up
    /// to date immediately.
    pub fn check_one(&mut self, id: EntityId) -> Result<VisibilityStats> {
        self.ensure_live()?;
        if !self.views.contains(id) {
            return Err(SchedulerError::MissingView(id));
        }
        let visible = self.evaluate_visibility(id, false, Visibility::Predicate);
        let mut stats = VisibilityStats::default();
        match self.viewport.check_one(id, visible) {
            Transition::Unmounted => {
                self.hide_view(id);
                stats.unmounted = 1;
            }
            Transition::Mounted(bits) => {
                self.schedule_owed(id, bits)?;
                self.require(id)?;
                stats.mounted = 1;
            }
            Transition::Unchanged => {}
        }
        Ok(stats)
    }

    /// Check this unmounted view first in the next visibility check.
    pub fn prioritize_mount(&mut self, id: EntityId) -> bool {
        self.viewport.prioritize_mount(id)
    }

    /// Check this mounted view first in the next visibility check.
    pub fn prioritize_unmount(&mut self, id: EntityId) -> bool {
        self.viewport.prioritize_unmount(id)
    }

    // ---------------------------------------------------------------------
    // Teardown
    // ---------------------------------------------------------------------

    /// Tear every view down. Later frames and unfreezes fail with
    /// [`SchedulerError::Disposed`].
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.freeze(None);
        self.reset_updates();
        self.fresh_after_reset = false;
        self.topology = TopologyIndex::new();
        self.batches.clear();
        self.events.clear();
        self.disposed = true;
        debug!("scheduler disposed");
    }
}

fn is_visible(
    views: &ViewRegistry,
    hooks: &mut Hooks,
    id: EntityId,
    mounted: bool,
    visibility: Visibility,
) -> bool {
    let Some(record) = views.get(id) else {
        return mounted;
    };
    if !record.is_detachable() {
        return true;
    }
    match visibility {
        Visibility::All => true,
        Visibility::KeepCurrent => mounted,
        Visibility::Predicate => match hooks.visibility.as_mut() {
            Some(predicate) => predicate(record.entity(), mounted),
            None => true,
        },
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("views", &self.views.len())
            .field("pending", &self.queue.len())
            .field("mounted", &self.viewport.mounted_len())
            .field("unmounted", &self.viewport.unmounted_len())
            .field("frame", &self.frame)
            .finish()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_frame();
    }
}
