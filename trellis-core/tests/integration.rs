//! Integration Tests for the Scheduler
//!
//! These tests drive a scheduler through model notifications and check what
//! the views observed.

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use common::*;
use trellis_core::flags::{Bits, FlagMapBuilder};
use trellis_core::graph::EntityId;
use trellis_core::schedule::{
    FrameId, ManualClock, RenderStats, ScheduleOptions, Scheduler, SchedulerConfig, SchedulerEvent,
    SchedulerState, Sorting, UpdateContext, View,
};
use trellis_core::{ConfigurationError, SchedulerError, ViewError};

fn recorder(scheduler: &mut Scheduler) -> Rc<RefCell<Vec<SchedulerEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    scheduler.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    events
}

/// A -> E -> B: moving A updates A first, then E, and never B.
#[test]
fn node_change_cascades_to_attached_edge() {
    let log = new_log();
    let scheduled = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&scheduled);
    let mut scheduler = Scheduler::builder(SchedulerConfig::default())
        .on_schedule(move |id, bits, priority| sink.borrow_mut().push((id, bits, priority)))
        .build();

    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();
    scheduler.on_add(node(2), NodeView::boxed(2, &log)).unwrap();
    scheduler.on_add(edge(3, 1, 2), EdgeView::boxed(3, &log)).unwrap();
    log.borrow_mut().clear();
    scheduled.borrow_mut().clear();

    scheduler.on_attribute_changed(node(1), &["position"]).unwrap();

    let translate = bits_of(&scheduler, "node", &["TRANSLATE"]);
    let edge_bits = bits_of(&scheduler, "edge", &["UPDATE", "SOURCE"]);
    assert_eq!(updates(&log), vec![(id(1), translate), (id(3), edge_bits)]);

    let scheduled = scheduled.borrow();
    assert_eq!(scheduled[0], (id(1), translate, 0));
    let (_, _, edge_priority) = scheduled
        .iter()
        .find(|(entity, _, _)| *entity == id(3))
        .copied()
        .unwrap();
    assert!(edge_priority >= 1);
    assert!(scheduled.iter().all(|(entity, _, _)| *entity != id(2)));
}

/// Edges attached to edges are reached through the chain.
#[test]
fn cascade_follows_edge_chains() {
    let log = new_log();
    let mut scheduler = Scheduler::default();
    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();
    scheduler.on_add(node(2), NodeView::boxed(2, &log)).unwrap();
    scheduler.on_add(edge(3, 1, 2), EdgeView::boxed(3, &log)).unwrap();
    // Edge 4 runs from node 2 to the middle of edge 3.
    scheduler.on_add(edge(4, 2, 3), EdgeView::boxed(4, &log)).unwrap();
    log.borrow_mut().clear();

    scheduler.on_attribute_changed(node(1), &["position"]).unwrap();

    let order: Vec<EntityId> = updates(&log).into_iter().map(|(id, _)| id).collect();
    assert_eq!(order, vec![id(1), id(3), id(4)]);
}

#[test]
fn isolated_requests_do_not_cascade() {
    let log = new_log();
    let mut scheduler = Scheduler::default();
    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();
    scheduler.on_add(node(2), NodeView::boxed(2, &log)).unwrap();
    scheduler.on_add(edge(3, 1, 2), EdgeView::boxed(3, &log)).unwrap();
    log.borrow_mut().clear();

    scheduler
        .on_attribute_changed_with(node(1), &["position"], &ScheduleOptions::isolated())
        .unwrap();

    assert_eq!(updates(&log).len(), 1);
}

#[test]
fn freeze_then_unfreeze_updates_each_entity_once() {
    let log = new_log();
    let mut scheduler = Scheduler::default();

    scheduler.freeze(Some("x"));
    for i in 0..50 {
        scheduler.on_add(node(i), NodeView::boxed(i, &log)).unwrap();
        scheduler.on_attribute_changed(node(i), &["position"]).unwrap();
        scheduler.on_attribute_changed(node(i), &["size"]).unwrap();
    }
    assert!(log.borrow().is_empty());
    assert_eq!(scheduler.state(), SchedulerState::Frozen);

    scheduler.unfreeze(Some("x")).unwrap();

    let delivered = updates(&log);
    assert_eq!(delivered.len(), 50);
    let all = bits_of(&scheduler, "node", &["TRANSLATE", "RESIZE", "RENDER"]);
    assert!(delivered.iter().all(|(_, bits)| *bits == all));
    assert_eq!(count(&log, |c| matches!(c, Call::Mount { initial: true, .. })), 50);
    assert!(!scheduler.has_scheduled_updates());
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[test]
fn first_freeze_key_wins() {
    let log = new_log();
    let mut scheduler = Scheduler::default();

    scheduler.freeze(Some("a"));
    scheduler.freeze(Some("b"));
    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();

    scheduler.unfreeze(Some("b")).unwrap();
    assert!(scheduler.is_frozen());
    assert!(log.borrow().is_empty());

    scheduler.unfreeze(Some("a")).unwrap();
    assert!(!scheduler.is_frozen());
    assert_eq!(updates(&log).len(), 1);
}

#[test]
fn keyed_freeze_over_plain_freeze_stays_frozen() {
    let mut scheduler = Scheduler::default();

    scheduler.freeze(None);
    scheduler.freeze(Some("k"));
    scheduler.unfreeze(Some("k")).unwrap();
    assert!(scheduler.is_frozen());

    scheduler.unfreeze(None).unwrap();
    assert!(!scheduler.is_frozen());
}

#[test]
fn unchanged_predicate_makes_second_check_a_no_op() {
    let log = new_log();
    let limit = Rc::new(Cell::new(u64::MAX));
    let bound = Rc::clone(&limit);
    let mut scheduler = Scheduler::builder(SchedulerConfig::default())
        .visibility(move |entity, _| entity.id().raw() < bound.get())
        .build();

    scheduler
        .add_entities((0..100).map(|i| (node(i), NodeView::boxed(i, &log))))
        .unwrap();
    assert_eq!(scheduler.viewport().mounted_len(), 100);

    limit.set(50);
    let first = scheduler.check_viewport().unwrap();
    assert_eq!((first.mounted, first.unmounted), (0, 50));

    let second = scheduler.check_viewport().unwrap();
    assert_eq!((second.mounted, second.unmounted), (0, 0));
    assert_eq!(count(&log, |c| matches!(c, Call::Unmount(_))), 50);
}

#[test]
fn unmounting_is_bounded_per_check() {
    let log = new_log();
    let visible = Rc::new(Cell::new(true));
    let flag = Rc::clone(&visible);
    let mut scheduler = Scheduler::builder(SchedulerConfig::default())
        .visibility(move |_, _| flag.get())
        .build();

    scheduler
        .add_entities((0..10_000).map(|i| (node(i), NodeView::boxed(i, &log))))
        .unwrap();
    assert_eq!(scheduler.viewport().mounted_len(), 10_000);

    visible.set(false);
    assert_eq!(scheduler.check_mounted(1000), 1000);
    assert_eq!(scheduler.viewport().mounted_len(), 9000);
    assert_eq!(scheduler.viewport().unmounted_len(), 1000);
    assert_eq!(count(&log, |c| matches!(c, Call::Unmount(_))), 1000);
}

#[test]
fn hidden_view_keeps_its_work_until_it_mounts_again() {
    let log = new_log();
    let visible = Rc::new(Cell::new(true));
    let flag = Rc::clone(&visible);
    let mut scheduler = Scheduler::builder(SchedulerConfig::default())
        .visibility(move |_, _| flag.get())
        .build();
    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();

    visible.set(false);
    scheduler.on_attribute_changed(node(1), &["position"]).unwrap();
    scheduler.on_attribute_changed(node(1), &["size"]).unwrap();
    assert_eq!(count(&log, |c| matches!(c, Call::Unmount(_))), 1);
    assert!(scheduler.viewport().is_unmounted(id(1)));
    log.borrow_mut().clear();

    visible.set(true);
    scheduler.update_visibility().unwrap();

    let owed = bits_of(&scheduler, "node", &["TRANSLATE", "RESIZE"]);
    assert_eq!(
        *log.borrow(),
        vec![
            Call::Mount { id: id(1), initial: false },
            Call::Update { id: id(1), bits: owed },
        ]
    );
}

#[test]
fn check_one_renders_a_view_that_became_visible() {
    let log = new_log();
    let visible = Rc::new(Cell::new(false));
    let flag = Rc::clone(&visible);
    let mut scheduler = Scheduler::builder(SchedulerConfig::default())
        .visibility(move |_, _| flag.get())
        .build();

    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();
    assert!(log.borrow().is_empty());

    visible.set(true);
    let stats = scheduler.check_one(id(1)).unwrap();

    assert_eq!(stats.mounted, 1);
    let render = bits_of(&scheduler, "node", &["RENDER"]);
    assert_eq!(
        *log.borrow(),
        vec![
            Call::Mount { id: id(1), initial: true },
            Call::Update { id: id(1), bits: render },
        ]
    );
}

#[test]
fn remove_then_readd_before_drain_keeps_only_the_new_view() {
    let old = new_log();
    let new = new_log();
    let mut scheduler = Scheduler::default();
    scheduler.on_add(node(1), NodeView::boxed(1, &old)).unwrap();

    scheduler.freeze(None);
    scheduler.on_remove(id(1)).unwrap();
    scheduler.on_add(node(1), NodeView::boxed(1, &new)).unwrap();
    assert_eq!(count(&old, |c| matches!(c, Call::Remove(_))), 1);

    scheduler.unfreeze(None).unwrap();

    let render = bits_of(&scheduler, "node", &["RENDER"]);
    assert_eq!(
        *new.borrow(),
        vec![
            Call::Mount { id: id(1), initial: true },
            Call::Update { id: id(1), bits: render },
        ]
    );
    assert_eq!(old.borrow().len(), 3);
    assert!(scheduler.viewport().is_mounted(id(1)));
}

#[test]
fn removal_drops_pending_work() {
    let log = new_log();
    let mut scheduler = Scheduler::default();
    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();
    log.borrow_mut().clear();

    scheduler.freeze(None);
    scheduler.on_attribute_changed(node(1), &["position"]).unwrap();
    scheduler.on_remove(id(1)).unwrap();
    scheduler.unfreeze(None).unwrap();

    assert_eq!(*log.borrow(), vec![Call::Remove(id(1))]);
    assert!(scheduler.record(id(1)).is_none());
    assert!(!scheduler.viewport().is_mounted(id(1)));
    assert_eq!(scheduler.paint_order().len(), 0);
}

#[test]
fn bulk_batch_drains_in_one_cycle() {
    let log = new_log();
    let before = Rc::new(Cell::new(0));
    let after = Rc::new(Cell::new(0));
    let (b, a) = (Rc::clone(&before), Rc::clone(&after));
    let mut scheduler = Scheduler::builder(SchedulerConfig::default())
        .before_render(move |_| b.set(b.get() + 1))
        .after_render(move |_, _| a.set(a.get() + 1))
        .build();
    let events = recorder(&mut scheduler);

    scheduler.start_batch("bulk");
    scheduler.freeze(Some("bulk"));
    for i in 400..500 {
        scheduler
            .on_add(edge(i, i - 400, i - 399), EdgeView::boxed(i, &log))
            .unwrap();
    }
    for i in 0..400 {
        scheduler.on_add(node(i), NodeView::boxed(i, &log)).unwrap();
    }
    assert!(log.borrow().is_empty());
    scheduler.unfreeze(Some("bulk")).unwrap();
    scheduler.stop_batch("bulk").unwrap();

    assert_eq!(before.get(), 1);
    assert_eq!(after.get(), 1);

    let delivered = updates(&log);
    assert_eq!(delivered.len(), 500);
    let first_edge = delivered.iter().position(|(id, _)| id.raw() >= 400).unwrap();
    assert_eq!(first_edge, 400);

    let events = events.borrow();
    let starts = events
        .iter()
        .filter(|e| matches!(e, SchedulerEvent::BatchStart { name } if name == "bulk"))
        .count();
    let stops = events
        .iter()
        .filter(|e| matches!(e, SchedulerEvent::BatchStop { name } if name == "bulk"))
        .count();
    let renders = events
        .iter()
        .filter(|e| matches!(e, SchedulerEvent::RenderDone(_)))
        .count();
    assert_eq!((starts, stops, renders), (1, 1, 1));
}

#[test]
fn update_delaying_batch_holds_the_flush() {
    let log = new_log();
    let mut scheduler = Scheduler::default();
    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();
    log.borrow_mut().clear();

    scheduler.start_batch("translate");
    scheduler.on_attribute_changed(node(1), &["position"]).unwrap();
    scheduler.on_attribute_changed(node(1), &["position"]).unwrap();
    assert!(log.borrow().is_empty());
    assert!(scheduler.has_scheduled_updates());

    scheduler.stop_batch("translate").unwrap();
    assert_eq!(updates(&log).len(), 1);
    assert!(!scheduler.has_scheduled_updates());
}

#[test]
fn edge_waiting_on_hidden_endpoint_forces_it() {
    let log = new_log();
    let hidden = id(2);
    let mut scheduler = Scheduler::builder(SchedulerConfig::default())
        .visibility(move |entity, _| entity.id() != hidden)
        .build();

    scheduler.freeze(None);
    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();
    scheduler.on_add(node(2), NodeView::boxed(2, &log)).unwrap();
    scheduler.on_add(edge(3, 1, 2), EdgeView::waiting(3, &log)).unwrap();
    scheduler.unfreeze(None).unwrap();

    assert!(scheduler.viewport().is_mounted(id(2)));
    assert!(updates(&log).iter().any(|(entity, _)| *entity == id(3)));
    let node_two = log
        .borrow()
        .iter()
        .position(|c| *c == Call::Mount { id: id(2), initial: true })
        .unwrap();
    let edge_update = log
        .borrow()
        .iter()
        .position(|c| matches!(c, Call::Update { id: e, .. } if *e == id(3)))
        .unwrap();
    assert!(node_two < edge_update);
    assert!(!scheduler.has_scheduled_updates());
}

#[test]
fn postponed_edge_stays_queued_without_resolution() {
    let log = new_log();
    let hidden = id(2);
    let config = SchedulerConfig {
        resolve_postponed: false,
        ..SchedulerConfig::default()
    };
    let mut scheduler = Scheduler::builder(config)
        .visibility(move |entity, _| entity.id() != hidden)
        .build();

    scheduler.freeze(None);
    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();
    scheduler.on_add(node(2), NodeView::boxed(2, &log)).unwrap();
    scheduler.on_add(edge(3, 1, 2), EdgeView::waiting(3, &log)).unwrap();
    scheduler.unfreeze(None).unwrap();

    assert!(!scheduler.viewport().is_mounted(id(2)));
    assert!(scheduler.queue().contains(id(3)));
    assert!(updates(&log).iter().all(|(entity, _)| *entity != id(3)));
}

#[test]
fn async_mode_drains_in_bounded_frames_then_idles() {
    let log = new_log();
    let clock = ManualClock::new();
    let renders: Rc<RefCell<Vec<RenderStats>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&renders);
    let config = SchedulerConfig {
        batch_size: Some(10),
        auto_idle: true,
        ..SchedulerConfig::asynchronous()
    };
    let mut scheduler = Scheduler::builder(config)
        .frame_clock(clock.clone())
        .after_render(move |stats, _| sink.borrow_mut().push(*stats))
        .build();
    let events = recorder(&mut scheduler);

    for i in 0..25 {
        scheduler.on_add(node(i), NodeView::boxed(i, &log)).unwrap();
    }
    assert!(log.borrow().is_empty());

    // A frame that was never requested is ignored.
    scheduler.on_frame(FrameId::from(9_999)).unwrap();
    assert!(log.borrow().is_empty());

    let mut frames = 0;
    while let Some(frame) = clock.tick() {
        scheduler.on_frame(frame).unwrap();
        frames += 1;
        assert!(frames < 20, "frame loop did not settle");
    }

    assert_eq!(frames, 4);
    assert_eq!(updates(&log).len(), 25);
    {
        let renders = renders.borrow();
        assert_eq!(renders.len(), 1);
        assert_eq!(renders[0].updated, 25);
        assert_eq!(renders[0].batches, 3);
    }
    assert!(events.borrow().contains(&SchedulerEvent::RenderIdle));
    assert!(scheduler.is_idle());
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    // A new request wakes the loop.
    scheduler.on_attribute_changed(node(0), &["size"]).unwrap();
    assert!(!scheduler.is_idle());
    let frame = clock.tick().unwrap();
    scheduler.on_frame(frame).unwrap();
    assert_eq!(updates(&log).len(), 26);
}

#[test]
fn async_progress_reports_the_whole_cycle() {
    let log = new_log();
    let clock = ManualClock::new();
    let progress = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&progress);
    let config = SchedulerConfig {
        batch_size: Some(10),
        auto_idle: true,
        ..SchedulerConfig::asynchronous()
    };
    let mut scheduler = Scheduler::builder(config)
        .frame_clock(clock.clone())
        .on_progress(move |empty, processed, total| sink.borrow_mut().push((empty, processed, total)))
        .build();

    for i in 0..25 {
        scheduler.on_add(node(i), NodeView::boxed(i, &log)).unwrap();
    }
    while let Some(frame) = clock.tick() {
        scheduler.on_frame(frame).unwrap();
    }

    assert_eq!(
        *progress.borrow(),
        vec![(false, 10, 25), (false, 20, 25), (true, 25, 25)]
    );
}

#[test]
fn async_render_hooks_fire_once_per_cycle() {
    let log = new_log();
    let clock = ManualClock::new();
    let before = Rc::new(Cell::new(0));
    let after = Rc::new(Cell::new(0));
    let (b, a) = (Rc::clone(&before), Rc::clone(&after));
    let config = SchedulerConfig {
        batch_size: Some(10),
        auto_idle: true,
        ..SchedulerConfig::asynchronous()
    };
    let mut scheduler = Scheduler::builder(config)
        .frame_clock(clock.clone())
        .before_render(move |_| b.set(b.get() + 1))
        .after_render(move |_, _| a.set(a.get() + 1))
        .build();

    for i in 0..25 {
        scheduler.on_add(node(i), NodeView::boxed(i, &log)).unwrap();
    }
    let mut frames = 0;
    while let Some(frame) = clock.tick() {
        scheduler.on_frame(frame).unwrap();
        frames += 1;
    }
    assert_eq!(frames, 4);
    assert_eq!((before.get(), after.get()), (1, 1));
    assert!(scheduler.is_idle());

    // Waking from idle starts a second cycle.
    for i in 0..15 {
        scheduler.on_attribute_changed(node(i), &["position"]).unwrap();
    }
    while let Some(frame) = clock.tick() {
        scheduler.on_frame(frame).unwrap();
    }
    assert_eq!((before.get(), after.get()), (2, 2));
    assert_eq!(updates(&log).len(), 40);
    assert!(scheduler.is_idle());
}

#[test]
fn unbounded_visibility_checks_survive_idle_frames() {
    let log = new_log();
    let clock = ManualClock::new();
    let config = SchedulerConfig {
        mount_batch_size: usize::MAX,
        unmount_batch_size: usize::MAX,
        ..SchedulerConfig::asynchronous()
    };
    let mut scheduler = Scheduler::builder(config)
        .frame_clock(clock.clone())
        .build();
    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();

    for _ in 0..5 {
        let frame = clock.tick().unwrap();
        scheduler.on_frame(frame).unwrap();
    }

    assert_eq!(updates(&log).len(), 1);
    assert_eq!(scheduler.state(), SchedulerState::AsyncDraining);

    // The same holds when the idle check is allowed to fire.
    let clock = ManualClock::new();
    let config = SchedulerConfig {
        mount_batch_size: usize::MAX,
        unmount_batch_size: usize::MAX,
        auto_idle: true,
        ..SchedulerConfig::asynchronous()
    };
    let mut scheduler = Scheduler::builder(config)
        .frame_clock(clock.clone())
        .build();
    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();
    while let Some(frame) = clock.tick() {
        scheduler.on_frame(frame).unwrap();
    }
    assert!(scheduler.is_idle());
}

#[test]
fn async_request_can_drain_synchronously() {
    let log = new_log();
    let clock = ManualClock::new();
    let mut scheduler = Scheduler::builder(SchedulerConfig::asynchronous())
        .frame_clock(clock.clone())
        .build();

    scheduler
        .on_add_with(node(1), NodeView::boxed(1, &log), &ScheduleOptions::default().sync())
        .unwrap();

    assert_eq!(updates(&log).len(), 1);
}

#[test]
fn freeze_cancels_the_pending_frame() {
    let clock = ManualClock::new();
    let mut scheduler = Scheduler::builder(SchedulerConfig::asynchronous())
        .frame_clock(clock.clone())
        .build();
    assert!(clock.pending().is_some());

    scheduler.freeze(None);
    assert!(clock.pending().is_none());
    assert_eq!(clock.cancelled(), 1);

    scheduler.unfreeze(None).unwrap();
    assert!(clock.pending().is_some());
    assert_eq!(scheduler.state(), SchedulerState::AsyncDraining);
}

#[test]
fn exact_sorting_follows_z_changes() {
    let log = new_log();
    let config = SchedulerConfig {
        sorting: Sorting::Exact,
        ..SchedulerConfig::default()
    };
    let mut scheduler = Scheduler::new(config);
    let events = recorder(&mut scheduler);

    scheduler.on_add(node(1).with_z(3), NodeView::boxed(1, &log)).unwrap();
    scheduler.on_add(node(2).with_z(1), NodeView::boxed(2, &log)).unwrap();
    scheduler.on_add(node(3).with_z(2), NodeView::boxed(3, &log)).unwrap();
    let order = |s: &Scheduler| s.paint_order().ids().map(|id| id.raw()).collect::<Vec<_>>();
    assert_eq!(order(&scheduler), vec![2, 3, 1]);

    scheduler.on_attribute_changed(node(2).with_z(5), &["z"]).unwrap();
    assert_eq!(order(&scheduler), vec![3, 1, 2]);
    assert!(events.borrow().contains(&SchedulerEvent::Sorted));

    scheduler.start_batch("to-front");
    scheduler.on_attribute_changed(node(3).with_z(9), &["z"]).unwrap();
    assert_eq!(order(&scheduler), vec![3, 1, 2]);
    scheduler.stop_batch("to-front").unwrap();
    assert_eq!(order(&scheduler), vec![1, 2, 3]);
}

#[test]
fn endpoint_change_moves_the_edge_in_the_topology() {
    let log = new_log();
    let mut scheduler = Scheduler::default();
    for i in 1..=3 {
        scheduler.on_add(node(i), NodeView::boxed(i, &log)).unwrap();
    }
    scheduler.on_add(edge(10, 1, 2), EdgeView::boxed(10, &log)).unwrap();

    scheduler.on_attribute_changed(edge(10, 1, 3), &["target"]).unwrap();
    log.borrow_mut().clear();

    scheduler.on_attribute_changed(node(2), &["position"]).unwrap();
    assert_eq!(updates(&log).len(), 1);

    scheduler.on_attribute_changed(node(3), &["position"]).unwrap();
    let target = bits_of(&scheduler, "edge", &["UPDATE", "TARGET"]);
    assert_eq!(updates(&log).last(), Some(&(id(10), target)));
}

#[test]
fn reset_replaces_every_view() {
    let old = new_log();
    let new = new_log();
    let mut scheduler = Scheduler::default();
    scheduler.on_add(node(1), NodeView::boxed(1, &old)).unwrap();
    scheduler.on_add(node(2), NodeView::boxed(2, &old)).unwrap();

    scheduler
        .on_reset(vec![
            (node(5), NodeView::boxed(5, &new)),
            (node(6), NodeView::boxed(6, &new)),
        ])
        .unwrap();

    assert_eq!(count(&old, |c| matches!(c, Call::Remove(_))), 2);
    assert_eq!(updates(&new).len(), 2);
    assert!(scheduler.topology().is_node(id(5)));
    assert!(!scheduler.topology().is_node(id(1)));
    assert_eq!(scheduler.views().len(), 2);
}

#[test]
fn unknown_entity_is_a_missing_view() {
    let mut scheduler = Scheduler::default();
    let err = scheduler
        .schedule(id(42), 1, 0, &ScheduleOptions::default())
        .unwrap_err();
    assert!(matches!(err, SchedulerError::MissingView(missing) if missing == id(42)));

    let err = scheduler.on_remove(id(42)).unwrap_err();
    assert!(matches!(err, SchedulerError::MissingView(_)));
}

#[test]
fn failing_view_keeps_its_bits() {
    let log = new_log();
    let mut scheduler = Scheduler::default();
    let view = Box::new(NodeView {
        id: id(1),
        log: Rc::clone(&log),
        fail: true,
    });

    let err = scheduler.on_add(node(1), view).unwrap_err();
    assert!(matches!(err, SchedulerError::View { id: failed, .. } if failed == id(1)));

    let render = bits_of(&scheduler, "node", &["RENDER"]);
    assert_eq!(scheduler.queue().get(id(1)).map(|(_, bits)| bits), Some(render));
    assert_eq!(count(&log, |c| matches!(c, Call::Mount { .. })), 1);
}

struct Greedy;

impl View for Greedy {
    fn class(&self) -> &str {
        "greedy"
    }

    fn declare_flags(&self, flags: &mut FlagMapBuilder) -> Result<(), ConfigurationError> {
        for i in 0..30 {
            flags.declare(&format!("attr{i}"), &[format!("L{i}").as_str()])?;
        }
        Ok(())
    }

    fn confirm_update(&mut self, _bits: Bits, _ctx: &mut UpdateContext<'_>) -> Result<Bits, ViewError> {
        Ok(0)
    }
}

#[test]
fn flag_budget_is_a_configuration_error() {
    let mut scheduler = Scheduler::default();
    let err = scheduler.on_add(node(1), Box::new(Greedy)).unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::Configuration(ConfigurationError::FlagBudgetExceeded { .. })
    ));
    assert!(scheduler.record(id(1)).is_none());
}

/// Asks for an update of another entity during its own update.
struct Leader {
    follower: EntityId,
    rejected: Rc<Cell<bool>>,
}

impl View for Leader {
    fn class(&self) -> &str {
        "leader"
    }

    fn confirm_update(&mut self, _bits: Bits, ctx: &mut UpdateContext<'_>) -> Result<Bits, ViewError> {
        self.rejected
            .set(ctx.request_update(EntityId::from(999), 1, None).is_err());
        ctx.request_update(self.follower, 1 << 1, None)?;
        Ok(0)
    }

    fn declare_flags(&self, flags: &mut FlagMapBuilder) -> Result<(), ConfigurationError> {
        flags.init(&["RENDER"])?;
        Ok(())
    }
}

#[test]
fn view_requests_are_applied_after_it_returns() {
    let log = new_log();
    let rejected = Rc::new(Cell::new(false));
    let mut scheduler = Scheduler::default();
    scheduler.on_add(node(2), NodeView::boxed(2, &log)).unwrap();
    log.borrow_mut().clear();

    let leader = Leader {
        follower: id(2),
        rejected: Rc::clone(&rejected),
    };
    scheduler.on_add(node(1), Box::new(leader)).unwrap();

    assert!(rejected.get());
    let resize = bits_of(&scheduler, "node", &["RESIZE"]);
    assert_eq!(updates(&log), vec![(id(2), resize)]);
}

#[test]
fn require_flushes_one_entity() {
    let log = new_log();
    let mut scheduler = Scheduler::default();
    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();
    scheduler.on_add(node(2), NodeView::boxed(2, &log)).unwrap();
    log.borrow_mut().clear();

    scheduler.freeze(None);
    scheduler.on_attribute_changed(node(1), &["position"]).unwrap();
    scheduler.on_attribute_changed(node(2), &["position"]).unwrap();

    assert_eq!(scheduler.require(id(2)).unwrap(), 0);
    assert_eq!(updates(&log).len(), 1);
    assert!(scheduler.queue().contains(id(1)));
    assert!(!scheduler.queue().contains(id(2)));
}

#[test]
fn disposed_scheduler_refuses_work() {
    let log = new_log();
    let clock = ManualClock::new();
    let mut scheduler = Scheduler::builder(SchedulerConfig::default())
        .frame_clock(clock.clone())
        .build();
    scheduler.on_add(node(1), NodeView::boxed(1, &log)).unwrap();

    scheduler.dispose();

    assert_eq!(count(&log, |c| matches!(c, Call::Remove(_))), 1);
    assert!(matches!(
        scheduler.on_frame(FrameId::from(1)),
        Err(SchedulerError::Disposed)
    ));
    assert!(matches!(scheduler.unfreeze(None), Err(SchedulerError::Disposed)));
    assert!(scheduler.is_disposed());
}
