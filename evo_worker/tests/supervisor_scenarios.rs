//! End-to-end supervisor behavior on a virtual clock.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::Harness;
use evo_common::worker::WorkerConfig;
use evo_worker::drain::{DrainReason, DrainState, TransitionResult};
use evo_worker::registry::{MemoryPidRegistry, PidRegistry};
use evo_worker::supervisor::SupervisorTimer;
use serde_json::json;

fn config(workers: u32) -> WorkerConfig {
    WorkerConfig::with_workers(workers)
}

// =============================================================================
// Admission
// =============================================================================

#[test]
fn strict_ceiling_rejects_third_admit_at_two() {
    let mut cfg = config(1);
    cfg.max_concurrency = Some(2);
    cfg.strict_concurrency = true;
    let mut h = Harness::new(cfg, 0);

    assert!(h.admit());
    assert!(h.admit());
    assert!(!h.admit());
    assert_eq!(h.supervisor.in_flight(), 2);
    assert_eq!(h.supervisor.total_requests(), 2);

    h.release();
    assert!(h.admit());
    assert_eq!(h.supervisor.in_flight(), 2);
    assert_eq!(h.supervisor.total_requests(), 3);
}

#[test]
fn default_ceiling_admits_one_past_the_limit() {
    let mut cfg = config(1);
    cfg.max_concurrency = Some(2);
    let mut h = Harness::new(cfg, 0);

    assert!(h.admit());
    assert!(h.admit());
    assert!(h.admit());
    assert!(!h.admit());
    assert_eq!(h.supervisor.in_flight(), 3);
    assert_eq!(h.supervisor.total_requests(), 3);
}

#[test]
fn rejected_admits_are_not_counted() {
    let mut cfg = config(1);
    cfg.max_concurrency = Some(1);
    cfg.strict_concurrency = true;
    let mut h = Harness::new(cfg, 0);

    assert!(h.admit());
    for _ in 0..5 {
        assert!(!h.admit());
    }
    assert_eq!(h.supervisor.total_requests(), 1);
}

#[test]
fn messages_are_counted_independently_of_admission() {
    let mut h = Harness::new(config(1), 0);
    for _ in 0..7 {
        h.supervisor.count_message();
    }
    assert_eq!(h.supervisor.total_messages(), 7);
    assert_eq!(h.supervisor.total_requests(), 0);
}

// =============================================================================
// Threshold-triggered drain
// =============================================================================

#[test]
fn memory_limit_drains_once_and_waits_for_in_flight_work() {
    let mut cfg = config(2);
    cfg.memory_limit = Some(100);
    let mut h = Harness::new(cfg, 0);
    h.proc_source.memory.set(Some(150));
    assert!(h.admit());

    h.run_until(4_999);
    assert_eq!(h.supervisor.state(), DrainState::Active);

    h.run_until(5_000);
    assert_eq!(h.denied(), 1);
    assert_eq!(h.host.log.borrow().denied, vec![0]);
    assert!(h.supervisor.is_deny_request());
    assert_eq!(
        h.supervisor.drain_reason(),
        Some(DrainReason::MemoryLimit { used: 150, limit: 100 })
    );
    assert_eq!(h.supervisor.state(), DrainState::Quiescing);
    assert_eq!(h.terminated(), 0);

    // Threshold ticks stop once draining; memory stays high.
    h.run_until(20_000);
    assert_eq!(h.denied(), 1);
    assert!(!h.supervisor.is_scheduled(SupervisorTimer::ThresholdCheck));
    assert_eq!(h.terminated(), 0);

    h.release();
    h.run_until(21_000);
    assert_eq!(h.terminated(), 1);
    assert!(h.supervisor.is_terminated());
    assert_eq!(h.host.log.borrow().in_flight_at_terminate, vec![0]);
}

#[test]
fn idle_worker_exits_on_drain_entry() {
    let mut cfg = config(2);
    cfg.memory_limit = Some(100);
    let mut h = Harness::new(cfg, 1);
    h.proc_source.memory.set(Some(101));

    h.run_until(5_000);
    assert_eq!(h.denied(), 1);
    assert_eq!(h.terminated(), 1);
    assert_eq!(h.supervisor.drain_polls(), 1);
    assert_eq!(h.supervisor.next_deadline(), None);
}

#[test]
fn memory_exactly_at_limit_does_not_drain() {
    let mut cfg = config(1);
    cfg.memory_limit = Some(100);
    let mut h = Harness::new(cfg, 0);
    h.proc_source.memory.set(Some(100));

    h.step(5_000, 60_000, 5_000);
    assert_eq!(h.supervisor.state(), DrainState::Active);
}

#[test]
fn unavailable_memory_never_trips_the_limit() {
    let mut cfg = config(1);
    cfg.memory_limit = Some(1);
    let mut h = Harness::new(cfg, 0);
    h.proc_source.memory.set(None);

    h.step(5_000, 30_000, 5_000);
    assert_eq!(h.supervisor.state(), DrainState::Active);
}

#[test]
fn request_limit_is_staggered_per_worker() {
    let mut cfg = config(2);
    cfg.max_request = Some(3);

    let mut first = Harness::new(cfg.clone(), 0);
    let mut second = Harness::new(cfg, 1);
    for h in [&mut first, &mut second] {
        for _ in 0..4 {
            assert!(h.admit());
            h.release();
        }
        h.run_until(5_000);
    }

    assert_eq!(
        first.supervisor.drain_reason(),
        Some(DrainReason::RequestLimit { total: 4, limit: 3 })
    );
    assert!(first.supervisor.is_terminated());
    assert_eq!(second.supervisor.state(), DrainState::Active);
    assert_eq!(second.supervisor.settings().request_limit, 1_503);
}

#[test]
fn message_limit_triggers_drain() {
    let mut cfg = config(1);
    cfg.msg_limit = Some(10);
    let mut h = Harness::new(cfg, 0);
    for _ in 0..11 {
        h.supervisor.count_message();
    }

    h.run_until(5_000);
    assert_eq!(
        h.supervisor.drain_reason(),
        Some(DrainReason::MessageLimit { total: 11, limit: 10 })
    );
}

#[test]
fn max_live_time_is_staggered_per_worker() {
    let mut cfg = config(3);
    cfg.max_live_time = Some(60_000);
    let mut h = Harness::new(cfg, 2);

    // 60s + 2 * 180s
    h.run_until(419_999);
    assert_eq!(h.supervisor.state(), DrainState::Active);
    h.run_until(420_000);
    assert_eq!(h.supervisor.drain_reason(), Some(DrainReason::MaxLiveTime));
    assert!(h.supervisor.is_terminated());
}

// =============================================================================
// Drain sequencing
// =============================================================================

#[test]
fn concurrent_triggers_deny_exactly_once() {
    let mut cfg = config(1);
    cfg.memory_limit = Some(10);
    cfg.max_live_time = Some(5_000);
    let mut h = Harness::new(cfg, 0);
    h.proc_source.memory.set(Some(1_000));
    assert!(h.admit());

    let pre_close_runs = Rc::new(Cell::new(0));
    let counter = pre_close_runs.clone();
    h.supervisor
        .set_pre_close_hook(move || counter.set(counter.get() + 1));

    // Threshold tick and max-live-time expire at the same instant.
    h.run_until(5_000);
    let again = h.supervisor.begin_drain(DrainReason::Signal, h.t0);
    assert!(matches!(again, TransitionResult::Rejected(_)));

    assert_eq!(h.denied(), 1);
    assert_eq!(pre_close_runs.get(), 1);
    assert!(h.supervisor.drain_reason().is_some());
}

#[test]
fn readiness_gates_exit_indefinitely() {
    let mut h = Harness::new(config(2), 0);
    let ready = Rc::new(Cell::new(false));
    let probe = ready.clone();
    let asked = Rc::new(Cell::new(0u32));
    let asked_probe = asked.clone();
    h.supervisor.set_readiness_predicate(move || {
        asked_probe.set(asked_probe.get() + 1);
        probe.get()
    });

    h.supervisor.begin_drain(DrainReason::Requested, h.t0);
    h.step(1_000, 600_000, 1_000);

    assert_eq!(h.supervisor.in_flight(), 0);
    assert_eq!(h.terminated(), 0);
    assert_eq!(h.supervisor.state(), DrainState::Quiescing);
    assert_eq!(h.supervisor.drain_polls(), 601);
    assert_eq!(asked.get(), 601);
    assert!(h.supervisor.is_scheduled(SupervisorTimer::DrainPoll));

    ready.set(true);
    h.run_until(601_000);
    assert_eq!(h.terminated(), 1);
}

#[test]
fn readiness_is_asked_even_while_work_is_in_flight() {
    let mut h = Harness::new(config(1), 0);
    let asked = Rc::new(Cell::new(0u32));
    let probe = asked.clone();
    h.supervisor.set_readiness_predicate(move || {
        probe.set(probe.get() + 1);
        true
    });
    assert!(h.admit());

    h.supervisor.begin_drain(DrainReason::Requested, h.t0);
    h.step(1_000, 3_000, 1_000);
    assert_eq!(asked.get(), 4);
    assert_eq!(h.terminated(), 0);
}

#[test]
fn drain_poll_follows_configured_interval() {
    let mut cfg = config(1);
    cfg.drain_poll_interval = Some(250);
    let mut h = Harness::new(cfg, 0);
    assert!(h.admit());

    h.supervisor.begin_drain(DrainReason::Requested, h.t0);
    h.run_until(249);
    assert_eq!(h.supervisor.drain_polls(), 1);
    h.run_until(250);
    assert_eq!(h.supervisor.drain_polls(), 2);
}

#[test]
fn nothing_fires_after_termination() {
    let mut h = Harness::new(config(2), 0);
    h.supervisor.begin_drain(DrainReason::Requested, h.t0);
    assert!(h.supervisor.is_terminated());

    assert_eq!(h.run_until(10_000_000), 0);
    assert_eq!(h.terminated(), 1);
}

// =============================================================================
// Peer watchdog
// =============================================================================

#[test]
fn peer_over_limit_is_killed_on_tenth_consecutive_sample() {
    let registry = MemoryPidRegistry::new();
    let mut h = Harness::with_registry(config(2), 0, registry);
    h.registry.publish(1, 555).unwrap();
    h.proc_source.peer_percent.set(96);

    // t=1000 is the baseline sample, then nine over-limit samples.
    h.step(1_000, 10_000, 1_000);
    assert_eq!(h.supervisor.peer_streak(), 9);
    assert!(h.terminator.killed.borrow().is_empty());

    h.run_until(11_000);
    assert_eq!(*h.terminator.killed.borrow(), vec![555]);
    assert_eq!(h.supervisor.peer_streak(), 0);

    // The auditor itself keeps running.
    assert_eq!(h.supervisor.state(), DrainState::Active);
    assert_eq!(h.denied(), 0);
}

#[test]
fn one_normal_peer_sample_resets_the_streak() {
    let mut h = Harness::new(config(2), 1);
    h.registry.publish(0, 77).unwrap();
    h.proc_source.peer_percent.set(99);

    h.step(1_000, 9_000, 1_000);
    assert_eq!(h.supervisor.peer_streak(), 8);

    h.proc_source.peer_percent.set(20);
    h.run_until(10_000);
    assert_eq!(h.supervisor.peer_streak(), 0);

    h.proc_source.peer_percent.set(99);
    h.step(11_000, 19_000, 1_000);
    assert_eq!(h.supervisor.peer_streak(), 9);
    assert!(h.terminator.killed.borrow().is_empty());
}

#[test]
fn peer_at_exactly_the_limit_is_not_counted() {
    let mut cfg = config(2);
    cfg.cpu_limit = Some(50.0);
    let mut h = Harness::new(cfg, 0);
    h.registry.publish(1, 88).unwrap();
    h.proc_source.peer_percent.set(50);

    h.step(1_000, 30_000, 1_000);
    assert_eq!(h.supervisor.peer_streak(), 0);
    assert!(h.terminator.killed.borrow().is_empty());
}

#[test]
fn peer_watchdog_keeps_running_while_draining() {
    let mut h = Harness::new(config(2), 0);
    h.registry.publish(1, 555).unwrap();
    h.proc_source.peer_percent.set(100);
    assert!(h.admit());

    h.supervisor.begin_drain(DrainReason::Requested, h.t0);
    h.step(1_000, 11_000, 1_000);
    assert_eq!(*h.terminator.killed.borrow(), vec![555]);
    assert_eq!(h.terminated(), 0);
}

#[test]
fn single_worker_never_audits_itself() {
    let mut h = Harness::new(config(1), 0);
    h.proc_source.peer_percent.set(100);

    h.step(1_000, 30_000, 1_000);
    assert!(!h.supervisor.is_scheduled(SupervisorTimer::PeerWatchdog));
    assert!(h.terminator.killed.borrow().is_empty());
    assert_eq!(h.registry.lookup(0), Some(1000));
}

#[test]
fn ring_neighbors_cover_the_whole_group() {
    let registry = MemoryPidRegistry::new();
    let group: Vec<Harness> = (0..4)
        .map(|id| Harness::with_registry(config(4), id, registry.clone()))
        .collect();

    for (id, h) in group.iter().enumerate() {
        assert_eq!(h.supervisor.settings().peer_index(), (id as u32 + 1) % 4);
        assert_eq!(registry.lookup(id as u32), Some(1000 + id as u32));
    }
}

// =============================================================================
// Telemetry
// =============================================================================

#[test]
fn telemetry_emits_memory_series_on_interval() {
    let mut cfg = config(2);
    cfg.telemetry.enabled = true;
    cfg.telemetry.interval = Some(2_000);
    let mut h = Harness::new(cfg, 1);
    h.proc_source.memory.set(Some(4_096));

    h.step(1_000, 6_000, 1_000);
    let metrics = h.sink.metrics.borrow();
    assert_eq!(metrics.len(), 3);
    assert!(metrics.iter().all(|(name, _)| name == "biz_worker_memory"));
    assert_eq!(metrics[0].1, json!({ "used": 4096, "worker_id": 1 }));
}

#[test]
fn telemetry_disabled_emits_nothing() {
    let mut h = Harness::new(config(1), 0);
    h.step(1_000, 60_000, 1_000);
    assert!(h.sink.metrics.borrow().is_empty());
}
