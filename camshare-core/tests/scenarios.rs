//! Concurrency properties and end-to-end scenarios for `SharedResource`.
//!
//! These run real OS threads against one manager to exercise creation
//! races, the capacity cap, the one-shot ownership claim and teardown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use camshare_core::resource::testing::{Tracked, TrackedArgs};
use camshare_core::{AcquireStatus, Ownership, SharedResource};

fn manager(capacity: i64) -> Arc<SharedResource<Tracked>> {
    Arc::new(SharedResource::new(capacity))
}

// ---------------------------------------------------------------------------
// Scenario A: capacity of one
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_capacity_one() {
    let m = manager(1);
    let args = TrackedArgs::default();

    let mut x = Ownership::default();
    let status = m.acquire_or_create(&mut x, &args).unwrap();
    // A lone creator at capacity one is told it sits at the cap.
    assert_eq!(status, AcquireStatus::CapacityReached);
    assert!(x.is_owner());

    let mut y = Ownership::default();
    assert_eq!(
        m.acquire_or_create(&mut y, &args).unwrap(),
        AcquireStatus::CapacityReached
    );
    assert!(!y.is_owner());
    assert_eq!(m.shared_count(), 1);

    assert!(m.release(x));
    assert_eq!(args.stats.dropped(), 1);

    let mut y = Ownership::default();
    assert_eq!(
        m.acquire_or_create(&mut y, &args).unwrap(),
        AcquireStatus::CapacityReached
    );
    assert!(y.is_owner(), "Y now owns a fresh generation");
    assert_eq!(m.generation(), 2);
    assert!(m.release(y));
}

#[test]
fn scenario_a_capacity_two_reports_created() {
    let m = manager(2);
    let args = TrackedArgs::default();

    let mut x = Ownership::default();
    assert_eq!(
        m.acquire_or_create(&mut x, &args).unwrap(),
        AcquireStatus::CreatedAndActive
    );
    let mut y = Ownership::default();
    assert_eq!(
        m.acquire_or_create(&mut y, &args).unwrap(),
        AcquireStatus::JoinedAndActive
    );
    let mut z = Ownership::default();
    assert_eq!(
        m.acquire_or_create(&mut z, &args).unwrap(),
        AcquireStatus::CapacityReached
    );

    assert!(!m.release(y));
    assert!(m.release(x));
}

// ---------------------------------------------------------------------------
// Scenario B: only the owner refreshes
// ---------------------------------------------------------------------------

#[test]
fn scenario_b_single_refresh_driver() {
    let m = manager(3);
    let args = TrackedArgs::default();

    let mut x = Ownership::default();
    let mut y = Ownership::default();
    let mut z = Ownership::default();
    assert_eq!(
        m.acquire_or_create(&mut x, &args).unwrap(),
        AcquireStatus::CreatedAndActive
    );
    assert_eq!(
        m.acquire_or_create(&mut y, &args).unwrap(),
        AcquireStatus::JoinedAndActive
    );
    assert_eq!(
        m.acquire_or_create(&mut z, &args).unwrap(),
        AcquireStatus::JoinedAndActive
    );
    assert!(x.is_owner() && !y.is_owner() && !z.is_owner());

    let mut fourth = Ownership::default();
    assert_eq!(
        m.acquire_or_create(&mut fourth, &args).unwrap(),
        AcquireStatus::CapacityReached
    );

    for _ in 0..10 {
        m.cooperative_refresh(&mut y);
    }
    assert_eq!(args.stats.refreshed(), 0);

    m.cooperative_refresh(&mut x);
    assert_eq!(args.stats.refreshed(), 1);

    for o in [z, y, x] {
        m.release(o);
    }
    assert!(!m.has_active_generation());
}

// ---------------------------------------------------------------------------
// Scenario C: unbounded fan-in
// ---------------------------------------------------------------------------

#[test]
fn scenario_c_hundred_concurrent_callers() {
    const CALLERS: usize = 100;
    let m = manager(0);
    // A slow open widens the window in which callers race to create.
    let args = TrackedArgs::with_open_delay(Duration::from_millis(20));
    let barrier = Arc::new(Barrier::new(CALLERS));
    let created = Arc::new(AtomicUsize::new(0));
    let joined = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let (m, args, barrier) = (m.clone(), args.clone(), barrier.clone());
            let (created, joined) = (created.clone(), joined.clone());
            thread::spawn(move || {
                let mut me = Ownership::default();
                barrier.wait();
                match m.acquire_or_create(&mut me, &args).unwrap() {
                    AcquireStatus::CreatedAndActive => created.fetch_add(1, Ordering::SeqCst),
                    AcquireStatus::JoinedAndActive => joined.fetch_add(1, Ordering::SeqCst),
                    AcquireStatus::CapacityReached => panic!("unbounded manager hit capacity"),
                };
                me
            })
        })
        .collect();
    let tokens: Vec<Ownership> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(joined.load(Ordering::SeqCst), CALLERS - 1);
    assert_eq!(m.shared_count(), CALLERS);
    assert_eq!(args.stats.opened(), 1);
    assert_eq!(tokens.iter().filter(|t| t.is_owner()).count(), 1);

    let destroyed = tokens.into_iter().filter(|t| m.release(*t)).count();
    assert_eq!(destroyed, 1);
    assert_eq!(args.stats.live(), 0);
}

// ---------------------------------------------------------------------------
// Scenario D: keep warm
// ---------------------------------------------------------------------------

#[test]
fn scenario_d_keep_warm_survives_without_callers() {
    let m = manager(4);
    let args = TrackedArgs::default();

    assert_eq!(m.keep_warm(&args).unwrap(), AcquireStatus::CreatedAndActive);
    assert_eq!(m.shared_count(), 1);

    // Callers come and go; the pinned generation outlives them.
    for _ in 0..3 {
        let mut viewer = Ownership::default();
        assert_eq!(
            m.acquire_or_create(&mut viewer, &args).unwrap(),
            AcquireStatus::JoinedAndActive
        );
        assert!(!m.release(viewer));
    }
    thread::sleep(Duration::from_millis(20));
    assert!(m.has_active_generation());
    assert_eq!(args.stats.opened(), 1);
    assert_eq!(args.stats.dropped(), 0);

    assert!(m.end_keep_warm());
    assert!(!m.has_active_generation());
    assert_eq!(args.stats.dropped(), 1);
}

#[test]
fn scenario_d_pin_does_not_take_a_viewer_slot() {
    const CAPACITY: i64 = 4;
    let m = manager(CAPACITY);
    let args = TrackedArgs::default();
    m.keep_warm(&args).unwrap();

    let mut viewers = Vec::new();
    for _ in 0..CAPACITY {
        let mut me = Ownership::default();
        assert_eq!(
            m.acquire_or_create(&mut me, &args).unwrap(),
            AcquireStatus::JoinedAndActive
        );
        viewers.push(me);
    }
    let mut extra = Ownership::default();
    assert_eq!(
        m.acquire_or_create(&mut extra, &args).unwrap(),
        AcquireStatus::CapacityReached
    );
    assert_eq!(m.shared_count(), CAPACITY as usize + 1);

    for v in viewers {
        assert!(!m.release(v));
    }
    assert!(m.end_keep_warm());
    assert_eq!(args.stats.dropped(), 1);
}

#[test]
fn scenario_d_capacity_one_stays_usable_while_warm() {
    let m = manager(1);
    let args = TrackedArgs::default();
    m.keep_warm(&args).unwrap();

    // Viewers take turns on the single slot; none is ever turned away.
    for _ in 0..3 {
        let mut viewer = Ownership::default();
        assert_eq!(
            m.acquire_or_create(&mut viewer, &args).unwrap(),
            AcquireStatus::JoinedAndActive
        );
        assert!(!m.release(viewer));
    }
    assert_eq!(args.stats.opened(), 1);
    assert!(m.end_keep_warm());
}

// ---------------------------------------------------------------------------
// Properties under contention
// ---------------------------------------------------------------------------

#[test]
fn shared_count_never_exceeds_capacity() {
    const CAPACITY: i64 = 3;
    const THREADS: usize = 12;
    const ROUNDS: usize = 200;

    let m = manager(CAPACITY);
    let args = TrackedArgs::default();
    let violations = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let (m, args, violations) = (m.clone(), args.clone(), violations.clone());
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let mut me = Ownership::default();
                    let status = m.acquire_or_create(&mut me, &args).unwrap();
                    if m.shared_count() as i64 > CAPACITY {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    let holding = status != AcquireStatus::CapacityReached || me.is_owner();
                    if holding {
                        m.cooperative_refresh(&mut me);
                        m.release(me);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert!(!m.has_active_generation());
    // Every generation opened was closed exactly once.
    assert_eq!(args.stats.opened(), args.stats.dropped());
    assert_eq!(args.stats.live(), 0);

    let snapshot = m.metrics().snapshot();
    assert_eq!(snapshot.creates, snapshot.destroys);
}

#[test]
fn ownership_claimed_once_per_generation() {
    const THREADS: usize = 16;
    let m = manager(0);
    let args = TrackedArgs::default();

    // Creator leaves at once so the claim is up for grabs.
    let mut creator = Ownership::default();
    m.acquire_or_create(&mut creator, &args).unwrap();
    let mut tokens: Vec<Ownership> = (0..THREADS)
        .map(|_| {
            let mut me = Ownership::default();
            m.acquire_or_create(&mut me, &args).unwrap();
            me
        })
        .collect();
    assert!(!m.release(creator));

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = tokens
        .drain(..)
        .map(|mut me| {
            let (m, barrier) = (m.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..50 {
                    m.cooperative_refresh(&mut me);
                }
                me
            })
        })
        .collect();
    let tokens: Vec<Ownership> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let owners = tokens.iter().filter(|t| t.is_owner()).count();
    assert_eq!(owners, 1);
    // Only the winner refreshed, once per call.
    assert_eq!(args.stats.refreshed(), 50);

    for t in tokens {
        m.release(t);
    }
    assert!(!m.has_active_generation());
}

#[test]
fn round_trip_resets_ownership() {
    let m = manager(0);
    let args = TrackedArgs::default();

    let mut first = Ownership::default();
    m.acquire_or_create(&mut first, &args).unwrap();
    let joiners: Vec<Ownership> = (0..5)
        .map(|_| {
            let mut me = Ownership::default();
            m.acquire_or_create(&mut me, &args).unwrap();
            me
        })
        .collect();
    for j in joiners {
        assert!(!m.release(j));
    }
    assert!(m.is_last_holder());
    assert!(m.release(first));

    assert!(!m.has_active_generation());
    assert!(!m.ownership_claimed());
    assert!(!m.is_last_holder());

    let mut next = Ownership::default();
    assert_eq!(
        m.acquire_or_create(&mut next, &args).unwrap(),
        AcquireStatus::CreatedAndActive
    );
    assert_eq!(m.generation(), 2);
    assert_eq!(args.stats.opened(), 2);
    m.release(next);
}

#[test]
fn construction_failure_does_not_disturb_live_generation() {
    let m = manager(0);
    let good = TrackedArgs::default();
    let mut holder = Ownership::default();
    m.acquire_or_create(&mut holder, &good).unwrap();

    // A live generation is joined regardless of the joiner's arguments.
    let mut joiner = Ownership::default();
    assert_eq!(
        m.acquire_or_create(&mut joiner, &TrackedArgs::failing()).unwrap(),
        AcquireStatus::JoinedAndActive
    );
    m.release(joiner);
    m.release(holder);

    let mut me = Ownership::default();
    let err = m.acquire_or_create(&mut me, &TrackedArgs::failing()).unwrap_err();
    assert!(err.is_unavailable());
    assert!(!m.has_active_generation());
}
