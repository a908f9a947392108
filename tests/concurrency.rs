//! Threaded delivery, disposal and lifecycle churn.

use parking_lot::Mutex;
use state_subject::{
    ActivityHooks, LifecycleEvent, LifecycleRegistry, LifecycleState, Scheduler, StateSubject,
    SubjectConfig, SubscribeOptions, WorkerPool,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct EdgeCounter {
    active: AtomicUsize,
    inactive: AtomicUsize,
}

impl ActivityHooks for EdgeCounter {
    fn on_active(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn on_inactive(&self) {
        self.inactive.fetch_add(1, Ordering::SeqCst);
    }
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    done()
}

// --- Scheduled delivery ---

#[test]
fn test_worker_pool_delivery_in_order() {
    let io: Arc<dyn Scheduler> = Arc::new(WorkerPool::new("test-io", 2));
    let main: Arc<dyn Scheduler> = Arc::new(WorkerPool::serial("test-main"));
    let owner = Arc::new(LifecycleRegistry::with_scheduler("screen", main));
    owner.mark_state(LifecycleState::Resumed);

    let subject = StateSubject::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    subject.subscribe_with(&owner, SubscribeOptions::default().subscribe_on(io), move |v: u32| {
        sink.lock().push(v);
    });

    assert!(wait_until(Duration::from_secs(5), || subject.attached_count() == 1));
    for v in 0..200 {
        subject.publish(v);
    }

    assert!(wait_until(Duration::from_secs(5), || seen.lock().last() == Some(&199)));
    let seen = seen.lock();
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", *seen);
}

#[test]
fn test_subject_default_subscribe_scheduler() {
    let io: Arc<dyn Scheduler> = Arc::new(WorkerPool::serial("subject-io"));
    let config = SubjectConfig {
        subscribe_scheduler: Some(io),
        ..SubjectConfig::named("configured")
    };
    let subject = StateSubject::with_config(config);
    subject.publish(7u32);

    let owner = Arc::new(LifecycleRegistry::new("screen"));
    owner.mark_state(LifecycleState::Started);

    let delivered_on = Arc::new(Mutex::new(None));
    let slot = delivered_on.clone();
    subject.subscribe(&owner, move |v| {
        *slot.lock() = Some((v, thread::current().name().map(str::to_string)));
    });

    assert!(wait_until(Duration::from_secs(5), || delivered_on.lock().is_some()));
    let (value, thread_name) = delivered_on.lock().clone().unwrap();
    assert_eq!(value, 7);
    // The owner delivers inline, so the value arrives on the attaching worker.
    assert!(thread_name.unwrap_or_default().starts_with("subject-io"));
}

#[test]
fn test_default_subscribe_runs_on_background_pool() {
    let subject = StateSubject::with_value("ready".to_string());
    let owner = Arc::new(LifecycleRegistry::new("screen"));
    owner.mark_state(LifecycleState::Resumed);

    let delivered_on = Arc::new(Mutex::new(None));
    let slot = delivered_on.clone();
    let handle = subject.subscribe(&owner, move |v: String| {
        *slot.lock() = Some((v, thread::current().name().map(str::to_string)));
    });

    assert!(wait_until(Duration::from_secs(5), || delivered_on.lock().is_some()));
    let (value, thread_name) = delivered_on.lock().clone().unwrap();
    assert_eq!(value, "ready");
    assert!(thread_name.unwrap_or_default().starts_with("state-subject-io-"));

    handle.dispose();
    assert!(!subject.has_any_subscribers());
}

#[test]
fn test_no_delivery_after_dispose_returns() {
    let main: Arc<dyn Scheduler> = Arc::new(WorkerPool::serial("slow-main"));
    let owner = Arc::new(LifecycleRegistry::with_scheduler("screen", main));
    owner.mark_state(LifecycleState::Resumed);

    let subject = StateSubject::new();
    let disposed = Arc::new(AtomicBool::new(false));
    let late = Arc::new(AtomicUsize::new(0));
    let (flag, counter) = (disposed.clone(), late.clone());
    let handle = subject.subscribe_with(
        &owner,
        SubscribeOptions::default().subscribe_on(state_subject::scheduler::immediate()),
        move |_: u32| {
            thread::sleep(Duration::from_micros(50));
            if flag.load(Ordering::SeqCst) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        },
    );

    for v in 0..100 {
        subject.publish(v);
    }
    handle.dispose();
    disposed.store(true, Ordering::SeqCst);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(late.load(Ordering::SeqCst), 0);
    assert!(!subject.has_any_subscribers());
}

// --- Concurrent teardown ---

#[test]
fn test_concurrent_dispose_and_unsubscribe() {
    let counter = Arc::new(EdgeCounter::default());
    let subject = StateSubject::<u32>::with_hooks(counter.clone());
    let owner = Arc::new(LifecycleRegistry::new("screen"));
    owner.mark_state(LifecycleState::Resumed);

    let handle = Arc::new(subject.subscribe_with(&owner, SubscribeOptions::immediate(), |_| {}));

    let threads: Vec<_> = (0..8)
        .map(|i| {
            let handle = handle.clone();
            let subject = subject.clone();
            let owner = owner.clone();
            thread::spawn(move || {
                if i % 2 == 0 {
                    handle.dispose();
                } else {
                    subject.unsubscribe(&owner);
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert!(!subject.has_any_subscribers());
    assert_eq!(owner.observer_count(), 0);
    assert_eq!(counter.active.load(Ordering::SeqCst), 1);
    assert_eq!(counter.inactive.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lifecycle_churn_while_publishing() {
    let counter = Arc::new(EdgeCounter::default());
    let subject = StateSubject::<u64>::with_hooks(counter.clone());
    let owners: Vec<_> = (0..4)
        .map(|i| {
            let owner = Arc::new(LifecycleRegistry::new(format!("owner-{}", i)));
            owner.mark_state(LifecycleState::Created);
            owner
        })
        .collect();
    for owner in &owners {
        let last = Arc::new(Mutex::new(None::<u64>));
        subject.subscribe_with(owner, SubscribeOptions::immediate(), move |v| {
            let mut last = last.lock();
            assert!(last.map_or(true, |prev| prev <= v));
            *last = Some(v);
        });
    }

    let stop = Arc::new(AtomicBool::new(false));
    let publisher = {
        let subject = subject.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut v = 0;
            while !stop.load(Ordering::SeqCst) {
                subject.publish(v);
                v += 1;
            }
        })
    };

    let churners: Vec<_> = owners
        .iter()
        .cloned()
        .map(|owner| {
            thread::spawn(move || {
                for _ in 0..200 {
                    owner.handle_event(LifecycleEvent::Start);
                    owner.handle_event(LifecycleEvent::Stop);
                }
            })
        })
        .collect();
    for t in churners {
        t.join().unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    publisher.join().unwrap();

    assert_eq!(subject.attached_count(), 0);
    assert_eq!(subject.binding_count(), 4);
    assert_eq!(subject.consumer_failures(), 0);
    assert_eq!(
        counter.active.load(Ordering::SeqCst),
        counter.inactive.load(Ordering::SeqCst)
    );
    assert!(counter.active.load(Ordering::SeqCst) >= 1);

    for owner in &owners {
        owner.mark_state(LifecycleState::Destroyed);
    }
    assert!(!subject.has_any_subscribers());
}
