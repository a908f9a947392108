//! Performance benchmarks for the state subject.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use state_subject::{
    Broadcaster, LifecycleRegistry, LifecycleState, StateSubject, SubscribeOptions,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn started_owner(name: String) -> Arc<LifecycleRegistry> {
    let owner = Arc::new(LifecycleRegistry::new(name));
    owner.mark_state(LifecycleState::Resumed);
    owner
}

/// Benchmark publish with varying numbers of attached bindings
fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fan_out");

    for subscribers in [1, 10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let subject = StateSubject::new();
                let sum = Arc::new(AtomicU64::new(0));
                let owners: Vec<_> = (0..count).map(|i| started_owner(format!("owner-{}", i))).collect();
                for owner in &owners {
                    let sum = sum.clone();
                    subject.subscribe_with(owner, SubscribeOptions::immediate(), move |v: u64| {
                        sum.fetch_add(v, Ordering::Relaxed);
                    });
                }

                let mut v = 0u64;
                b.iter(|| {
                    v += 1;
                    subject.publish(black_box(v));
                });
            },
        );
    }

    group.finish();
}

/// Benchmark raw broadcaster publish without lifecycle bindings
fn bench_broadcaster_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcaster_publish");

    for subscribers in [1, 100] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let broadcaster = Broadcaster::named("bench");
                let subscriptions: Vec<_> = (0..count)
                    .map(|_| broadcaster.attach(Default::default(), |v: u64| {
                        black_box(v);
                    }))
                    .collect();

                let mut v = 0u64;
                b.iter(|| {
                    v += 1;
                    broadcaster.publish(black_box(v));
                });
                drop(subscriptions);
            },
        );
    }

    group.finish();
}

/// Benchmark subscribe followed by dispose on a live owner
fn bench_subscribe_churn(c: &mut Criterion) {
    let subject = StateSubject::with_value(0u64);
    let owner = started_owner("churn".to_string());

    c.bench_function("subscribe_dispose", |b| {
        b.iter(|| {
            let handle = subject.subscribe_with(&owner, SubscribeOptions::immediate(), |v| {
                black_box(v);
            });
            handle.dispose();
        });
    });
}

/// Benchmark a full start/stop cycle with a bound subscription
fn bench_lifecycle_cycle(c: &mut Criterion) {
    let subject = StateSubject::with_value(0u64);
    let owner = Arc::new(LifecycleRegistry::new("cycle"));
    owner.mark_state(LifecycleState::Created);
    subject.subscribe_with(&owner, SubscribeOptions::immediate(), |v| {
        black_box(v);
    });

    c.bench_function("start_stop_cycle", |b| {
        b.iter(|| {
            owner.mark_state(LifecycleState::Started);
            owner.mark_state(LifecycleState::Created);
        });
    });
}

criterion_group!(
    benches,
    bench_publish_fan_out,
    bench_broadcaster_publish,
    bench_subscribe_churn,
    bench_lifecycle_cycle,
);

criterion_main!(benches);
