//! A screen that shows a ticking counter while it is visible.
//!
//! A background thread publishes a new string every 200ms. The screen
//! subscribes with a transformer that appends "!", goes to the background
//! for a while (no deliveries), comes back, and finally disposes its
//! subscription.
//!
//! Run with: cargo run --example ticker

use state_subject::{
    ActiveInactive, LifecycleRegistry, LifecycleState, Scheduler, StateSubject, SubjectConfig,
    SubscribeOptions, Transformer, WorkerPool,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let main_thread: Arc<dyn Scheduler> = Arc::new(WorkerPool::serial("main"));
    let screen = Arc::new(LifecycleRegistry::with_scheduler("ticker-screen", main_thread));
    screen.mark_state(LifecycleState::Resumed);

    let activity = Arc::new(ActiveInactive::new());
    let ticker = StateSubject::from_parts(SubjectConfig::named("ticker"), activity.clone(), None);

    let running = Arc::new(AtomicBool::new(true));
    let producer = {
        let ticker = ticker.clone();
        let running = running.clone();
        thread::spawn(move || {
            let mut tick = 0u64;
            while running.load(Ordering::SeqCst) {
                ticker.publish(format!("tick {}", tick));
                tick += 1;
                thread::sleep(Duration::from_millis(200));
            }
        })
    };

    let handle = ticker.subscribe_with(
        &screen,
        SubscribeOptions::default().transformer(Transformer::map(|s: String| s + "!")),
        |s| println!("screen shows: {}", s),
    );

    thread::sleep(Duration::from_secs(1));
    println!("screen hidden (active: {})", activity.is_active());
    screen.mark_state(LifecycleState::Created);

    thread::sleep(Duration::from_secs(1));
    println!("screen visible again (active: {})", activity.is_active());
    screen.mark_state(LifecycleState::Resumed);

    thread::sleep(Duration::from_secs(1));
    handle.dispose();
    println!(
        "disposed (active: {}, subscribers: {})",
        activity.is_active(),
        ticker.has_any_subscribers()
    );

    running.store(false, Ordering::SeqCst);
    let _ = producer.join();
    screen.mark_state(LifecycleState::Destroyed);
}
