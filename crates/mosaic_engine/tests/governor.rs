use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use mosaic_core::{ProviderDescriptor, ProviderType};
use mosaic_engine::{scatter_gather, Governor};
use tokio::time::Instant;

fn descriptor(rate_limit_ms: u64) -> ProviderDescriptor {
    ProviderDescriptor::new("novelupdates", "https://novelupdates.test", ProviderType::Manga)
        .with_rate_limit(Duration::from_millis(rate_limit_ms))
}

#[tokio::test(start_paused = true)]
async fn calls_are_spaced_by_the_rate_limit() {
    let governor = Arc::new(Governor::new());
    let descriptor = descriptor(100);
    let started = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let (governor, descriptor, started) = (governor.clone(), descriptor.clone(), started.clone());
        tokio::spawn(async move {
            let _permit = governor.acquire(&descriptor).await;
            started.lock().unwrap().push(Instant::now());
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = {
        let (governor, descriptor, started) = (governor.clone(), descriptor.clone(), started.clone());
        tokio::spawn(async move {
            let _permit = governor.acquire(&descriptor).await;
            started.lock().unwrap().push(Instant::now());
        })
    };
    first.await.unwrap();
    second.await.unwrap();

    let started = started.lock().unwrap();
    assert_eq!(started.len(), 2);
    assert!(started[1] - started[0] >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn zero_rate_limit_never_waits() {
    let governor = Governor::new();
    let descriptor = descriptor(0);
    let before = Instant::now();
    for _ in 0..10 {
        let _permit = governor.acquire(&descriptor).await;
    }
    assert_eq!(Instant::now(), before);
}

#[tokio::test(start_paused = true)]
async fn concurrency_cap_bounds_calls_in_flight() {
    let governor = Arc::new(Governor::new());
    let descriptor = descriptor(0).with_max_concurrent(2);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks = (0..6).map(|_| {
        let (governor, descriptor) = (governor.clone(), descriptor.clone());
        let (current, peak) = (current.clone(), peak.clone());
        tokio::spawn(async move {
            let _permit = governor.acquire(&descriptor).await;
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            current.fetch_sub(1, Ordering::SeqCst);
        })
    });
    for task in join_all(tasks).await {
        task.unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(governor.in_flight("novelupdates"), 0);
}

#[tokio::test(start_paused = true)]
async fn scatter_gather_runs_batches_in_order() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let results = scatter_gather((0..12u64).collect(), 5, |n| {
        let (current, peak) = (current.clone(), peak.clone());
        async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            // Later items finish first within a batch.
            tokio::time::sleep(Duration::from_millis(100 - n)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            if n == 7 {
                Err(format!("item {n} failed"))
            } else {
                Ok(n * 10)
            }
        }
    })
    .await;

    assert_eq!(peak.load(Ordering::SeqCst), 5);
    assert_eq!(results.len(), 12);
    assert_eq!(results[0], Ok(0));
    assert_eq!(results[7], Err("item 7 failed".to_string()));
    assert_eq!(results[11], Ok(110));
}
