use std::sync::{Arc, Mutex};
use std::time::Duration;

use mosaic_engine::{JobState, QueueExecutor};
use pretty_assertions::assert_eq;

type Log = Arc<Mutex<Vec<String>>>;

fn sleeping_queue(log: &Log, work: Duration) -> QueueExecutor<u32, u32> {
    let log = log.clone();
    QueueExecutor::new("test-executor", move |n: u32| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(format!("start {n}"));
            tokio::time::sleep(work).await;
            log.lock().unwrap().push(format!("end {n}"));
            anyhow::ensure!(n != 2, "job {n} refused");
            Ok(n * 10)
        }
    })
    .interval(Duration::from_millis(100))
}

#[tokio::test(start_paused = true)]
async fn jobs_run_one_at_a_time_in_enqueue_order() {
    let log: Log = Arc::default();
    let results: Arc<Mutex<Vec<(u32, u32)>>> = Arc::default();
    let queue = {
        let results = results.clone();
        sleeping_queue(&log, Duration::from_millis(250))
            .on_success(move |n, result| results.lock().unwrap().push((*n, *result)))
    };

    for n in [1, 3, 4] {
        queue.enqueue(n);
    }
    assert_eq!(queue.pending(), 3);
    queue.start();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["start 1", "end 1", "start 3", "end 3", "start 4", "end 4"]
    );
    assert_eq!(*results.lock().unwrap(), vec![(1, 10), (3, 30), (4, 40)]);
    assert_eq!(queue.pending(), 0);
    assert!(!queue.is_running());
    queue.stop();
}

#[tokio::test(start_paused = true)]
async fn failures_are_reported_and_the_queue_moves_on() {
    let log: Log = Arc::default();
    let errors: Log = Arc::default();
    let queue = {
        let errors = errors.clone();
        sleeping_queue(&log, Duration::from_millis(10)).on_error(move |err, n| {
            errors.lock().unwrap().push(format!("{n}: {err}"));
        })
    };

    let first = queue.enqueue(1);
    let failing = queue.enqueue(2);
    let last = queue.enqueue(3);
    queue.start();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(*errors.lock().unwrap(), vec!["2: job 2 refused"]);
    assert_eq!(queue.state_of(first), Some(JobState::Completed));
    assert_eq!(queue.state_of(failing), Some(JobState::Failed));
    assert_eq!(queue.state_of(last), Some(JobState::Completed));
    assert_eq!(queue.state_of(999), None);
    queue.stop();
}

#[tokio::test(start_paused = true)]
async fn panicking_jobs_count_as_failures() {
    let errors: Log = Arc::default();
    let queue = {
        let errors = errors.clone();
        QueueExecutor::new("panicky-executor", |n: u32| async move {
            if n == 0 {
                panic!("boom");
            }
            Ok(n)
        })
        .on_error(move |err, _| errors.lock().unwrap().push(err.to_string()))
        .interval(Duration::from_millis(100))
    };

    let panicked = queue.enqueue(0);
    let fine = queue.enqueue(1);
    queue.start();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(*errors.lock().unwrap(), vec!["job panicked"]);
    assert_eq!(queue.state_of(panicked), Some(JobState::Failed));
    assert_eq!(queue.state_of(fine), Some(JobState::Completed));
    queue.stop();
}

#[tokio::test(start_paused = true)]
async fn panicking_success_callback_does_not_stall_the_queue() {
    let log: Log = Arc::default();
    let queue = sleeping_queue(&log, Duration::from_millis(10)).on_success(|n, _| {
        if *n == 1 {
            panic!("success callback exploded");
        }
    });

    let first = queue.enqueue(1);
    let second = queue.enqueue(3);
    queue.start();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(queue.state_of(first), Some(JobState::Completed));
    assert_eq!(queue.state_of(second), Some(JobState::Completed));
    assert_eq!(queue.pending(), 0);
    assert!(!queue.is_running());
    queue.stop();
}

#[tokio::test(start_paused = true)]
async fn panicking_error_callback_does_not_stall_the_queue() {
    let log: Log = Arc::default();
    let queue = sleeping_queue(&log, Duration::from_millis(10))
        .on_error(|_, _| panic!("error callback exploded"));

    let failing = queue.enqueue(2);
    let next = queue.enqueue(4);
    queue.start();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(queue.state_of(failing), Some(JobState::Failed));
    assert_eq!(queue.state_of(next), Some(JobState::Completed));
    assert_eq!(*log.lock().unwrap(), vec!["start 2", "end 2", "start 4", "end 4"]);
    assert!(!queue.is_running());
    queue.stop();
}

#[tokio::test(start_paused = true)]
async fn stopping_leaves_queued_jobs_pending() {
    let log: Log = Arc::default();
    let queue = sleeping_queue(&log, Duration::from_secs(1));

    let running = queue.enqueue(1);
    let waiting = queue.enqueue(3);
    queue.enqueue(4);
    queue.start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(queue.state_of(running), Some(JobState::Running));
    assert!(queue.is_running());

    queue.stop();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(*log.lock().unwrap(), vec!["start 1", "end 1"]);
    assert_eq!(queue.state_of(running), Some(JobState::Completed));
    assert_eq!(queue.state_of(waiting), Some(JobState::Queued));
    assert_eq!(queue.pending(), 2);

    queue.start();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(queue.pending(), 0);
    assert_eq!(queue.state_of(waiting), Some(JobState::Completed));
    queue.stop();
}

#[tokio::test(start_paused = true)]
async fn starting_twice_does_not_run_jobs_concurrently() {
    let log: Log = Arc::default();
    let queue = sleeping_queue(&log, Duration::from_millis(300));
    queue.enqueue(1);
    queue.enqueue(3);
    queue.start();
    queue.start();
    queue.clone().start();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(*log.lock().unwrap(), vec!["start 1", "end 1", "start 3", "end 3"]);
    queue.stop();
}
