use std::sync::Arc;

use tokio::sync::mpsc;

use super::PrioritySemaphore;

#[tokio::test]
async fn it_admits_up_to_the_limit_without_waiting() {
    let semaphore = PrioritySemaphore::new(2);

    semaphore.acquire(false).await;
    semaphore.acquire(true).await;

    assert_eq!(semaphore.active_count().await, 2);
}

#[tokio::test]
async fn it_frees_slots_on_release() {
    let semaphore = PrioritySemaphore::new(1);

    semaphore.acquire(false).await;
    semaphore.release().await;

    assert_eq!(semaphore.active_count().await, 0);
}

#[tokio::test]
async fn it_resumes_priority_waiters_first() {
    let semaphore = Arc::new(PrioritySemaphore::new(1));
    let (tx, mut rx) = mpsc::unbounded_channel::<&str>();

    semaphore.acquire(false).await;

    // The regular waiter queues first, the priority waiter second.
    let regular = {
        let semaphore = semaphore.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            semaphore.acquire(false).await;
            tx.send("regular").unwrap();
        })
    };
    tokio::task::yield_now().await;

    let priority = {
        let semaphore = semaphore.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            semaphore.acquire(true).await;
            tx.send("priority").unwrap();
        })
    };
    tokio::task::yield_now().await;

    semaphore.release().await;
    assert_eq!(rx.recv().await, Some("priority"));

    semaphore.release().await;
    assert_eq!(rx.recv().await, Some("regular"));

    priority.await.unwrap();
    regular.await.unwrap();
}

#[tokio::test]
async fn it_resumes_same_class_waiters_in_fifo_order() {
    let semaphore = Arc::new(PrioritySemaphore::new(1));
    let (tx, mut rx) = mpsc::unbounded_channel::<usize>();

    semaphore.acquire(false).await;

    let mut handles = vec![];
    for idx in 0..3 {
        let semaphore = semaphore.clone();
        let tx = tx.clone();
        handles.push(tokio::spawn(async move {
            semaphore.acquire(false).await;
            tx.send(idx).unwrap();
        }));
        // Force a deterministic queueing order.
        tokio::task::yield_now().await;
    }

    for expected in 0..3 {
        semaphore.release().await;
        assert_eq!(rx.recv().await, Some(expected));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn it_hands_the_slot_past_cancelled_waiters() {
    let semaphore = Arc::new(PrioritySemaphore::new(1));
    let (tx, mut rx) = mpsc::unbounded_channel::<&str>();

    semaphore.acquire(false).await;

    let cancelled = {
        let semaphore = semaphore.clone();
        tokio::spawn(async move {
            semaphore.acquire(false).await;
        })
    };
    tokio::task::yield_now().await;
    cancelled.abort();
    let _ = cancelled.await;

    let live = {
        let semaphore = semaphore.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            semaphore.acquire(false).await;
            tx.send("live").unwrap();
        })
    };
    tokio::task::yield_now().await;

    semaphore.release().await;
    assert_eq!(rx.recv().await, Some("live"));

    live.await.unwrap();
}
