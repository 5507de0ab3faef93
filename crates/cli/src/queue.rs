//! Minimal in-process work queue with broker-style acknowledgement.
//!
//! Items stay outstanding from `push` until they are acked. Requeued and
//! left items go back to the tail and are delivered again.

use std::{
  pin::pin,
  sync::atomic::{AtomicUsize, Ordering},
};

use tokio::sync::{Mutex, Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// One delivery of a work item.
#[derive(Debug)]
pub struct Delivery<T> {
  pub item: T,
  /// 1 for the first delivery, incremented on every redelivery
  pub attempt: u32,
}

/// Counters for the run summary
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
  pub pushed: usize,
  pub acked: usize,
  pub requeued: usize,
  pub left: usize,
}

pub struct WorkQueue<T> {
  sender: mpsc::UnboundedSender<Delivery<T>>,
  receiver: Mutex<mpsc::UnboundedReceiver<Delivery<T>>>,
  outstanding: AtomicUsize,
  drained: Notify,
  pushed: AtomicUsize,
  acked: AtomicUsize,
  requeued: AtomicUsize,
  left: AtomicUsize,
}

impl<T> Default for WorkQueue<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> WorkQueue<T> {
  pub fn new() -> Self {
    let (sender, receiver) = mpsc::unbounded_channel();
    Self {
      sender,
      receiver: Mutex::new(receiver),
      outstanding: AtomicUsize::new(0),
      drained: Notify::new(),
      pushed: AtomicUsize::new(0),
      acked: AtomicUsize::new(0),
      requeued: AtomicUsize::new(0),
      left: AtomicUsize::new(0),
    }
  }

  pub fn push(&self, item: T) {
    self.outstanding.fetch_add(1, Ordering::SeqCst);
    self.pushed.fetch_add(1, Ordering::Relaxed);
    self.send(Delivery { item, attempt: 1 });
  }

  /// Wait for the next delivery. `None` once `cancel` fires.
  pub async fn next(&self, cancel: &CancellationToken) -> Option<Delivery<T>> {
    let mut receiver = tokio::select! {
      biased;
      _ = cancel.cancelled() => return None,
      receiver = self.receiver.lock() => receiver,
    };
    tokio::select! {
      biased;
      _ = cancel.cancelled() => None,
      delivery = receiver.recv() => delivery,
    }
  }

  /// Done with the item, for better or worse.
  pub fn ack(&self, delivery: Delivery<T>) {
    trace!(attempt = delivery.attempt, "Acked delivery");
    self.acked.fetch_add(1, Ordering::Relaxed);
    if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
      self.drained.notify_waiters();
    }
  }

  /// Put the item back after a downstream failure.
  pub fn requeue(&self, delivery: Delivery<T>) {
    self.requeued.fetch_add(1, Ordering::Relaxed);
    self.send(Delivery {
      item: delivery.item,
      attempt: delivery.attempt + 1,
    });
  }

  /// Not acknowledged; the item will be delivered again.
  pub fn leave(&self, delivery: Delivery<T>) {
    self.left.fetch_add(1, Ordering::Relaxed);
    self.send(Delivery {
      item: delivery.item,
      attempt: delivery.attempt + 1,
    });
  }

  pub fn outstanding(&self) -> usize {
    self.outstanding.load(Ordering::SeqCst)
  }

  /// Resolves once every pushed item has been acked.
  pub async fn drained(&self) {
    loop {
      let mut notified = pin!(self.drained.notified());
      notified.as_mut().enable();
      if self.outstanding() == 0 {
        return;
      }
      notified.await;
    }
  }

  pub fn stats(&self) -> QueueStats {
    QueueStats {
      pushed: self.pushed.load(Ordering::Relaxed),
      acked: self.acked.load(Ordering::Relaxed),
      requeued: self.requeued.load(Ordering::Relaxed),
      left: self.left.load(Ordering::Relaxed),
    }
  }

  fn send(&self, delivery: Delivery<T>) {
    // The receiver lives in `self`, so the channel cannot be closed here.
    let _ = self.sender.send(delivery);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::{sync::Arc, time::Duration};
  use tokio::time::timeout;

  #[tokio::test]
  async fn test_ack_drains_queue() {
    let queue = WorkQueue::new();
    let cancel = CancellationToken::new();
    queue.push("a");
    queue.push("b");

    let first = queue.next(&cancel).await.unwrap();
    assert_eq!((first.item, first.attempt), ("a", 1));
    queue.ack(first);
    assert_eq!(queue.outstanding(), 1);

    let second = queue.next(&cancel).await.unwrap();
    queue.ack(second);

    timeout(Duration::from_millis(100), queue.drained())
      .await
      .expect("queue should be drained");
    assert_eq!(
      queue.stats(),
      QueueStats {
        pushed: 2,
        acked: 2,
        requeued: 0,
        left: 0
      }
    );
  }

  #[tokio::test]
  async fn test_requeue_redelivers_with_next_attempt() {
    let queue = WorkQueue::new();
    let cancel = CancellationToken::new();
    queue.push(7);

    let delivery = queue.next(&cancel).await.unwrap();
    queue.requeue(delivery);
    assert_eq!(queue.outstanding(), 1);

    let again = queue.next(&cancel).await.unwrap();
    assert_eq!((again.item, again.attempt), (7, 2));
    assert_eq!(queue.stats().requeued, 1);
  }

  #[tokio::test]
  async fn test_left_items_stay_outstanding() {
    let queue = WorkQueue::new();
    let cancel = CancellationToken::new();
    queue.push("x");

    let delivery = queue.next(&cancel).await.unwrap();
    queue.leave(delivery);

    assert_eq!(queue.outstanding(), 1);
    assert_eq!(queue.stats().left, 1);
    assert!(timeout(Duration::from_millis(50), queue.drained()).await.is_err());
  }

  #[tokio::test]
  async fn test_next_returns_none_when_cancelled() {
    let queue = Arc::new(WorkQueue::<u32>::new());
    let cancel = CancellationToken::new();

    let consumer = {
      let queue = Arc::clone(&queue);
      let cancel = cancel.clone();
      tokio::spawn(async move { queue.next(&cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let delivery = timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
    assert!(delivery.is_none());
  }
}
