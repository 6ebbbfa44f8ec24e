//! Multi-producer/single-consumer handoff between scan workers and the writer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::domain::FileRecord;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("ingest queue is closed to new records")]
    Closed,
}

/// Thread-safe record handoff with an explicit end-of-stream signal.
///
/// Any number of producers may [`enqueue`](IngestQueue::enqueue) concurrently;
/// exactly one consumer drains via [`recv`](IngestQueue::recv). After
/// [`close`](IngestQueue::close), enqueues fail but the consumer still drains
/// everything buffered before observing end-of-stream. With a capacity bound,
/// producers block while the buffer is full (backpressure); unbounded queues
/// never block producers.
#[derive(Debug)]
pub struct IngestQueue {
    tx: RwLock<Option<Sender<FileRecord>>>,
    rx: Receiver<FileRecord>,
    depth: AtomicUsize,
}

impl IngestQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        let (tx, rx) = match capacity {
            Some(bound) => crossbeam_channel::bounded(bound),
            None => crossbeam_channel::unbounded(),
        };
        Self {
            tx: RwLock::new(Some(tx)),
            rx,
            depth: AtomicUsize::new(0),
        }
    }

    /// Hand a record to the consumer. Fails once the queue is closed.
    pub fn enqueue(&self, record: FileRecord) -> Result<(), QueueError> {
        let guard = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(QueueError::Closed);
        };
        // Count before sending so the consumer can never observe a record
        // whose increment has not landed yet.
        self.depth.fetch_add(1, Ordering::SeqCst);
        if tx.send(record).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    /// Mark no-more-items. Buffered records remain available to the consumer;
    /// subsequent enqueues fail. Idempotent.
    pub fn close(&self) {
        let mut guard = self.tx.write().unwrap_or_else(PoisonError::into_inner);
        guard.take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Records handed over but not yet pulled by the consumer, excluding
    /// anything already in the consumer's in-flight batch.
    ///
    /// Inclusive of producers currently blocked in a bounded send, so the
    /// value can transiently exceed the configured capacity by the number of
    /// blocked producers. Counting on the send side would instead race the
    /// consumer's decrement and could underflow.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Block until the next record, or `None` once the queue is closed and
    /// fully drained. Single-consumer by contract.
    pub fn recv(&self) -> Option<FileRecord> {
        let record = self.rx.recv().ok()?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn record(path: &str) -> FileRecord {
        FileRecord {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            size: 1,
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn enqueue_and_drain_in_order() {
        let queue = IngestQueue::new(None);
        queue.enqueue(record("/a")).expect("enqueue a");
        queue.enqueue(record("/b")).expect("enqueue b");
        assert_eq!(queue.depth(), 2);

        assert_eq!(queue.recv().expect("a").path, "/a");
        assert_eq!(queue.recv().expect("b").path, "/b");
        assert_eq!(queue.depth(), 0);
    }

    #[test]
    fn enqueue_after_close_is_rejected() {
        let queue = IngestQueue::new(None);
        queue.enqueue(record("/a")).expect("enqueue");
        queue.close();
        assert!(queue.is_closed());
        assert_eq!(queue.enqueue(record("/b")), Err(QueueError::Closed));
    }

    #[test]
    fn consumer_drains_buffered_records_after_close() {
        let queue = IngestQueue::new(None);
        queue.enqueue(record("/a")).expect("enqueue a");
        queue.enqueue(record("/b")).expect("enqueue b");
        queue.close();

        assert!(queue.recv().is_some());
        assert!(queue.recv().is_some());
        assert!(queue.recv().is_none(), "end-of-stream after drain");
    }

    #[test]
    fn close_is_idempotent() {
        let queue = IngestQueue::new(None);
        queue.close();
        queue.close();
        assert!(queue.recv().is_none());
    }

    #[test]
    fn concurrent_producers_all_land() {
        let queue = Arc::new(IngestQueue::new(None));
        let mut handles = Vec::new();
        for p in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    queue.enqueue(record(&format!("/p{p}/f{i}"))).expect("enqueue");
                }
            }));
        }
        for handle in handles {
            handle.join().expect("producer");
        }
        queue.close();

        let mut drained = 0;
        while queue.recv().is_some() {
            drained += 1;
        }
        assert_eq!(drained, 200);
    }

    #[test]
    fn bounded_queue_applies_backpressure() {
        let queue = Arc::new(IngestQueue::new(Some(2)));
        queue.enqueue(record("/a")).expect("a");
        queue.enqueue(record("/b")).expect("b");

        // Third enqueue blocks until the consumer makes room.
        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.enqueue(record("/c")))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!producer.is_finished(), "producer should be blocked on full queue");
        // The blocked producer is already counted: depth is capacity plus
        // the number of senders waiting for room.
        assert_eq!(queue.depth(), 3);

        assert!(queue.recv().is_some());
        producer.join().expect("join").expect("enqueue c");
    }
}
