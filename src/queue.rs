use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::Error;

/// Deltas the ring can hold before new ones are dropped.
pub const QUEUE_CAPACITY: usize = 64;

struct Ring {
    deltas: [i32; QUEUE_CAPACITY],
    head: usize,
    tail: usize,
    count: usize,
}

/// Bounded FIFO of pending scroll deltas between the capture and physics
/// threads. Overflow drops the newest delta rather than blocking capture.
pub struct ScrollQueue {
    ring: Mutex<Ring>,
    available: Condvar,
}

impl ScrollQueue {
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(Ring {
                deltas: [0; QUEUE_CAPACITY],
                head: 0,
                tail: 0,
                count: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueue one delta and wake the consumer. `QueueFull` when at
    /// capacity; existing entries are untouched.
    pub fn push(&self, delta: i32) -> Result<(), Error> {
        let mut ring = self.ring.lock();
        if ring.count == QUEUE_CAPACITY {
            return Err(Error::QueueFull(delta));
        }
        let head = ring.head;
        ring.deltas[head] = delta;
        ring.head = (head + 1) % QUEUE_CAPACITY;
        ring.count += 1;
        self.available.notify_one();
        Ok(())
    }

    /// Dequeue the oldest delta, if any.
    pub fn try_pop(&self) -> Option<i32> {
        let mut ring = self.ring.lock();
        if ring.count == 0 {
            return None;
        }
        let delta = ring.deltas[ring.tail];
        ring.tail = (ring.tail + 1) % QUEUE_CAPACITY;
        ring.count -= 1;
        Some(delta)
    }

    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Park until a delta is queued, `interrupt` reports true, or `timeout`
    /// elapses, whichever comes first.
    ///
    /// `interrupt` runs with the queue lock held; it may take the state lock
    /// (queue before state is the one sanctioned nesting order).
    pub fn wait(&self, timeout: Duration, interrupt: impl Fn() -> bool) {
        let mut ring = self.ring.lock();
        while ring.count == 0 && !interrupt() {
            if self.available.wait_for(&mut ring, timeout).timed_out() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let queue = ScrollQueue::new();
        queue.push(1).unwrap();
        queue.push(-2).unwrap();
        queue.push(3).unwrap();
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(-2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn overflow_drops_newest_and_keeps_existing() {
        let queue = ScrollQueue::new();
        for i in 0..QUEUE_CAPACITY {
            queue.push(i as i32).unwrap();
        }
        match queue.push(999) {
            Err(Error::QueueFull(999)) => {}
            other => panic!("expected QueueFull, got {other:?}"),
        }
        assert_eq!(queue.len(), QUEUE_CAPACITY);
        assert_eq!(queue.try_pop(), Some(0));
    }

    #[test]
    fn wraps_around() {
        let queue = ScrollQueue::new();
        for round in 0..3 {
            for i in 0..QUEUE_CAPACITY {
                queue.push((round * 100 + i) as i32).unwrap();
            }
            for i in 0..QUEUE_CAPACITY {
                assert_eq!(queue.try_pop(), Some((round * 100 + i) as i32));
            }
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn wait_returns_immediately_when_data_is_queued() {
        let queue = ScrollQueue::new();
        queue.push(5).unwrap();
        // Would hang well past the test timeout if the count check was wrong.
        queue.wait(Duration::from_secs(60), || false);
        assert_eq!(queue.try_pop(), Some(5));
    }

    #[test]
    fn wait_honors_interrupt() {
        let queue = ScrollQueue::new();
        queue.wait(Duration::from_secs(60), || true);
    }

    #[test]
    fn wait_times_out_when_idle() {
        let queue = ScrollQueue::new();
        let start = std::time::Instant::now();
        queue.wait(Duration::from_millis(10), || false);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
