//! Bounded, priority-aware fulfillment queue.
//!
//! Urgent orders go to the front, everything else appends. Pushing into a
//! full queue waits until a slot frees; callers bound the wait with their
//! own deadline (`tokio::time::timeout`).

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

pub struct FulfillmentQueue {
    capacity: usize,
    inner: Mutex<VecDeque<String>>,
    space_available: Notify,
    item_available: Notify,
}

impl FulfillmentQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::new()),
            space_available: Notify::new(),
            item_available: Notify::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Enqueue an order id, waiting for space if the queue is full.
    pub async fn push(&self, order_id: String, urgent: bool) {
        loop {
            let notified = self.space_available.notified();
            {
                let mut queue = self.inner.lock().unwrap();
                if queue.len() < self.capacity {
                    if urgent {
                        queue.push_front(order_id);
                    } else {
                        queue.push_back(order_id);
                    }
                    drop(queue);
                    self.item_available.notify_one();
                    return;
                }
            }
            notified.await;
        }
    }

    /// Enqueue without waiting; returns `false` when the queue is full.
    pub fn try_push(&self, order_id: String, urgent: bool) -> bool {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() >= self.capacity {
            return false;
        }
        if urgent {
            queue.push_front(order_id);
        } else {
            queue.push_back(order_id);
        }
        drop(queue);
        self.item_available.notify_one();
        true
    }

    /// Dequeue the next order id, waiting until one is available.
    pub async fn pop(&self) -> String {
        loop {
            let notified = self.item_available.notified();
            {
                let mut queue = self.inner.lock().unwrap();
                if let Some(order_id) = queue.pop_front() {
                    drop(queue);
                    self.space_available.notify_one();
                    return order_id;
                }
            }
            notified.await;
        }
    }

    /// Dequeue without waiting.
    pub fn try_pop(&self) -> Option<String> {
        let order_id = self.inner.lock().unwrap().pop_front();
        if order_id.is_some() {
            self.space_available.notify_one();
        }
        order_id
    }
}
