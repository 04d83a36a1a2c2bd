//! Message queue and notification seams.
//!
//! The service pulls parse requests from a [`MessageQueue`] with explicit acknowledgement and
//! publishes one [`CompletionNotification`] per job to a [`NotificationSink`]. Both are traits
//! so a broker client can be plugged in; the in-memory versions here back the tests and the
//! CLI.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{commands::CompletionNotification, error::NetdocError};

/// A message handed to a worker, to be acked or nacked by `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub body: Vec<u8>,
    /// 1 on first delivery, incremented on every requeue
    pub attempt: u32,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Next message, or `None` when nothing is pending.
    async fn receive(&self) -> Result<Option<Delivery>, NetdocError>;
    async fn ack(&self, tag: u64) -> Result<(), NetdocError>;
    /// Reject a message; with `requeue` it is delivered again later, otherwise dropped.
    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), NetdocError>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: &CompletionNotification) -> Result<(), NetdocError>;
}

#[derive(Debug, Default)]
pub struct MemoryQueue {
    pending: Mutex<VecDeque<Delivery>>,
    in_flight: Mutex<BTreeMap<u64, Delivery>>,
    acked: Mutex<Vec<u64>>,
    rejected: Mutex<Vec<Delivery>>,
    next_tag: AtomicU64,
}

impl MemoryQueue {
    pub fn push(&self, body: Vec<u8>) -> u64 {
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending.lock().push_back(Delivery {
            tag,
            body,
            attempt: 1,
        });
        tag
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn acked(&self) -> Vec<u64> {
        self.acked.lock().clone()
    }

    /// Messages nacked without requeue.
    pub fn rejected(&self) -> Vec<Delivery> {
        self.rejected.lock().clone()
    }

    fn take_in_flight(&self, tag: u64) -> Result<Delivery, NetdocError> {
        self.in_flight
            .lock()
            .remove(&tag)
            .ok_or_else(|| NetdocError::NotFound(format!("delivery tag {tag}")))
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive(&self) -> Result<Option<Delivery>, NetdocError> {
        let Some(delivery) = self.pending.lock().pop_front() else {
            return Ok(None);
        };
        self.in_flight
            .lock()
            .insert(delivery.tag, delivery.clone());
        Ok(Some(delivery))
    }

    async fn ack(&self, tag: u64) -> Result<(), NetdocError> {
        self.take_in_flight(tag)?;
        self.acked.lock().push(tag);
        Ok(())
    }

    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), NetdocError> {
        let mut delivery = self.take_in_flight(tag)?;
        if requeue {
            delivery.attempt += 1;
            self.pending.lock().push_back(delivery);
        } else {
            self.rejected.lock().push(delivery);
        }
        Ok(())
    }
}

/// Collects notifications in memory; can be told to fail the next publishes.
#[derive(Debug, Default)]
pub struct MemoryNotifications {
    published: Mutex<Vec<CompletionNotification>>,
    failing: Mutex<u32>,
}

impl MemoryNotifications {
    pub fn published(&self) -> Vec<CompletionNotification> {
        self.published.lock().clone()
    }

    pub fn fail_next(&self, n: u32) {
        *self.failing.lock() = n;
    }
}

#[async_trait]
impl NotificationSink for MemoryNotifications {
    async fn publish(&self, notification: &CompletionNotification) -> Result<(), NetdocError> {
        {
            let mut failing = self.failing.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(NetdocError::StorageUnavailable(
                    "injected notification failure".to_string(),
                ));
            }
        }
        self.published.lock().push(notification.clone());
        Ok(())
    }
}
