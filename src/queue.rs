//! Lock-free FIFOs between device callback threads and the audio thread.
//!
//! Producers (device callbacks, control thread) never block the consumer
//! (audio thread). The queue is unbounded; the producer side allocates, the
//! consumer side only pops.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::message::{MidiBytes, TimedMessage};

/// Creates a connected producer/consumer pair.
pub fn bridge_queue() -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (QueueProducer { tx }, QueueConsumer { rx })
}

#[derive(Clone)]
pub struct QueueProducer {
    tx: Sender<TimedMessage>,
}

impl QueueProducer {
    /// Returns `false` when the consumer is gone.
    pub fn push(&self, msg: TimedMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

pub struct QueueConsumer {
    rx: Receiver<TimedMessage>,
}

impl QueueConsumer {
    /// Non-blocking pop.
    pub fn pop(&self) -> Option<TimedMessage> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// The producer currently bound to one open input device.
///
/// Written by the control thread, read by the device's callback thread.
/// An empty slot means "no route": the callback drops the event.
#[derive(Default)]
pub struct InboundSlot {
    producer: ArcSwapOption<QueueProducer>,
}

impl InboundSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, producer: QueueProducer) {
        self.producer.store(Some(Arc::new(producer)));
    }

    pub fn clear(&self) {
        self.producer.store(None);
    }

    pub fn is_bound(&self) -> bool {
        self.producer.load().is_some()
    }

    /// Called from the device callback thread. Returns whether the message
    /// was queued.
    pub fn deliver(&self, bytes: MidiBytes, timestamp: u64) -> bool {
        let guard = self.producer.load();
        match &*guard {
            Some(producer) => producer.push(TimedMessage { bytes, timestamp }),
            None => false,
        }
    }
}
