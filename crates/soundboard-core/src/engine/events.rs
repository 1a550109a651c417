//! Status notifications from the audio thread to the control side
//!
//! The audio thread reports voice completions and rejected triggers through a
//! second `rtrb` ring buffer. Events are plain `Copy` values so sending one
//! never allocates. If the control side falls behind and the ring is full,
//! events wait in a fixed-size backlog owned by the audio side and are retried
//! on the next push; only when that backlog is full too is an event dropped
//! (and counted).
//!
//! Device errors raised in stream error callbacks arrive on the same
//! [`StatusReceiver`] through a crossbeam channel, since those callbacks run
//! outside the mixer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};

use crate::audio::DeviceError;
use crate::types::{AssetId, VoiceId};

/// Default capacity of the status ring buffer
pub const STATUS_QUEUE_CAPACITY: usize = 256;

/// Events held back by the audio thread while the status ring is full
pub const STATUS_BACKLOG_CAPACITY: usize = 64;

/// Why a voice left the mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Played to the end of the sound
    Completed,
    /// Removed by a stop command
    Stopped,
    /// Removed by an exclusive trigger
    Replaced,
}

/// Notification produced by the mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    VoiceFinished {
        voice: VoiceId,
        asset: AssetId,
        reason: FinishReason,
    },
    /// A trigger arrived while every voice slot was in use; no voice was created
    CapacityExceeded { voice: VoiceId, asset: AssetId },
}

/// Anything the control side can observe from the running engine
#[derive(Debug)]
pub enum StatusEvent {
    Engine(EngineEvent),
    Device(DeviceError),
}

/// Audio-side sender of engine events
pub struct StatusOutbox {
    producer: rtrb::Producer<EngineEvent>,
    /// Pre-allocated, never grows past `STATUS_BACKLOG_CAPACITY`
    backlog: Vec<EngineEvent>,
    dropped: Arc<AtomicU64>,
}

/// Control-side receiver for engine events and device errors
pub struct StatusReceiver {
    consumer: rtrb::Consumer<EngineEvent>,
    device_rx: Receiver<DeviceError>,
    device_tx: Sender<DeviceError>,
}

/// Create the status channel
///
/// `dropped` is incremented for every event lost to a full backlog.
pub fn status_channel(capacity: usize, dropped: Arc<AtomicU64>) -> (StatusOutbox, StatusReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    let (device_tx, device_rx) = crossbeam::channel::unbounded();
    (
        StatusOutbox {
            producer,
            backlog: Vec::with_capacity(STATUS_BACKLOG_CAPACITY),
            dropped,
        },
        StatusReceiver {
            consumer,
            device_rx,
            device_tx,
        },
    )
}

impl StatusOutbox {
    /// Send an event without blocking or allocating
    pub fn push(&mut self, event: EngineEvent) {
        if self.flush() && self.producer.push(event).is_ok() {
            return;
        }
        if self.backlog.len() < STATUS_BACKLOG_CAPACITY {
            self.backlog.push(event);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Move backlogged events into the ring. Returns `true` when the backlog is empty.
    pub fn flush(&mut self) -> bool {
        let mut sent = 0;
        for event in &self.backlog {
            if self.producer.push(*event).is_err() {
                break;
            }
            sent += 1;
        }
        self.backlog.drain(..sent);
        self.backlog.is_empty()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}

impl StatusReceiver {
    /// Sender handed to stream error callbacks
    pub fn device_error_sender(&self) -> Sender<DeviceError> {
        self.device_tx.clone()
    }

    /// Next pending event, device errors first
    pub fn poll(&mut self) -> Option<StatusEvent> {
        if let Ok(err) = self.device_rx.try_recv() {
            return Some(StatusEvent::Device(err));
        }
        self.consumer.pop().ok().map(StatusEvent::Engine)
    }

    /// Every event currently pending
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        std::iter::from_fn(|| self.poll()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(n: u64) -> EngineEvent {
        EngineEvent::VoiceFinished {
            voice: VoiceId(n),
            asset: AssetId(1),
            reason: FinishReason::Completed,
        }
    }

    fn engine_events(rx: &mut StatusReceiver) -> Vec<EngineEvent> {
        rx.drain()
            .into_iter()
            .filter_map(|e| match e {
                StatusEvent::Engine(ev) => Some(ev),
                StatusEvent::Device(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_events_delivered_in_order() {
        let (mut outbox, mut rx) = status_channel(8, Arc::new(AtomicU64::new(0)));
        outbox.push(finished(1));
        outbox.push(finished(2));

        assert_eq!(engine_events(&mut rx), vec![finished(1), finished(2)]);
        assert!(rx.poll().is_none());
    }

    #[test]
    fn test_backlog_retries_after_consumer_catches_up() {
        let dropped = Arc::new(AtomicU64::new(0));
        let (mut outbox, mut rx) = status_channel(2, dropped.clone());
        for n in 1..=5 {
            outbox.push(finished(n));
        }
        assert_eq!(outbox.backlog_len(), 3);

        assert_eq!(engine_events(&mut rx), vec![finished(1), finished(2)]);
        assert!(!outbox.flush());
        assert_eq!(engine_events(&mut rx), vec![finished(3), finished(4)]);
        assert!(outbox.flush());
        assert_eq!(engine_events(&mut rx), vec![finished(5)]);
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_overflow_is_counted() {
        let dropped = Arc::new(AtomicU64::new(0));
        let (mut outbox, _rx) = status_channel(1, dropped.clone());
        for n in 0..(1 + STATUS_BACKLOG_CAPACITY as u64 + 3) {
            outbox.push(finished(n));
        }
        assert_eq!(outbox.backlog_len(), STATUS_BACKLOG_CAPACITY);
        assert_eq!(dropped.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_device_errors_are_polled_first() {
        let (mut outbox, mut rx) = status_channel(4, Arc::new(AtomicU64::new(0)));
        outbox.push(finished(1));
        rx.device_error_sender()
            .send(DeviceError::StreamError("underrun".to_string()))
            .unwrap();

        assert!(matches!(rx.poll(), Some(StatusEvent::Device(DeviceError::StreamError(_)))));
        assert!(matches!(rx.poll(), Some(StatusEvent::Engine(_))));
    }
}
