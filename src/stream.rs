//! # Sample Stream Module
//!
//! Ordered hand-off between the transport and the session pipeline.
//! Exactly one producer (`FrameSender`) and one consumer (`SampleStream`) share a
//! bounded queue. The transport pushes raw frames and link changes; the consumer
//! decodes frames into samples, dropping the ones it cannot decode.
//!
//! ## Ordering
//! Events are delivered in the order they were sent. A full queue blocks the
//! transport instead of dropping or reordering frames.

use crate::error::DecodeError;
use crate::frame::{self, SensorSample};
use crossbeam_channel::{bounded, Receiver, SendError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Raw event pushed by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Frame(Vec<u8>),
    Link(LinkStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

/// Decoded item handed to the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Sample(SensorSample),
    Link(LinkStatus),
}

/// Shared "is the sensor connected" flag
///
/// Written by the transport side, read by the session before starting a
/// workout or set.
#[derive(Debug, Clone, Default)]
pub struct LinkState(Arc<AtomicBool>);

impl LinkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_up(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set_up(&self, up: bool) {
        self.0.store(up, Ordering::Release);
    }
}

/// Producer half, owned by the transport
pub struct FrameSender {
    tx: Sender<StreamEvent>,
    link: LinkState,
}

impl FrameSender {
    /// Push one raw notification payload
    pub fn send_frame(&self, bytes: &[u8]) -> Result<(), SendError<StreamEvent>> {
        self.tx.send(StreamEvent::Frame(bytes.to_vec()))
    }

    /// Mark the link up and tell the pipeline
    pub fn connected(&self) -> Result<(), SendError<StreamEvent>> {
        self.link.set_up(true);
        self.tx.send(StreamEvent::Link(LinkStatus::Connected))
    }

    /// Mark the link down and tell the pipeline
    pub fn disconnected(&self) -> Result<(), SendError<StreamEvent>> {
        self.link.set_up(false);
        self.tx.send(StreamEvent::Link(LinkStatus::Disconnected))
    }
}

/// Consumer half, owned by the pipeline
pub struct SampleStream {
    rx: Receiver<StreamEvent>,
    last_sample: Option<SensorSample>,
    dropped_frames: u64,
}

/// Create a connected producer/consumer pair
pub fn channel(capacity: usize, link: LinkState) -> (FrameSender, SampleStream) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        FrameSender { tx, link },
        SampleStream {
            rx,
            last_sample: None,
            dropped_frames: 0,
        },
    )
}

impl SampleStream {
    /// Receiver for use in `select!`; events must be passed back through `accept`
    pub fn events(&self) -> Receiver<StreamEvent> {
        self.rx.clone()
    }

    /// Decode one raw event
    ///
    /// Returns `None` for frames that do not decode.
    pub fn accept(&mut self, event: StreamEvent) -> Option<StreamItem> {
        match event {
            StreamEvent::Frame(bytes) => match self.decode(&bytes) {
                Ok(sample) => Some(StreamItem::Sample(sample)),
                Err(e) => {
                    self.dropped_frames += 1;
                    log::debug!("Dropping frame: {}", e);
                    None
                }
            },
            StreamEvent::Link(status) => {
                if status == LinkStatus::Connected {
                    // Device timestamps restart with each connection
                    self.last_sample = None;
                }
                Some(StreamItem::Link(status))
            }
        }
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<SensorSample, DecodeError> {
        let sample = frame::decode(bytes, self.last_sample.as_ref())?;
        if let Some(last) = &self.last_sample {
            if sample.timestamp < last.timestamp {
                log::warn!(
                    "Device timestamp went backwards ({} -> {}), passing through unchanged",
                    last.timestamp,
                    sample.timestamp
                );
            }
        }
        self.last_sample = Some(sample);
        Ok(sample)
    }

    /// Block until the next decodable item; `None` once the producer is gone
    #[cfg(test)]
    pub fn next_item(&mut self) -> Option<StreamItem> {
        loop {
            let event = self.rx.recv().ok()?;
            if let Some(item) = self.accept(event) {
                return Some(item);
            }
        }
    }

    /// Take the next queued item without blocking
    pub fn try_next_item(&mut self) -> Option<StreamItem> {
        loop {
            let event = self.rx.try_recv().ok()?;
            if let Some(item) = self.accept(event) {
                return Some(item);
            }
        }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(v: f32, t: u32) -> Vec<u8> {
        SensorSample {
            velocity: [v, 0.0, 0.0],
            acceleration: [1.0, 0.0, 0.0],
            timestamp: t,
        }
        .to_frame()
        .to_vec()
    }

    #[test]
    fn test_link_state_follows_sender() {
        let link = LinkState::new();
        let (sender, mut stream) = channel(8, link.clone());
        assert!(!link.is_up());

        sender.connected().unwrap();
        assert!(link.is_up());
        assert_eq!(stream.next_item(), Some(StreamItem::Link(LinkStatus::Connected)));

        sender.disconnected().unwrap();
        assert!(!link.is_up());
        assert_eq!(stream.next_item(), Some(StreamItem::Link(LinkStatus::Disconnected)));
    }

    #[test]
    fn test_order_preserved_and_bad_frames_dropped() {
        let (sender, mut stream) = channel(16, LinkState::new());
        sender.send_frame(&frame(0.1, 1)).unwrap();
        sender.send_frame(&[1, 2, 3]).unwrap();
        sender.send_frame(&frame(0.2, 2)).unwrap();
        drop(sender);

        let mut timestamps = Vec::new();
        while let Some(item) = stream.next_item() {
            if let StreamItem::Sample(s) = item {
                timestamps.push(s.timestamp);
            }
        }
        assert_eq!(timestamps, vec![1, 2]);
        assert_eq!(stream.dropped_frames(), 1);
    }

    #[test]
    fn test_velocity_frame_uses_last_sample() {
        let (sender, mut stream) = channel(8, LinkState::new());
        sender.send_frame(&frame(0.1, 77)).unwrap();
        sender.send_frame(&frame(0.9, 0)[..12]).unwrap();

        stream.next_item();
        match stream.next_item() {
            Some(StreamItem::Sample(s)) => {
                assert_eq!(s.velocity[0], 0.9);
                assert_eq!(s.acceleration, [1.0, 0.0, 0.0]);
                assert_eq!(s.timestamp, 77);
            }
            other => panic!("expected sample, got {:?}", other),
        }
    }

    #[test]
    fn test_try_next_item_does_not_block() {
        let (_sender, mut stream) = channel(4, LinkState::new());
        assert_eq!(stream.try_next_item(), None);
    }
}
