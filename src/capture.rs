//! # Capture Replay Transport
//!
//! Stands in for the BLE link by replaying recorded notification payloads.
//!
//! ## Capture Format
//! One frame per line, hex encoded. Blank lines and lines starting with `#`
//! are ignored:
//! ```text
//! # squat, 60kg
//! cdcc4c3e000000000000000000000040...
//! ```
//!
//! ## Replay
//! `connect` reports the link as up. `start_streaming` then pushes each frame
//! from its own thread at a fixed interval and reports the link as down when
//! the capture is exhausted. Setting the stop flag ends the replay early.

use crate::error::CaptureError;
use crate::stream::{FrameSender, StreamEvent};
use crossbeam_channel::SendError;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Parse capture text into raw frames
pub fn parse_capture(contents: &str) -> Result<Vec<Vec<u8>>, CaptureError> {
    let mut frames = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let frame = hex::decode(line).map_err(|source| CaptureError::InvalidLine {
            line: number + 1,
            source,
        })?;
        frames.push(frame);
    }

    if frames.is_empty() {
        return Err(CaptureError::Empty);
    }
    Ok(frames)
}

pub fn load_capture(path: impl AsRef<Path>) -> Result<Vec<Vec<u8>>, CaptureError> {
    let contents = fs::read_to_string(path.as_ref()).map_err(CaptureError::ReadFailed)?;
    let frames = parse_capture(&contents)?;
    log::info!("Loaded {} frames from {}", frames.len(), path.as_ref().display());
    Ok(frames)
}

/// Replays captured frames into a sample stream
pub struct CaptureTransport {
    frames: Vec<Vec<u8>>,
    interval: Duration,
    should_stop: Arc<AtomicBool>,
}

impl CaptureTransport {
    pub fn new(frames: Vec<Vec<u8>>, interval: Duration) -> Self {
        Self {
            frames,
            interval,
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops a running replay when set
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.should_stop.clone()
    }

    /// Mark the link up; frames flow once `start_streaming` is called
    pub fn connect(self, sender: FrameSender) -> Result<ConnectedCapture, SendError<StreamEvent>> {
        sender.connected()?;
        log::info!("Capture replay: connected, {} frames queued", self.frames.len());
        Ok(ConnectedCapture {
            transport: self,
            sender,
        })
    }
}

/// Capture whose link is up but which is not streaming yet
pub struct ConnectedCapture {
    transport: CaptureTransport,
    sender: FrameSender,
}

impl ConnectedCapture {
    /// Replay on a dedicated thread; the thread returns the number of frames delivered
    pub fn start_streaming(self) -> std::io::Result<JoinHandle<usize>> {
        thread::Builder::new()
            .name("capture-replay".to_string())
            .spawn(move || self.replay())
    }

    fn replay(self) -> usize {
        let CaptureTransport {
            frames,
            interval,
            should_stop,
        } = self.transport;
        let mut delivered = 0;

        for frame in &frames {
            if should_stop.load(Ordering::Relaxed) {
                log::info!("Capture replay: stop requested after {} frames", delivered);
                break;
            }
            if self.sender.send_frame(frame).is_err() {
                log::warn!("Capture replay: stream closed after {} frames", delivered);
                return delivered;
            }
            delivered += 1;
            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }

        let _ = self.sender.disconnected();
        log::info!("Capture replay: finished, {} frames delivered", delivered);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SensorSample;
    use crate::stream::{self, LinkState, LinkStatus, StreamItem};
    use std::io::Write;

    fn capture_line(v: f32, t: u32) -> String {
        let sample = SensorSample {
            velocity: [v, 0.0, 0.0],
            acceleration: [0.0, 1.0, 0.0],
            timestamp: t,
        };
        hex::encode(sample.to_frame())
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let text = format!("# header\n\n{}\n  {}  \n", capture_line(0.1, 1), capture_line(0.2, 2));
        let frames = parse_capture(&text).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 28);
    }

    #[test]
    fn test_parse_reports_bad_line() {
        let text = format!("{}\nnot hex\n", capture_line(0.1, 1));
        match parse_capture(&text) {
            Err(CaptureError::InvalidLine { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected InvalidLine, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_capture() {
        assert!(matches!(parse_capture("# nothing\n"), Err(CaptureError::Empty)));
    }

    #[test]
    fn test_load_capture_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", capture_line(0.3, 9)).unwrap();
        assert_eq!(load_capture(file.path()).unwrap().len(), 1);
        assert!(matches!(
            load_capture(file.path().join("missing")),
            Err(CaptureError::ReadFailed(_))
        ));
    }

    #[test]
    fn test_replay_brackets_frames_with_link_events() {
        let link = LinkState::new();
        let (sender, mut stream) = stream::channel(16, link.clone());
        let frames = parse_capture(&format!("{}\n{}", capture_line(0.1, 1), capture_line(0.2, 2))).unwrap();

        let connected = CaptureTransport::new(frames, Duration::ZERO).connect(sender).unwrap();
        assert!(link.is_up());

        let handle = connected.start_streaming().unwrap();
        assert_eq!(handle.join().unwrap(), 2);
        assert!(!link.is_up());

        let mut items = Vec::new();
        while let Some(item) = stream.next_item() {
            items.push(item);
        }
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], StreamItem::Link(LinkStatus::Connected));
        assert!(matches!(items[2], StreamItem::Sample(s) if s.timestamp == 2));
        assert_eq!(items[3], StreamItem::Link(LinkStatus::Disconnected));
    }

    #[test]
    fn test_stop_flag_ends_replay() {
        let (sender, _stream) = stream::channel(16, LinkState::new());
        let frames = vec![vec![0u8; 28]; 5];
        let transport = CaptureTransport::new(frames, Duration::ZERO);
        transport.stop_flag().store(true, Ordering::Relaxed);

        let handle = transport.connect(sender).unwrap().start_streaming().unwrap();
        assert_eq!(handle.join().unwrap(), 0);
    }
}
