//! # Error Types Module
//!
//! Centralized error handling for repstream.
//! Provides custom error types for each concern with proper context and error chaining.
//!
//! ## Error Types
//! - `DecodeError`: Unrecognized notification frames (dropped, never shown to the user)
//! - `GatewayError`: Failures reported by the persistence backend
//! - `SessionError`: Rejected or failed workout/set transitions
//! - `ConfigError`: Configuration file I/O and parsing errors
//! - `CaptureError`: Capture file loading errors
//!
//! ## Usage Examples
//! ```rust
//! // Frame decoder uses DecodeError
//! pub fn decode(bytes: &[u8], previous: Option<&SensorSample>) -> Result<SensorSample, DecodeError> { ... }
//!
//! // Session transitions use SessionError
//! pub async fn start_set(&mut self, exercise_type: &str, weight: f32) -> Result<SetId, SessionError> { ... }
//! ```

use std::fmt;

/// Errors produced while decoding a raw notification frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame length matches none of the known layouts
    UnrecognizedLength(usize),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnrecognizedLength(len) => {
                write!(f, "Unrecognized frame length: {} bytes", len)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors reported by a persistence gateway.
///
/// The pipeline treats every variant the same way; the distinction only
/// matters for log output.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// No authenticated user for the backend; only remote backends raise it
    #[allow(dead_code)]
    NotAuthenticated,
    /// Backend storage failed
    Io(String),
    /// Referenced workout or set does not exist
    NotFound(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::NotAuthenticated => write!(f, "User not authenticated"),
            GatewayError::Io(msg) => write!(f, "Storage error: {}", msg),
            GatewayError::NotFound(what) => write!(f, "Not found: {}", what),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Io(err.to_string())
    }
}

/// Errors surfaced to the caller of a session operation
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Operation is not allowed from the current state; nothing changed
    GuardViolation {
        operation: &'static str,
        state: &'static str,
    },
    /// The sensor link is down
    NotConnected,
    /// The persistence gateway failed during a transition
    Persistence {
        operation: &'static str,
        source: GatewayError,
    },
    /// The pipeline thread is gone
    PipelineClosed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::GuardViolation { operation, state } => {
                write!(f, "Cannot {} while {}", operation, state)
            }
            SessionError::NotConnected => {
                write!(f, "Sensor not connected")
            }
            SessionError::Persistence { operation, source } => {
                write!(f, "Failed to {}: {}", operation, source)
            }
            SessionError::PipelineClosed => {
                write!(f, "Session pipeline has shut down")
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Persistence { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
        }
    }
}

/// Errors that can occur while loading a frame capture
#[derive(Debug)]
pub enum CaptureError {
    /// Failed to read the capture file
    ReadFailed(std::io::Error),
    /// A line is not valid hex
    InvalidLine { line: usize, source: hex::FromHexError },
    /// The capture contains no frames
    Empty,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::ReadFailed(e) => {
                write!(f, "Failed to read capture file: {}", e)
            }
            CaptureError::InvalidLine { line, source } => {
                write!(f, "Invalid hex frame on line {}: {}", line, source)
            }
            CaptureError::Empty => {
                write!(f, "Capture contains no frames")
            }
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::ReadFailed(e) => Some(e),
            CaptureError::InvalidLine { source, .. } => Some(source),
            CaptureError::Empty => None,
        }
    }
}
