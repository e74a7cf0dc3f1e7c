//! Error types for controller profile and transport operations.

use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Underlying numeric failure for a malformed profile line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueParseError {
    #[error(transparent)]
    Integer(#[from] ParseIntError),

    #[error(transparent)]
    Float(#[from] ParseFloatError),
}

/// Error types for controller profiles and serial transfers.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Serial port communication error
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parameter name not present in the family schema
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// Value rejected by the schema range (range is in raw units)
    #[error("Value {value} for {name} is out of range (raw {min}..={max})")]
    OutOfRange {
        /// Parameter name
        name: String,
        /// Rejected value
        value: f64,
        /// Lowest accepted raw value
        min: i64,
        /// Highest accepted raw value
        max: i64,
    },

    /// Malformed line in a text profile
    #[error("Parse error on line {line}: '{text}': {source}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// Offending text with the annotation stripped
        text: String,
        /// Numeric parse failure
        #[source]
        source: ValueParseError,
    },

    /// More non-empty lines than the family load order expects
    #[error("Extra data at the end of file on line {line}: '{text}'")]
    TrailingData {
        /// 1-based line number
        line: usize,
        /// First extra line
        text: String,
    },

    /// Received frame shorter than the family frame length
    #[error("Frame length mismatch: expected {expected} bytes, got {actual}")]
    FrameLength {
        /// Expected frame length
        expected: usize,
        /// Actual number of bytes received
        actual: usize,
    },

    /// XOR checksum over the frame is not zero (wrong family or broken data)
    #[error("Checksum mismatch (wrong family?)")]
    ChecksumMismatch,

    /// Model byte or name pattern not found in the coefficient table
    #[error("Unknown controller model {model_id:?} (pattern {pattern:?})")]
    UnknownModel {
        /// Model byte from the frame, if the family transmits one
        model_id: Option<u8>,
        /// Name pattern used to narrow the search
        pattern: Option<String>,
    },

    /// Malformed model name pattern
    #[error("Invalid model pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    /// Controller reported that the uploaded frame was short
    #[error("Controller says data is short (wrong family?)")]
    FrameTooShort,

    /// Controller reported that the uploaded frame was broken
    #[error("Controller says received data is broken")]
    FrameCorrupt,

    /// Unexpected byte during the acknowledgement phase
    #[error("Invalid reply byte {0:#04x}")]
    InvalidReplyByte(u8),

    /// Controller never completed the acknowledgement sequence
    #[error("Controller does not acknowledge data")]
    NotAcknowledged,

    /// Operation not supported by the controller family
    #[error("{family} does not support {operation}")]
    Unsupported {
        /// Family name
        family: String,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Profile has not been given a file name yet
    #[error("Profile has no file name")]
    MissingFileName,

    /// No registered family recognised the profile text
    #[error("Unrecognised profile format: {}", .0.display())]
    UnrecognizedFormat(PathBuf),

    /// Family tables violate a schema invariant
    #[error("Invalid schema for {family}: {reason}")]
    InvalidSchema {
        /// Family name
        family: String,
        /// Violated invariant
        reason: String,
    },
}
