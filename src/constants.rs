//! Protocol constants for Infineon-style controller communication.
//!
//! This module defines the handshake bytes, timing parameters and serial
//! port configuration shared by the controller families.

/// Probe byte sent repeatedly until the controller reports ready
pub const READY_PROBE: u8 = b'8';

/// Byte the controller answers with when it is ready to receive a frame
pub const READY_REPLY: u8 = b'U';

/// Query byte asking the controller to send its current configuration
pub const DOWNLOAD_QUERY: u8 = b'U';

/// Acknowledgement sequence sent by EB3xx-style firmware after a frame
pub const ACK_SEQUENCE: &[u8] = b"QR";

/// Acknowledgement sent by EB2xx firmware after a frame
pub const LEGACY_ACK_SEQUENCE: &[u8] = b"U";

/// Device error code: received frame is too short
pub const NACK_SHORT_FRAME: u8 = 0xA1;

/// Device error code: received frame is corrupt
pub const NACK_CORRUPT_FRAME: u8 = 0xA2;

/// Idle reads allowed while waiting for the acknowledgement
pub const ACK_IDLE_READS: usize = 10;

/// Hard cap on bytes accumulated during a download
pub const DOWNLOAD_BYTE_CAP: usize = 1024;

/// Per-read timeout in milliseconds
pub const READ_TIMEOUT_MS: u64 = 200;

/// Baud rate used by EB3xx/KH6xx-style firmware
pub const BAUD_RATE: u32 = 38400;

/// Baud rate used by EB2xx firmware
pub const LEGACY_BAUD_RATE: u32 = 9600;

/// Name of the parameter selecting the controller model
pub const MODEL_PARAMETER: &str = "ControllerModel";

/// Extension of text profile files
pub const PROFILE_EXTENSION: &str = "asv";
