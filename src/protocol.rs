use crate::codec;
use crate::constants::*;
use crate::error::{ControllerError, Result};
use crate::profile::Profile;
use crate::registry::{Capabilities, Family};
use log::{debug, info, trace, warn};
use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Byte-level access to a controller connection.
///
/// Reads time out after the link's read timeout and report `None`.
pub trait ByteLink {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;
    fn read_byte(&mut self) -> Result<Option<u8>>;
    fn discard_input(&mut self) -> Result<()>;
}

impl ByteLink for Box<dyn SerialPort> {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.write_all(data)?;
        self.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        self.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }
}

impl<L: ByteLink + ?Sized> ByteLink for &mut L {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_bytes(data)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        (**self).read_byte()
    }

    fn discard_input(&mut self) -> Result<()> {
        (**self).discard_input()
    }
}

/// Serial line parameters of a family. Always 8 data bits, no parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    pub stop_bits: StopBits,
    pub timeout: Duration,
}

impl LinkSettings {
    /// 38400 baud, two stop bits
    pub const STANDARD: Self = Self {
        baud_rate: BAUD_RATE,
        stop_bits: StopBits::Two,
        timeout: Duration::from_millis(READ_TIMEOUT_MS),
    };

    /// 9600 baud, one stop bit
    pub const LEGACY: Self = Self {
        baud_rate: LEGACY_BAUD_RATE,
        stop_bits: StopBits::One,
        timeout: Duration::from_millis(READ_TIMEOUT_MS),
    };

    pub fn open(&self, port_name: &str) -> Result<Box<dyn SerialPort>> {
        let port = serialport::new(port_name, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(self.stop_bits)
            .timeout(self.timeout)
            .open()?;
        Ok(port)
    }
}

/// Bytes exchanged during upload and download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub ready_probe: u8,
    pub ready_reply: u8,
    /// Sequence confirming a received frame
    pub ack: &'static [u8],
    pub short_frame: Option<u8>,
    pub corrupt_frame: Option<u8>,
    pub ack_idle_reads: usize,
    pub query: u8,
    pub download_cap: usize,
}

impl Handshake {
    /// EB3xx/KH6xx style firmware
    pub const STANDARD: Self = Self {
        ready_probe: READY_PROBE,
        ready_reply: READY_REPLY,
        ack: ACK_SEQUENCE,
        short_frame: Some(NACK_SHORT_FRAME),
        corrupt_frame: Some(NACK_CORRUPT_FRAME),
        ack_idle_reads: ACK_IDLE_READS,
        query: DOWNLOAD_QUERY,
        download_cap: DOWNLOAD_BYTE_CAP,
    };

    /// EB2xx firmware: single byte acknowledgement, no error codes
    pub const LEGACY: Self = Self {
        ack: LEGACY_ACK_SEQUENCE,
        short_frame: None,
        corrupt_frame: None,
        ..Self::STANDARD
    };
}

/// Treatment of unexpected bytes while waiting for the acknowledgement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckPolicy {
    /// Fail with [`ControllerError::InvalidReplyByte`]
    #[default]
    Strict,
    /// Skip the byte; it counts as an idle read
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingReady,
    AwaitingAck,
    AwaitingData,
}

/// Progress notification passed to the poll callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    Stage(Stage),
    /// No useful data on this read
    Waiting,
    /// Share of the expected frame received, 0.0 to 1.0
    Fraction(f64),
}

/// Result of a transfer the caller may cancel.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Outcome<T> {
    Done(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(value) => Some(value),
            Outcome::Cancelled => None,
        }
    }
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

/// Transfers profiles over a byte link.
///
/// Each transfer consumes the controller, so the port is closed however
/// the transfer ends. Poll callbacks return `false` to cancel.
pub struct Controller<L> {
    link: L,
    ack_policy: AckPolicy,
}

impl Controller<Box<dyn SerialPort>> {
    /// Open `port_name` with the line settings of `family`.
    pub fn open(port_name: &str, family: &Family) -> Result<Self> {
        info!(
            "Opening {} at {} baud for {}",
            port_name, family.link.baud_rate, family.name
        );
        Ok(Self::new(family.link.open(port_name)?))
    }

    /// List available serial ports
    pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
        Ok(serialport::available_ports()?)
    }
}

impl<L: ByteLink> Controller<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            ack_policy: AckPolicy::default(),
        }
    }

    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        self.ack_policy = policy;
        self
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.link.discard_input()?;
        trace!("TX: {}", hex(data));
        self.link.write_bytes(data)
    }

    /// Send a profile to the controller.
    ///
    /// Probes until the controller is ready, then writes the frame and waits
    /// for the acknowledgement sequence.
    pub fn upload<F>(mut self, profile: &Profile, mut poll: F) -> Result<Outcome<()>>
    where
        F: FnMut(Progress) -> bool,
    {
        let frame = codec::encode(profile)?;
        let handshake = profile.family().handshake;

        if !poll(Progress::Stage(Stage::AwaitingReady)) {
            return Ok(Outcome::Cancelled);
        }
        // Controllers print garbage while booting; after any byte other than
        // the ready reply the next probe is skipped.
        let mut skip_probe = false;
        loop {
            if !skip_probe {
                self.send(&[handshake.ready_probe])?;
            }
            skip_probe = false;

            match self.link.read_byte()? {
                Some(byte) if byte == handshake.ready_reply => break,
                Some(byte) => {
                    trace!("RX (ignored): {:02X}", byte);
                    skip_probe = true;
                }
                None => {}
            }
            if !poll(Progress::Waiting) {
                return Ok(Outcome::Cancelled);
            }
        }
        debug!("Controller ready");

        if !poll(Progress::Stage(Stage::AwaitingAck)) {
            return Ok(Outcome::Cancelled);
        }
        self.send(&frame)?;

        let mut matched = 0;
        let mut idle = 0;
        while idle < handshake.ack_idle_reads {
            match self.link.read_byte()? {
                Some(byte) if byte == handshake.ack[matched] => {
                    trace!("RX: {:02X}", byte);
                    matched += 1;
                    if matched == handshake.ack.len() {
                        info!("Upload of {} acknowledged", profile.model_name());
                        return Ok(Outcome::Done(()));
                    }
                }
                Some(byte) if Some(byte) == handshake.short_frame => return Err(ControllerError::FrameTooShort),
                Some(byte) if Some(byte) == handshake.corrupt_frame => return Err(ControllerError::FrameCorrupt),
                Some(byte) => match self.ack_policy {
                    AckPolicy::Strict => return Err(ControllerError::InvalidReplyByte(byte)),
                    AckPolicy::Lenient => {
                        warn!("Skipping stray reply byte {:02X}", byte);
                        idle += 1;
                    }
                },
                None => idle += 1,
            }
            if !poll(Progress::Waiting) {
                return Ok(Outcome::Cancelled);
            }
        }

        Err(ControllerError::NotAcknowledged)
    }

    /// Read the current configuration from the controller.
    ///
    /// The controller streams its frame when asked with the query byte; the
    /// transfer ends at the first silence after a full frame has arrived.
    /// Partial data followed by silence is discarded and queried again.
    pub fn download<F>(mut self, family: &'static Family, pattern: Option<&str>, mut poll: F) -> Result<Outcome<Profile>>
    where
        F: FnMut(Progress) -> bool,
    {
        if !family.supports(Capabilities::DOWNLOAD) {
            return Err(ControllerError::Unsupported {
                family: family.name.to_string(),
                operation: "download",
            });
        }
        let handshake = family.handshake;
        let frame_len = family.schema.frame_len();

        if !poll(Progress::Stage(Stage::AwaitingData)) {
            return Ok(Outcome::Cancelled);
        }

        let mut data = Vec::with_capacity(frame_len);
        let mut query = false;
        loop {
            if query && data.is_empty() {
                self.send(&[handshake.query])?;
                query = false;
            }

            match self.link.read_byte()? {
                None => {
                    if data.len() >= frame_len {
                        break;
                    }
                    if !data.is_empty() {
                        debug!("Discarding {} bytes of partial frame", data.len());
                    }
                    query = true;
                    data.clear();
                    if !poll(Progress::Waiting) {
                        return Ok(Outcome::Cancelled);
                    }
                }
                Some(byte) => {
                    data.push(byte);
                    let fraction = (data.len() as f64 / frame_len as f64).min(1.0);
                    if !poll(Progress::Fraction(fraction)) {
                        return Ok(Outcome::Cancelled);
                    }
                    if data.len() >= handshake.download_cap {
                        warn!("Download reached {} bytes without a pause", data.len());
                        break;
                    }
                }
            }
        }

        trace!("RX: {}", hex(&data));
        let profile = codec::decode(family, &data, pattern)?;
        info!("Downloaded {} profile for {}", family.name, profile.model_name());
        Ok(Outcome::Done(profile))
    }
}
