//! Inficon VGC50x serial-over-Ethernet protocol.
//!
//! This module implements the low-level request/response framing used by the
//! Inficon VGC501/502/503 vacuum gauge controllers on their Ethernet port.
//!
//! # Protocol Overview
//!
//! Commands are ASCII mnemonics of three characters (e.g. `PR1`, `UNI`, `AYT`),
//! optionally followed by comma-separated parameters, and terminated by CR LF.
//! Every exchange is a two-step handshake:
//!
//! ```text
//! host:   PR1\r\n
//! device: <ACK>\r\n          (0x06, or <NAK> 0x15 if the command was rejected)
//! host:   <ENQ>              (0x05, sent bare)
//! device: 0,+1.0000E-03\r\n  (the data payload)
//! ```
//!
//! The protocol is strictly half-duplex. Only one exchange is ever in flight,
//! and stale input from a previous timed-out exchange is drained before each
//! new command is written.
//!
//! # Transport
//!
//! The controller listens on TCP port 8000 by default. All operations are
//! blocking and bounded by the configured timeout.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use gauge_hardware::inficon::Connection;
//!
//! let mut link = Connection::connect("192.168.1.60", 8000, Duration::from_secs(1))?;
//!
//! let ident = link.query("AYT", &[])?;
//! println!("Device: {ident}");
//!
//! let payload = link.query("PR1", &[])?;
//! println!("Gauge 1: {payload}");
//! # Ok::<(), gauge_hardware::inficon::VgcError>(())
//! ```

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace, warn};

use super::response::GaugeStatus;

/// Default TCP port of the VGC50x Ethernet interface.
pub const DEFAULT_PORT: u16 = 8000;

/// Default timeout for a single blocking read or write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Frame terminator for commands and responses.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Positive acknowledgement.
pub const ACK: u8 = 0x06;

/// Negative acknowledgement (command rejected).
pub const NAK: u8 = 0x15;

/// Enquiry: asks the device to transmit the buffered payload.
pub const ENQ: u8 = 0x05;

/// Upper bound on a single response line.
const MAX_RESPONSE_LEN: usize = 256;

/// Errors that can occur while talking to a VGC50x controller.
#[derive(Error, Debug)]
pub enum VgcError {
    /// The TCP connection could not be opened or was refused.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// No complete response was received within the timeout.
    #[error("Timeout waiting for response")]
    Timeout,

    /// The socket failed or closed in the middle of an exchange.
    #[error("Communication error: {0}")]
    Communication(#[from] std::io::Error),

    /// The payload did not match the expected layout.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The operation needs an initialized connection.
    #[error("Controller is not connected")]
    NotConnected,

    /// An argument was rejected before anything was sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The controller answered the command with NAK.
    #[error("Command {0:?} rejected by controller (NAK)")]
    Nak(String),

    /// The controller answered with something other than ACK or NAK.
    #[error("Unexpected acknowledgement: {0:?}")]
    UnexpectedAcknowledge(String),

    /// The gauge reported a status without a usable measurement.
    #[error("Gauge {gauge} reports {status}")]
    SensorStatus {
        /// 1-based gauge index
        gauge: u8,
        /// Status reported alongside the reading
        status: GaugeStatus,
    },

    /// A configuration file could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl VgcError {
    /// Whether this error leaves the socket unusable.
    ///
    /// Only transport failures are fatal. Timeouts and protocol-level
    /// rejections are recovered by draining stale input before the next command.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VgcError::Communication(_) | VgcError::Connection(_))
    }
}

/// Result type for VGC operations.
pub type VgcResult<T> = Result<T, VgcError>;

/// A single TCP connection to a VGC50x controller.
///
/// Owns the socket exclusively. Provides:
///
/// - Connection setup via [`connect`](Self::connect)
/// - Raw frame writing via [`send_command`](Self::send_command) and
///   [`send_enquiry`](Self::send_enquiry)
/// - Terminator-delimited reads via [`read_response`](Self::read_response)
/// - Resynchronisation via [`clear_buffer`](Self::clear_buffer)
/// - The full ACK/ENQ handshake via [`query`](Self::query)
///
/// For typed accessors use [`Vgc502`](super::Vgc502) instead.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    timeout: Duration,
}

impl Connection {
    /// Open a TCP connection to the controller.
    ///
    /// Every resolved address is tried in turn, each bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`VgcError::Connection`] if the host does not resolve, the
    /// peer refuses, or no address answers within the timeout.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> VgcResult<Self> {
        if timeout.is_zero() {
            return Err(VgcError::InvalidArgument(
                "timeout must be non-zero".to_string(),
            ));
        }

        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| VgcError::Connection(format!("Cannot resolve {host}:{port}: {e}")))?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Self::from_stream(stream, timeout),
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(VgcError::Connection(match last_err {
            Some(e) => format!("Could not connect to {host}:{port}: {e}"),
            None => format!("No addresses found for {host}:{port}"),
        }))
    }

    fn from_stream(stream: TcpStream, timeout: Duration) -> VgcResult<Self> {
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;

        debug!("Connected to VGC controller at {}", peer);

        Ok(Self {
            stream,
            peer,
            timeout,
        })
    }

    /// Address of the connected controller.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Timeout applied to each read and write.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the wire frame for a command: `MNEMONIC[,arg...]\r\n`.
    pub fn encode_command(code: &str, args: &[&str]) -> Vec<u8> {
        let mut frame = code.as_bytes().to_vec();
        for arg in args {
            frame.push(b',');
            frame.extend_from_slice(arg.as_bytes());
        }
        frame.extend_from_slice(TERMINATOR);
        frame
    }

    /// Write a command frame. Returns the bytes that were sent.
    ///
    /// Does not wait for the acknowledgement; see [`query`](Self::query).
    pub fn send_command(&mut self, code: &str, args: &[&str]) -> VgcResult<Vec<u8>> {
        let frame = Self::encode_command(code, args);
        debug!("VGC send: {:?}", String::from_utf8_lossy(&frame).trim_end());
        self.write_all(&frame)?;
        Ok(frame)
    }

    /// Write the bare ENQ byte requesting the data payload.
    pub fn send_enquiry(&mut self) -> VgcResult<()> {
        trace!("VGC send: ENQ");
        self.write_all(&[ENQ])
    }

    fn write_all(&mut self, bytes: &[u8]) -> VgcResult<()> {
        match self.stream.write_all(bytes).and_then(|()| self.stream.flush()) {
            Ok(()) => Ok(()),
            Err(e) if is_timeout(&e) => Err(VgcError::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    /// Read one response line, up to and including the CR LF terminator.
    ///
    /// The whole read is bounded by a single deadline of one timeout period,
    /// so a peer trickling bytes without ever terminating still times out.
    /// Bytes are consumed one at a time so nothing past the terminator is
    /// taken off the socket.
    ///
    /// # Errors
    ///
    /// - [`VgcError::Timeout`] if no terminator arrives before the deadline
    /// - [`VgcError::Communication`] if the peer closes the socket mid-read
    pub fn read_response(&mut self) -> VgcResult<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; 1];
        let mut bytes = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Timeout after {} bytes: {:?}", bytes.len(), bytes);
                return Err(VgcError::Timeout);
            }
            self.stream.set_read_timeout(Some(remaining))?;

            match self.stream.read(&mut buf) {
                Ok(0) => {
                    return Err(VgcError::Communication(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "connection closed by controller",
                    )));
                }
                Ok(_) => {
                    bytes.push(buf[0]);
                    if bytes.ends_with(TERMINATOR) {
                        break;
                    }
                    if bytes.len() > MAX_RESPONSE_LEN {
                        return Err(VgcError::Parse(format!(
                            "Response exceeds {MAX_RESPONSE_LEN} bytes without terminator"
                        )));
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => return Err(VgcError::Timeout),
                Err(e) => return Err(e.into()),
            }
        }

        trace!("VGC recv: {:?}", bytes);
        Ok(bytes)
    }

    /// Discard any bytes already waiting on the socket.
    ///
    /// Called before every command so that a late reply to an earlier,
    /// timed-out exchange cannot be mistaken for the next response.
    /// Returns the number of bytes discarded.
    pub fn clear_buffer(&mut self) -> VgcResult<usize> {
        self.stream.set_nonblocking(true)?;
        let drained = self.drain_nonblocking();
        self.stream.set_nonblocking(false)?;

        let drained = drained?;
        if drained > 0 {
            debug!("Discarded {} stale bytes before next command", drained);
        }
        Ok(drained)
    }

    fn drain_nonblocking(&mut self) -> VgcResult<usize> {
        let mut buf = [0u8; 64];
        let mut total = 0;
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    return Err(VgcError::Communication(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "connection closed by controller",
                    )));
                }
                Ok(n) => {
                    trace!("VGC discard: {:?}", &buf[..n]);
                    total += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(total),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Run one complete exchange and return the stripped payload.
    ///
    /// Clears stale input, writes the command, waits for ACK, sends ENQ and
    /// reads the payload line. Any step that times out aborts the exchange.
    ///
    /// # Errors
    ///
    /// Returns [`VgcError::Nak`] if the controller rejects the command and
    /// [`VgcError::UnexpectedAcknowledge`] for any other acknowledgement.
    pub fn query(&mut self, code: &str, args: &[&str]) -> VgcResult<String> {
        self.clear_buffer()?;
        self.send_command(code, args)?;

        let ack = self.read_response()?;
        match strip_frame(&ack) {
            [ACK] => trace!("ACK received, sending ENQ"),
            [NAK] => {
                let sent = String::from_utf8_lossy(&Self::encode_command(code, args))
                    .trim_end()
                    .to_string();
                return Err(VgcError::Nak(sent));
            }
            other => {
                return Err(VgcError::UnexpectedAcknowledge(
                    String::from_utf8_lossy(other).into_owned(),
                ));
            }
        }

        self.send_enquiry()?;
        let payload = self.read_response()?;
        let text = std::str::from_utf8(strip_frame(&payload))
            .map_err(|_| VgcError::Parse(format!("Non-ASCII payload: {payload:?}")))?;
        debug!("VGC payload: {:?}", text);
        Ok(text.to_string())
    }
}

/// Strip the terminator and surrounding ASCII whitespace from a frame.
fn strip_frame(frame: &[u8]) -> &[u8] {
    let frame = frame.strip_suffix(TERMINATOR).unwrap_or(frame);
    frame.trim_ascii()
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}
