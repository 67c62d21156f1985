use std::{
    io::{Read, Write},
    time::Duration,
};

use serialport::SerialPort;
use thiserror::Error;

/// Fixed baud rate of the modem link.
pub const MODEM_BAUD: u32 = 115200;

#[derive(Error, Debug)]
/// Errors raised by a [`SerialTransport`] or [`ControlLines`] implementation
pub enum TransportError {
    #[error("Serial port is not open")]
    /// The port was used before [`SerialTransport::begin`] succeeded
    NotOpen,
    #[error("Failed to open serial port: {0}")]
    /// The underlying port could not be opened
    Open(#[from] serialport::Error),
    #[error("Serial I/O error: {0}")]
    /// A read or write on the open port failed
    Io(#[from] std::io::Error),
}

/// A byte channel to the modem.
///
/// The channel is treated as unreliable and latency-bearing: `available`
/// never blocks, and a missing reply is the caller's concern.
pub trait SerialTransport {
    /// Open the channel at the given baud rate
    fn begin(&mut self, baud: u32) -> Result<(), TransportError>;
    /// True if at least one byte can be read without blocking
    fn available(&mut self) -> bool;
    /// Read one buffered byte, if any
    fn read_byte(&mut self) -> Option<u8>;
    /// Write `text` followed by a line terminator
    fn write_line(&mut self, text: &str) -> Result<(), TransportError>;
}

/// The modem's power control lines.
pub trait ControlLines {
    /// Drive the power key line
    fn set_power_key(&mut self, high: bool);
    /// Drive the reset line
    fn set_reset(&mut self, high: bool);
    /// Drive the low-power line
    fn set_low_power(&mut self, high: bool);
}

/// A modem attached through a host serial adapter.
///
/// The power key is wired to DTR and the reset line to RTS; the low-power
/// line has no counterpart on a plain adapter and is ignored.
pub struct SerialModem {
    path: String,
    port: Option<Box<dyn SerialPort>>,
    rx: Vec<u8>,
    read: usize,
}

impl SerialModem {
    /// Create a modem handle for the serial device at `path`; the port is opened by `begin`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            port: None,
            rx: Vec::with_capacity(256),
            read: 0,
        }
    }

    /// Serial device path
    pub fn path(&self) -> &str {
        &self.path
    }

    fn fill(&mut self) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        let pending = port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(());
        }
        let mut tmp = [0u8; 256];
        let want = pending.min(tmp.len());
        let n = port.read(&mut tmp[..want])?;
        if self.read == self.rx.len() {
            self.rx.clear();
            self.read = 0;
        }
        self.rx.extend_from_slice(&tmp[..n]);
        Ok(())
    }
}

impl SerialTransport for SerialModem {
    fn begin(&mut self, baud: u32) -> Result<(), TransportError> {
        let port = serialport::new(&self.path, baud)
            .timeout(Duration::from_millis(10))
            .open()?;
        log::info!("Opened {} at {} baud", self.path, baud);
        self.port = Some(port);
        self.rx.clear();
        self.read = 0;
        Ok(())
    }

    fn available(&mut self) -> bool {
        if self.read < self.rx.len() {
            return true;
        }
        if let Err(e) = self.fill() {
            log::trace!("Serial poll on {} failed: {e}", self.path);
        }
        self.read < self.rx.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        if !self.available() {
            return None;
        }
        let b = self.rx[self.read];
        self.read += 1;
        Some(b)
    }

    fn write_line(&mut self, text: &str) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.write_all(text.as_bytes())?;
        port.write_all(b"\r\n")?;
        port.flush()?;
        Ok(())
    }
}

impl ControlLines for SerialModem {
    fn set_power_key(&mut self, high: bool) {
        if let Some(port) = self.port.as_mut() {
            if let Err(e) = port.write_data_terminal_ready(high) {
                log::warn!("Failed to drive power key on {}: {e}", self.path);
            }
        }
    }

    fn set_reset(&mut self, high: bool) {
        if let Some(port) = self.port.as_mut() {
            if let Err(e) = port.write_request_to_send(high) {
                log::warn!("Failed to drive reset line on {}: {e}", self.path);
            }
        }
    }

    fn set_low_power(&mut self, high: bool) {
        log::trace!("Low-power line not wired on {}, ignoring {high}", self.path);
    }
}
