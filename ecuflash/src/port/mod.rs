//! Device channel abstraction.
//!
//! The ECU talks over a serial link whose read primitive may block with no
//! data for as long as the device stays quiet. The [`DeviceChannel`] trait
//! exposes that link as a *cancellable* read: every read waits for at most a
//! given slice of time, and a slice that times out abandons the pending read.
//! The caller must then call [`DeviceChannel::reacquire_reader`] before the
//! next read, otherwise the channel refuses to read again.
//!
//! ```text
//! read_chunk(wait) ──► Data(bytes) ──► read_chunk(wait) ...
//!        │
//!        └──────────► TimedOut ──► reacquire_reader() ──► read_chunk(wait) ...
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use ecuflash::port::{DeviceChannel, ReadOutcome};
//!
//! fn poll<C: DeviceChannel>(channel: &mut C) -> ecuflash::Result<Vec<u8>> {
//!     channel.write_command(b"S\r\n")?;
//!     match channel.read_chunk(Duration::from_millis(250))? {
//!         ReadOutcome::Data(bytes) => Ok(bytes),
//!         ReadOutcome::TimedOut => {
//!             channel.reacquire_reader()?;
//!             Ok(Vec::new())
//!         },
//!         ReadOutcome::EndOfStream => Ok(Vec::new()),
//!     }
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

use {
    crate::error::Result,
    log::trace,
    std::time::{Duration, Instant},
};

/// Default baud rate of the ECU's USB serial interface.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout used when opening the port.
    pub timeout: Duration,
    /// Data bits (typically 8).
    pub data_bits: DataBits,
    /// Parity (typically None).
    pub parity: Parity,
    /// Stop bits (typically One).
    pub stop_bits: StopBits,
    /// Flow control (typically None).
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(250),
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// Hardware flow control (RTS/CTS).
    Hardware,
}

/// Result of one bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes received within the wait.
    Data(Vec<u8>),
    /// Nothing arrived; the pending read was abandoned.
    TimedOut,
    /// The channel was closed by the other side.
    EndOfStream,
}

/// A bidirectional byte channel to the ECU with a cancellable read.
pub trait DeviceChannel: Send {
    /// Port name/path for display.
    fn name(&self) -> &str;

    /// Send a command without waiting for an acknowledgment.
    fn write_command(&mut self, bytes: &[u8]) -> Result<()>;

    /// Wait at most `wait` for the next chunk of bytes.
    ///
    /// On [`ReadOutcome::TimedOut`] the read side is released; call
    /// [`DeviceChannel::reacquire_reader`] before reading again.
    fn read_chunk(&mut self, wait: Duration) -> Result<ReadOutcome>;

    /// Take a fresh read handle after an abandoned read.
    fn reacquire_reader(&mut self) -> Result<()>;

    /// Close the channel and release the device.
    fn close(&mut self) -> Result<()>;

    /// Read and throw away input for `window`, e.g. boot noise after opening.
    ///
    /// Returns the number of bytes discarded.
    fn discard_input(&mut self, window: Duration) -> Result<usize> {
        let start = Instant::now();
        let mut discarded = 0;

        while let Some(remaining) = window.checked_sub(start.elapsed()) {
            if remaining.is_zero() {
                break;
            }
            match self.read_chunk(remaining)? {
                ReadOutcome::Data(bytes) => discarded += bytes.len(),
                ReadOutcome::TimedOut => {
                    self.reacquire_reader()?;
                    break;
                },
                ReadOutcome::EndOfStream => break,
            }
        }

        trace!("Discarded {discarded} bytes from {}", self.name());
        Ok(discarded)
    }
}

impl<C: DeviceChannel + ?Sized> DeviceChannel for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write_command(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_command(bytes)
    }

    fn read_chunk(&mut self, wait: Duration) -> Result<ReadOutcome> {
        (**self).read_chunk(wait)
    }

    fn reacquire_reader(&mut self) -> Result<()> {
        (**self).reacquire_reader()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn discard_input(&mut self, window: Duration) -> Result<usize> {
        (**self).discard_input(window)
    }
}

#[cfg(feature = "native")]
pub use native::NativePort;
