//! Native serial channel implementation using the `serialport` crate.
//!
//! The port keeps the handle it was opened with for writing and a cloned
//! handle for reading. A read slice that times out drops the cloned handle;
//! [`DeviceChannel::reacquire_reader`] clones a new one from the owning port.

use {
    crate::{
        error::{Error, Result},
        port::{DataBits, DeviceChannel, FlowControl, Parity, ReadOutcome, SerialConfig, StopBits},
    },
    log::{debug, trace},
    std::{
        io::{ErrorKind, Read, Write},
        time::Duration,
    },
};

/// Size of the buffer used for a single read slice.
const READ_CHUNK_SIZE: usize = 256;

/// Native serial channel.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    reader: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    baud_rate: u32,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .flow_control(config.flow_control.into())
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => Error::ChannelUnavailable(format!(
                    "{}: {}",
                    config.port_name, e.description
                )),
                _ => Error::Serial(e),
            })?;
        let reader = port.try_clone()?;

        debug!(
            "Opened {} at {} baud",
            config.port_name, config.baud_rate
        );

        Ok(Self {
            port: Some(port),
            reader: Some(reader),
            name: config.port_name.clone(),
            baud_rate: config.baud_rate,
        })
    }

    /// Open a serial port with default settings.
    pub fn open_simple(port_name: &str, baud_rate: u32) -> Result<Self> {
        Self::open(&SerialConfig::new(port_name, baud_rate))
    }

    /// Baud rate the port was opened with.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn closed_error() -> Error {
        Error::ChannelUnavailable("serial port is closed".to_string())
    }
}

impl DeviceChannel for NativePort {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_command(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(Self::closed_error)?;
        trace!("TX {bytes:02X?}");
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_chunk(&mut self, wait: Duration) -> Result<ReadOutcome> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::ChannelUnavailable("read handle was released".to_string()))?;
        reader.set_timeout(wait)?;

        let mut buf = [0u8; READ_CHUNK_SIZE];
        match reader.read(&mut buf) {
            Ok(0) => Ok(ReadOutcome::EndOfStream),
            Ok(n) => {
                trace!("RX {n} bytes");
                Ok(ReadOutcome::Data(buf[..n].to_vec()))
            },
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                // Abandon the pending read.
                self.reader = None;
                Ok(ReadOutcome::TimedOut)
            },
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof
                ) =>
            {
                debug!("{} closed: {e}", self.name);
                Ok(ReadOutcome::EndOfStream)
            },
            Err(e) => Err(e.into()),
        }
    }

    fn reacquire_reader(&mut self) -> Result<()> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(Self::closed_error)?;
        self.reader = Some(port.try_clone()?);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping both handles closes the device.
        self.reader.take();
        self.port.take();
        debug!("Closed {}", self.name);
        Ok(())
    }
}

// Type conversions from our types to serialport types

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => Self::None,
            FlowControl::Hardware => Self::Hardware,
        }
    }
}
