//! Serial port resolution.
//!
//! The ECU's port is never guessed: it comes from `--port`, `ECUFLASH_PORT`,
//! or the `[serial]` section of a config file. A missing port is a usage
//! error so scripts can tell it apart from a device failure.

use {
    crate::{CliError, config::Config},
    anyhow::{Context, Result},
    ecuflash::{NativePort, SerialConfig, port::DEFAULT_BAUD},
    log::debug,
};

/// Port and baud rate to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortChoice {
    /// Port name/path.
    pub name: String,
    /// Baud rate.
    pub baud: u32,
}

/// Pick the port and baud rate from CLI/env values, falling back to config.
pub fn resolve_port(port: Option<&str>, baud: Option<u32>, config: &Config) -> Result<PortChoice> {
    let name = match port {
        Some(name) => name.to_string(),
        None => {
            let Some(name) = config.serial.port.clone() else {
                return Err(CliError::Usage(
                    "no serial port given; use --port, ECUFLASH_PORT or [serial] port in ecuflash.toml"
                        .to_string(),
                )
                .into());
            };
            debug!("Using port from config: {name}");
            name
        },
    };

    let baud = baud
        .or(config.serial.baud)
        .unwrap_or(DEFAULT_BAUD);

    Ok(PortChoice { name, baud })
}

/// Open the chosen port.
pub fn open_port(choice: &PortChoice) -> Result<NativePort> {
    NativePort::open(&SerialConfig::new(&choice.name, choice.baud))
        .with_context(|| format!("Failed to open {}", choice.name))
}
