//! Error types for ecuflash.

use std::io;
use thiserror::Error;

/// Result type for ecuflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ecuflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Version text or listing could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// No firmware image of the requested variant exists in the listing.
    #[error("No firmware .bin files found (check repository filenames)")]
    NoFirmwareFound,

    /// Remote fetch answered with a non-success status.
    #[error("Download failed: HTTP {status}")]
    FetchFailed {
        /// HTTP status code.
        status: u16,
    },

    /// Transport-level HTTP failure (DNS, TLS, connection reset).
    #[error("HTTP error: {0}")]
    Http(String),

    /// A required capability (serial device, DFU tool) is not available.
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The user declined a confirmation prompt.
    #[error("Cancelled by user")]
    UserCancelled,

    /// Refused to flash an image that is not newer than the device firmware.
    #[error("No newer firmware detected (device {device}, available {available}); use force to reflash")]
    NotNewer {
        /// Version running on the device.
        device: String,
        /// Newest version found remotely.
        available: String,
    },

    /// Action attempted before its prerequisite step completed.
    #[error("{0}")]
    InvalidState(&'static str),

    /// The flashing collaborator reported a failure.
    #[error("Flash failed: {0}")]
    FlashFailed(String),

    /// Operation stopped by the embedding application.
    #[error("Interrupted")]
    Interrupted,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
