//! # ecuflash
//!
//! A library for updating Speeduino ECU firmware.
//!
//! This crate provides the core functionality for:
//!
//! - Reading the firmware version an ECU reports over its serial port
//! - Selecting the newest firmware release and its matching tuning
//!   configuration from remote listings
//! - Rebooting the ECU into its STM32 DFU bootloader and flashing the image
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `github` (default): Firmware listings via the GitHub contents API
//!
//! ## Example
//!
//! ```rust,no_run
//! use ecuflash::{
//!     DfuUtil, FlashVariant, GithubConfig, GithubRepository, NativePort, SerialConfig,
//!     UpdateSession,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repository = GithubRepository::new(GithubConfig::default());
//!     let mut session = UpdateSession::new(repository, DfuUtil::new());
//!
//!     session.connect(NativePort::open(&SerialConfig::new("/dev/ttyACM0", 115_200))?)?;
//!     let version = session.read_version()?;
//!     println!("ECU firmware: {version}");
//!
//!     let check = session.check_updates(FlashVariant::Standard)?;
//!     if check.is_newer {
//!         session.enter_update_mode()?;
//!         std::thread::sleep(ecuflash::protocol::DFU_ENUMERATION_WAIT);
//!         session.flash(false, |_| true)?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod dfu;
pub mod error;
pub mod port;
pub mod protocol;
pub mod reader;
pub mod release;
pub mod remote;
pub mod session;
pub mod text;
pub mod version;

#[cfg(test)]
mod mock;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
#[cfg(feature = "github")]
pub use remote::github::{GithubConfig, GithubRepository};
pub use {
    dfu::{DfuUtil, Flasher},
    error::{Error, Result},
    port::{DeviceChannel, ReadOutcome, SerialConfig},
    reader::{VersionReader, VersionReply},
    release::{Collections, FlashVariant, Selection, select_release},
    remote::{RemoteEntry, RemoteFile, Repository},
    session::{SessionState, UpdateCheck, UpdateSession},
    text::sanitize_for_log,
    version::Version,
};
