//! Speeduino serial and bootloader constants.
//!
//! Commands are fire-and-forget: nothing waits for an acknowledgment before
//! the next step.

use std::time::Duration;

/// Ask the ECU to print its firmware signature (`Speeduino YYYYMM.minor`).
pub const VERSION_REQUEST: &[u8] = b"S\r\n";

/// Ask the ECU to jump into its USB DFU bootloader.
pub const ENTER_BOOTLOADER: &[u8] = b"BOOT\n";

/// Pause between sending the version request and starting to read.
pub const VERSION_REQUEST_DELAY: Duration = Duration::from_millis(60);

/// Window after opening the port during which boot noise is discarded.
pub const CONNECT_FLUSH_WINDOW: Duration = Duration::from_millis(180);

/// Overall time allowed for a version reply.
pub const VERSION_REPLY_TIMEOUT: Duration = Duration::from_millis(3000);

/// Wait of a single read slice while polling for the version reply.
pub const READ_SLICE: Duration = Duration::from_millis(250);

/// Flash address the STM32 bootloader writes the application image to.
pub const DFU_START_ADDRESS: u32 = 0x0800_0000;

/// DFU alternate setting for internal flash.
pub const DFU_ALT_SETTING: u8 = 0;

/// Transfer size used when the bootloader does not report one.
pub const DEFAULT_TRANSFER_SIZE: u16 = 2048;

/// Time the ECU needs to re-enumerate as a DFU device after [`ENTER_BOOTLOADER`].
pub const DFU_ENUMERATION_WAIT: Duration = Duration::from_secs(2);
