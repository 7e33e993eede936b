//! Flashing through the STM32 USB DFU bootloader.
//!
//! The transfer itself is delegated to `dfu-util`; this module only prepares
//! the image file and the command line and interprets the exit status.

use {
    crate::{
        error::{Error, Result},
        protocol::DFU_ALT_SETTING,
    },
    log::{debug, info},
    std::{
        io::{ErrorKind, Write},
        path::PathBuf,
        process::Command,
    },
};

/// Writes a firmware image to device memory.
pub trait Flasher {
    /// Write `image` starting at `address`, in transfers of `transfer_size` bytes.
    ///
    /// Blocks until the transfer completes or fails.
    fn flash(&mut self, image: &[u8], address: u32, transfer_size: u16) -> Result<()>;
}

impl<F: Flasher + ?Sized> Flasher for Box<F> {
    fn flash(&mut self, image: &[u8], address: u32, transfer_size: u16) -> Result<()> {
        (**self).flash(image, address, transfer_size)
    }
}

/// [`Flasher`] that runs the external `dfu-util` program.
#[derive(Debug, Clone)]
pub struct DfuUtil {
    program: PathBuf,
    alt: u8,
    device: Option<String>,
    leave: bool,
}

impl Default for DfuUtil {
    fn default() -> Self {
        Self {
            program: PathBuf::from("dfu-util"),
            alt: DFU_ALT_SETTING,
            device: None,
            leave: true,
        }
    }
}

impl DfuUtil {
    /// Use `dfu-util` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `dfu-util` binary.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Select the DFU alternate setting.
    #[must_use]
    pub fn with_alt(mut self, alt: u8) -> Self {
        self.alt = alt;
        self
    }

    /// Restrict to a device given as `vid:pid` (hex).
    #[must_use]
    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }

    /// Build the `dfu-util` argument list for an image stored at `image_path`.
    pub fn args(&self, image_path: &str, address: u32, transfer_size: u16) -> Vec<String> {
        let mut target = format!("0x{address:08x}");
        if self.leave {
            target.push_str(":leave");
        }

        let mut args = vec![
            "-a".to_string(),
            self.alt.to_string(),
            "-s".to_string(),
            target,
            "-t".to_string(),
            transfer_size.to_string(),
        ];
        if let Some(device) = &self.device {
            args.push("-d".to_string());
            args.push(device.clone());
        }
        args.push("-D".to_string());
        args.push(image_path.to_string());
        args
    }
}

impl Flasher for DfuUtil {
    fn flash(&mut self, image: &[u8], address: u32, transfer_size: u16) -> Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("ecuflash-")
            .suffix(".bin")
            .tempfile()?;
        file.write_all(image)?;
        file.flush()?;

        let image_path = file
            .path()
            .to_string_lossy()
            .into_owned();
        let args = self.args(&image_path, address, transfer_size);
        info!(
            "Flashing {} bytes via DFU (alt {}, start 0x{address:08x})",
            image.len(),
            self.alt
        );
        debug!("{} {}", self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    Error::ChannelUnavailable(format!(
                        "{} not found; install dfu-util to flash over USB",
                        self.program.display()
                    ))
                } else {
                    Error::Io(e)
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("dfu-util output:\n{stdout}{stderr}");

        if !output.status.success() {
            return Err(Error::FlashFailed(
                format!("{stderr}\n{stdout}")
                    .trim()
                    .to_string(),
            ));
        }

        Ok(())
    }
}
