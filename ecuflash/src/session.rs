//! Update orchestration.
//!
//! [`UpdateSession`] walks the ECU through the update steps in a fixed order:
//!
//! ```text
//! Disconnected ─connect─► Connected ─read_version─► VersionKnown ─check_updates─► Checked
//!                                                                                   │
//!                                              Flashed ◄─flash── Flashing ◄─flash───┤
//!                                                                                   │
//!                                                             Downloaded ◄─save_downloads
//! ```
//!
//! Every action checks its precondition and fails with
//! [`Error::InvalidState`] instead of skipping a step. Connecting again
//! resets the whole session.

use {
    crate::{
        dfu::Flasher,
        error::{Error, Result},
        port::DeviceChannel,
        protocol::{
            CONNECT_FLUSH_WINDOW, DEFAULT_TRANSFER_SIZE, DFU_START_ADDRESS, ENTER_BOOTLOADER,
            VERSION_REQUEST, VERSION_REQUEST_DELAY,
        },
        reader::VersionReader,
        release::{Collections, FlashVariant, Selection, select_release},
        remote::{Repository, files_with_extension},
        text::sanitize_for_log,
        version::Version,
    },
    log::{debug, info, warn},
    std::{
        fmt, fs,
        path::{Path, PathBuf},
        thread,
    },
};

/// Progress of an [`UpdateSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No serial channel.
    Disconnected,
    /// Channel open, device version unknown.
    Connected,
    /// Device version read.
    VersionKnown,
    /// Release selected and downloaded into memory.
    Checked,
    /// Downloaded files written to disk.
    Downloaded,
    /// Firmware transfer in progress.
    Flashing,
    /// Firmware written.
    Flashed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::VersionKnown => "version known",
            Self::Checked => "checked",
            Self::Downloaded => "downloaded",
            Self::Flashing => "flashing",
            Self::Flashed => "flashed",
        };
        f.write_str(name)
    }
}

/// Result of a successful update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    /// Selected firmware and configuration files.
    pub selection: Selection,
    /// Whether the firmware is newer than the device's.
    pub is_newer: bool,
    /// Size of the downloaded firmware image.
    pub firmware_len: usize,
    /// Size of the downloaded configuration file, if one was selected.
    pub config_len: Option<usize>,
}

struct Downloads {
    check: UpdateCheck,
    firmware: Vec<u8>,
    config: Option<Vec<u8>>,
}

/// State of one ECU update, from connection to flashing.
pub struct UpdateSession<R: Repository, F: Flasher> {
    repository: R,
    flasher: F,
    collections: Collections,
    reader: VersionReader,
    transfer_size: u16,
    channel: Option<Box<dyn DeviceChannel>>,
    state: SessionState,
    device_version: Option<Version>,
    downloads: Option<Downloads>,
}

impl<R: Repository, F: Flasher> UpdateSession<R, F> {
    /// Create a disconnected session.
    pub fn new(repository: R, flasher: F) -> Self {
        Self {
            repository,
            flasher,
            collections: Collections::default(),
            reader: VersionReader::default(),
            transfer_size: DEFAULT_TRANSFER_SIZE,
            channel: None,
            state: SessionState::Disconnected,
            device_version: None,
            downloads: None,
        }
    }

    /// Use other remote collections.
    #[must_use]
    pub fn with_collections(mut self, collections: Collections) -> Self {
        self.collections = collections;
        self
    }

    /// Use a custom version reader (timeouts).
    #[must_use]
    pub fn with_reader(mut self, reader: VersionReader) -> Self {
        self.reader = reader;
        self
    }

    /// Set the DFU transfer size.
    #[must_use]
    pub fn with_transfer_size(mut self, transfer_size: u16) -> Self {
        self.transfer_size = transfer_size;
        self
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Version read from the device, if any.
    pub fn device_version(&self) -> Option<&Version> {
        self.device_version.as_ref()
    }

    /// Result of the last successful check, if still valid.
    pub fn update_check(&self) -> Option<&UpdateCheck> {
        self.downloads
            .as_ref()
            .map(|d| &d.check)
    }

    /// Whether a serial channel is open.
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// The remote repository.
    pub fn repository_mut(&mut self) -> &mut R {
        &mut self.repository
    }

    /// The flashing collaborator.
    pub fn flasher(&self) -> &F {
        &self.flasher
    }

    /// Open a new session on `channel`, discarding everything from before.
    pub fn connect<C: DeviceChannel + 'static>(&mut self, channel: C) -> Result<()> {
        self.disconnect();

        let mut channel: Box<dyn DeviceChannel> = Box::new(channel);
        let discarded = channel.discard_input(CONNECT_FLUSH_WINDOW)?;
        if discarded > 0 {
            debug!("Discarded {discarded} bytes of boot noise");
        }

        info!("Connected to {}", channel.name());
        self.channel = Some(channel);
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Close the channel (if any) and forget all session data.
    pub fn disconnect(&mut self) {
        self.close_channel();
        self.state = SessionState::Disconnected;
        self.device_version = None;
        self.downloads = None;
    }

    /// Ask the device for its firmware version.
    ///
    /// Earlier check results are discarded even if the read fails.
    pub fn read_version(&mut self) -> Result<Version> {
        if self.state == SessionState::Flashing {
            return Err(Error::InvalidState("Flash in progress."));
        }
        let Some(channel) = self.channel.as_mut() else {
            return Err(Error::InvalidState("Connect to the ECU first."));
        };

        self.device_version = None;
        self.downloads = None;
        self.state = SessionState::Connected;

        debug!("Requesting version from {}", channel.name());
        channel.write_command(VERSION_REQUEST)?;
        thread::sleep(VERSION_REQUEST_DELAY);

        let reply = self
            .reader
            .read_version(channel.as_mut())?;
        info!("ECU raw: {}", sanitize_for_log(reply.raw.trim()));

        let Some(version) = reply.version else {
            if reply.raw.trim().is_empty() {
                return Err(Error::Timeout(format!(
                    "no reply to version request within {:?}",
                    self.reader.overall()
                )));
            }
            return Err(Error::Parse(
                "could not parse version from ECU reply".to_string(),
            ));
        };

        info!("Parsed: {} => {version}", version.raw());
        self.device_version = Some(version.clone());
        self.state = SessionState::VersionKnown;
        Ok(version)
    }

    /// Select, download and compare the newest release of `variant`.
    ///
    /// On failure the session keeps its previous state and can retry.
    pub fn check_updates(&mut self, variant: FlashVariant) -> Result<&UpdateCheck> {
        let device = match (self.state, &self.device_version) {
            (SessionState::Flashing, _) => return Err(Error::InvalidState("Flash in progress.")),
            (_, Some(device)) => device.clone(),
            (_, None) => return Err(Error::InvalidState("Read ECU version first.")),
        };

        info!("Checking for latest {variant} firmware and configuration");
        let firmware_entries = self
            .repository
            .list_files(&self.collections.firmware)?;
        let config_entries = self
            .repository
            .list_files(&self.collections.config)?;
        let selection = select_release(
            &files_with_extension(&firmware_entries, "bin"),
            &files_with_extension(&config_entries, "ini"),
            variant,
        )?;

        info!("Latest firmware: {}", selection.firmware.name);
        match &selection.config {
            Some(config) => info!("Configuration match: {}", config.name),
            None => info!("Configuration match: (none found)"),
        }

        debug!("Downloading {}", selection.firmware.name);
        let firmware = self
            .repository
            .fetch(&selection.firmware.download_url)?;
        let config = match &selection.config {
            Some(file) => {
                debug!("Downloading {}", file.name);
                Some(
                    self.repository
                        .fetch(&file.download_url)?,
                )
            },
            None => None,
        };

        let is_newer = device < selection.firmware_version;
        if is_newer {
            info!("Update available: {device} -> {}", selection.firmware_version);
        } else {
            info!("Already up to date ({device})");
        }

        let check = UpdateCheck {
            selection,
            is_newer,
            firmware_len: firmware.len(),
            config_len: config.as_ref().map(Vec::len),
        };
        self.state = SessionState::Checked;
        let downloads = self.downloads.insert(Downloads {
            check,
            firmware,
            config,
        });
        Ok(&downloads.check)
    }

    /// Write the downloaded firmware and configuration files into `dir`.
    ///
    /// Returns the paths written.
    pub fn save_downloads(&mut self, dir: &Path) -> Result<Vec<PathBuf>> {
        let downloads = match self.state {
            SessionState::Checked | SessionState::Downloaded | SessionState::Flashed => self
                .downloads
                .as_ref()
                .ok_or(Error::InvalidState("Run the update check first."))?,
            _ => return Err(Error::InvalidState("Run the update check first.")),
        };

        fs::create_dir_all(dir)?;
        let selection = &downloads.check.selection;
        let mut files = vec![(&selection.firmware.name, &downloads.firmware)];
        if let (Some(file), Some(bytes)) = (&selection.config, &downloads.config) {
            files.push((&file.name, bytes));
        }

        let mut written = Vec::with_capacity(files.len());
        for (name, bytes) in files {
            let path = dir.join(local_file_name(name)?);
            fs::write(&path, bytes)?;
            info!("Saved {} ({} bytes)", path.display(), bytes.len());
            written.push(path);
        }

        if self.state == SessionState::Checked {
            self.state = SessionState::Downloaded;
        }
        Ok(written)
    }

    /// Tell the ECU to reboot into its DFU bootloader and release the port.
    ///
    /// The session state does not change; the channel is closed so the
    /// bootloader can enumerate on USB.
    pub fn enter_update_mode(&mut self) -> Result<()> {
        if self.device_version.is_none() {
            return Err(Error::InvalidState("Read ECU version first."));
        }
        let Some(channel) = self.channel.as_mut() else {
            return Err(Error::InvalidState("Connect to the ECU first."));
        };

        info!("Sending BOOT command");
        channel.write_command(ENTER_BOOTLOADER)?;
        self.close_channel();
        info!("Serial closed; ECU should now appear as STM32 bootloader (DFU)");
        Ok(())
    }

    /// Check that the downloaded firmware may be flashed.
    ///
    /// Firmware that is not newer than the device's is refused with
    /// [`Error::NotNewer`] unless `force` is set.
    pub fn flash_plan(&self, force: bool) -> Result<&UpdateCheck> {
        let check = match self.state {
            SessionState::Checked | SessionState::Downloaded => self.update_check(),
            _ => None,
        }
        .ok_or(Error::InvalidState("Run the update check first."))?;

        if !check.is_newer && !force {
            return Err(Error::NotNewer {
                device: self
                    .device_version
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                available: check
                    .selection
                    .firmware_version
                    .to_string(),
            });
        }
        Ok(check)
    }

    /// Flash the downloaded firmware.
    ///
    /// Applies [`UpdateSession::flash_plan`], then asks `confirm`, which may
    /// cancel.
    pub fn flash<C>(&mut self, force: bool, confirm: C) -> Result<()>
    where
        C: FnOnce(&UpdateCheck) -> bool,
    {
        let plan = self.flash_plan(force)?;
        if !plan.is_newer {
            warn!(
                "Forcing flash of {} over {}",
                plan.selection.firmware_version,
                self.device_version
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            );
        }
        if !confirm(plan) {
            return Err(Error::UserCancelled);
        }

        let previous = self.state;
        let Some(downloads) = self.downloads.as_ref() else {
            return Err(Error::InvalidState("Run the update check first."));
        };
        info!("Flashing {}", downloads.check.selection.firmware.name);
        self.state = SessionState::Flashing;
        let result = self
            .flasher
            .flash(&downloads.firmware, DFU_START_ADDRESS, self.transfer_size);

        match result {
            Ok(()) => {
                info!("Flash complete; device may disconnect and re-enumerate");
                self.state = SessionState::Flashed;
                Ok(())
            },
            Err(e) => {
                self.state = previous;
                Err(match e {
                    Error::FlashFailed(message) => Error::FlashFailed(message),
                    other => Error::FlashFailed(other.to_string()),
                })
            },
        }
    }

    fn close_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close() {
                warn!("Failed to close {}: {e}", channel.name());
            }
        }
    }
}

impl<R: Repository, F: Flasher> Drop for UpdateSession<R, F> {
    fn drop(&mut self) {
        self.close_channel();
    }
}

/// Last path component of a remote file name.
fn local_file_name(name: &str) -> Result<&str> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);
    if base.is_empty() || base == "." || base == ".." {
        return Err(Error::Parse(format!("unusable file name: {name:?}")));
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            mock::{MemoryRepository, ProbedChannel, RecordingFlasher},
            port::ReadOutcome,
        },
        std::time::Duration,
    };

    type TestSession = UpdateSession<MemoryRepository, RecordingFlasher>;

    fn repository() -> MemoryRepository {
        MemoryRepository::new()
            .with_file("firmware", "202412.5.bin", b"old")
            .with_file("firmware", "202501.6.bin", b"new firmware")
            .with_file("firmware", "202501.6-1mb.bin", b"large firmware")
            .with_file("firmware", "README.md", b"readme")
            .with_file("Speeduino_ini_files", "202412.5.ini", b"old ini")
            .with_file("Speeduino_ini_files", "202501.6.ini", b"matching ini")
    }

    fn session(repository: MemoryRepository) -> TestSession {
        UpdateSession::new(repository, RecordingFlasher::default()).with_reader(
            VersionReader::new(Duration::from_millis(120)).with_slice(Duration::from_millis(20)),
        )
    }

    /// Boot noise, end of noise, then the reply to the version request.
    fn device_reply(reply: &str) -> Vec<ReadOutcome> {
        vec![
            ReadOutcome::Data(b"\x00boot".to_vec()),
            ReadOutcome::TimedOut,
            ReadOutcome::Data(reply.as_bytes().to_vec()),
        ]
    }

    fn checked_session(device: &str) -> TestSession {
        let mut session = session(repository());
        let (channel, _) = ProbedChannel::new(device_reply(device));
        session.connect(channel).unwrap();
        session.read_version().unwrap();
        session
            .check_updates(FlashVariant::Standard)
            .unwrap();
        session
    }

    #[test]
    fn test_new_session_is_disconnected() {
        let session = session(repository());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
        assert!(session.device_version().is_none());
        assert!(session.update_check().is_none());
    }

    #[test]
    fn test_actions_require_their_prerequisites() {
        let mut session = session(repository());
        assert!(matches!(session.read_version(), Err(Error::InvalidState(_))));
        assert!(matches!(
            session.check_updates(FlashVariant::Standard),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            session.save_downloads(Path::new("unused")),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(session.enter_update_mode(), Err(Error::InvalidState(_))));
        assert!(matches!(session.flash(true, |_| true), Err(Error::InvalidState(_))));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_connect_discards_noise() {
        let mut session = session(repository());
        let (channel, probe) = ProbedChannel::new(device_reply("Speeduino 202501.6\r\n"));
        session.connect(channel).unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert!(probe.written().is_empty());

        let version = session.read_version().unwrap();
        assert_eq!(version.to_string(), "202501.6");
        assert_eq!(probe.written(), [VERSION_REQUEST.to_vec()]);
        assert_eq!(session.state(), SessionState::VersionKnown);
    }

    #[test]
    fn test_read_version_without_reply_times_out() {
        let mut session = session(repository());
        let (channel, _) = ProbedChannel::new(Vec::new());
        session.connect(channel).unwrap();

        let err = session.read_version().unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.device_version().is_none());
    }

    #[test]
    fn test_read_version_unparsable_reply() {
        let mut session = session(repository());
        let (channel, _) = ProbedChannel::new(device_reply("Speeduino 202513.1 ready\r\n"));
        session.connect(channel).unwrap();

        let err = session.read_version().unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_check_updates_selects_and_downloads() {
        let session = checked_session("Speeduino 202412.5\r\n");
        assert_eq!(session.state(), SessionState::Checked);

        let check = session.update_check().unwrap();
        assert_eq!(check.selection.firmware.name, "202501.6.bin");
        assert_eq!(
            check
                .selection
                .config
                .as_ref()
                .map(|f| f.name.as_str()),
            Some("202501.6.ini")
        );
        assert!(check.is_newer);
        assert_eq!(check.firmware_len, b"new firmware".len());
        assert_eq!(check.config_len, Some(b"matching ini".len()));
    }

    #[test]
    fn test_check_updates_large_flash_variant() {
        let mut session = session(repository());
        let (channel, _) = ProbedChannel::new(device_reply("Speeduino 202412.5\r\n"));
        session.connect(channel).unwrap();
        session.read_version().unwrap();

        let check = session
            .check_updates(FlashVariant::LargeFlash)
            .unwrap();
        assert_eq!(check.selection.firmware.name, "202501.6-1mb.bin");
    }

    #[test]
    fn test_check_updates_same_version_is_not_newer() {
        let session = checked_session("Speeduino 202501.6\r\n");
        assert!(!session.update_check().unwrap().is_newer);
    }

    #[test]
    fn test_check_failure_keeps_state_and_can_retry() {
        let repository = repository().with_failing_fetch("firmware", "202501.6.bin", 503);
        let mut session = session(repository);
        let (channel, _) = ProbedChannel::new(device_reply("Speeduino 202412.5\r\n"));
        session.connect(channel).unwrap();
        session.read_version().unwrap();

        let err = session
            .check_updates(FlashVariant::Standard)
            .unwrap_err();
        assert!(matches!(err, Error::FetchFailed { status: 503 }));
        assert_eq!(session.state(), SessionState::VersionKnown);
        assert!(session.update_check().is_none());

        session.repository_mut().heal();
        session
            .check_updates(FlashVariant::Standard)
            .unwrap();
        assert_eq!(session.state(), SessionState::Checked);
    }

    #[test]
    fn test_check_without_firmware_fails() {
        let repository =
            MemoryRepository::new().with_file("Speeduino_ini_files", "202501.6.ini", b"ini");
        let mut session = session(repository);
        let (channel, _) = ProbedChannel::new(device_reply("Speeduino 202412.5\r\n"));
        session.connect(channel).unwrap();
        session.read_version().unwrap();

        let err = session
            .check_updates(FlashVariant::Standard)
            .unwrap_err();
        assert!(matches!(err, Error::NoFirmwareFound));
        assert_eq!(session.state(), SessionState::VersionKnown);
    }

    #[test]
    fn test_reread_version_clears_check() {
        let mut session = session(repository());
        let (channel, _) = ProbedChannel::new(vec![
            ReadOutcome::TimedOut,
            ReadOutcome::Data(b"Speeduino 202412.5\r\n".to_vec()),
            ReadOutcome::Data(b"Speeduino 202501.6\r\n".to_vec()),
        ]);
        session.connect(channel).unwrap();
        session.read_version().unwrap();
        session
            .check_updates(FlashVariant::Standard)
            .unwrap();

        let version = session.read_version().unwrap();
        assert_eq!(version.to_string(), "202501.6");
        assert_eq!(session.state(), SessionState::VersionKnown);
        assert!(session.update_check().is_none());
    }

    #[test]
    fn test_reconnect_resets_session() {
        let mut session = checked_session("Speeduino 202412.5\r\n");
        let (channel, _) = ProbedChannel::new([ReadOutcome::TimedOut]);
        session.connect(channel).unwrap();

        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.device_version().is_none());
        assert!(session.update_check().is_none());
    }

    #[test]
    fn test_reconnect_closes_previous_channel() {
        let mut session = session(repository());
        let (first, first_probe) = ProbedChannel::new([ReadOutcome::TimedOut]);
        session.connect(first).unwrap();
        let (second, second_probe) = ProbedChannel::new([ReadOutcome::TimedOut]);
        session.connect(second).unwrap();

        assert!(first_probe.closed());
        assert!(!second_probe.closed());
    }

    #[test]
    fn test_save_downloads_writes_files() {
        let mut session = checked_session("Speeduino 202412.5\r\n");
        let dir = tempfile::tempdir().unwrap();

        let written = session
            .save_downloads(dir.path())
            .unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(
            fs::read(dir.path().join("202501.6.bin")).unwrap(),
            b"new firmware"
        );
        assert_eq!(
            fs::read(dir.path().join("202501.6.ini")).unwrap(),
            b"matching ini"
        );
        assert_eq!(session.state(), SessionState::Downloaded);
    }

    #[test]
    fn test_local_file_name_strips_directories() {
        assert_eq!(local_file_name("202501.6.bin").unwrap(), "202501.6.bin");
        assert_eq!(local_file_name("../../etc/202501.6.bin").unwrap(), "202501.6.bin");
        assert_eq!(local_file_name("dir\\202501.6.ini").unwrap(), "202501.6.ini");
        assert!(local_file_name("..").is_err());
        assert!(local_file_name("dir/").is_err());
    }

    #[test]
    fn test_enter_update_mode_sends_boot_and_closes() {
        let mut session = session(repository());
        let (channel, probe) = ProbedChannel::new(device_reply("Speeduino 202412.5\r\n"));
        session.connect(channel).unwrap();

        assert!(matches!(session.enter_update_mode(), Err(Error::InvalidState(_))));
        session.read_version().unwrap();

        session.enter_update_mode().unwrap();
        assert_eq!(
            probe.written(),
            [VERSION_REQUEST.to_vec(), ENTER_BOOTLOADER.to_vec()]
        );
        assert!(probe.closed());
        assert!(!session.is_connected());
        assert_eq!(session.state(), SessionState::VersionKnown);

        assert!(matches!(session.enter_update_mode(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_flash_writes_firmware() {
        let mut session = checked_session("Speeduino 202412.5\r\n");
        session.flash(false, |_| true).unwrap();

        assert_eq!(session.state(), SessionState::Flashed);
        assert_eq!(
            session.flasher().calls,
            [(b"new firmware".to_vec(), 0x0800_0000, 2048)]
        );
    }

    #[test]
    fn test_flash_uses_configured_transfer_size() {
        let mut session = checked_session("Speeduino 202412.5\r\n").with_transfer_size(1024);
        session.flash(false, |_| true).unwrap();
        assert_eq!(session.flasher().calls[0].2, 1024);
    }

    #[test]
    fn test_flash_refuses_not_newer() {
        let mut session = checked_session("Speeduino 202501.6\r\n");
        let err = session.flash(false, |_| true).unwrap_err();

        match err {
            Error::NotNewer { device, available } => {
                assert_eq!(device, "202501.6");
                assert_eq!(available, "202501.6");
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Checked);
        assert!(session.flasher().calls.is_empty());
    }

    #[test]
    fn test_flash_plan_checks_without_flashing() {
        let session = checked_session("Speeduino 202501.6\r\n");
        assert!(matches!(session.flash_plan(false), Err(Error::NotNewer { .. })));
        let plan = session.flash_plan(true).unwrap();
        assert_eq!(plan.selection.firmware.name, "202501.6.bin");
        assert!(session.flasher().calls.is_empty());
    }

    #[test]
    fn test_flash_force_overrides_not_newer() {
        let mut session = checked_session("Speeduino 202501.6\r\n");
        session.flash(true, |_| true).unwrap();
        assert_eq!(session.state(), SessionState::Flashed);
    }

    #[test]
    fn test_flash_declined_confirmation() {
        let mut session = checked_session("Speeduino 202412.5\r\n");
        let err = session
            .flash(false, |check| {
                assert_eq!(check.selection.firmware.name, "202501.6.bin");
                false
            })
            .unwrap_err();

        assert!(matches!(err, Error::UserCancelled));
        assert_eq!(session.state(), SessionState::Checked);
        assert!(session.flasher().calls.is_empty());
    }

    #[test]
    fn test_flash_failure_restores_state() {
        let mut session = checked_session("Speeduino 202412.5\r\n");
        let dir = tempfile::tempdir().unwrap();
        session
            .save_downloads(dir.path())
            .unwrap();
        session.flasher.fail_with = Some("LIBUSB_ERROR_PIPE".to_string());

        let err = session.flash(false, |_| true).unwrap_err();
        assert!(matches!(err, Error::FlashFailed(ref m) if m == "LIBUSB_ERROR_PIPE"));
        assert_eq!(session.state(), SessionState::Downloaded);
    }

    #[test]
    fn test_flash_after_flashed_requires_new_check() {
        let mut session = checked_session("Speeduino 202412.5\r\n");
        session.flash(false, |_| true).unwrap();
        assert!(matches!(session.flash(true, |_| true), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::VersionKnown.to_string(), "version known");
        assert_eq!(SessionState::Flashed.to_string(), "flashed");
    }
}
