//! Configuration file support for ecuflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (ECUFLASH_*)
//! 3. Local config file (./ecuflash.toml)
//! 4. Global config file (~/.config/ecuflash/config.toml)
//!
//! Layers 1 and 2 are handled by clap; this module merges 3 over 4.

use {
    directories::ProjectDirs,
    ecuflash::{
        Collections, GithubConfig,
        protocol::{DEFAULT_TRANSFER_SIZE, DFU_ALT_SETTING, VERSION_REPLY_TIMEOUT},
    },
    log::{debug, warn},
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = "ecuflash.toml";

/// Serial connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SerialSection {
    /// Serial port of the ECU (e.g., "/dev/ttyACM0" or "COM3").
    pub port: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
}

/// Where firmware and configuration files are listed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositorySection {
    /// API endpoint.
    pub api_base: Option<String>,
    /// Account owning the collections.
    pub owner: Option<String>,
    /// Firmware collection name.
    pub firmware: Option<String>,
    /// Configuration file collection name.
    pub config: Option<String>,
    /// Branch to list.
    pub branch: Option<String>,
}

/// Flashing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashSection {
    /// Prefer 1 MB firmware builds.
    pub large_flash: Option<bool>,
    /// Path of the `dfu-util` binary.
    pub dfu_util: Option<PathBuf>,
    /// DFU alternate setting.
    pub alt: Option<u8>,
    /// DFU device filter (`vid:pid`).
    pub device: Option<String>,
    /// DFU transfer size in bytes.
    pub transfer_size: Option<u16>,
}

/// Device protocol settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSection {
    /// Overall wait for the version reply, in milliseconds.
    pub version_timeout_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Serial settings.
    #[serde(default)]
    pub serial: SerialSection,
    /// Remote repository settings.
    #[serde(default)]
    pub repository: RepositorySection,
    /// Flash settings.
    #[serde(default)]
    pub flash: FlashSection,
    /// Device settings.
    #[serde(default)]
    pub device: DeviceSection,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ecuflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; values set in `other` win.
    fn merge(&mut self, other: Self) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.serial.port, other.serial.port);
        take(&mut self.serial.baud, other.serial.baud);

        take(&mut self.repository.api_base, other.repository.api_base);
        take(&mut self.repository.owner, other.repository.owner);
        take(&mut self.repository.firmware, other.repository.firmware);
        take(&mut self.repository.config, other.repository.config);
        take(&mut self.repository.branch, other.repository.branch);

        take(&mut self.flash.large_flash, other.flash.large_flash);
        take(&mut self.flash.dfu_util, other.flash.dfu_util);
        take(&mut self.flash.alt, other.flash.alt);
        take(&mut self.flash.device, other.flash.device);
        take(&mut self.flash.transfer_size, other.flash.transfer_size);

        take(
            &mut self.device.version_timeout_ms,
            other.device.version_timeout_ms,
        );
    }

    /// GitHub client settings with defaults filled in.
    pub fn github(&self) -> GithubConfig {
        let mut github = GithubConfig::default();
        if let Some(api_base) = &self.repository.api_base {
            github.api_base.clone_from(api_base);
        }
        if let Some(owner) = &self.repository.owner {
            github.owner.clone_from(owner);
        }
        if let Some(branch) = &self.repository.branch {
            github.branch.clone_from(branch);
        }
        github
    }

    /// Collection names with defaults filled in.
    pub fn collections(&self) -> Collections {
        let mut collections = Collections::default();
        if let Some(firmware) = &self.repository.firmware {
            collections.firmware.clone_from(firmware);
        }
        if let Some(config) = &self.repository.config {
            collections.config.clone_from(config);
        }
        collections
    }

    /// Overall version reply timeout.
    pub fn version_timeout(&self) -> Duration {
        self.device
            .version_timeout_ms
            .map_or(VERSION_REPLY_TIMEOUT, Duration::from_millis)
    }

    /// Whether 1 MB firmware builds are selected.
    pub fn large_flash(&self) -> bool {
        self.flash.large_flash.unwrap_or(false)
    }

    /// DFU alternate setting.
    pub fn dfu_alt(&self) -> u8 {
        self.flash.alt.unwrap_or(DFU_ALT_SETTING)
    }

    /// DFU transfer size.
    pub fn transfer_size(&self) -> u16 {
        self.flash
            .transfer_size
            .unwrap_or(DEFAULT_TRANSFER_SIZE)
    }
}
