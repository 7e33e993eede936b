//! Release selection.
//!
//! Picks the newest firmware image of one flash-size variant and the
//! configuration file that best matches it. Firmware and configuration files
//! are versioned independently, so the configuration match falls back in
//! three steps:
//!
//! 1. same version as the firmware;
//! 2. newest version not newer than the firmware;
//! 3. newest version overall.

use {
    crate::{
        error::{Error, Result},
        remote::RemoteFile,
        version::Version,
    },
    log::debug,
    std::fmt,
};

/// Filename marker of large-flash (1 MB) firmware builds.
pub const LARGE_FLASH_MARKER: &str = "-1mb";

/// Default collection holding firmware images.
pub const DEFAULT_FIRMWARE_COLLECTION: &str = "firmware";

/// Default collection holding tuning-software configuration files.
pub const DEFAULT_CONFIG_COLLECTION: &str = "Speeduino_ini_files";

/// Firmware build family, distinguished by target flash size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashVariant {
    /// Regular builds.
    #[default]
    Standard,
    /// Builds for 1 MB flash parts (`-1mb` in the filename).
    LargeFlash,
}

impl FlashVariant {
    /// Variant for the "large flash wanted" flag.
    pub fn from_large_flash(large_flash: bool) -> Self {
        if large_flash {
            Self::LargeFlash
        } else {
            Self::Standard
        }
    }

    /// Whether a firmware filename belongs to this variant.
    pub fn matches(self, name: &str) -> bool {
        let large = name.contains(LARGE_FLASH_MARKER);
        match self {
            Self::Standard => !large,
            Self::LargeFlash => large,
        }
    }
}

impl fmt::Display for FlashVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::LargeFlash => write!(f, "1mb"),
        }
    }
}

/// Names of the two remote collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collections {
    /// Collection with `.bin` firmware images.
    pub firmware: String,
    /// Collection with `.ini` configuration files.
    pub config: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            firmware: DEFAULT_FIRMWARE_COLLECTION.to_string(),
            config: DEFAULT_CONFIG_COLLECTION.to_string(),
        }
    }
}

/// The chosen firmware image and its configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Newest firmware of the requested variant.
    pub firmware: RemoteFile,
    /// Version of `firmware`.
    pub firmware_version: Version,
    /// Best matching configuration file, if any exists.
    pub config: Option<RemoteFile>,
}

/// Keep files with a parseable version, sorted ascending by version.
fn versioned(files: impl IntoIterator<Item = RemoteFile>) -> Vec<(Version, RemoteFile)> {
    let mut candidates: Vec<(Version, RemoteFile)> = files
        .into_iter()
        .filter_map(|file| {
            let version = file.version.clone()?;
            Some((version, file))
        })
        .collect();
    // Stable sort keeps listing order among equal versions.
    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    candidates
}

/// Select the newest firmware of `variant` and its best configuration file.
///
/// Fails with [`Error::NoFirmwareFound`] when no firmware of the variant has
/// a versioned name. A missing configuration file is not an error.
pub fn select_release(
    firmware: &[RemoteFile],
    configs: &[RemoteFile],
    variant: FlashVariant,
) -> Result<Selection> {
    let mut candidates = versioned(
        firmware
            .iter()
            .filter(|file| variant.matches(&file.name))
            .cloned(),
    );
    let (firmware_version, firmware) = candidates
        .pop()
        .ok_or(Error::NoFirmwareFound)?;
    debug!("Latest {variant} firmware: {} ({firmware_version})", firmware.name);

    let configs = versioned(configs.iter().cloned());
    let config = best_config(&configs, &firmware_version).cloned();

    Ok(Selection {
        firmware,
        firmware_version,
        config,
    })
}

/// Apply the exact / closest-older / newest fallback to sorted configs.
fn best_config<'a>(
    configs: &'a [(Version, RemoteFile)],
    firmware: &Version,
) -> Option<&'a RemoteFile> {
    configs
        .iter()
        .find(|(version, _)| version == firmware)
        .or_else(|| {
            configs
                .iter()
                .rev()
                .find(|(version, _)| version <= firmware)
        })
        .or_else(|| configs.last())
        .map(|(_, file)| file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<RemoteFile> {
        names
            .iter()
            .map(|name| RemoteFile::new(*name, format!("mem://{name}")))
            .collect()
    }

    fn config_name(selection: &Selection) -> Option<&str> {
        selection
            .config
            .as_ref()
            .map(|f| f.name.as_str())
    }

    #[test]
    fn test_selects_newest_standard_firmware() {
        let firmware = files(&["202412.5.bin", "202501.6.bin", "202501.6-1mb.bin"]);
        let selection = select_release(&firmware, &[], FlashVariant::Standard).unwrap();
        assert_eq!(selection.firmware.name, "202501.6.bin");
        assert_eq!(selection.firmware_version.to_string(), "202501.6");
        assert!(selection.config.is_none());
    }

    #[test]
    fn test_selects_large_flash_variant() {
        let firmware = files(&["202412.5-1mb.bin", "202501.6.bin", "202502.1.bin", "202501.6-1mb.bin"]);
        let selection = select_release(&firmware, &[], FlashVariant::LargeFlash).unwrap();
        assert_eq!(selection.firmware.name, "202501.6-1mb.bin");
    }

    #[test]
    fn test_sorting_is_by_version_not_listing_order() {
        let firmware = files(&["202501.6.1.bin", "202502.0.bin", "202412.9.bin", "202501.6.bin"]);
        let selection = select_release(&firmware, &[], FlashVariant::Standard).unwrap();
        assert_eq!(selection.firmware.name, "202502.0.bin");
    }

    #[test]
    fn test_unversioned_firmware_dropped() {
        let firmware = files(&["latest.bin", "202410.2.bin", "bootloader.bin"]);
        let selection = select_release(&firmware, &[], FlashVariant::Standard).unwrap();
        assert_eq!(selection.firmware.name, "202410.2.bin");
    }

    #[test]
    fn test_no_firmware_found() {
        let err = select_release(&[], &files(&["202501.6.ini"]), FlashVariant::Standard).unwrap_err();
        assert!(matches!(err, Error::NoFirmwareFound));

        let only_unversioned = files(&["latest.bin"]);
        let err = select_release(&only_unversioned, &[], FlashVariant::Standard).unwrap_err();
        assert!(matches!(err, Error::NoFirmwareFound));

        let only_standard = files(&["202501.6.bin"]);
        let err = select_release(&only_standard, &[], FlashVariant::LargeFlash).unwrap_err();
        assert!(matches!(err, Error::NoFirmwareFound));
    }

    #[test]
    fn test_config_exact_match() {
        let firmware = files(&["202501.6.bin"]);
        let configs = files(&["202412.5.ini", "Speeduino_202501.6.ini", "202502.1.ini"]);
        let selection = select_release(&firmware, &configs, FlashVariant::Standard).unwrap();
        assert_eq!(config_name(&selection), Some("Speeduino_202501.6.ini"));
    }

    #[test]
    fn test_config_closest_older() {
        let firmware = files(&["202501.6.bin"]);
        let configs = files(&["202412.9.ini", "202412.5.ini"]);
        let selection = select_release(&firmware, &configs, FlashVariant::Standard).unwrap();
        assert_eq!(config_name(&selection), Some("202412.9.ini"));
    }

    #[test]
    fn test_config_closest_older_ignores_newer() {
        let firmware = files(&["202501.6.bin"]);
        let configs = files(&["202412.5.ini", "202502.1.ini", "202501.5.ini"]);
        let selection = select_release(&firmware, &configs, FlashVariant::Standard).unwrap();
        assert_eq!(config_name(&selection), Some("202501.5.ini"));
    }

    #[test]
    fn test_config_latest_overall_when_all_newer() {
        let firmware = files(&["202501.6.bin"]);
        let configs = files(&["202502.1.ini"]);
        let selection = select_release(&firmware, &configs, FlashVariant::Standard).unwrap();
        assert_eq!(config_name(&selection), Some("202502.1.ini"));

        let configs = files(&["202503.0.ini", "202502.1.ini"]);
        let selection = select_release(&firmware, &configs, FlashVariant::Standard).unwrap();
        assert_eq!(config_name(&selection), Some("202503.0.ini"));
    }

    #[test]
    fn test_config_absent_when_none_parseable() {
        let firmware = files(&["202501.6.bin"]);
        let configs = files(&["speeduino.ini", "README.ini"]);
        let selection = select_release(&firmware, &configs, FlashVariant::Standard).unwrap();
        assert!(selection.config.is_none());
    }

    #[test]
    fn test_variant_matching() {
        assert!(FlashVariant::Standard.matches("202501.6.bin"));
        assert!(!FlashVariant::Standard.matches("202501.6-1mb.bin"));
        assert!(FlashVariant::LargeFlash.matches("202501.6-1mb.bin"));
        assert!(!FlashVariant::LargeFlash.matches("202501.6.bin"));
        assert_eq!(FlashVariant::from_large_flash(true), FlashVariant::LargeFlash);
        assert_eq!(FlashVariant::from_large_flash(false), FlashVariant::Standard);
    }

    #[test]
    fn test_default_collections() {
        let collections = Collections::default();
        assert_eq!(collections.firmware, "firmware");
        assert_eq!(collections.config, "Speeduino_ini_files");
    }
}
