//! Speeduino firmware version model.
//!
//! Versions are encoded as `YYYYMM.minor[.patch]`, e.g. `202501.6` or
//! `202501.6.1`. Two textual sources are understood:
//!
//! - Device status text, where the version follows a `Speeduino` marker and
//!   may also be written with a dotted year/month (`Speeduino 2025.01.6`).
//!   Status lines repeat and arrive with serial noise, so the text is scanned
//!   for every occurrence and the last valid one is used.
//! - Remote filenames such as `202501.6.bin` or `Speeduino_202501.6-1mb.ini`.
//!
//! Ordering is by `(year_month, minor, patch)`; the raw matched text is kept
//! for display only.

use {
    crate::error::{Error, Result},
    regex::{Captures, Regex},
    std::{
        cmp::Ordering,
        fmt,
        hash::{Hash, Hasher},
        sync::LazyLock,
    },
};

// Groups: year(4) month(2) minor patch(optional). The dot between year and
// month is optional so both `202501.6` and `2025.01.6` match. Digits are
// ASCII only.
static DEVICE_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)speeduino\s+([0-9]{4})\.?([0-9]{2})\.([0-9]+)(?:\.([0-9]+))?").expect("static pattern")
});

static FILENAME_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{6})\.([0-9]+)(?:\.([0-9]+))?").expect("static pattern")
});

/// A Speeduino firmware version.
///
/// Equality, hashing and ordering ignore [`Version::raw`].
#[derive(Debug, Clone)]
pub struct Version {
    year_month: u32,
    minor: u32,
    patch: u32,
    raw: String,
}

impl Version {
    /// Create a version from its encoded `year_month` (e.g. `202501`).
    ///
    /// Fails when the low two digits are not a month in 1..=12.
    pub fn new(year_month: u32, minor: u32, patch: u32) -> Result<Self> {
        let month = year_month % 100;
        if !(1..=12).contains(&month) {
            return Err(Error::Parse(format!(
                "invalid month {month:02} in version {year_month}.{minor}"
            )));
        }
        let mut version = Self {
            year_month,
            minor,
            patch,
            raw: String::new(),
        };
        version.raw = version.to_string();
        Ok(version)
    }

    /// Create a version from a separate year and month.
    pub fn from_parts(year: u32, month: u32, minor: u32, patch: u32) -> Result<Self> {
        if month > 99 {
            return Err(Error::Parse(format!("invalid month {month}")));
        }
        let year_month = year
            .checked_mul(100)
            .and_then(|ym| ym.checked_add(month))
            .ok_or_else(|| Error::Parse(format!("year {year} out of range")))?;
        Self::new(year_month, minor, patch)
    }

    /// Attach the text this version was parsed from.
    #[must_use]
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }

    /// Encoded `YYYYMM` key.
    pub fn year_month(&self) -> u32 {
        self.year_month
    }

    /// Four-digit year.
    pub fn year(&self) -> u32 {
        self.year_month / 100
    }

    /// Month (1..=12).
    pub fn month(&self) -> u32 {
        self.year_month % 100
    }

    /// Minor release number.
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Patch number (0 when absent).
    pub fn patch(&self) -> u32 {
        self.patch
    }

    /// Text the version was parsed from, or the canonical form.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn key(&self) -> (u32, u32, u32) {
        (self.year_month, self.minor, self.patch)
    }

    /// Parse the most recent version announced in device status text.
    ///
    /// Returns `None` when no occurrence has a valid month.
    pub fn parse_device_text(text: &str) -> Option<Self> {
        scan_device_text(text)
            .filter_map(DeviceCandidate::into_version)
            .last()
    }

    /// Parse the version embedded in a remote filename.
    ///
    /// Filenames without a `YYYYMM.minor` token yield `None`, never a zero
    /// version.
    pub fn parse_filename(name: &str) -> Option<Self> {
        let caps = FILENAME_VERSION_RE.captures(name)?;
        let year_month = number(&caps, 1)?;
        let minor = number(&caps, 2)?;
        let patch = optional_number(&caps, 3)?;
        Self::new(year_month, minor, patch)
            .ok()
            .map(|v| v.with_raw(&caps[0]))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.year_month, self.minor)?;
        if self.patch != 0 {
            write!(f, ".{}", self.patch)?;
        }
        Ok(())
    }
}

/// An unvalidated version occurrence found in device text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    /// Matched text, trimmed.
    pub raw: String,
    /// Four-digit year.
    pub year: u32,
    /// Two-digit month, not yet range checked.
    pub month: u32,
    /// Minor release number.
    pub minor: u32,
    /// Patch number (0 when absent).
    pub patch: u32,
}

impl DeviceCandidate {
    /// Validate the candidate, discarding out-of-range months.
    pub fn into_version(self) -> Option<Version> {
        if !(1..=12).contains(&self.month) {
            return None;
        }
        Version::from_parts(self.year, self.month, self.minor, self.patch)
            .ok()
            .map(|v| v.with_raw(self.raw))
    }
}

/// Iterate over every marker-prefixed version occurrence in `text`, in order.
///
/// No month validation happens here; occurrences whose numbers overflow are
/// skipped.
pub fn scan_device_text(text: &str) -> impl Iterator<Item = DeviceCandidate> + '_ {
    DEVICE_VERSION_RE
        .captures_iter(text)
        .filter_map(|caps| {
            Some(DeviceCandidate {
                raw: caps[0].trim().to_string(),
                year: number(&caps, 1)?,
                month: number(&caps, 2)?,
                minor: number(&caps, 3)?,
                patch: optional_number(&caps, 4)?,
            })
        })
}

fn number(caps: &Captures<'_>, index: usize) -> Option<u32> {
    caps.get(index)?
        .as_str()
        .parse()
        .ok()
}

// Outer `None` means the group matched but overflowed.
fn optional_number(caps: &Captures<'_>, index: usize) -> Option<u32> {
    match caps.get(index) {
        Some(m) => m.as_str().parse().ok(),
        None => Some(0),
    }
}
