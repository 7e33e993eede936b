//! Streaming version extraction.
//!
//! [`VersionReader`] polls a [`DeviceChannel`] in short slices until a valid
//! version can be parsed from everything received so far, the overall
//! timeout expires, or the device closes the stream.

use {
    crate::{
        error::{Error, Result},
        port::{DeviceChannel, ReadOutcome},
        protocol::{READ_SLICE, VERSION_REPLY_TIMEOUT},
        text::Utf8StreamDecoder,
        version::Version,
    },
    log::{debug, trace},
    std::time::{Duration, Instant},
};

/// Text received from the device and the version found in it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReply {
    /// Everything decoded from the channel during the read.
    pub raw: String,
    /// Last valid version occurrence in `raw`.
    pub version: Option<Version>,
}

/// Reads a version reply with bounded total wait.
#[derive(Debug, Clone, Copy)]
pub struct VersionReader {
    overall: Duration,
    slice: Duration,
}

impl Default for VersionReader {
    fn default() -> Self {
        Self {
            overall: VERSION_REPLY_TIMEOUT,
            slice: READ_SLICE,
        }
    }
}

impl VersionReader {
    /// Create a reader with the given overall timeout.
    pub fn new(overall: Duration) -> Self {
        Self {
            overall,
            ..Self::default()
        }
    }

    /// Set the per-slice wait.
    #[must_use]
    pub fn with_slice(mut self, slice: Duration) -> Self {
        self.slice = slice;
        self
    }

    /// Overall timeout.
    pub fn overall(&self) -> Duration {
        self.overall
    }

    /// Read from `channel` until a version is parseable.
    ///
    /// A timeout without a parseable version is not an error: the returned
    /// reply has `version: None` and whatever text arrived.
    pub fn read_version<C: DeviceChannel + ?Sized>(&self, channel: &mut C) -> Result<VersionReply> {
        let start = Instant::now();
        let mut decoder = Utf8StreamDecoder::new();
        let mut raw = String::new();

        while let Some(remaining) = self.overall.checked_sub(start.elapsed()) {
            if remaining.is_zero() {
                break;
            }
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            match channel.read_chunk(self.slice.min(remaining))? {
                ReadOutcome::Data(bytes) => {
                    raw.push_str(&decoder.decode(&bytes));
                    // Scan the whole accumulator so a version split across
                    // chunks is found once complete.
                    if let Some(version) = Version::parse_device_text(&raw) {
                        debug!("Version {version} found after {:?}", start.elapsed());
                        return Ok(VersionReply {
                            raw,
                            version: Some(version),
                        });
                    }
                },
                ReadOutcome::TimedOut => {
                    trace!("Read slice timed out, reacquiring reader");
                    channel.reacquire_reader()?;
                },
                ReadOutcome::EndOfStream => {
                    debug!("{} reached end of stream", channel.name());
                    break;
                },
            }
        }

        raw.push_str(&decoder.finish());
        let version = Version::parse_device_text(&raw);
        if version.is_none() {
            debug!(
                "No version after {:?} ({} chars received)",
                start.elapsed(),
                raw.len()
            );
        }
        Ok(VersionReply { raw, version })
    }
}
