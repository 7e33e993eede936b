//! In-memory collaborators used by unit tests.

use {
    crate::{
        dfu::Flasher,
        error::{Error, Result},
        port::{DeviceChannel, ReadOutcome},
        remote::{EntryKind, RemoteEntry, Repository},
    },
    std::{collections::HashMap, collections::VecDeque, thread, time::Duration},
};

/// Channel that replays a fixed script of read outcomes.
///
/// Once the script is exhausted every read waits out its slice and times out.
/// Like a real port, a timed-out read releases the reader until
/// `reacquire_reader` is called.
pub(crate) struct ScriptedChannel {
    script: VecDeque<ReadOutcome>,
    released: bool,
    closed: bool,
    reacquired: usize,
}

impl ScriptedChannel {
    pub(crate) fn new(script: impl IntoIterator<Item = ReadOutcome>) -> Self {
        Self {
            script: script
                .into_iter()
                .collect(),
            released: false,
            closed: false,
            reacquired: 0,
        }
    }

    pub(crate) fn reacquire_count(&self) -> usize {
        self.reacquired
    }

    pub(crate) fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl DeviceChannel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn write_command(&mut self, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::ChannelUnavailable("closed".into()));
        }
        log::trace!("scripted TX {} bytes", bytes.len());
        Ok(())
    }

    fn read_chunk(&mut self, wait: Duration) -> Result<ReadOutcome> {
        if self.closed || self.released {
            return Err(Error::ChannelUnavailable("read handle was released".into()));
        }
        let outcome = self
            .script
            .pop_front()
            .unwrap_or_else(|| {
                thread::sleep(wait);
                ReadOutcome::TimedOut
            });
        if outcome == ReadOutcome::TimedOut {
            self.released = true;
        }
        Ok(outcome)
    }

    fn reacquire_reader(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::ChannelUnavailable("closed".into()));
        }
        self.released = false;
        self.reacquired += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Shared view of a [`ScriptedChannel`] that stays inspectable after the
/// channel is moved into a session.
#[derive(Clone, Default)]
pub(crate) struct ChannelProbe {
    inner: std::sync::Arc<std::sync::Mutex<ProbeState>>,
}

#[derive(Default)]
struct ProbeState {
    written: Vec<Vec<u8>>,
    closed: bool,
}

impl ChannelProbe {
    pub(crate) fn written(&self) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .written
            .clone()
    }

    pub(crate) fn closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .closed
    }
}

/// A [`ScriptedChannel`] that reports writes and close to a [`ChannelProbe`].
pub(crate) struct ProbedChannel {
    channel: ScriptedChannel,
    probe: ChannelProbe,
}

impl ProbedChannel {
    pub(crate) fn new(script: impl IntoIterator<Item = ReadOutcome>) -> (Self, ChannelProbe) {
        let probe = ChannelProbe::default();
        (
            Self {
                channel: ScriptedChannel::new(script),
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl DeviceChannel for ProbedChannel {
    fn name(&self) -> &str {
        self.channel.name()
    }

    fn write_command(&mut self, bytes: &[u8]) -> Result<()> {
        self.channel
            .write_command(bytes)?;
        self.probe
            .inner
            .lock()
            .unwrap()
            .written
            .push(bytes.to_vec());
        Ok(())
    }

    fn read_chunk(&mut self, wait: Duration) -> Result<ReadOutcome> {
        self.channel.read_chunk(wait)
    }

    fn reacquire_reader(&mut self) -> Result<()> {
        self.channel.reacquire_reader()
    }

    fn close(&mut self) -> Result<()> {
        self.channel.close()?;
        self.probe
            .inner
            .lock()
            .unwrap()
            .closed = true;
        Ok(())
    }
}

/// Repository backed by in-memory listings and blobs.
#[derive(Default)]
pub(crate) struct MemoryRepository {
    listings: HashMap<String, Vec<RemoteEntry>>,
    blobs: HashMap<String, Vec<u8>>,
    failing: HashMap<String, u16>,
}

impl MemoryRepository {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a file to `collection`, downloadable at `mem://{collection}/{name}`.
    pub(crate) fn with_file(mut self, collection: &str, name: &str, bytes: &[u8]) -> Self {
        let url = format!("mem://{collection}/{name}");
        self.listings
            .entry(collection.to_string())
            .or_default()
            .push(RemoteEntry {
                name: name.to_string(),
                download_url: Some(url.clone()),
                kind: EntryKind::File,
            });
        self.blobs
            .insert(url, bytes.to_vec());
        self
    }

    /// Make every fetch of `collection/name` fail with `status`.
    pub(crate) fn with_failing_fetch(mut self, collection: &str, name: &str, status: u16) -> Self {
        self.failing
            .insert(format!("mem://{collection}/{name}"), status);
        self
    }

    pub(crate) fn heal(&mut self) {
        self.failing.clear();
    }
}

impl Repository for MemoryRepository {
    fn list_files(&self, collection: &str) -> Result<Vec<RemoteEntry>> {
        Ok(self
            .listings
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    fn fetch(&self, download_url: &str) -> Result<Vec<u8>> {
        if let Some(status) = self.failing.get(download_url) {
            return Err(Error::FetchFailed { status: *status });
        }
        self.blobs
            .get(download_url)
            .cloned()
            .ok_or(Error::FetchFailed { status: 404 })
    }
}

/// Flasher that records what it was asked to write.
#[derive(Default)]
pub(crate) struct RecordingFlasher {
    pub(crate) calls: Vec<(Vec<u8>, u32, u16)>,
    pub(crate) fail_with: Option<String>,
}

impl Flasher for RecordingFlasher {
    fn flash(&mut self, image: &[u8], address: u32, transfer_size: u16) -> Result<()> {
        if let Some(message) = &self.fail_with {
            return Err(Error::FlashFailed(message.clone()));
        }
        self.calls
            .push((image.to_vec(), address, transfer_size));
        Ok(())
    }
}
