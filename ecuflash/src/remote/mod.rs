//! Remote file repository collaborator.
//!
//! A repository is anything that can list the files of a named collection
//! and fetch a file's bytes. Firmware images and configuration files live in
//! two separate collections, each versioned through its filenames.

#[cfg(feature = "github")]
pub mod github;

use {
    crate::{error::Result, version::Version},
    log::trace,
};

/// Kind of a listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symlink, submodule or anything else.
    Other,
}

/// One row of a remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// File name.
    pub name: String,
    /// Where the bytes can be fetched from, if downloadable.
    pub download_url: Option<String>,
    /// Entry kind.
    pub kind: EntryKind,
}

/// A downloadable file with the version parsed from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// File name.
    pub name: String,
    /// Download reference passed to [`Repository::fetch`].
    pub download_url: String,
    /// Version parsed from `name`, `None` if the name carries none.
    pub version: Option<Version>,
}

impl RemoteFile {
    /// Create a file entry, parsing its version from the name.
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        let name = name.into();
        let version = Version::parse_filename(&name);
        Self {
            name,
            download_url: download_url.into(),
            version,
        }
    }
}

/// Listing and download operations of a remote repository.
pub trait Repository {
    /// List every entry of `collection`.
    fn list_files(&self, collection: &str) -> Result<Vec<RemoteEntry>>;

    /// Fetch the bytes behind a download reference.
    fn fetch(&self, download_url: &str) -> Result<Vec<u8>>;
}

impl<R: Repository + ?Sized> Repository for &R {
    fn list_files(&self, collection: &str) -> Result<Vec<RemoteEntry>> {
        (**self).list_files(collection)
    }

    fn fetch(&self, download_url: &str) -> Result<Vec<u8>> {
        (**self).fetch(download_url)
    }
}

/// Keep downloadable files whose name ends with `extension` (case-insensitive).
pub fn files_with_extension(entries: &[RemoteEntry], extension: &str) -> Vec<RemoteFile> {
    let suffix = format!(".{}", extension.trim_start_matches('.')).to_ascii_lowercase();
    entries
        .iter()
        .filter(|entry| entry.kind == EntryKind::File)
        .filter(|entry| {
            entry
                .name
                .to_ascii_lowercase()
                .ends_with(&suffix)
        })
        .filter_map(|entry| {
            let Some(url) = &entry.download_url else {
                trace!("Skipping {}: no download reference", entry.name);
                return None;
            };
            Some(RemoteFile::new(entry.name.clone(), url.clone()))
        })
        .collect()
}
