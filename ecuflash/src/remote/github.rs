//! GitHub contents API repository.
//!
//! Each collection is a GitHub repository; its root directory listing comes
//! from `GET /repos/{owner}/{collection}/contents/?ref={branch}`.

use {
    crate::{
        error::{Error, Result},
        remote::{EntryKind, RemoteEntry, Repository},
    },
    log::debug,
    serde::Deserialize,
    std::{io::Read, time::Duration},
};

/// Default GitHub API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Account that publishes Speeduino firmware and configuration files.
pub const DEFAULT_OWNER: &str = "NickZ1969";

/// Default branch to list.
pub const DEFAULT_BRANCH: &str = "main";

/// Default upper bound on a single download.
pub const MAX_DOWNLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// Connection settings for [`GithubRepository`].
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// API endpoint, without trailing slash.
    pub api_base: String,
    /// Repository owner.
    pub owner: String,
    /// Branch or tag to list.
    pub branch: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Largest accepted download; bigger bodies are an error.
    pub max_download_bytes: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            timeout: Duration::from_secs(30),
            max_download_bytes: MAX_DOWNLOAD_BYTES,
        }
    }
}

/// Repository backed by the GitHub contents API.
pub struct GithubRepository {
    agent: ureq::Agent,
    config: GithubConfig,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    download_url: Option<String>,
}

impl GithubRepository {
    /// Create a client for the given settings.
    pub fn new(config: GithubConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout)
            .user_agent(concat!("ecuflash/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent, config }
    }

    /// Listing URL of a collection (without the `ref` query).
    pub fn contents_url(&self, collection: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/",
            self.config
                .api_base
                .trim_end_matches('/'),
            self.config.owner,
            collection
        )
    }
}

impl Repository for GithubRepository {
    fn list_files(&self, collection: &str) -> Result<Vec<RemoteEntry>> {
        let url = self.contents_url(collection);
        debug!("GET {url}?ref={}", self.config.branch);

        let body = self
            .agent
            .get(&url)
            .query("ref", &self.config.branch)
            .set("Accept", "application/vnd.github+json")
            .call()
            .map_err(|e| map_ureq_error(&url, e))?
            .into_string()?;

        parse_listing(&body)
    }

    fn fetch(&self, download_url: &str) -> Result<Vec<u8>> {
        debug!("GET {download_url}");

        let response = self
            .agent
            .get(download_url)
            .call()
            .map_err(|e| map_ureq_error(download_url, e))?;

        let limit = self.config.max_download_bytes;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(limit.saturating_add(1))
            .read_to_end(&mut bytes)?;
        if bytes.len() as u64 > limit {
            return Err(Error::Http(format!(
                "{download_url}: download exceeds {limit} bytes"
            )));
        }
        debug!("Fetched {} bytes", bytes.len());
        Ok(bytes)
    }
}

fn map_ureq_error(url: &str, err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(status, _) => Error::FetchFailed { status },
        ureq::Error::Transport(transport) => Error::Http(format!("{url}: {transport}")),
    }
}

/// Parse a contents API directory listing.
pub fn parse_listing(json: &str) -> Result<Vec<RemoteEntry>> {
    let items: Vec<ContentItem> = serde_json::from_str(json)
        .map_err(|e| Error::Parse(format!("unexpected GitHub listing: {e}")))?;

    Ok(items
        .into_iter()
        .map(|item| RemoteEntry {
            kind: match item.kind.as_str() {
                "file" => EntryKind::File,
                "dir" => EntryKind::Dir,
                _ => EntryKind::Other,
            },
            name: item.name,
            download_url: item.download_url,
        })
        .collect())
}
