//! Roster file persistence + profile page fetching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use sjt_core::{FetchOutcome, ProfileRecord};

pub const CRATE_NAME: &str = "sjt-storage";

/// Identifying User-Agent sent with every profile request.
pub const USER_AGENT: &str =
    "GDSC-Bennett-Completion-Tracker-Bot/1.0 (+https://github.com/Chitresh-code)";

/// Loads and atomically rewrites the roster JSON file.
#[derive(Debug, Clone)]
pub struct RosterStore {
    path: PathBuf,
}

impl RosterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> anyhow::Result<Vec<ProfileRecord>> {
        let bytes = fs::read(&self.path)
            .await
            .with_context(|| format!("reading roster file {}", self.path.display()))?;
        let records: Vec<ProfileRecord> = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing roster file {}", self.path.display()))?;
        info!(count = records.len(), path = %self.path.display(), "loaded roster");
        Ok(records)
    }

    /// Serialize with four-space indentation and atomically replace the file
    /// via a temp-file rename.
    pub async fn save(&self, records: &[ProfileRecord]) -> anyhow::Result<()> {
        let bytes = render_roster(records).context("serializing roster")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating roster directory {}", parent.display()))?;
            }
        }

        let temp_name = format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len());
        let temp_path = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(&temp_name),
            _ => PathBuf::from(&temp_name),
        };

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp roster file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp roster file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp roster file {}", temp_path.display()))?;
        drop(file);

        match fs::rename(&temp_path, &self.path).await {
            Ok(()) => {
                info!(count = records.len(), path = %self.path.display(), "wrote roster");
                Ok(())
            }
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!(
                        "atomically renaming temp roster {} -> {}",
                        temp_path.display(),
                        self.path.display()
                    )
                })
            }
        }
    }
}

/// The roster file uses four-space indentation, literal non-ASCII text, and
/// a trailing newline.
fn render_roster(records: &[ProfileRecord]) -> serde_json::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    records.serialize(&mut serializer)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Seam between sweep orchestration and the network, so the sweep can be
/// driven by a scripted source in tests.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetch one profile page and extract its achievements. Never fails:
    /// trouble is folded into the returned outcome.
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// HTTP client that turns a profile URL into a `FetchOutcome`.
#[derive(Debug, Clone)]
pub struct ProfileFetcher {
    client: reqwest::Client,
}

impl ProfileFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }

    async fn get_html(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl ProfileSource for ProfileFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let span = info_span!("profile_fetch", url);
        let _guard = span.enter();

        match self.get_html(url).await {
            Ok(html) => {
                let extraction = sjt_extract::extract(&html);
                debug!(
                    badges = extraction.badges.len(),
                    arcade_games = extraction.arcade_games.len(),
                    "extracted achievements"
                );
                FetchOutcome::success(url, extraction.badges, extraction.arcade_games)
            }
            Err(err) => {
                warn!(error = %err, "profile fetch failed");
                FetchOutcome::failure(url, err.to_string())
            }
        }
    }
}
