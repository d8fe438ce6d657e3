//! Per-crawl artifact directory
//!
//! Every crawl run stores the bodies it fetched under
//! `{download_dir}/{domain}_{uuid}/`, one file per URL, named with
//! `sanitize_filename`.

use crate::url::sanitize_filename;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A freshly created directory that receives one crawl run's artifacts
#[derive(Debug, Clone)]
pub struct DownloadArea {
    dir: PathBuf,
}

impl DownloadArea {
    /// Creates a uniquely named directory for one crawl of `domain`
    ///
    /// # Arguments
    ///
    /// * `root` - The configured download directory (created if missing)
    /// * `domain` - The crawled website's domain
    pub async fn create(root: &Path, domain: &str) -> io::Result<Self> {
        let name = format!("{}_{}", sanitize_filename(domain), Uuid::new_v4());
        let dir = root.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// The directory path
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Writes one fetched body and returns the artifact path
    ///
    /// A later URL that sanitizes to the same name replaces the earlier file.
    pub async fn store(&self, url: &str, body: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.join(sanitize_filename(url));
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}
